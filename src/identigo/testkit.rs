//! Shared arrangement helpers for the unit-test suites.

use crate::identigo::clock::ManualClock;
use crate::identigo::config::CoreConfig;
use crate::identigo::context::{Context, Services, SessionHandle};
use crate::identigo::email::{EmailSender, LogEmailSender};
use crate::identigo::policy::{DefaultPolicy, PermissionSet};
use crate::identigo::storage::{
    AccountStatus, AdminRecord, IdentityStore, MemoryStore, StoreRole, UserRecord,
};
use crate::identigo::telemetry::CountingSink;
use std::sync::Arc;
use ulid::Ulid;
use uuid::Uuid;

pub(crate) struct TestEnv {
    pub services: Arc<Services>,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub telemetry: Arc<CountingSink>,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        Self::with_mailer(Arc::new(LogEmailSender))
    }

    pub(crate) fn with_mailer(mailer: Arc<dyn EmailSender>) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new());
        let telemetry = Arc::new(CountingSink::new());
        let services = Services::new(
            Arc::new(store.clone()),
            Arc::new(DefaultPolicy),
            mailer,
            Arc::clone(&clock) as _,
            Arc::clone(&telemetry) as _,
            CoreConfig::new(),
        );
        Self {
            services,
            store,
            clock,
            telemetry,
        }
    }

    pub(crate) async fn context(&self, session: SessionHandle) -> Context {
        let tx = self
            .services
            .store
            .begin(StoreRole::ReadWrite)
            .await
            .expect("begin transaction");
        Context::create(
            Arc::clone(&self.services),
            tx,
            session,
            "203.0.113.7",
            "identigo-tests/1.0",
            Ulid::new().to_string(),
        )
    }

    pub(crate) async fn anonymous_context(&self) -> Context {
        self.context(SessionHandle::Anonymous).await
    }

    /// Seed an active user with the given password and return the record.
    pub(crate) fn seed_user(&self, email: &str, password: &str) -> UserRecord {
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            real_name: "Seeded User".to_string(),
            status: AccountStatus::Active,
            password_hash: password_hash(password),
        };
        self.store.seed_user(record.clone());
        record
    }

    /// Seed an admin with the given permissions and return the record.
    pub(crate) fn seed_admin(
        &self,
        email: &str,
        password: &str,
        permissions: PermissionSet,
    ) -> AdminRecord {
        let record = AdminRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            real_name: "Seeded Admin".to_string(),
            password_hash: password_hash(password),
            permissions,
        };
        self.store.seed_admin(record.clone());
        record
    }

    /// Open an admin session the way a completed login would.
    pub(crate) fn admin_session(&self, record: &AdminRecord) -> SessionHandle {
        let session = self.services.admin_sessions.create(record.id);
        session.set_permissions(record.permissions);
        SessionHandle::Admin(session)
    }

    /// Open a user session the way a completed login would.
    pub(crate) fn user_session(&self, record: &UserRecord) -> SessionHandle {
        SessionHandle::User(self.services.user_sessions.create(record.id))
    }
}

pub(crate) fn password_hash(password: &str) -> String {
    crate::identigo::commands::hash_password(password).expect("password hashing failed")
}
