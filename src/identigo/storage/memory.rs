//! In-memory storage backend.
//!
//! A transaction clones the shared state on `begin` and works on the copy;
//! `commit` swaps the copy back in, `rollback` simply drops it. This gives
//! the same commit/rollback observability as the Postgres backend without a
//! running database, which is what the deterministic test-suite runs on.

use super::{
    codes, AccountStatus, AdminQueries, AdminRecord, AuditQueries, AuditRecord, IdentityStore,
    IdentityTx, PendingToken, StorageFailure, StoreRole, TokenPurpose, UserQueries, UserRecord,
};
use crate::identigo::policy::PermissionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct StoredToken {
    token: PendingToken,
    consumed: bool,
}

#[derive(Clone, Debug, Default)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    admins: HashMap<Uuid, AdminRecord>,
    tokens: HashMap<Vec<u8>, StoredToken>,
    audit: Vec<AuditRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail; exercises the commit-error path.
    pub fn set_commit_failure(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Seed a user outside of any transaction (test arrangement).
    pub fn seed_user(&self, record: UserRecord) {
        self.lock().users.insert(record.id, record);
    }

    /// Seed an admin outside of any transaction (test arrangement).
    pub fn seed_admin(&self, record: AdminRecord) {
        self.lock().admins.insert(record.id, record);
    }

    #[must_use]
    pub fn user(&self, id: Uuid) -> Option<UserRecord> {
        self.lock().users.get(&id).cloned()
    }

    #[must_use]
    pub fn admin(&self, id: Uuid) -> Option<AdminRecord> {
        self.lock().admins.get(&id).cloned()
    }

    #[must_use]
    pub fn audit_len(&self) -> usize {
        self.lock().audit.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn begin(&self, role: StoreRole) -> Result<Box<dyn IdentityTx>, StorageFailure> {
        let working = self.lock().clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.state),
            working,
            role,
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<State>>,
    working: State,
    role: StoreRole,
    fail_commit: bool,
}

impl MemoryTx {
    fn writable(&self) -> Result<(), StorageFailure> {
        match self.role {
            StoreRole::ReadWrite => Ok(()),
            StoreRole::ReadOnly => Err(StorageFailure::new(
                codes::READ_ONLY,
                "write attempted in a read-only transaction",
            )),
        }
    }

    fn duplicate_email(entity: &'static str) -> StorageFailure {
        StorageFailure::new(codes::DUPLICATE_KEY, "email already exists")
            .with_attribute("db.entity", entity)
            .with_attribute("db.constraint", "email_unique")
    }
}

#[async_trait]
impl IdentityTx for MemoryTx {
    fn users(&mut self) -> &mut dyn UserQueries {
        self
    }

    fn admins(&mut self) -> &mut dyn AdminQueries {
        self
    }

    fn audit(&mut self) -> &mut dyn AuditQueries {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageFailure> {
        if self.fail_commit {
            return Err(
                StorageFailure::new(codes::TRANSACTION_FAILED, "commit refused")
                    .with_remediation("Retry later"),
            );
        }
        *self.shared.lock().unwrap_or_else(PoisonError::into_inner) = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageFailure> {
        // Dropping the working copy is the rollback.
        Ok(())
    }
}

#[async_trait]
impl UserQueries for MemoryTx {
    async fn find_by_id(&mut self, id: Uuid) -> Result<Option<UserRecord>, StorageFailure> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserRecord>, StorageFailure> {
        Ok(self
            .working
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert(&mut self, record: &UserRecord) -> Result<(), StorageFailure> {
        self.writable()?;
        if self
            .working
            .users
            .values()
            .any(|user| user.email == record.email)
        {
            return Err(Self::duplicate_email("users"));
        }
        self.working.users.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_real_name(
        &mut self,
        id: Uuid,
        real_name: &str,
    ) -> Result<bool, StorageFailure> {
        self.writable()?;
        Ok(self.working.users.get_mut(&id).is_some_and(|user| {
            user.real_name = real_name.to_string();
            true
        }))
    }

    async fn update_email(&mut self, id: Uuid, email: &str) -> Result<bool, StorageFailure> {
        self.writable()?;
        if self
            .working
            .users
            .values()
            .any(|user| user.id != id && user.email == email)
        {
            return Err(Self::duplicate_email("users"));
        }
        Ok(self.working.users.get_mut(&id).is_some_and(|user| {
            user.email = email.to_string();
            true
        }))
    }

    async fn update_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StorageFailure> {
        self.writable()?;
        Ok(self.working.users.get_mut(&id).is_some_and(|user| {
            user.password_hash = password_hash.to_string();
            true
        }))
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StorageFailure> {
        self.writable()?;
        Ok(self.working.users.get_mut(&id).is_some_and(|user| {
            user.status = status;
            true
        }))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, StorageFailure> {
        self.writable()?;
        Ok(self.working.users.remove(&id).is_some())
    }

    async fn insert_token(
        &mut self,
        token_hash: &[u8],
        token: &PendingToken,
    ) -> Result<(), StorageFailure> {
        self.writable()?;
        self.working.tokens.insert(
            token_hash.to_vec(),
            StoredToken {
                token: token.clone(),
                consumed: false,
            },
        );
        Ok(())
    }

    async fn consume_token(
        &mut self,
        token_hash: &[u8],
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingToken>, StorageFailure> {
        self.writable()?;
        let Some(stored) = self.working.tokens.get_mut(token_hash) else {
            return Ok(None);
        };
        if stored.consumed || stored.token.purpose != purpose || stored.token.expires_at <= now {
            return Ok(None);
        }
        stored.consumed = true;
        Ok(Some(stored.token.clone()))
    }
}

#[async_trait]
impl AdminQueries for MemoryTx {
    async fn find_by_id(&mut self, id: Uuid) -> Result<Option<AdminRecord>, StorageFailure> {
        Ok(self.working.admins.get(&id).cloned())
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<AdminRecord>, StorageFailure> {
        Ok(self
            .working
            .admins
            .values()
            .find(|admin| admin.email == email)
            .cloned())
    }

    async fn insert(&mut self, record: &AdminRecord) -> Result<(), StorageFailure> {
        self.writable()?;
        if self
            .working
            .admins
            .values()
            .any(|admin| admin.email == record.email)
        {
            return Err(Self::duplicate_email("admins"));
        }
        self.working.admins.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_permissions(
        &mut self,
        id: Uuid,
        permissions: PermissionSet,
    ) -> Result<bool, StorageFailure> {
        self.writable()?;
        Ok(self.working.admins.get_mut(&id).is_some_and(|admin| {
            admin.permissions = permissions;
            true
        }))
    }
}

#[async_trait]
impl AuditQueries for MemoryTx {
    async fn record(&mut self, entry: &AuditRecord) -> Result<(), StorageFailure> {
        self.writable()?;
        self.working.audit.push(entry.clone());
        Ok(())
    }

    async fn read_latest(&mut self, limit: u32) -> Result<Vec<AuditRecord>, StorageFailure> {
        let mut page: Vec<AuditRecord> = self.working.audit.clone();
        page.sort_by(|a, b| b.at.cmp(&a.at));
        page.truncate(limit as usize);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        codes, AccountStatus, IdentityStore, PendingToken, StoreRole, TokenPurpose, UserRecord,
    };
    use super::MemoryStore;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            real_name: "Test User".to_string(),
            status: AccountStatus::Active,
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn commit_publishes_and_rollback_discards() {
        let store = MemoryStore::new();
        let alice = user("alice@example.com");
        let bob = user("bob@example.com");

        let mut tx = store.begin(StoreRole::ReadWrite).await.unwrap();
        tx.users().insert(&alice).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.user(alice.id).is_some());

        let mut tx = store.begin(StoreRole::ReadWrite).await.unwrap();
        tx.users().insert(&bob).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.user(bob.id).is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_typed_failure() {
        let store = MemoryStore::new();
        store.seed_user(user("alice@example.com"));

        let mut tx = store.begin(StoreRole::ReadWrite).await.unwrap();
        let err = tx
            .users()
            .insert(&user("alice@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::DUPLICATE_KEY);
        assert_eq!(
            err.attributes.get("db.entity").map(String::as_str),
            Some("users")
        );
    }

    #[tokio::test]
    async fn read_only_transactions_refuse_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin(StoreRole::ReadOnly).await.unwrap();
        let err = tx.users().insert(&user("x@example.com")).await.unwrap_err();
        assert_eq!(err.code, codes::READ_ONLY);
    }

    #[tokio::test]
    async fn tokens_are_consumed_exactly_once() {
        let store = MemoryStore::new();
        let alice = user("alice@example.com");
        let now = Utc::now();
        let token = PendingToken {
            user_id: alice.id,
            purpose: TokenPurpose::EmailAdd,
            payload: "new@example.com".to_string(),
            expires_at: now + Duration::minutes(30),
        };

        let mut tx = store.begin(StoreRole::ReadWrite).await.unwrap();
        tx.users().insert_token(b"hash", &token).await.unwrap();

        let first = tx
            .users()
            .consume_token(b"hash", TokenPurpose::EmailAdd, now)
            .await
            .unwrap();
        assert_eq!(first.as_ref().map(|t| t.payload.as_str()), Some("new@example.com"));

        let second = tx
            .users()
            .consume_token(b"hash", TokenPurpose::EmailAdd, now)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn expired_or_mismatched_tokens_do_not_consume() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let token = PendingToken {
            user_id: Uuid::new_v4(),
            purpose: TokenPurpose::PasswordReset,
            payload: String::new(),
            expires_at: now - Duration::minutes(1),
        };

        let mut tx = store.begin(StoreRole::ReadWrite).await.unwrap();
        tx.users().insert_token(b"stale", &token).await.unwrap();

        let expired = tx
            .users()
            .consume_token(b"stale", TokenPurpose::PasswordReset, now)
            .await
            .unwrap();
        assert!(expired.is_none());

        let wrong_purpose = tx
            .users()
            .consume_token(b"stale", TokenPurpose::EmailAdd, now)
            .await
            .unwrap();
        assert!(wrong_purpose.is_none());
    }

    #[tokio::test]
    async fn commit_failure_knob_reports_transaction_code() {
        let store = MemoryStore::new();
        store.set_commit_failure(true);

        let mut tx = store.begin(StoreRole::ReadWrite).await.unwrap();
        tx.users().insert(&user("x@example.com")).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.code, codes::TRANSACTION_FAILED);
    }
}
