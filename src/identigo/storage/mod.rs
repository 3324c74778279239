//! Storage collaborator contracts.
//!
//! Handlers read and write exclusively through a transaction obtained from
//! an [`IdentityStore`]; the transaction exposes typed query capabilities
//! and surfaces every problem as a [`StorageFailure`] carrying a stable
//! error code and diagnostic attributes. The core never sees SQL.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::identigo::policy::PermissionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable storage error codes, passed through to command failures verbatim.
pub mod codes {
    pub const QUERY_FAILED: &str = "STORAGE_QUERY_FAILED";
    pub const DUPLICATE_KEY: &str = "STORAGE_DUPLICATE_KEY";
    pub const CONNECTION_FAILED: &str = "STORAGE_CONNECTION_FAILED";
    pub const TRANSACTION_FAILED: &str = "STORAGE_TRANSACTION_FAILED";
    pub const READ_ONLY: &str = "STORAGE_READ_ONLY";
}

/// Typed storage error: code, message, diagnostic attributes, optional
/// remediation hint. Attributes never contain SQL text or secrets.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error("storage failure {code}: {message}")]
pub struct StorageFailure {
    pub code: String,
    pub message: String,
    pub attributes: BTreeMap<String, String>,
    pub remediation: Option<String>,
}

impl StorageFailure {
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            attributes: BTreeMap::new(),
            remediation: None,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

/// Privilege level the caller selects when opening a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreRole {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountStatus {
    PendingVerification,
    Active,
    Disabled,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_verification" => Some(Self::PendingVerification),
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub real_name: String,
    pub status: AccountStatus,
    pub password_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminRecord {
    pub id: Uuid,
    pub email: String,
    pub real_name: String,
    pub password_hash: String,
    pub permissions: PermissionSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub admin_id: Uuid,
    pub operation: String,
    pub subject: Option<Uuid>,
    pub detail: String,
}

/// What a pending one-shot token is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailAdd,
    PasswordReset,
}

impl TokenPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailAdd => "email_add",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// A stored one-shot token. Only the hash of the raw token is persisted;
/// `payload` carries flow data (the email address being added).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingToken {
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

/// Opens transactions bound to a caller-selected role.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn begin(&self, role: StoreRole) -> Result<Box<dyn IdentityTx>, StorageFailure>;
}

/// One request's exclusively-owned transaction.
#[async_trait]
pub trait IdentityTx: Send {
    fn users(&mut self) -> &mut dyn UserQueries;
    fn admins(&mut self) -> &mut dyn AdminQueries;
    fn audit(&mut self) -> &mut dyn AuditQueries;

    async fn commit(self: Box<Self>) -> Result<(), StorageFailure>;
    async fn rollback(self: Box<Self>) -> Result<(), StorageFailure>;
}

#[async_trait]
pub trait UserQueries: Send {
    async fn find_by_id(&mut self, id: Uuid) -> Result<Option<UserRecord>, StorageFailure>;
    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserRecord>, StorageFailure>;
    async fn insert(&mut self, record: &UserRecord) -> Result<(), StorageFailure>;
    async fn update_real_name(&mut self, id: Uuid, real_name: &str)
        -> Result<bool, StorageFailure>;
    async fn update_email(&mut self, id: Uuid, email: &str) -> Result<bool, StorageFailure>;
    async fn update_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StorageFailure>;
    async fn update_status(
        &mut self,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StorageFailure>;
    async fn delete(&mut self, id: Uuid) -> Result<bool, StorageFailure>;

    async fn insert_token(
        &mut self,
        token_hash: &[u8],
        token: &PendingToken,
    ) -> Result<(), StorageFailure>;
    /// Atomically consume an unconsumed, unexpired token. Returns the token
    /// data once; a second call for the same hash yields `None`.
    async fn consume_token(
        &mut self,
        token_hash: &[u8],
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingToken>, StorageFailure>;
}

#[async_trait]
pub trait AdminQueries: Send {
    async fn find_by_id(&mut self, id: Uuid) -> Result<Option<AdminRecord>, StorageFailure>;
    async fn find_by_email(&mut self, email: &str) -> Result<Option<AdminRecord>, StorageFailure>;
    async fn insert(&mut self, record: &AdminRecord) -> Result<(), StorageFailure>;
    async fn update_permissions(
        &mut self,
        id: Uuid,
        permissions: PermissionSet,
    ) -> Result<bool, StorageFailure>;
}

#[async_trait]
pub trait AuditQueries: Send {
    async fn record(&mut self, entry: &AuditRecord) -> Result<(), StorageFailure>;
    /// Newest-first page of audit records.
    async fn read_latest(&mut self, limit: u32) -> Result<Vec<AuditRecord>, StorageFailure>;
}
