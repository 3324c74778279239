//! Postgres storage backend.
//!
//! Queries follow the service convention: every statement runs inside a
//! `db.query` span and maps its error into a [`StorageFailure`] whose
//! attributes carry the operation and entity, never the SQL text.

use super::{
    codes, AccountStatus, AdminQueries, AdminRecord, AuditQueries, AuditRecord, IdentityStore,
    IdentityTx, PendingToken, StorageFailure, StoreRole, TokenPurpose, UserQueries, UserRecord,
};
use crate::identigo::policy::PermissionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    async fn begin(&self, role: StoreRole) -> Result<Box<dyn IdentityTx>, StorageFailure> {
        let mut tx = self.pool.begin().await.map_err(|err| {
            StorageFailure::new(codes::CONNECTION_FAILED, err.to_string())
                .with_remediation("Retry later")
        })?;

        if role == StoreRole::ReadOnly {
            let query = "SET TRANSACTION READ ONLY";
            let span = span_for("SET", "transaction", query);
            sqlx::query(query)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .map_err(|err| failure("SET", "transaction", &err))?;
        }

        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IdentityTx for PgTx {
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
        self.tx.commit().await.map_err(|err| {
            StorageFailure::new(codes::TRANSACTION_FAILED, err.to_string())
                .with_attribute("db.operation", "COMMIT")
                .with_remediation("Retry later")
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageFailure> {
        self.tx.rollback().await.map_err(|err| {
            StorageFailure::new(codes::TRANSACTION_FAILED, err.to_string())
                .with_attribute("db.operation", "ROLLBACK")
        })
    }
}

#[async_trait]
impl UserQueries for PgTx {
    async fn find_by_id(&mut self, id: Uuid) -> Result<Option<UserRecord>, StorageFailure> {
        let query = r"
            SELECT id, email, real_name, status, password_hash
            FROM users
            WHERE id = $1
        ";
        let span = span_for("SELECT", "users", query);
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("SELECT", "users", &err))?;
        row.map(user_from_row).transpose()
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserRecord>, StorageFailure> {
        let query = r"
            SELECT id, email, real_name, status, password_hash
            FROM users
            WHERE email = $1
        ";
        let span = span_for("SELECT", "users", query);
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("SELECT", "users", &err))?;
        row.map(user_from_row).transpose()
    }

    async fn insert(&mut self, record: &UserRecord) -> Result<(), StorageFailure> {
        let query = r"
            INSERT INTO users (id, email, real_name, status, password_hash)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = span_for("INSERT", "users", query);
        sqlx::query(query)
            .bind(record.id)
            .bind(&record.email)
            .bind(&record.real_name)
            .bind(record.status.as_str())
            .bind(&record.password_hash)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("INSERT", "users", &err))?;
        Ok(())
    }

    async fn update_real_name(
        &mut self,
        id: Uuid,
        real_name: &str,
    ) -> Result<bool, StorageFailure> {
        let query = "UPDATE users SET real_name = $2 WHERE id = $1";
        let span = span_for("UPDATE", "users", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(real_name)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("UPDATE", "users", &err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_email(&mut self, id: Uuid, email: &str) -> Result<bool, StorageFailure> {
        let query = "UPDATE users SET email = $2 WHERE id = $1";
        let span = span_for("UPDATE", "users", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(email)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("UPDATE", "users", &err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StorageFailure> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let span = span_for("UPDATE", "users", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("UPDATE", "users", &err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StorageFailure> {
        let query = "UPDATE users SET status = $2 WHERE id = $1";
        let span = span_for("UPDATE", "users", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("UPDATE", "users", &err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, StorageFailure> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = span_for("DELETE", "users", query);
        let result = sqlx::query(query)
            .bind(id)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("DELETE", "users", &err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_token(
        &mut self,
        token_hash: &[u8],
        token: &PendingToken,
    ) -> Result<(), StorageFailure> {
        let query = r"
            INSERT INTO pending_tokens (token_hash, user_id, purpose, payload, expires_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = span_for("INSERT", "pending_tokens", query);
        sqlx::query(query)
            .bind(token_hash)
            .bind(token.user_id)
            .bind(token.purpose.as_str())
            .bind(&token.payload)
            .bind(token.expires_at)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("INSERT", "pending_tokens", &err))?;
        Ok(())
    }

    async fn consume_token(
        &mut self,
        token_hash: &[u8],
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingToken>, StorageFailure> {
        let query = r"
            UPDATE pending_tokens
            SET consumed_at = $3
            WHERE token_hash = $1
              AND purpose = $2
              AND consumed_at IS NULL
              AND expires_at > $3
            RETURNING user_id, payload, expires_at
        ";
        let span = span_for("UPDATE", "pending_tokens", query);
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(purpose.as_str())
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("UPDATE", "pending_tokens", &err))?;

        Ok(row.map(|row| PendingToken {
            user_id: row.get("user_id"),
            purpose,
            payload: row.get("payload"),
            expires_at: row.get("expires_at"),
        }))
    }
}

#[async_trait]
impl AdminQueries for PgTx {
    async fn find_by_id(&mut self, id: Uuid) -> Result<Option<AdminRecord>, StorageFailure> {
        let query = r"
            SELECT id, email, real_name, password_hash, permissions
            FROM admins
            WHERE id = $1
        ";
        let span = span_for("SELECT", "admins", query);
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("SELECT", "admins", &err))?;
        Ok(row.map(admin_from_row))
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<AdminRecord>, StorageFailure> {
        let query = r"
            SELECT id, email, real_name, password_hash, permissions
            FROM admins
            WHERE email = $1
        ";
        let span = span_for("SELECT", "admins", query);
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("SELECT", "admins", &err))?;
        Ok(row.map(admin_from_row))
    }

    async fn insert(&mut self, record: &AdminRecord) -> Result<(), StorageFailure> {
        let query = r"
            INSERT INTO admins (id, email, real_name, password_hash, permissions)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = span_for("INSERT", "admins", query);
        sqlx::query(query)
            .bind(record.id)
            .bind(&record.email)
            .bind(&record.real_name)
            .bind(&record.password_hash)
            .bind(i64::from(record.permissions.bits()))
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("INSERT", "admins", &err))?;
        Ok(())
    }

    async fn update_permissions(
        &mut self,
        id: Uuid,
        permissions: PermissionSet,
    ) -> Result<bool, StorageFailure> {
        let query = "UPDATE admins SET permissions = $2 WHERE id = $1";
        let span = span_for("UPDATE", "admins", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(i64::from(permissions.bits()))
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("UPDATE", "admins", &err))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditQueries for PgTx {
    async fn record(&mut self, entry: &AuditRecord) -> Result<(), StorageFailure> {
        let query = r"
            INSERT INTO audit_log (id, at, admin_id, operation, subject, detail)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = span_for("INSERT", "audit_log", query);
        sqlx::query(query)
            .bind(entry.id)
            .bind(entry.at)
            .bind(entry.admin_id)
            .bind(&entry.operation)
            .bind(entry.subject)
            .bind(&entry.detail)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("INSERT", "audit_log", &err))?;
        Ok(())
    }

    async fn read_latest(&mut self, limit: u32) -> Result<Vec<AuditRecord>, StorageFailure> {
        let query = r"
            SELECT id, at, admin_id, operation, subject, detail
            FROM audit_log
            ORDER BY at DESC
            LIMIT $1
        ";
        let span = span_for("SELECT", "audit_log", query);
        let rows = sqlx::query(query)
            .bind(i64::from(limit))
            .fetch_all(&mut *self.tx)
            .instrument(span)
            .await
            .map_err(|err| failure("SELECT", "audit_log", &err))?;

        Ok(rows
            .into_iter()
            .map(|row| AuditRecord {
                id: row.get("id"),
                at: row.get("at"),
                admin_id: row.get("admin_id"),
                operation: row.get("operation"),
                subject: row.get("subject"),
                detail: row.get("detail"),
            })
            .collect())
    }
}

fn span_for(operation: &'static str, entity: &'static str, query: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.entity = entity,
        db.statement = query
    )
}

fn user_from_row(row: sqlx::postgres::PgRow) -> Result<UserRecord, StorageFailure> {
    let status: String = row.get("status");
    let status = AccountStatus::parse(&status).ok_or_else(|| {
        StorageFailure::new(codes::QUERY_FAILED, "unrecognized account status")
            .with_attribute("db.entity", "users")
    })?;
    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        real_name: row.get("real_name"),
        status,
        password_hash: row.get("password_hash"),
    })
}

fn admin_from_row(row: sqlx::postgres::PgRow) -> AdminRecord {
    let bits: i64 = row.get("permissions");
    AdminRecord {
        id: row.get("id"),
        email: row.get("email"),
        real_name: row.get("real_name"),
        password_hash: row.get("password_hash"),
        permissions: PermissionSet::from_bits_truncate(u32::try_from(bits).unwrap_or(0)),
    }
}

fn failure(operation: &'static str, entity: &'static str, err: &sqlx::Error) -> StorageFailure {
    if is_unique_violation(err) {
        return StorageFailure::new(codes::DUPLICATE_KEY, "unique constraint violated")
            .with_attribute("db.operation", operation)
            .with_attribute("db.entity", entity);
    }
    if is_read_only_violation(err) {
        return StorageFailure::new(codes::READ_ONLY, "write attempted in a read-only transaction")
            .with_attribute("db.operation", operation)
            .with_attribute("db.entity", entity);
    }
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageFailure::new(codes::CONNECTION_FAILED, "database connection failed")
                .with_attribute("db.operation", operation)
                .with_attribute("db.entity", entity)
                .with_remediation("Retry later")
        }
        _ => StorageFailure::new(codes::QUERY_FAILED, "database query failed")
            .with_attribute("db.operation", operation)
            .with_attribute("db.entity", entity),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn is_read_only_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "25006"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::codes;
    use super::failure;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code }))
    }

    #[test]
    fn unique_violation_maps_to_duplicate_key() {
        let failure = failure("INSERT", "users", &db_error(Some("23505")));
        assert_eq!(failure.code, codes::DUPLICATE_KEY);
        assert_eq!(
            failure.attributes.get("db.entity").map(String::as_str),
            Some("users")
        );
    }

    #[test]
    fn read_only_sqlstate_maps_to_read_only_code() {
        let failure = failure("UPDATE", "users", &db_error(Some("25006")));
        assert_eq!(failure.code, codes::READ_ONLY);
    }

    #[test]
    fn other_database_errors_map_to_query_failed() {
        let failure = failure("SELECT", "admins", &db_error(Some("42703")));
        assert_eq!(failure.code, codes::QUERY_FAILED);
        // No SQL text in the attribute map.
        assert!(!failure.attributes.contains_key("db.statement"));
    }

    #[test]
    fn pool_exhaustion_maps_to_connection_failed() {
        let failure = failure("SELECT", "users", &sqlx::Error::PoolTimedOut);
        assert_eq!(failure.code, codes::CONNECTION_FAILED);
        assert_eq!(failure.remediation.as_deref(), Some("Retry later"));
    }
}
