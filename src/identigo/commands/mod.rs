//! Concrete command handlers and their shared helpers.

mod admin_audit;
mod admin_users;
mod email_flow;
mod login;
mod password_reset;
mod profile;

pub use admin_audit::{AdminAuditRead, AdminPermissionGrant, GrantOutcome};
pub use admin_users::{
    AdminUserCreate, AdminUserDelete, AdminUserRead, AdminUserUpdate, CreatedUser, UserProfile,
};
pub use email_flow::{UserAccountVerify, UserEmailAddBegin, UserEmailAddConfirm, UserEmailAddDeny};
pub use login::{AdminLogin, AdminLoginResponse, UserLogin, UserLoginResponse, UserLogout, AdminLogout};
pub use password_reset::{UserPasswordResetBegin, UserPasswordResetComplete};
pub use profile::{ProfileView, UserNameUpdate, UserPasswordChange, UserProfileRead};

use crate::identigo::config::CoreConfig;
use crate::identigo::context::Context;
use crate::identigo::failure::CommandError;
use crate::identigo::messages::MessageRef;
use crate::identigo::storage::AuditRecord;
use argon2::password_hash::{rand_core::OsRng as HashOsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(crate) fn require_valid_email(email: &str) -> Result<String, CommandError> {
    let normalized = normalize_email(email);
    if valid_email(&normalized) {
        Ok(normalized)
    } else {
        Err(CommandError::Validation(MessageRef::with_args(
            "user.email-invalid",
            vec![normalized],
        )))
    }
}

/// Hash a password for storage (argon2id, fresh salt per call).
pub fn hash_password(password: &str) -> Result<String, CommandError> {
    let salt = SaltString::generate(&mut HashOsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| credential_error())
}

/// Verify a candidate against a stored hash. A corrupt stored hash is a
/// server-side defect, not a wrong password.
pub(crate) fn verify_password(stored_hash: &str, candidate: &str) -> Result<bool, CommandError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| credential_error())?;
    Ok(Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok())
}

fn credential_error() -> CommandError {
    CommandError::Tagged {
        code: "CREDENTIAL_RECORD_INVALID".to_string(),
        message: MessageRef::new("auth.credential-error"),
    }
}

/// Enforce the password format rules: length bounds plus a minimal
/// mixed-character requirement.
pub(crate) fn check_password_format(
    config: &CoreConfig,
    password: &str,
) -> Result<(), CommandError> {
    let chars = password.chars().count();
    if chars < config.password_min_chars() {
        return Err(CommandError::Password(MessageRef::with_args(
            "password.too-short",
            vec![config.password_min_chars().to_string()],
        )));
    }
    if chars > config.password_max_chars() {
        return Err(CommandError::Password(MessageRef::with_args(
            "password.too-long",
            vec![config.password_max_chars().to_string()],
        )));
    }
    let all_letters = password.chars().all(char::is_alphabetic);
    let all_digits = password.chars().all(|c| c.is_ascii_digit());
    if all_letters || all_digits {
        return Err(CommandError::Password(MessageRef::new(
            "password.too-simple",
        )));
    }
    Ok(())
}

/// Fresh one-shot token for email links: 32 random bytes, URL-safe base64.
/// Only its hash is persisted.
pub(crate) fn generate_one_shot_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a one-shot token so raw values never touch the database.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Append an audit entry for an administrative mutation.
pub(crate) async fn record_audit(
    ctx: &mut Context,
    admin_id: Uuid,
    operation: &str,
    subject: Option<Uuid>,
    detail: impl Into<String>,
) -> Result<(), CommandError> {
    let entry = AuditRecord {
        id: Uuid::new_v4(),
        at: ctx.clock().wall(),
        admin_id,
        operation: operation.to_string(),
        subject,
        detail: detail.into(),
    };
    ctx.audit().record(&entry).await?;
    Ok(())
}
