//! The unified failure taxonomy.
//!
//! Business logic raises only the closed [`CommandError`] set; the executor
//! converts each variant into a [`CommandFailure`] with a fixed status and
//! error-code mapping. Anything outside the closed set is a programming
//! defect and propagates as a panic rather than being coerced into a
//! misleading structured error.

use crate::identigo::email::MailFailure;
use crate::identigo::messages::MessageRef;
use crate::identigo::storage::StorageFailure;
use std::collections::BTreeMap;
use std::fmt;

/// Stable machine-readable error codes.
pub mod codes {
    pub const HTTP_PARAMETER_INVALID: &str = "HTTP_PARAMETER_INVALID";
    pub const SECURITY_POLICY_DENIED: &str = "SECURITY_POLICY_DENIED";
    pub const PASSWORD_ERROR: &str = "PASSWORD_ERROR";
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const MAIL_SYSTEM_FAILURE: &str = "MAIL_SYSTEM_FAILURE";
}

/// The closed set of failures business logic may raise.
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    /// Malformed or rejected input; maps to 400 `HTTP_PARAMETER_INVALID`.
    #[error("invalid parameter")]
    Validation(MessageRef),

    /// Security policy denial; maps to 500 `SECURITY_POLICY_DENIED`.
    #[error("security policy denied: {0}")]
    Security(String),

    /// Password format problem; maps to 400 `PASSWORD_ERROR`.
    #[error("password not acceptable")]
    Password(MessageRef),

    /// Malformed command at the protocol level; maps to 400 `PROTOCOL_ERROR`.
    #[error("malformed command: {0}")]
    Protocol(String),

    /// Mail transport failure; maps to 500 `MAIL_SYSTEM_FAILURE`.
    #[error(transparent)]
    Mail(#[from] MailFailure),

    /// Storage failure; maps to 500 with the storage code and attributes
    /// passed through verbatim.
    #[error(transparent)]
    Storage(#[from] StorageFailure),

    /// Any other typed failure carrying its own stable code; maps to 500.
    #[error("{code}")]
    Tagged { code: String, message: MessageRef },
}

/// The structured failure returned to the transport instead of a response.
///
/// Always carries a non-empty error code and the originating request id;
/// the attribute map never contains secrets or internal exception details.
#[derive(Clone, Debug)]
pub struct CommandFailure {
    pub message: String,
    pub code: String,
    pub status: u16,
    pub attributes: BTreeMap<String, String>,
    pub remediation: Option<String>,
    pub request_id: String,
    pub cause: Option<String>,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] (request {}): {}",
            self.status, self.code, self.request_id, self.message
        )
    }
}

impl std::error::Error for CommandFailure {}
