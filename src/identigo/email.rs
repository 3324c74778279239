//! Outbound email seam.
//!
//! Verification and password-reset flows hand a message to an `EmailSender`
//! and do not care how delivery happens (SMTP, API, outbox worker). The
//! default sender for local dev logs the payload and returns `Ok`.

use serde_json::json;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    /// Verification mail carrying the raw one-shot token.
    #[must_use]
    pub fn verification(to_email: &str, token: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: "verify_email".to_string(),
            payload_json: json!({ "email": to_email, "token": token }).to_string(),
        }
    }

    /// Password-reset mail carrying the raw one-shot token.
    #[must_use]
    pub fn password_reset(to_email: &str, token: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: "password_reset".to_string(),
            payload_json: json!({ "email": to_email, "token": token }).to_string(),
        }
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error("mail delivery via {transport} failed: {detail}")]
pub struct MailFailure {
    pub transport: String,
    pub detail: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or report a transport failure.
    fn send(&self, message: &EmailMessage) -> Result<(), MailFailure>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), MailFailure> {
        tracing::info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Sender that records every message; used by tests that need to read the
/// raw token a flow mailed out.
#[derive(Debug, Default)]
pub struct CapturingEmailSender {
    sent: std::sync::Mutex<Vec<EmailMessage>>,
}

impl CapturingEmailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EmailSender for CapturingEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), MailFailure> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

/// Sender that always fails; exercises the mail-failure path in tests.
#[derive(Clone, Debug, Default)]
pub struct FailingEmailSender;

impl EmailSender for FailingEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), MailFailure> {
        Err(MailFailure {
            transport: "test".to_string(),
            detail: format!("refused to deliver to {}", message.to_email),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EmailMessage, EmailSender, FailingEmailSender, LogEmailSender};

    #[test]
    fn log_sender_accepts_everything() {
        let message = EmailMessage::verification("user@example.com", "token");
        assert!(LogEmailSender.send(&message).is_ok());
    }

    #[test]
    fn failing_sender_reports_transport() {
        let message = EmailMessage::password_reset("user@example.com", "token");
        let err = FailingEmailSender.send(&message).unwrap_err();
        assert_eq!(err.transport, "test");
        assert!(err.detail.contains("user@example.com"));
    }

    #[test]
    fn verification_payload_carries_token() {
        let message = EmailMessage::verification("user@example.com", "tok123");
        assert_eq!(message.template, "verify_email");
        assert!(message.payload_json.contains("tok123"));
    }
}
