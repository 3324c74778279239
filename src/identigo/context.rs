//! Per-request execution context.
//!
//! A context is built once per request from the request id, the open
//! transaction, the resolved session, and caller metadata. It is the only
//! place where command failures are constructed, so every failure path
//! produces the same shape: stable code, transport status, request id,
//! localized message, secret-free attributes.

use crate::identigo::clock::Clock;
use crate::identigo::config::CoreConfig;
use crate::identigo::email::EmailSender;
use crate::identigo::failure::{codes, CommandError, CommandFailure};
use crate::identigo::limit::{RateGates, RateLimitOp, RateLimiter};
use crate::identigo::messages::{Locale, MessageRef, Messages};
use crate::identigo::policy::{Action, PolicyType};
use crate::identigo::session::{AdminSession, SessionId, SessionStore, UserSession};
use crate::identigo::storage::{
    AdminQueries, AuditQueries, IdentityStore, IdentityTx, UserQueries,
};
use crate::identigo::telemetry::TelemetrySink;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared server-lifetime collaborators, injected into every context.
pub struct Services {
    pub store: Arc<dyn IdentityStore>,
    pub policy: Arc<dyn PolicyType>,
    pub messages: Arc<Messages>,
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<dyn EmailSender>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub user_sessions: Arc<SessionStore<UserSession>>,
    pub admin_sessions: Arc<SessionStore<AdminSession>>,
    pub gates: RateGates,
    pub config: CoreConfig,
}

impl Services {
    /// Wire the shared state for one server instance: session stores and
    /// rate gates are built here from the config so there is exactly one
    /// owner for each.
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        policy: Arc<dyn PolicyType>,
        mailer: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
        config: CoreConfig,
    ) -> Arc<Self> {
        let user_sessions = Arc::new(SessionStore::new(
            config.session_idle_timeout(),
            Arc::clone(&clock),
            Arc::clone(&telemetry),
        ));
        let admin_sessions = Arc::new(SessionStore::new(
            config.session_idle_timeout(),
            Arc::clone(&clock),
            Arc::clone(&telemetry),
        ));
        let gates = RateGates {
            login: RateLimiter::new(RateLimitOp::Login, config.login_window(), Arc::clone(&clock)),
            password_reset: RateLimiter::new(
                RateLimitOp::PasswordReset,
                config.password_reset_window(),
                Arc::clone(&clock),
            ),
            email_verify: RateLimiter::new(
                RateLimitOp::EmailVerify,
                config.email_verify_window(),
                Arc::clone(&clock),
            ),
        };
        Arc::new(Self {
            store,
            policy,
            messages: Arc::new(Messages::builtin()),
            clock,
            mailer,
            telemetry,
            user_sessions,
            admin_sessions,
            gates,
            config,
        })
    }

    /// Resolve a presented session token against both stores.
    #[must_use]
    pub fn resolve_session(&self, token: Option<&str>) -> SessionHandle {
        let Some(token) = token else {
            return SessionHandle::Anonymous;
        };
        let id = SessionId::from_token(token);
        if let Some(session) = self.user_sessions.find(&id) {
            return SessionHandle::User(session);
        }
        if let Some(session) = self.admin_sessions.find(&id) {
            return SessionHandle::Admin(session);
        }
        SessionHandle::Anonymous
    }
}

/// The session resolved for the current request, borrowed for its duration.
#[derive(Clone)]
pub enum SessionHandle {
    Anonymous,
    User(Arc<UserSession>),
    Admin(Arc<AdminSession>),
}

pub struct Context {
    services: Arc<Services>,
    tx: Option<Box<dyn IdentityTx>>,
    session: SessionHandle,
    remote_host: String,
    user_agent: String,
    request_id: String,
    locale: Locale,
}

impl Context {
    #[must_use]
    pub fn create(
        services: Arc<Services>,
        tx: Box<dyn IdentityTx>,
        session: SessionHandle,
        remote_host: impl Into<String>,
        user_agent: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            services,
            tx: Some(tx),
            session,
            remote_host: remote_host.into(),
            user_agent: user_agent.into(),
            request_id: request_id.into(),
            locale: Locale::default(),
        }
    }

    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.services.clock.as_ref()
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn users(&mut self) -> &mut dyn UserQueries {
        self.tx_mut().users()
    }

    pub fn admins(&mut self) -> &mut dyn AdminQueries {
        self.tx_mut().admins()
    }

    pub fn audit(&mut self) -> &mut dyn AuditQueries {
        self.tx_mut().audit()
    }

    /// Ask the policy engine whether the action may proceed; a denial comes
    /// back as the typed security failure.
    pub fn security_check(&self, action: &Action) -> Result<(), CommandError> {
        match self.services.policy.check(action) {
            crate::identigo::policy::PolicyResult::Permitted => Ok(()),
            crate::identigo::policy::PolicyResult::Denied { reason } => {
                tracing::debug!(
                    action = action.name(),
                    request_id = %self.request_id,
                    "security policy denied"
                );
                Err(CommandError::Security(reason))
            }
        }
    }

    /// The acting user session, or a security failure for anonymous and
    /// admin callers.
    pub fn require_user(&self) -> Result<Arc<UserSession>, CommandError> {
        match &self.session {
            SessionHandle::User(session) => Ok(Arc::clone(session)),
            _ => Err(CommandError::Security(
                "no authenticated user session".to_string(),
            )),
        }
    }

    /// The acting admin session, or a security failure otherwise.
    pub fn require_admin(&self) -> Result<Arc<AdminSession>, CommandError> {
        match &self.session {
            SessionHandle::Admin(session) => Ok(Arc::clone(session)),
            _ => Err(CommandError::Security(
                "no authenticated administrator session".to_string(),
            )),
        }
    }

    /// Render a message template in the request's negotiated locale.
    #[must_use]
    pub fn format(&self, message: &MessageRef) -> String {
        self.services.messages.format(self.locale, message)
    }

    /// Convert a raised command error into the structured failure. This is
    /// the single classification point; each arm delegates to the matching
    /// `fail_*` constructor so the mapping table stays in one place.
    pub(crate) fn normalize(&self, err: CommandError) -> CommandFailure {
        match err {
            CommandError::Validation(message) => self.fail_validation(&message),
            CommandError::Security(reason) => self.fail_security(&reason),
            CommandError::Password(message) => self.fail_password(&message),
            CommandError::Protocol(detail) => self.fail_protocol(&detail),
            CommandError::Mail(failure) => self.fail_mail(&failure),
            CommandError::Storage(failure) => self.fail_storage(failure),
            CommandError::Tagged { code, message } => self.fail_tagged(&code, &message),
        }
    }

    fn fail_validation(&self, message: &MessageRef) -> CommandFailure {
        self.fail_formatted(codes::HTTP_PARAMETER_INVALID, 400, message)
            .with_remediation(self.format(&MessageRef::new("remedy.fix-input")))
    }

    fn fail_password(&self, message: &MessageRef) -> CommandFailure {
        self.fail_formatted(codes::PASSWORD_ERROR, 400, message)
            .with_remediation(self.format(&MessageRef::new("remedy.fix-input")))
    }

    fn fail_security(&self, reason: &str) -> CommandFailure {
        let mut failure = self.bare_failure(codes::SECURITY_POLICY_DENIED, 500, reason.to_string());
        failure
            .attributes
            .insert("policy.reason".to_string(), reason.to_string());
        failure
    }

    fn fail_protocol(&self, detail: &str) -> CommandFailure {
        self.bare_failure(codes::PROTOCOL_ERROR, 400, detail.to_string())
    }

    fn fail_mail(&self, failure: &crate::identigo::email::MailFailure) -> CommandFailure {
        let mut out = self.fail_formatted(codes::MAIL_SYSTEM_FAILURE, 500, &MessageRef::new("mail.failed"));
        out.attributes
            .insert("mail.transport".to_string(), failure.transport.clone());
        out.remediation = Some(self.format(&MessageRef::new("remedy.retry-later")));
        out.cause = Some(failure.detail.clone());
        out
    }

    fn fail_storage(&self, failure: crate::identigo::storage::StorageFailure) -> CommandFailure {
        // The storage layer's code, attributes, and remediation pass
        // through verbatim.
        CommandFailure {
            message: failure.message.clone(),
            code: failure.code,
            status: 500,
            attributes: failure.attributes,
            remediation: failure.remediation,
            request_id: self.request_id.clone(),
            cause: Some(failure.message),
        }
    }

    fn fail_tagged(&self, code: &str, message: &MessageRef) -> CommandFailure {
        self.fail_formatted(code, 500, message)
    }

    /// Generic formatted failure: resolves the template id and arguments
    /// through the locale-aware message service.
    fn fail_formatted(&self, code: &str, status: u16, message: &MessageRef) -> CommandFailure {
        self.bare_failure(code, status, self.format(message))
    }

    fn bare_failure(&self, code: &str, status: u16, message: String) -> CommandFailure {
        CommandFailure {
            message,
            code: code.to_string(),
            status,
            attributes: BTreeMap::new(),
            remediation: None,
            request_id: self.request_id.clone(),
            cause: None,
        }
    }

    fn tx_mut(&mut self) -> &mut dyn IdentityTx {
        self.tx
            .as_deref_mut()
            .expect("transaction already finished")
    }

    pub(crate) fn take_tx(&mut self) -> Box<dyn IdentityTx> {
        self.tx.take().expect("transaction already finished")
    }
}

impl CommandFailure {
    #[must_use]
    fn with_remediation(mut self, remediation: String) -> Self {
        self.remediation = Some(remediation);
        self
    }
}
