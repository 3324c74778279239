//! TTL-gated admission checks for abuse-prone flows.
//!
//! This is a single-admission-per-window gate, not a counting limiter: the
//! first attempt for a (host, principal, operation) key is admitted and
//! stamps the window; every further attempt is denied until the window
//! elapses, and denials do not extend it. Downstream flows (repeated
//! password-reset requests in particular) depend on exactly this shape.

use crate::identigo::clock::Clock;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitOp {
    Login,
    PasswordReset,
    EmailVerify,
}

impl RateLimitOp {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::EmailVerify => "EMAIL_VERIFY",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RateLimitKey {
    host: String,
    principal: String,
}

/// One independently configured gate per use site.
pub struct RateLimiter {
    op: RateLimitOp,
    window: Duration,
    clock: Arc<dyn Clock>,
    admitted: DashMap<RateLimitKey, Duration>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(op: RateLimitOp, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            op,
            window,
            clock,
            admitted: DashMap::new(),
        }
    }

    #[must_use]
    pub fn op(&self) -> RateLimitOp {
        self.op
    }

    /// Admission check; `principal` may be empty for pre-auth flows.
    ///
    /// The entry API keeps the check-and-stamp atomic, so two concurrent
    /// first attempts for the same key can never both be admitted.
    pub fn is_allowed(&self, host: &str, principal: &str) -> bool {
        let now = self.clock.monotonic();
        let key = RateLimitKey {
            host: host.to_string(),
            principal: principal.to_string(),
        };
        match self.admitted.entry(key) {
            Entry::Occupied(mut occupied) => {
                if now.saturating_sub(*occupied.get()) < self.window {
                    false
                } else {
                    occupied.insert(now);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }

    /// Drop elapsed windows; denial correctness does not depend on this,
    /// it only bounds memory.
    pub fn sweep_expired(&self) {
        let now = self.clock.monotonic();
        self.admitted
            .retain(|_, stamped| now.saturating_sub(*stamped) < self.window);
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.admitted.len()
    }
}

/// The gates owned by the server, one per sensitive flow.
pub struct RateGates {
    pub login: RateLimiter,
    pub password_reset: RateLimiter,
    pub email_verify: RateLimiter,
}

impl RateGates {
    #[must_use]
    pub fn gate(&self, op: RateLimitOp) -> &RateLimiter {
        match op {
            RateLimitOp::Login => &self.login,
            RateLimitOp::PasswordReset => &self.password_reset,
            RateLimitOp::EmailVerify => &self.email_verify,
        }
    }
}
