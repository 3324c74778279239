//! Core tunables.

use std::time::Duration;

const DEFAULT_SESSION_IDLE_SECONDS: u64 = 12 * 60 * 60;
const DEFAULT_SESSION_SWEEP_SECONDS: u64 = 60;
const DEFAULT_LOGIN_WINDOW_SECONDS: u64 = 5;
const DEFAULT_PASSWORD_RESET_WINDOW_SECONDS: u64 = 60;
const DEFAULT_EMAIL_VERIFY_WINDOW_SECONDS: u64 = 60;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_PASSWORD_MIN_CHARS: usize = 8;
const DEFAULT_PASSWORD_MAX_CHARS: usize = 128;

#[derive(Clone, Debug)]
pub struct CoreConfig {
    session_idle_timeout: Duration,
    session_sweep_interval: Duration,
    login_window: Duration,
    password_reset_window: Duration,
    email_verify_window: Duration,
    token_ttl_seconds: i64,
    password_min_chars: usize,
    password_max_chars: usize,
}

impl CoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECONDS),
            session_sweep_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_SECONDS),
            login_window: Duration::from_secs(DEFAULT_LOGIN_WINDOW_SECONDS),
            password_reset_window: Duration::from_secs(DEFAULT_PASSWORD_RESET_WINDOW_SECONDS),
            email_verify_window: Duration::from_secs(DEFAULT_EMAIL_VERIFY_WINDOW_SECONDS),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            password_min_chars: DEFAULT_PASSWORD_MIN_CHARS,
            password_max_chars: DEFAULT_PASSWORD_MAX_CHARS,
        }
    }

    #[must_use]
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_sweep_interval(mut self, interval: Duration) -> Self {
        self.session_sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_login_window(mut self, window: Duration) -> Self {
        self.login_window = window;
        self
    }

    #[must_use]
    pub fn with_password_reset_window(mut self, window: Duration) -> Self {
        self.password_reset_window = window;
        self
    }

    #[must_use]
    pub fn with_email_verify_window(mut self, window: Duration) -> Self {
        self.email_verify_window = window;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        self.session_idle_timeout
    }

    #[must_use]
    pub fn session_sweep_interval(&self) -> Duration {
        self.session_sweep_interval
    }

    #[must_use]
    pub fn login_window(&self) -> Duration {
        self.login_window
    }

    #[must_use]
    pub fn password_reset_window(&self) -> Duration {
        self.password_reset_window
    }

    #[must_use]
    pub fn email_verify_window(&self) -> Duration {
        self.email_verify_window
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn password_min_chars(&self) -> usize {
        self.password_min_chars
    }

    #[must_use]
    pub fn password_max_chars(&self) -> usize {
        self.password_max_chars
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
