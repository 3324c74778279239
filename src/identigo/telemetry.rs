//! Session gauge deltas for observability.
//!
//! The sink is off the request success/failure path: stores report +1 on
//! create and -1 on delete/evict, and whatever backend is wired in decides
//! what to do with the signal.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait TelemetrySink: Send + Sync {
    /// Report a live-session count change for a session kind ("user"/"admin").
    fn session_delta(&self, kind: &'static str, delta: i64);
}

/// Default sink: emits the delta as a tracing event.
#[derive(Clone, Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn session_delta(&self, kind: &'static str, delta: i64) {
        tracing::debug!(kind, delta, "session gauge delta");
    }
}

/// Accumulating sink for tests and the health endpoint.
#[derive(Debug, Default)]
pub struct CountingSink {
    live: AtomicI64,
}

impl CountingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn live(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }
}

impl TelemetrySink for CountingSink {
    fn session_delta(&self, _kind: &'static str, delta: i64) {
        self.live.fetch_add(delta, Ordering::SeqCst);
    }
}
