//! Time source used for session and rate-limit expiry decisions.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source for expiry comparisons and request timestamps.
///
/// `monotonic` drives idle-timeout and rate-limit windows; `wall` stamps
/// audit records and token expirations. Both must come from the same clock
/// instance so tests can substitute a manual one.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary per-clock origin.
    fn monotonic(&self) -> Duration;

    /// Wall-clock timestamp.
    fn wall(&self) -> DateTime<Utc>;
}

/// Production clock backed by `Instant` and `Utc::now`.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests; time only moves when `advance` is called.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicU64,
    wall_origin: DateTime<Utc>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nanos: AtomicU64::new(0),
            // Fixed origin keeps wall timestamps reproducible across runs.
            wall_origin: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn wall(&self) -> DateTime<Utc> {
        self.wall_origin
            + chrono::Duration::from_std(self.monotonic()).unwrap_or(chrono::Duration::zero())
    }
}
