//! In-memory session store with expire-after-access semantics.
//!
//! Lookups refresh the idle clock; a session that is never looked up for the
//! configured timeout expires. Expiry is enforced both lazily on `find` and
//! by a background sweeper task, so a dead session is never observable and
//! abandoned entries do not pile up.

use super::{PrincipalSession, SessionId};
use crate::identigo::clock::Clock;
use crate::identigo::telemetry::TelemetrySink;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct StoreEntry<S> {
    session: Arc<S>,
    last_access_nanos: AtomicU64,
}

pub struct SessionStore<S: PrincipalSession> {
    sessions: DashMap<SessionId, StoreEntry<S>>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<S: PrincipalSession> SessionStore<S> {
    #[must_use]
    pub fn new(
        idle_timeout: Duration,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            clock,
            telemetry,
        }
    }

    /// Open a session for a principal.
    ///
    /// The identifier space is 256 bits; an insert over an existing key can
    /// only mean a broken token generator and is treated as fatal.
    pub fn create(&self, principal: Uuid) -> Arc<S> {
        let id = SessionId::generate();
        let session = Arc::new(S::open(id.clone(), principal));
        let entry = StoreEntry {
            session: Arc::clone(&session),
            last_access_nanos: AtomicU64::new(self.now_nanos()),
        };
        let previous = self.sessions.insert(id, entry);
        assert!(previous.is_none(), "session identifier collision");
        self.telemetry.session_delta(S::KIND, 1);
        session
    }

    /// Look up a live session; refreshes its idle-expiry clock.
    ///
    /// A miss is a normal outcome, not an error.
    pub fn find(&self, id: &SessionId) -> Option<Arc<S>> {
        let now = self.clock.monotonic();
        {
            let entry = self.sessions.get(id)?;
            if !self.is_expired(&entry, now) {
                entry
                    .last_access_nanos
                    .store(duration_nanos(now), Ordering::Release);
                return Some(Arc::clone(&entry.session));
            }
        }
        // Re-check under the shard lock so a concurrent refresh wins.
        if self
            .sessions
            .remove_if(id, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            self.telemetry.session_delta(S::KIND, -1);
        }
        None
    }

    /// Explicit invalidation (logout); idempotent if already absent.
    pub fn delete(&self, id: &SessionId) {
        if self.sessions.remove(id).is_some() {
            self.telemetry.session_delta(S::KIND, -1);
        }
    }

    /// Drop every session whose idle window has elapsed; returns the count.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.monotonic();
        let mut evicted = 0usize;
        self.sessions.retain(|_, entry| {
            let live = !self.is_expired(entry, now);
            if !live {
                evicted += 1;
            }
            live
        });
        if evicted > 0 {
            self.telemetry
                .session_delta(S::KIND, -(i64::try_from(evicted).unwrap_or(i64::MAX)));
        }
        evicted
    }

    /// Live-session count for observability.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }

    /// Every live session owned by a principal; does not refresh idle clocks.
    #[must_use]
    pub fn find_by_principal(&self, principal: Uuid) -> Vec<Arc<S>> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().session.principal() == principal)
            .map(|entry| Arc::clone(&entry.value().session))
            .collect()
    }

    /// Spawn the background sweeper for this store. The task stops on its
    /// own once the store is dropped.
    pub fn spawn_sweeper(store: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                let evicted = store.sweep_expired();
                if evicted > 0 {
                    tracing::debug!(kind = S::KIND, evicted, "swept expired sessions");
                }
            }
        })
    }

    fn is_expired(&self, entry: &StoreEntry<S>, now: Duration) -> bool {
        let last = Duration::from_nanos(entry.last_access_nanos.load(Ordering::Acquire));
        now.saturating_sub(last) > self.idle_timeout
    }

    fn now_nanos(&self) -> u64 {
        duration_nanos(self.clock.monotonic())
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
