//! Response cache with single-flight request coalescing.
//!
//! The cache maps a [`Fingerprint`] to the [`ValidatedReport`] produced for
//! it. It is bounded in two ways:
//!
//! * **Time** — an entry older than the TTL is treated as absent, even while
//!   it still occupies a slot. Expired entries are dropped lazily on lookup
//!   and eagerly when a store needs room.
//! * **Capacity** — when full, expired entries go first; if none are expired,
//!   the least-recently-used entry is evicted. Every access draws a fresh
//!   value from a monotonic counter, so there are never ties.
//!
//! ## Single flight
//!
//! Backend calls are slow and billed, and users double-click. Concurrent
//! requests for the same fingerprint therefore share one generation:
//!
//! ```text
//!   caller A ──┐ lookup-or-claim (one lock) ──▶ miss, no flight ──▶ LEADER: spawn work
//!   caller B ──┤ lookup-or-claim            ──▶ miss, flight    ──▶ follower: await shared
//!   caller C ──┘ lookup-or-claim            ──▶ miss, flight    ──▶ follower: await shared
//! ```
//!
//! The leader's work runs in its own Tokio task. If the caller that started it
//! disconnects, the work still completes and populates the cache. The
//! in-flight slot is released by a drop guard inside that task, so a panic
//! in the work does not leave the fingerprint claimed forever.
//!
//! The mutex is `std::sync::Mutex`: it is only ever held for map operations
//! and never across an `.await`.

use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::fingerprint::Fingerprint;
use crate::report::ValidatedReport;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type SharedOutcome = Shared<BoxFuture<'static, Result<ValidatedReport, VerifyError>>>;

/// How a report was obtained by [`ResponseCache::get_or_generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from a live cache entry; no work ran.
    Hit,
    /// This caller was the leader and ran the work.
    Generated,
    /// Another caller was already generating; this one awaited its result.
    Coalesced,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Generated => "miss",
            CacheOutcome::Coalesced => "coalesced",
        }
    }
}

struct Entry {
    report: ValidatedReport,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<Fingerprint, Entry>,
    in_flight: HashMap<Fingerprint, SharedOutcome>,
    tick: u64,
}

impl State {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn lookup(&mut self, key: &Fingerprint, now: Instant, ttl: Duration) -> Option<ValidatedReport> {
        let expired = is_expired(self.entries.get(key)?, now, ttl);
        if expired {
            self.entries.remove(key);
            debug!("Cache entry {} expired", key.short());
            return None;
        }
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.report.clone())
    }

    fn insert(
        &mut self,
        key: Fingerprint,
        report: ValidatedReport,
        now: Instant,
        capacity: usize,
        ttl: Duration,
    ) {
        if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
            let purged = self.purge_expired(now, ttl);
            if purged > 0 {
                debug!("Purged {} expired cache entries", purged);
            }
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
                debug!("Evicted least-recently-used entry {}", victim.short());
            }
        }
        let tick = self.next_tick();
        self.entries.insert(
            key,
            Entry {
                report,
                inserted_at: now,
                last_used: tick,
            },
        );
    }

    fn purge_expired(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !is_expired(e, now, ttl));
        before - self.entries.len()
    }
}

fn is_expired(entry: &Entry, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(entry.inserted_at) >= ttl
}

struct Inner {
    state: Mutex<State>,
    capacity: usize,
    ttl: Duration,
}

/// Shared handle to the response cache. Cloning is cheap; all clones see the
/// same entries.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("capacity", &self.inner.capacity)
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` reports for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                capacity: capacity.max(1),
                ttl,
            }),
        }
    }

    pub fn from_config(config: &VerifyConfig) -> Self {
        Self::new(config.cache_capacity, config.cache_ttl())
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is only mutated through short, non-panicking map operations,
        // so a poisoned lock still guards consistent data.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the live report for `fingerprint`, if any.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<ValidatedReport> {
        self.lock()
            .lookup(fingerprint, Instant::now(), self.inner.ttl)
    }

    /// Insert or overwrite the report for `fingerprint`, resetting its age.
    pub fn store(&self, fingerprint: Fingerprint, report: ValidatedReport) {
        debug!("Caching report for {}", fingerprint.short());
        self.lock().insert(
            fingerprint,
            report,
            Instant::now(),
            self.inner.capacity,
            self.inner.ttl,
        );
    }

    /// Serve `fingerprint` from cache, join an in-flight generation for it,
    /// or become the leader and run `work`.
    ///
    /// `work` is only called by the leader. Its future is spawned onto the
    /// Tokio runtime, so it runs to completion even if this call is
    /// cancelled. On success the report is stored before any waiter is
    /// released; on failure nothing is cached and every waiter receives the
    /// same error.
    pub async fn get_or_generate<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        work: F,
    ) -> Result<(ValidatedReport, CacheOutcome), VerifyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ValidatedReport, VerifyError>> + Send + 'static,
    {
        let (pending, outcome) = {
            let mut state = self.lock();
            if let Some(report) = state.lookup(fingerprint, Instant::now(), self.inner.ttl) {
                info!("Cache hit for {}", fingerprint.short());
                return Ok((report, CacheOutcome::Hit));
            }
            match state.in_flight.get(fingerprint) {
                Some(pending) => {
                    info!("Joining in-flight generation for {}", fingerprint.short());
                    (pending.clone(), CacheOutcome::Coalesced)
                }
                None => {
                    info!("Cache miss for {}; generating", fingerprint.short());
                    let pending = self.spawn_leader(fingerprint.clone(), work());
                    state.in_flight.insert(fingerprint.clone(), pending.clone());
                    (pending, CacheOutcome::Generated)
                }
            }
        };

        pending.await.map(|report| (report, outcome))
    }

    fn spawn_leader<Fut>(&self, fingerprint: Fingerprint, work: Fut) -> SharedOutcome
    where
        Fut: Future<Output = Result<ValidatedReport, VerifyError>> + Send + 'static,
    {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let _slot = InFlightSlot {
                cache: cache.clone(),
                fingerprint: fingerprint.clone(),
            };
            let result = work.await;
            if let Ok(report) = &result {
                cache.store(fingerprint, report.clone());
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(VerifyError::Internal(format!("Generation task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let ttl = self.inner.ttl;
        self.lock()
            .entries
            .values()
            .filter(|e| !is_expired(e, now, ttl))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fingerprints currently being generated.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Drop every expired entry now, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now(), self.inner.ttl)
    }

    /// Drop every cached report. In-flight generations are unaffected.
    pub fn clear(&self) {
        let mut state = self.lock();
        let n = state.entries.len();
        state.entries.clear();
        warn!("Cleared {} cached reports", n);
    }
}

/// Releases a fingerprint's in-flight claim when the leader task ends,
/// whether it returned or panicked.
struct InFlightSlot {
    cache: ResponseCache,
    fingerprint: Fingerprint,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.cache.lock().in_flight.remove(&self.fingerprint);
    }
}
