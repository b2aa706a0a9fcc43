//! Registry of per-identity rate window counters.
//!
//! The registry owns the counter storage and the clock. It knows how to open,
//! sweep and evict counters but leaves admission decisions to the limiter.

use crate::application::ports::{Clock, EvictionCandidate, EvictionPolicy, Storage};
use crate::domain::identity::ClientIdentity;
use crate::domain::policy::RateWindowCounter;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How many counters are sampled when choosing an eviction victim.
const EVICTION_SAMPLE_SIZE: usize = 32;

/// Registry of window counters keyed by client identity.
///
/// Generic over the storage implementation. In production, use
/// `Arc<ShardedStorage>`.
#[derive(Debug, Clone)]
pub struct CounterRegistry<S>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
}

impl<S> CounterRegistry<S>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    /// Create a registry over `storage`, reading time from `clock`.
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Current instant according to the registry clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Access the counter of an identity that already has one.
    pub fn with_existing<F, R>(&self, identity: &ClientIdentity, f: F) -> Option<R>
    where
        F: FnOnce(&mut RateWindowCounter) -> R,
    {
        self.storage.with_existing_mut(identity, f)
    }

    /// Access the counter of an identity, opening one at `now` if absent.
    ///
    /// The callback receives `true` when the counter was just opened.
    pub fn with_counter<F, R>(&self, identity: ClientIdentity, now: Instant, f: F) -> R
    where
        F: FnOnce(&mut RateWindowCounter, bool) -> R,
    {
        self.storage
            .with_entry_mut(identity, || RateWindowCounter::open(now), f)
    }

    /// Remove every counter whose window has elapsed at `now`.
    ///
    /// Returns the number of counters removed.
    pub fn sweep(&self, now: Instant, window: Duration) -> usize {
        let before = self.storage.len();
        self.storage
            .retain(|_, counter| !counter.is_expired(now, window));
        before.saturating_sub(self.storage.len())
    }

    /// Evict one counter chosen by `policy` from a sample of entries.
    ///
    /// Returns the evicted identity, if any.
    pub fn evict_one(
        &self,
        policy: &dyn EvictionPolicy<ClientIdentity, RateWindowCounter>,
    ) -> Option<ClientIdentity> {
        let mut candidates = Vec::with_capacity(EVICTION_SAMPLE_SIZE);
        self.storage.for_each(|identity, counter| {
            if candidates.len() < EVICTION_SAMPLE_SIZE {
                candidates.push(EvictionCandidate {
                    key: *identity,
                    value: *counter,
                    last_access: counter.window_start,
                });
            }
        });

        let victim = policy.select_victim(&candidates)?;
        self.storage.remove(&victim).then_some(victim)
    }

    /// Get the number of tracked identities.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Clear all tracked counters.
    pub fn clear(&self) {
        self.storage.clear();
    }
}
