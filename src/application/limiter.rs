//! Fixed-window rate limiters.
//!
//! A [`RateLimiter`] gates one endpoint (or the whole site) per client
//! identity. Counters for elapsed windows are swept lazily every few checks,
//! and an optional eviction policy bounds the number of tracked identities.
//! [`TieredRateLimiter`] chains limiters so that a request must pass every
//! tier, narrowest first.

use crate::application::metrics::Metrics;
use crate::application::ports::{EvictionPolicy, Storage};
use crate::application::registry::CounterRegistry;
use crate::domain::identity::ClientIdentity;
use crate::domain::policy::{RateDecision, RateWindowCounter, WindowPolicy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default number of checks between lazy sweeps.
pub const DEFAULT_SWEEP_EVERY: u64 = 1024;

type CounterEviction = Arc<dyn EvictionPolicy<ClientIdentity, RateWindowCounter>>;

/// Fixed-window limiter keyed by client identity.
#[derive(Debug, Clone)]
pub struct RateLimiter<S>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    name: &'static str,
    registry: CounterRegistry<S>,
    policy: WindowPolicy,
    eviction: Option<CounterEviction>,
    metrics: Metrics,
    checks: Arc<AtomicU64>,
    sweep_every: u64,
}

impl<S> RateLimiter<S>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `name` - Label used in logs, e.g. `"contact"` or `"global"`
    /// * `registry` - Counter registry (which contains the clock)
    /// * `policy` - Window length and maximum count
    /// * `metrics` - Metrics tracker
    pub fn new(
        name: &'static str,
        registry: CounterRegistry<S>,
        policy: WindowPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            name,
            registry,
            policy,
            eviction: None,
            metrics,
            checks: Arc::new(AtomicU64::new(0)),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }

    /// Bound the number of tracked identities with an eviction policy.
    pub fn with_eviction(mut self, eviction: CounterEviction) -> Self {
        self.eviction = Some(eviction);
        self
    }

    /// Sweep elapsed windows every `checks` checks. Zero disables lazy sweeping.
    pub fn with_sweep_every(mut self, checks: u64) -> Self {
        self.sweep_every = checks;
        self
    }

    /// Limiter label.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The window policy.
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.registry.len()
    }

    /// Register a request from `identity` and decide whether to admit it.
    ///
    /// # Returns
    /// `Allow`, or `Reject` carrying the time left until the window resets.
    pub fn check(&self, identity: ClientIdentity) -> RateDecision {
        let now = self.registry.now();
        self.maybe_sweep(now);

        let decision = match self
            .registry
            .with_existing(&identity, |counter| self.policy.register(counter, now))
        {
            Some(decision) => decision,
            None => {
                self.make_room();
                self.registry
                    .with_counter(identity, now, |counter, created| {
                        if created {
                            self.policy.first()
                        } else {
                            self.policy.register(counter, now)
                        }
                    })
            }
        };

        if let RateDecision::Reject { retry_after } = decision {
            warn!(
                limiter = self.name,
                identity = %identity,
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Remove every counter whose window has elapsed.
    pub fn sweep(&self) -> usize {
        let removed = self
            .registry
            .sweep(self.registry.now(), self.policy.window());
        if removed > 0 {
            debug!(limiter = self.name, removed, "swept expired rate windows");
        }
        removed
    }

    fn maybe_sweep(&self, now: Instant) {
        if self.sweep_every == 0 {
            return;
        }
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sweep_every == 0 {
            let removed = self.registry.sweep(now, self.policy.window());
            debug!(limiter = self.name, removed, "lazy sweep");
        }
    }

    fn make_room(&self) {
        let Some(eviction) = &self.eviction else {
            return;
        };
        if !eviction.should_evict(self.registry.len()) {
            return;
        }
        if let Some(victim) = self.registry.evict_one(eviction.as_ref()) {
            self.metrics.record_eviction();
            debug!(limiter = self.name, identity = %victim, "evicted rate window");
        }
    }
}

/// Several limiters gating the same request in order.
///
/// The first rejecting tier short-circuits; later tiers do not count the
/// request.
#[derive(Debug, Clone)]
pub struct TieredRateLimiter<S>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    tiers: Vec<RateLimiter<S>>,
}

impl<S> TieredRateLimiter<S>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    /// Chain limiters, narrowest first.
    pub fn new(tiers: Vec<RateLimiter<S>>) -> Self {
        Self { tiers }
    }

    /// Check every tier in order.
    pub fn check(&self, identity: ClientIdentity) -> RateDecision {
        for tier in &self.tiers {
            let decision = tier.check(identity);
            if decision.is_reject() {
                return decision;
            }
        }
        RateDecision::Allow
    }
}
