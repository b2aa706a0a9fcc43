//! Observability metrics for the submission pipeline.
//!
//! Counters are shared by every clone of [`Metrics`] and can be read at any
//! time without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking submission statistics.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    received: AtomicU64,
    completed: AtomicU64,
    rate_limited: AtomicU64,
    csrf_rejected: AtomicU64,
    validation_failed: AtomicU64,
    dispatch_failed: AtomicU64,
    counters_evicted: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.inner.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_csrf_rejected(&self) {
        self.inner.csrf_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_failed(&self) {
        self.inner.validation_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_failed(&self) {
        self.inner.dispatch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.counters_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            received: load(&self.inner.received),
            completed: load(&self.inner.completed),
            rate_limited: load(&self.inner.rate_limited),
            csrf_rejected: load(&self.inner.csrf_rejected),
            validation_failed: load(&self.inner.validation_failed),
            dispatch_failed: load(&self.inner.dispatch_failed),
            counters_evicted: load(&self.inner.counters_evicted),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        for counter in [
            &self.inner.received,
            &self.inner.completed,
            &self.inner.rate_limited,
            &self.inner.csrf_rejected,
            &self.inner.validation_failed,
            &self.inner.dispatch_failed,
            &self.inner.counters_evicted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Submissions that entered the pipeline
    pub received: u64,
    /// Submissions that reached `Completed`, including failed dispatches
    pub completed: u64,
    /// Submissions rejected by a rate limiter
    pub rate_limited: u64,
    /// Submissions rejected for a bad anti-forgery token
    pub csrf_rejected: u64,
    /// Submissions that failed validation
    pub validation_failed: u64,
    /// Completed submissions whose notification could not be delivered
    pub dispatch_failed: u64,
    /// Rate counters evicted to respect the capacity bound
    pub counters_evicted: u64,
}

impl MetricsSnapshot {
    /// Total rejections of any kind.
    pub fn rejected(&self) -> u64 {
        self.rate_limited
            .saturating_add(self.csrf_rejected)
            .saturating_add(self.validation_failed)
    }

    /// Fraction of received submissions that were rejected (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been received.
    pub fn rejection_rate(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.rejected() as f64 / self.received as f64
        }
    }
}
