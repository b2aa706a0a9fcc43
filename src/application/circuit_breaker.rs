//! Circuit breaker in front of the mail transport.
//!
//! Only dispatches that exhausted every retry count as failures. Once
//! `failure_threshold` of them happen in a row the circuit opens and the
//! dispatcher stops calling the transport, so submissions are not held in
//! backoff loops against a dead relay. After `recovery_timeout` exactly one
//! trial dispatch goes through; its outcome closes or re-opens the circuit.
//! A trial that never reports back is replaced after another timeout.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Where the breaker stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Dispatches reach the transport
    Closed = 0,
    /// Dispatches fail fast
    Open = 1,
    /// One trial dispatch is in flight
    HalfOpen = 2,
}

impl CircuitState {
    fn decode(raw: u8) -> Self {
        match raw {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Exhausted dispatches in a row before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free breaker shared by every dispatch.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    streak: AtomicU32,
    /// Nanoseconds after `epoch` at which the circuit opened or the last trial started
    opened_at: AtomicU64,
    epoch: Instant,
    clock: Arc<dyn Clock>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            streak: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            epoch: clock.now(),
            clock,
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::decode(self.state.load(Ordering::Acquire))
    }

    /// Exhausted dispatches since the last delivery.
    pub fn consecutive_failures(&self) -> u32 {
        self.streak.load(Ordering::Relaxed)
    }

    /// Whether the next dispatch may call the transport.
    ///
    /// An open circuit whose recovery timeout has passed moves to half-open
    /// here and lets exactly one caller through as the trial. Everyone else
    /// fails fast until the trial resolves.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open | CircuitState::HalfOpen => self.claim_trial(),
        }
    }

    /// The transport answered: either delivered, or refused the job outright.
    ///
    /// A refusal (bad address, rejected credentials) still proves the relay
    /// is reachable, so it resolves a trial the same way a delivery does.
    pub fn record_success(&self) {
        self.streak.store(0, Ordering::Release);
        if self.shift(CircuitState::HalfOpen, CircuitState::Closed) {
            info!("mail transport recovered, circuit closed");
        }
    }

    /// A dispatch exhausted its attempts.
    pub fn record_failure(&self) {
        let streak = self.streak.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let reopen = self.shift(CircuitState::HalfOpen, CircuitState::Open);
        let trip = streak >= self.config.failure_threshold
            && self.shift(CircuitState::Closed, CircuitState::Open);

        if reopen || trip {
            self.opened_at.store(self.nanos_now(), Ordering::Release);
            warn!(
                failures = streak,
                recovery_ms = self.config.recovery_timeout.as_millis() as u64,
                "mail transport circuit open"
            );
        }
    }

    /// Restart the timeout and win the trial slot, if the timeout has passed.
    fn claim_trial(&self) -> bool {
        let stamped = self.opened_at.load(Ordering::Acquire);
        let now = self.nanos_now();
        if Duration::from_nanos(now.saturating_sub(stamped)) < self.config.recovery_timeout {
            return false;
        }
        if self
            .opened_at
            .compare_exchange(stamped, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if self.shift(CircuitState::Open, CircuitState::HalfOpen) {
            info!("mail transport circuit half-open, probing");
        } else {
            warn!("circuit trial never resolved, trying again");
        }
        true
    }

    fn shift(&self, from: CircuitState, to: CircuitState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn nanos_now(&self) -> u64 {
        let since = self.clock.now().saturating_duration_since(self.epoch);
        u64::try_from(since.as_nanos()).unwrap_or(u64::MAX)
    }
}
