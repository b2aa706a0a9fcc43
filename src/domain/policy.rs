//! Fixed-window rate limiting policy.
//!
//! A window policy admits up to `max_requests` per identity within a window of
//! `window` length. The first request after the window has elapsed opens a fresh
//! window instead of incrementing the old one.

use std::fmt;
use std::time::{Duration, Instant};

/// Decision made by a rate limiting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Let the request through
    Allow,
    /// Reject the request; the window resets after `retry_after`
    Reject {
        /// Time remaining until the current window closes
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Check if this decision is Allow.
    pub fn is_allow(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }

    /// Check if this decision is Reject.
    pub fn is_reject(&self) -> bool {
        matches!(self, RateDecision::Reject { .. })
    }

    /// The retry hint carried by a rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateDecision::Allow => None,
            RateDecision::Reject { retry_after } => Some(*retry_after),
        }
    }
}

/// Error returned when a policy is configured with invalid parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Window length must be greater than zero
    ZeroWindow,
    /// Maximum request count must be greater than zero
    ZeroMaxRequests,
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::ZeroWindow => write!(f, "rate limit window must be greater than 0"),
            PolicyError::ZeroMaxRequests => {
                write!(f, "rate limit max requests must be greater than 0")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Per-identity counter for the window currently open.
///
/// One counter exists per identity. When its window elapses the counter is
/// replaced wholesale, never carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowCounter {
    /// When the current window opened
    pub window_start: Instant,
    /// Requests seen in the current window, including rejected ones
    pub count: u32,
}

impl RateWindowCounter {
    /// Open a window at `now` holding the request that opened it.
    pub fn open(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    /// Whether the window that opened at `window_start` is over at `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Fixed-window counting policy.
///
/// # Example
/// ```
/// use formgate::{RateWindowCounter, WindowPolicy};
/// use std::time::{Duration, Instant};
///
/// let policy = WindowPolicy::new(2, Duration::from_secs(60)).unwrap();
/// let now = Instant::now();
/// let mut counter = RateWindowCounter::open(now);
///
/// assert!(policy.register(&mut counter, now).is_allow());
/// assert!(policy.register(&mut counter, now).is_reject());
///
/// // Once the window elapses, the counter is replaced
/// let later = now + Duration::from_secs(60);
/// assert!(policy.register(&mut counter, later).is_allow());
/// assert_eq!(counter.count, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    max_requests: u32,
    window: Duration,
}

impl WindowPolicy {
    /// Create a window policy.
    ///
    /// # Errors
    /// Returns `PolicyError` if either the window or the maximum is zero.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, PolicyError> {
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        if max_requests == 0 {
            return Err(PolicyError::ZeroMaxRequests);
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Maximum requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a request against an existing counter.
    ///
    /// A freshly opened counter (see [`RateWindowCounter::open`]) already holds
    /// its opening request, so callers creating a counter must not register
    /// that same request again; use [`WindowPolicy::first`] for it.
    pub fn register(&self, counter: &mut RateWindowCounter, now: Instant) -> RateDecision {
        if counter.is_expired(now, self.window) {
            *counter = RateWindowCounter::open(now);
            return RateDecision::Allow;
        }

        counter.count = counter.count.saturating_add(1);
        if counter.count > self.max_requests {
            let elapsed = now.saturating_duration_since(counter.window_start);
            RateDecision::Reject {
                retry_after: self.window.saturating_sub(elapsed),
            }
        } else {
            RateDecision::Allow
        }
    }

    /// Decision for the request that opened a fresh counter.
    pub fn first(&self) -> RateDecision {
        RateDecision::Allow
    }
}
