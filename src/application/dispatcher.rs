//! Notification dispatch with bounded retry.
//!
//! One transport call is one attempt. Transient failures (network errors and
//! per-attempt timeouts) are retried with exponential backoff until the
//! attempt budget runs out; permanent failures stop immediately. Waiting
//! suspends only the dispatching task.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::ports::{Confirmation, MailTransport, TransportError};
use crate::domain::submission::DispatchJob;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Error returned when a retry policy is configured with invalid parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicyError {
    /// At least one attempt is required
    ZeroAttempts,
    /// Attempts need a positive timeout
    ZeroAttemptTimeout,
}

impl fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicyError::ZeroAttempts => write!(f, "dispatch attempts must be greater than 0"),
            RetryPolicyError::ZeroAttemptTimeout => {
                write!(f, "dispatch attempt timeout must be greater than 0")
            }
        }
    }
}

impl std::error::Error for RetryPolicyError {}

/// Retry and backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
    max_backoff: Duration,
    attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2,
            max_backoff: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy doubling the backoff after each failure.
    ///
    /// # Errors
    /// Returns `RetryPolicyError` if `max_attempts` or `attempt_timeout` is zero.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        attempt_timeout: Duration,
    ) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError::ZeroAttempts);
        }
        if attempt_timeout.is_zero() {
            return Err(RetryPolicyError::ZeroAttemptTimeout);
        }
        Ok(Self {
            max_attempts,
            initial_backoff,
            attempt_timeout,
            ..Self::default()
        })
    }

    /// Cap a single backoff delay.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Timeout applied to each attempt.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Why a dispatch did not deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The transport refused the job; it was not retried
    Permanent(String),
    /// Every attempt failed transiently
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Reason given by the last attempt
        last_error: String,
    },
    /// The circuit breaker is open; no attempt was made
    Unavailable,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Permanent(reason) => write!(f, "dispatch rejected: {reason}"),
            DispatchFailure::Exhausted {
                attempts,
                last_error,
            } => write!(f, "dispatch failed after {attempts} attempts: {last_error}"),
            DispatchFailure::Unavailable => write!(f, "mail transport unavailable"),
        }
    }
}

impl std::error::Error for DispatchFailure {}

/// Sends notification jobs through a mail transport.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl NotificationDispatcher {
    /// Create a dispatcher.
    pub fn new(transport: Arc<dyn MailTransport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            breaker: None,
        }
    }

    /// Guard the transport with a circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// The retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Deliver a job, retrying transient failures.
    ///
    /// # Returns
    /// The transport's confirmation, or why delivery failed for good.
    pub async fn dispatch(&self, job: &DispatchJob) -> Result<Confirmation, DispatchFailure> {
        if let Some(breaker) = &self.breaker {
            if !breaker.allow_request() {
                warn!("mail transport circuit open, skipping dispatch");
                return Err(DispatchFailure::Unavailable);
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(attempt, "dispatch attempt");

            let result = match tokio::time::timeout(
                self.retry.attempt_timeout,
                self.transport.send(job),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Transient(format!(
                    "attempt timed out after {}ms",
                    self.retry.attempt_timeout.as_millis()
                ))),
            };

            match result {
                Ok(confirmation) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    info!(attempt, confirmation = %confirmation.0, "notification dispatched");
                    return Ok(confirmation);
                }
                Err(TransportError::Permanent(reason)) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    error!(attempt, %reason, "notification rejected by transport");
                    return Err(DispatchFailure::Permanent(reason));
                }
                Err(TransportError::Transient(reason)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_after(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "dispatch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(TransportError::Transient(reason)) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    error!(attempts = attempt, %reason, "notification dispatch exhausted");
                    return Err(DispatchFailure::Exhausted {
                        attempts: attempt,
                        last_error: reason,
                    });
                }
            }
        }
    }
}
