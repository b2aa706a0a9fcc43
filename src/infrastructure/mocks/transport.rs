//! Scripted mail transport for testing.

use crate::application::ports::{Confirmation, MailTransport, TransportError};
use crate::domain::submission::DispatchJob;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mail transport replaying scripted outcomes.
///
/// Each call pops the next scripted result; once the script is empty every
/// call succeeds. Confirmations are `mock-{n}` where `n` counts attempts.
///
/// # Examples
///
/// ```
/// use formgate::infrastructure::mocks::MockTransport;
///
/// let transport = MockTransport::new()
///     .then_transient("connection reset")
///     .then_permanent("no such mailbox");
/// assert_eq!(transport.attempts(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
    sent: Arc<Mutex<Vec<DispatchJob>>>,
    latency: Option<Duration>,
}

impl MockTransport {
    /// Create a transport that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transient failure to the script.
    pub fn then_transient(self, reason: &str) -> Self {
        self.push(Err(TransportError::Transient(reason.to_string())))
    }

    /// Append a permanent failure to the script.
    pub fn then_permanent(self, reason: &str) -> Self {
        self.push(Err(TransportError::Permanent(reason.to_string())))
    }

    /// Append a success to the script.
    pub fn then_ok(self) -> Self {
        self.push(Ok(()))
    }

    /// Delay every attempt by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> usize {
        self.sent
            .lock()
            .expect("MockTransport mutex poisoned - a test thread panicked while holding the lock")
            .len()
    }

    /// Every job passed to `send`, one entry per attempt.
    pub fn sent(&self) -> Vec<DispatchJob> {
        self.sent
            .lock()
            .expect("MockTransport mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    fn push(self, outcome: Result<(), TransportError>) -> Self {
        self.script
            .lock()
            .expect("MockTransport mutex poisoned - a test thread panicked while holding the lock")
            .push_back(outcome);
        self
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(&self, job: &DispatchJob) -> Result<Confirmation, TransportError> {
        let (attempt, outcome) = {
            let mut sent = self.sent.lock().expect(
                "MockTransport mutex poisoned - a test thread panicked while holding the lock",
            );
            sent.push(job.clone());
            let outcome = self
                .script
                .lock()
                .expect(
                    "MockTransport mutex poisoned - a test thread panicked while holding the lock",
                )
                .pop_front()
                .unwrap_or(Ok(()));
            (sent.len(), outcome)
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        outcome.map(|()| Confirmation(format!("mock-{attempt}")))
    }
}
