//! Periodic removal of expired rate windows and sessions.
//!
//! Lazy sweeping inside the limiter only runs while traffic arrives; the
//! background sweeper keeps memory bounded during quiet periods too.

use crate::application::pipeline::{SubmissionPipeline, SweepReport};
use crate::application::ports::{SessionStore, Storage};
use crate::domain::identity::ClientIdentity;
use crate::domain::policy::RateWindowCounter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Error returned when sweeper configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweeperConfigError {
    /// Sweep interval must be greater than zero
    ZeroInterval,
}

impl fmt::Display for SweeperConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweeperConfigError::ZeroInterval => write!(f, "sweep interval must be greater than 0"),
        }
    }
}

impl std::error::Error for SweeperConfigError {}

/// Configuration for the background sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// How often to sweep
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl SweeperConfig {
    /// Create a sweeper config with the specified interval.
    ///
    /// # Errors
    /// Returns `SweeperConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, SweeperConfigError> {
        if interval.is_zero() {
            return Err(SweeperConfigError::ZeroInterval);
        }
        Ok(Self { interval })
    }
}

/// Error returned when the sweeper task did not stop cleanly.
#[derive(Debug)]
pub enum ShutdownError {
    /// The task panicked or was cancelled
    TaskFailed(tokio::task::JoinError),
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownError::TaskFailed(e) => write!(f, "sweeper task failed: {e}"),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Handle to a running sweeper.
///
/// Dropping the handle leaves the task running; call [`SweeperHandle::shutdown`]
/// to stop it.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<SweepReport>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    ///
    /// Returns the totals removed over the sweeper's lifetime.
    pub async fn shutdown(self) -> Result<SweepReport, ShutdownError> {
        // The task may already be gone; the join below reports how it ended
        let _ = self.stop.send(());
        self.task.await.map_err(ShutdownError::TaskFailed)
    }
}

/// Sweeps a pipeline at a fixed interval.
#[derive(Debug)]
pub struct Sweeper<S, St>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
    St: SessionStore,
{
    pipeline: Arc<SubmissionPipeline<S, St>>,
    config: SweeperConfig,
}

impl<S, St> Sweeper<S, St>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone + 'static,
    St: SessionStore + 'static,
{
    /// Create a new sweeper.
    pub fn new(pipeline: Arc<SubmissionPipeline<S, St>>, config: SweeperConfig) -> Self {
        Self { pipeline, config }
    }

    /// Get the sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Spawn the background task.
    pub fn start(self) -> SweeperHandle {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            let mut total = SweepReport::default();
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let report = self.pipeline.sweep();
                        total.counters += report.counters;
                        total.sessions += report.sessions;
                        debug!(
                            counters = report.counters,
                            sessions = report.sessions,
                            "periodic sweep"
                        );
                    }
                }
            }
            total
        });

        SweeperHandle { stop, task }
    }
}
