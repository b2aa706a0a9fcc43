//! Composition root.
//!
//! [`FormGate`] wires configuration, storage, sessions, the mail transport and
//! the clock into a ready [`SubmissionPipeline`].

use crate::application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    comments::CommentBoard,
    dispatcher::{NotificationDispatcher, RetryPolicy, RetryPolicyError},
    limiter::RateLimiter,
    metrics::Metrics,
    pipeline::{PipelineComponents, SubmissionPipeline},
    ports::{Clock, EvictionPolicy, MailTransport},
    registry::CounterRegistry,
    sweeper::{Sweeper, SweeperConfig, SweeperConfigError, SweeperHandle},
};
use crate::domain::identity::ClientIdentity;
use crate::domain::policy::{PolicyError, RateWindowCounter, WindowPolicy};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::{Config, MailSettings};
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::mail::{LogTransport, SmtpSetupError, SmtpTransport};
use crate::infrastructure::session::InMemorySessionStore;
use crate::infrastructure::storage::ShardedStorage;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Counter storage used by every limiter the gate builds.
pub type CounterStorage = Arc<ShardedStorage<ClientIdentity, RateWindowCounter>>;

/// The pipeline as assembled by [`FormGate`].
pub type GatePipeline = SubmissionPipeline<CounterStorage, InMemorySessionStore>;

/// Error returned when building a [`FormGate`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A limiter has a zero window or zero maximum
    Policy {
        limiter: &'static str,
        source: PolicyError,
    },
    /// Dispatch retry settings are invalid
    Retry(RetryPolicyError),
    /// Sweep interval is invalid
    Sweeper(SweeperConfigError),
    /// The identity cap must be greater than zero
    ZeroTrackedIdentities,
    /// Session cookies cannot be signed with an empty key
    EmptySecret,
    /// Neither a transport nor mail settings were given
    NoMailTransport,
    /// The SMTP transport could not be set up
    Mail(SmtpSetupError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Policy { limiter, source } => {
                write!(f, "{limiter} limiter: {source}")
            }
            BuildError::Retry(e) => write!(f, "dispatch retry configuration error: {e}"),
            BuildError::Sweeper(e) => write!(f, "sweeper configuration error: {e}"),
            BuildError::ZeroTrackedIdentities => {
                write!(f, "max_tracked_identities must be greater than 0")
            }
            BuildError::EmptySecret => write!(f, "session secret must not be empty"),
            BuildError::NoMailTransport => write!(
                f,
                "no mail transport configured: set EMAIL_HOST, or MAIL_TRANSPORT=log for development"
            ),
            BuildError::Mail(e) => write!(f, "mail transport error: {e}"),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<RetryPolicyError> for BuildError {
    fn from(e: RetryPolicyError) -> Self {
        BuildError::Retry(e)
    }
}

impl From<SmtpSetupError> for BuildError {
    fn from(e: SmtpSetupError) -> Self {
        BuildError::Mail(e)
    }
}

impl From<SweeperConfigError> for BuildError {
    fn from(e: SweeperConfigError) -> Self {
        BuildError::Sweeper(e)
    }
}

/// Builder for constructing a [`FormGate`].
pub struct FormGateBuilder {
    config: Config,
    transport: Option<Arc<dyn MailTransport>>,
    clock: Option<Arc<dyn Clock>>,
    circuit_breaker: CircuitBreakerConfig,
    room_capacity: usize,
    max_rooms: usize,
}

impl FormGateBuilder {
    /// Use the given configuration instead of the defaults.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the mail transport, overriding the configured mail settings.
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Tune when the dispatcher stops calling a failing transport.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Maximum comments kept per room.
    pub fn with_room_capacity(mut self, capacity: usize) -> Self {
        self.room_capacity = capacity;
        self
    }

    /// Maximum rooms kept at once.
    pub fn with_max_rooms(mut self, max_rooms: usize) -> Self {
        self.max_rooms = max_rooms;
        self
    }

    /// Build the gate.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<FormGate, BuildError> {
        let config = self.config;
        if config.max_tracked_identities == 0 {
            return Err(BuildError::ZeroTrackedIdentities);
        }
        if config.session_secret.is_empty() {
            return Err(BuildError::EmptySecret);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = Metrics::new();
        let eviction: Arc<dyn EvictionPolicy<ClientIdentity, RateWindowCounter>> =
            Arc::new(LruEviction::new(config.max_tracked_identities));

        let limiter = |name: &'static str, max: u32, window: Duration| {
            let policy = WindowPolicy::new(max, window)
                .map_err(|source| BuildError::Policy { limiter: name, source })?;
            let registry = CounterRegistry::<CounterStorage>::new(
                Arc::new(ShardedStorage::with_capacity(1024)),
                Arc::clone(&clock),
            );
            Ok::<_, BuildError>(
                RateLimiter::new(name, registry, policy, metrics.clone())
                    .with_eviction(Arc::clone(&eviction)),
            )
        };

        let contact_limiter =
            limiter("contact", config.rate_limit_max, config.rate_limit_window)?;
        let comment_limiter = limiter(
            "comment",
            config.comment_rate_limit_max,
            config.comment_rate_limit_window,
        )?;
        let global_limiter =
            limiter("global", config.global_rate_limit_max, config.rate_limit_window)?;

        let retry = RetryPolicy::new(
            config.dispatch_max_attempts,
            config.dispatch_backoff,
            config.dispatch_timeout,
        )?;
        let transport: Arc<dyn MailTransport> = match (self.transport, &config.mail) {
            (Some(transport), _) => transport,
            (None, Some(MailSettings::Smtp(smtp))) => {
                Arc::new(SmtpTransport::new(smtp, config.dispatch_timeout)?)
            }
            (None, Some(MailSettings::Log)) => Arc::new(LogTransport::new()),
            (None, None) => return Err(BuildError::NoMailTransport),
        };
        let breaker = Arc::new(CircuitBreaker::new(self.circuit_breaker, Arc::clone(&clock)));
        let dispatcher = NotificationDispatcher::new(transport, retry).with_circuit_breaker(breaker);

        let sweeper = SweeperConfig::new(config.sweep_interval)?;
        let sessions = Arc::new(InMemorySessionStore::new(
            Arc::clone(&clock),
            config.session_ttl,
        ));

        let pipeline = SubmissionPipeline::new(PipelineComponents {
            contact_limiter,
            comment_limiter,
            global_limiter,
            sessions,
            dispatcher,
            board: CommentBoard::new(self.room_capacity).with_max_rooms(self.max_rooms),
            clock,
            recipient: config.contact_email.clone(),
            metrics,
        });

        info!(
            contact_max = config.rate_limit_max,
            comment_max = config.comment_rate_limit_max,
            global_max = config.global_rate_limit_max,
            "form gate ready"
        );

        Ok(FormGate {
            pipeline: Arc::new(pipeline),
            config,
            sweeper,
        })
    }
}

/// A fully wired submission gate.
///
/// # Example
///
/// ```
/// use formgate::{Config, FormGate, MailSettings};
///
/// let config = Config {
///     contact_email: "owner@example.com".to_string(),
///     session_secret: "change-me".to_string(),
///     mail: Some(MailSettings::Log),
///     ..Config::default()
/// };
/// let gate = FormGate::builder().with_config(config).build().unwrap();
/// assert_eq!(gate.pipeline().metrics().snapshot().received, 0);
/// ```
#[derive(Debug, Clone)]
pub struct FormGate {
    pipeline: Arc<GatePipeline>,
    config: Config,
    sweeper: SweeperConfig,
}

impl FormGate {
    /// Start building a gate from default configuration.
    pub fn builder() -> FormGateBuilder {
        FormGateBuilder {
            config: Config::default(),
            transport: None,
            clock: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            room_capacity: crate::application::comments::DEFAULT_ROOM_CAPACITY,
            max_rooms: crate::application::comments::DEFAULT_MAX_ROOMS,
        }
    }

    /// The assembled pipeline.
    pub fn pipeline(&self) -> &Arc<GatePipeline> {
        &self.pipeline
    }

    /// The configuration the gate was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawn the periodic sweeper. Must be called within a tokio runtime.
    pub fn start_sweeper(&self) -> SweeperHandle {
        Sweeper::new(Arc::clone(&self.pipeline), self.sweeper).start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::comment::CommentRecord;
    use crate::infrastructure::config::SmtpSettings;

    fn config() -> Config {
        Config {
            contact_email: "owner@example.com".to_string(),
            session_secret: "secret".to_string(),
            mail: Some(MailSettings::Log),
            ..Config::default()
        }
    }

    #[test]
    fn test_build_with_defaults() {
        let gate = FormGate::builder().with_config(config()).build().unwrap();
        assert_eq!(gate.config().rate_limit_max, 10);
    }

    #[test]
    fn test_mail_transport_must_be_chosen() {
        let config = Config {
            mail: None,
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert_eq!(err, BuildError::NoMailTransport);
    }

    #[test]
    fn test_explicit_transport_needs_no_settings() {
        let config = Config {
            mail: None,
            ..config()
        };
        let gate = FormGate::builder()
            .with_config(config)
            .with_transport(Arc::new(LogTransport::new()))
            .build();
        assert!(gate.is_ok());
    }

    #[test]
    fn test_bad_smtp_sender_fails_build() {
        let config = Config {
            mail: Some(MailSettings::Smtp(SmtpSettings {
                host: "smtp.example.com".to_string(),
                port: 587,
                secure: false,
                user: None,
                pass: None,
                from: "nobody at all".to_string(),
            })),
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert!(matches!(err, BuildError::Mail(SmtpSetupError::InvalidSender(_))));
    }

    #[test]
    fn test_room_limit_reaches_the_board() {
        let gate = FormGate::builder()
            .with_config(config())
            .with_max_rooms(1)
            .build()
            .unwrap();
        let board = gate.pipeline().board();
        for room in ["a", "b"] {
            board.post(
                room,
                CommentRecord {
                    author: None,
                    body: "hi".to_string(),
                    created_at: chrono::Utc::now(),
                },
            );
        }
        assert_eq!(board.room_count(), 1);
        assert_eq!(board.count("b"), 1);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = Config {
            session_secret: String::new(),
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert_eq!(err, BuildError::EmptySecret);
    }

    #[test]
    fn test_zero_limit_names_limiter() {
        let config = Config {
            comment_rate_limit_max: 0,
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert_eq!(
            err,
            BuildError::Policy {
                limiter: "comment",
                source: PolicyError::ZeroMaxRequests
            }
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = Config {
            dispatch_max_attempts: 0,
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert!(matches!(err, BuildError::Retry(_)));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let config = Config {
            sweep_interval: Duration::ZERO,
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert_eq!(err, BuildError::Sweeper(SweeperConfigError::ZeroInterval));
    }

    #[test]
    fn test_zero_tracked_identities_rejected() {
        let config = Config {
            max_tracked_identities: 0,
            ..config()
        };
        let err = FormGate::builder().with_config(config).build().unwrap_err();
        assert_eq!(err, BuildError::ZeroTrackedIdentities);
    }
}
