//! # formgate
//!
//! Abuse-mitigating submission pipeline for public contact forms and comment
//! boxes, with a client-side controller for partial page updates.
//!
//! Every submission passes through the same ordered stages:
//!
//! ```text
//! Received -> RateChecked -> CsrfChecked -> Validated -> Dispatched -> Completed
//! ```
//!
//! Any stage may stop the submission with `Rejected(reason)`. Each path ends
//! in exactly one user-visible outcome: a redirect carrying a one-shot flash
//! message, a 422 re-render with the submitted values and per-field errors,
//! or a 400/403/429 rejection with a single human sentence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formgate::{Config, FormGate};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     formgate::infrastructure::http::init_tracing();
//!
//!     let config = Config::from_env().expect("valid configuration");
//!     let gate = FormGate::builder()
//!         .with_config(config)
//!         .build()
//!         .expect("valid gate configuration");
//!
//!     formgate::infrastructure::http::serve(gate).await
//! }
//! ```
//!
//! ## Using the pipeline directly
//!
//! The HTTP adapter is optional (`server` feature). The pipeline can be
//! driven from any front end:
//!
//! ```rust,no_run
//! use formgate::{ClientIdentity, Config, FormGate, MailSettings, RawForm, Submission};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! # async fn run() {
//! let config = Config {
//!     contact_email: "owner@example.com".to_string(),
//!     session_secret: "change-me".to_string(),
//!     mail: Some(MailSettings::Log),
//!     ..Config::default()
//! };
//! let gate = FormGate::builder().with_config(config).build().unwrap();
//! let pipeline = gate.pipeline();
//!
//! // Render: start a session, issue the token, drain flashes
//! let session = pipeline.session(None);
//! let form = pipeline.prepare_form(&session).unwrap();
//!
//! // Submit
//! let run = pipeline
//!     .submit_contact(Submission {
//!         identity: ClientIdentity::Addr(IpAddr::V4(Ipv4Addr::LOCALHOST)),
//!         session: Some(session),
//!         csrf_token: Some(form.csrf_token),
//!         form: RawForm::new()
//!             .with("name", "Ann Lee")
//!             .with("email", "ann@example.com")
//!             .with("subject", "Hello")
//!             .with("message", "A message of reasonable length."),
//!     })
//!     .await;
//! assert_eq!(run.outcome.http_status(), 303);
//! # }
//! ```
//!
//! ## Rate Limiting
//!
//! Fixed windows keyed by client identity, in tiers: a narrow per-endpoint
//! limiter (10 contact submissions or 5 comments per window) runs before a
//! broad global one (100 requests per window). The first rejecting tier wins
//! and reports how long until its window resets.
//!
//! ```rust
//! use formgate::{RateWindowCounter, WindowPolicy};
//! use std::time::{Duration, Instant};
//!
//! let policy = WindowPolicy::new(2, Duration::from_secs(60)).unwrap();
//! let start = Instant::now();
//! let mut counter = RateWindowCounter::open(start);
//!
//! assert!(policy.register(&mut counter, start).is_allow());
//! assert!(policy.register(&mut counter, start).is_reject());
//! ```
//!
//! ## Memory Management
//!
//! All state is in-process and bounded:
//! - Elapsed rate windows are swept lazily every 1024 checks and by the
//!   background sweeper; a per-limiter cap (`MAX_TRACKED_IDENTITIES`) evicts
//!   the oldest window when reached.
//! - Sessions expire after `SESSION_TTL_SECS` of inactivity.
//! - Comment rooms keep the newest 10,000 comments.
//!
//! ## Observability
//!
//! Every stage logs through `tracing` with `identity`, `session` and a
//! per-submission `correlation_id`. Counters are available as a snapshot:
//!
//! ```rust,no_run
//! # use formgate::{Config, FormGate, MailSettings};
//! # let gate = FormGate::builder().with_config(Config {
//! #     session_secret: "s".to_string(), mail: Some(MailSettings::Log), ..Config::default()
//! # }).build().unwrap();
//! let snapshot = gate.pipeline().metrics().snapshot();
//! println!("received: {}", snapshot.received);
//! println!("rejection rate: {:.2}%", snapshot.rejection_rate() * 100.0);
//! ```
//!
//! ## Client
//!
//! [`client::SyncController`] keeps the live comment list, the input and an
//! error banner in step with fragment swaps, and rewrites every
//! `<time datetime="...">` into local time idempotently.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Client-side controller
pub mod client;

// Re-export commonly used types for convenience
pub use domain::{
    comment::{CommentPage, CommentRecord},
    flash::{FlashCategory, FlashMessage},
    identity::{ClientIdentity, IdentitySource},
    outcome::{PipelineRun, PipelineState, RejectReason, StatusKind, SubmissionOutcome},
    policy::{PolicyError, RateDecision, RateWindowCounter, WindowPolicy},
    submission::{CommentPayload, ContactPayload, DispatchJob},
    validation::{FieldSpec, RawForm, RuleSet, ValidationErrorMap},
};

pub use application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    csrf::{CsrfGuard, CsrfVerdict},
    dispatcher::{DispatchFailure, NotificationDispatcher, RetryPolicy, RetryPolicyError},
    flash::FlashStore,
    limiter::{RateLimiter, TieredRateLimiter},
    metrics::{Metrics, MetricsSnapshot},
    pipeline::{CommentOutcome, FormContext, Submission, SubmissionPipeline, SweepReport},
    ports::{
        Clock, Confirmation, EvictionCandidate, EvictionPolicy, MailTransport, SessionData,
        SessionId, SessionStore, Storage, TransportError,
    },
    registry::CounterRegistry,
    sweeper::{ShutdownError, Sweeper, SweeperConfig, SweeperConfigError, SweeperHandle},
};

pub use infrastructure::{
    clock::SystemClock,
    config::{Config, ConfigError, MailSettings, SmtpSettings},
    eviction::LruEviction,
    gate::{BuildError, FormGate, FormGateBuilder},
    mail::{LogTransport, SmtpSetupError, SmtpTransport},
    session::InMemorySessionStore,
    storage::ShardedStorage,
};

pub use client::{BannerState, SyncController, SyncEvent};
