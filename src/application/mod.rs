//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Counter registry and rate limiters (admission decisions)
//! - CSRF guard and flash store (per-session state)
//! - Notification dispatcher (retry, backoff, circuit breaker)
//! - Submission pipeline (ordered stages) and background sweeper
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod comments;
pub mod csrf;
pub mod dispatcher;
pub mod flash;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod sweeper;
