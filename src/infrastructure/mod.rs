//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Storage implementations (sharded maps) and eviction policies
//! - Sessions, mail transport and environment configuration
//! - The composition root ([`gate::FormGate`]) and the HTTP surface

pub mod clock;
pub mod config;
pub mod eviction;
pub mod gate;
pub mod mail;
pub mod render;
pub mod session;
pub mod storage;

#[cfg(feature = "server")]
pub mod http;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides a controllable clock, a scriptable mail
/// transport and a tracing layer that captures events.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// formgate = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
