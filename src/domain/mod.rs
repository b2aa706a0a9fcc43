//! Domain layer - pure types and rules with no I/O.
//!
//! This layer contains the core concepts and invariants of the submission system:
//! - Client identity and the fixed-window rate policy
//! - The declarative validation engine and typed payloads
//! - Flash messages, comments, pipeline states and outcomes
//!
//! All types in this layer are pure and easily testable.

pub mod comment;
pub mod flash;
pub mod identity;
pub mod outcome;
pub mod policy;
pub mod submission;
pub mod validation;
