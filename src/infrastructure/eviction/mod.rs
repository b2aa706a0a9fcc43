//! Eviction policy adapters for bounding tracked identities.
//!
//! These are adapters (infrastructure layer) implementing the EvictionPolicy
//! port (application layer).

pub mod lru;

pub use lru::LruEviction;
