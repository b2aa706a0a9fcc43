//! Client side of the partial-update flow.
//!
//! The browser swaps server fragments into the page; the [`SyncController`]
//! reacts to those swaps and to failed submissions by managing the comment
//! input, a lazily created error banner and timestamp localization. The
//! document is reached through the [`DocumentHost`] port so the controller can
//! run against a real DOM binding or the in-memory [`VirtualDocument`].

pub mod controller;
pub mod dom;
pub mod timestamp;

pub use controller::{transition, BannerState, Effect, SyncController, SyncEvent, SyncTargets};
pub use dom::{DocumentHost, VirtualDocument};
