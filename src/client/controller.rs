//! Partial-update sync controller.
//!
//! The controller is a two-state machine over the error banner:
//!
//! ```text
//!            SubmitFailed(kind)
//!   Idle  ─────────────────────▶  ErrorShown(message)
//!    ▲                               │  SubmitFailed(kind): replace message
//!    └───────────────────────────────┘
//!      SubmitSucceeded / FragmentSwapped(live list)
//! ```
//!
//! [`transition`] is pure: it maps a state and an event to the next state and
//! a list of [`Effect`]s. [`SyncController::handle`] applies those effects to
//! a [`DocumentHost`].

use crate::client::dom::DocumentHost;
use crate::client::timestamp;
use crate::domain::outcome::StatusKind;
use chrono::{Local, TimeZone};
use std::fmt::Display;
use tracing::debug;

/// Error banner state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BannerState {
    #[default]
    Idle,
    ErrorShown(String),
}

/// Lifecycle events raised by the partial-update layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The server accepted the submission and returned this fragment
    SubmitSucceeded(String),
    /// The server refused the submission
    SubmitFailed(StatusKind),
    /// A fragment was swapped into the element with this id
    FragmentSwapped(String),
}

/// Element ids the controller works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTargets {
    /// Live list replaced by comment fragments
    pub list: String,
    /// Comment input
    pub input: String,
    /// Error banner, created on demand before the input
    pub banner: String,
}

impl Default for SyncTargets {
    fn default() -> Self {
        Self {
            list: "comment-list".to_string(),
            input: "comment-input".to_string(),
            banner: "error-box".to_string(),
        }
    }
}

/// Class marking the input as errored.
pub const INPUT_ERROR_CLASS: &str = "error";

/// A single change to apply to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Put the fragment into the live list
    SwapList(String),
    /// Create the banner if needed and show the message
    ShowBanner(String),
    /// Destroy the banner
    RemoveBanner,
    /// Mark or unmark the input as errored
    MarkInput(bool),
    /// Empty the input and focus it
    ResetInput,
    /// Rewrite every timestamp from its source attribute
    LocalizeTimestamps,
}

/// Compute the next state and its effects.
pub fn transition(
    state: &BannerState,
    event: &SyncEvent,
    targets: &SyncTargets,
) -> (BannerState, Vec<Effect>) {
    match event {
        SyncEvent::SubmitFailed(kind) => {
            let message = kind.user_message().to_string();
            (
                BannerState::ErrorShown(message.clone()),
                vec![Effect::ShowBanner(message), Effect::MarkInput(true)],
            )
        }
        SyncEvent::SubmitSucceeded(fragment) => {
            let mut effects = vec![Effect::SwapList(fragment.clone())];
            effects.extend(list_swapped());
            (BannerState::Idle, effects)
        }
        SyncEvent::FragmentSwapped(target) if *target == targets.list => {
            (BannerState::Idle, list_swapped())
        }
        // Other swaps may still carry timestamps
        SyncEvent::FragmentSwapped(_) => (state.clone(), vec![Effect::LocalizeTimestamps]),
    }
}

fn list_swapped() -> Vec<Effect> {
    vec![
        Effect::ResetInput,
        Effect::RemoveBanner,
        Effect::MarkInput(false),
        Effect::LocalizeTimestamps,
    ]
}

/// Keeps the live list, input and error banner in step with server responses.
///
/// Generic over the time zone timestamps are rendered in; [`SyncController::new`]
/// uses the local zone.
#[derive(Debug, Clone)]
pub struct SyncController<Tz: TimeZone = Local> {
    state: BannerState,
    targets: SyncTargets,
    tz: Tz,
}

impl SyncController<Local> {
    /// Create a controller with the default element ids and the local zone.
    pub fn new() -> Self {
        Self::with_time_zone(SyncTargets::default(), Local)
    }
}

impl Default for SyncController<Local> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz> SyncController<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Create a controller with explicit ids and time zone.
    pub fn with_time_zone(targets: SyncTargets, tz: Tz) -> Self {
        Self {
            state: BannerState::Idle,
            targets,
            tz,
        }
    }

    /// Current banner state.
    pub fn state(&self) -> &BannerState {
        &self.state
    }

    /// Element ids in use.
    pub fn targets(&self) -> &SyncTargets {
        &self.targets
    }

    /// Process one event against the document.
    pub fn handle<H: DocumentHost>(&mut self, host: &mut H, event: SyncEvent) {
        let (next, effects) = transition(&self.state, &event, &self.targets);
        debug!(from = ?self.state, to = ?next, "sync transition");
        for effect in effects {
            self.apply(host, effect);
        }
        self.state = next;
    }

    /// Rewrite every timestamp from its `datetime` source.
    pub fn localize_timestamps<H: DocumentHost>(&self, host: &mut H) {
        for (index, source) in host.time_sources().into_iter().enumerate() {
            let text = timestamp::localize_in(&source, &self.tz);
            host.set_time_text(index, &text);
        }
    }

    fn apply<H: DocumentHost>(&self, host: &mut H, effect: Effect) {
        let SyncTargets {
            list,
            input,
            banner,
        } = &self.targets;
        match effect {
            Effect::SwapList(fragment) => host.swap_fragment(list, &fragment),
            Effect::ShowBanner(message) => {
                if !host.has_element(banner) {
                    host.create_element_before(banner, input);
                }
                host.set_text(banner, &message);
            }
            Effect::RemoveBanner => host.remove_element(banner),
            Effect::MarkInput(on) => host.toggle_class(input, INPUT_ERROR_CLASS, on),
            Effect::ResetInput => {
                host.set_value(input, "");
                host.focus(input);
            }
            Effect::LocalizeTimestamps => self.localize_timestamps(host),
        }
    }
}
