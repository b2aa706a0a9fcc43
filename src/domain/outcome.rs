//! Pipeline states and the user-visible outcomes they end in.

use crate::domain::flash::FlashMessage;
use crate::domain::validation::{RawForm, ValidationErrorMap};
use std::fmt;
use std::time::Duration;

/// Client-visible failure kinds.
///
/// Each kind maps to exactly one status code and one human sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// The payload failed validation
    ValidationFailed,
    /// The anti-forgery token did not match the session
    CsrfMismatch,
    /// The caller exceeded a rate limit
    RateLimited,
    /// Anything unexpected
    InternalFailure,
}

impl StatusKind {
    /// HTTP status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            StatusKind::ValidationFailed => 400,
            StatusKind::CsrfMismatch => 403,
            StatusKind::RateLimited => 429,
            StatusKind::InternalFailure => 500,
        }
    }

    /// Classify an HTTP status code received by a client.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => StatusKind::ValidationFailed,
            403 => StatusKind::CsrfMismatch,
            429 => StatusKind::RateLimited,
            _ => StatusKind::InternalFailure,
        }
    }

    /// The sentence shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            StatusKind::ValidationFailed => "Your message cannot be empty.",
            StatusKind::CsrfMismatch => {
                "Invalid request token. Please reload the page and try again."
            }
            StatusKind::RateLimited => {
                "You have exceeded the rate limit. Please wait a few minutes and try again."
            }
            StatusKind::InternalFailure => "An unexpected error occurred. Please try again.",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

/// Why a submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    RateLimited { retry_after: Duration },
    CsrfMismatch,
    Invalid(ValidationErrorMap),
}

impl RejectReason {
    /// Client-visible kind of this rejection.
    pub fn status(&self) -> StatusKind {
        match self {
            RejectReason::RateLimited { .. } => StatusKind::RateLimited,
            RejectReason::CsrfMismatch => StatusKind::CsrfMismatch,
            RejectReason::Invalid(_) => StatusKind::ValidationFailed,
        }
    }
}

/// States a submission moves through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    RateChecked,
    CsrfChecked,
    Validated,
    Dispatched,
    Completed,
    Rejected(RejectReason),
}

/// The single user-visible result of a contact submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Redirect back to the form; the flash was pushed to the session
    Redirect { flash: FlashMessage },
    /// Re-render the form pre-filled with the submitted values
    Invalid {
        values: RawForm,
        errors: ValidationErrorMap,
    },
    /// Refuse the request outright
    Rejected {
        status: StatusKind,
        retry_after: Option<Duration>,
    },
}

impl SubmissionOutcome {
    /// HTTP status code for this outcome.
    pub fn http_status(&self) -> u16 {
        match self {
            SubmissionOutcome::Redirect { .. } => 303,
            SubmissionOutcome::Invalid { .. } => 422,
            SubmissionOutcome::Rejected { status, .. } => status.http_status(),
        }
    }
}

/// States visited by one submission, and where it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun<O> {
    /// Every state entered, starting with `Received`
    pub states: Vec<PipelineState>,
    /// What the caller sees
    pub outcome: O,
}

impl<O> PipelineRun<O> {
    /// The terminal state.
    pub fn final_state(&self) -> Option<&PipelineState> {
        self.states.last()
    }

    /// Whether the run ended in `Rejected`.
    pub fn is_rejected(&self) -> bool {
        matches!(self.final_state(), Some(PipelineState::Rejected(_)))
    }
}
