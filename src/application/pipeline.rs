//! Submission pipeline orchestration.
//!
//! A submission moves through an explicit, ordered list of stages:
//!
//! ```text
//! Received -> RateChecked -> CsrfChecked -> Validated -> Dispatched -> Completed
//!     \____________\______________\____________\
//!                                               -> Rejected(reason)
//! ```
//!
//! Each stage returns a [`StageOutcome`]: either the value the next stage
//! needs, or the reason to stop. The orchestrators below record every state
//! entered so callers and tests can audit the path taken.

use crate::application::comments::CommentBoard;
use crate::application::csrf::{CsrfGuard, CsrfVerdict};
use crate::application::dispatcher::NotificationDispatcher;
use crate::application::flash::FlashStore;
use crate::application::limiter::{RateLimiter, TieredRateLimiter};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, SessionId, SessionStore, Storage};
use crate::domain::comment::{CommentPage, CommentRecord};
use crate::domain::flash::{FlashMessage, CONTACT_FAILED, CONTACT_SENT};
use crate::domain::identity::ClientIdentity;
use crate::domain::outcome::{
    PipelineRun, PipelineState, RejectReason, StatusKind, SubmissionOutcome,
};
use crate::domain::policy::{RateDecision, RateWindowCounter};
use crate::domain::submission::{CommentPayload, ContactPayload, DispatchJob};
use crate::domain::validation::{RawForm, ValidationErrorMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

/// Result of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome<T> {
    /// Proceed to the next stage with this value
    Continue(T),
    /// Stop here
    ShortCircuit(RejectReason),
}

/// Rate limit stage.
pub fn check_rate<S>(limiter: &TieredRateLimiter<S>, identity: ClientIdentity) -> StageOutcome<()>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
{
    match limiter.check(identity) {
        RateDecision::Allow => StageOutcome::Continue(()),
        RateDecision::Reject { retry_after } => {
            StageOutcome::ShortCircuit(RejectReason::RateLimited { retry_after })
        }
    }
}

/// Anti-forgery stage. Runs before the payload is looked at.
///
/// A caller without a live session cannot hold a valid token.
pub fn check_csrf<St: SessionStore>(
    guard: &CsrfGuard<St>,
    session: Option<SessionId>,
    presented: Option<&str>,
) -> StageOutcome<SessionId> {
    let Some(session) = session else {
        return StageOutcome::ShortCircuit(RejectReason::CsrfMismatch);
    };
    match guard.verify(&session, presented) {
        CsrfVerdict::Ok => StageOutcome::Continue(session),
        CsrfVerdict::Mismatch => StageOutcome::ShortCircuit(RejectReason::CsrfMismatch),
    }
}

/// Validation stage.
pub fn check_payload<P>(
    form: &RawForm,
    validate: impl FnOnce(&RawForm) -> Result<P, ValidationErrorMap>,
) -> StageOutcome<P> {
    match validate(form) {
        Ok(payload) => StageOutcome::Continue(payload),
        Err(errors) => StageOutcome::ShortCircuit(RejectReason::Invalid(errors)),
    }
}

/// An inbound form submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Rate limiter key of the caller
    pub identity: ClientIdentity,
    /// Live session the request belongs to, if any
    pub session: Option<SessionId>,
    /// Anti-forgery token sent with the request, if any
    pub csrf_token: Option<String>,
    /// Submitted fields, without the token
    pub form: RawForm,
}

/// Result of a comment submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    /// The comment was recorded; carries the first page to swap in
    Posted(CommentPage),
    /// Refused with a client-visible status
    Rejected {
        status: StatusKind,
        retry_after: Option<Duration>,
    },
}

/// Everything a contact form render needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormContext {
    /// Token to embed in the form
    pub csrf_token: String,
    /// Flash messages queued by the previous request, now consumed
    pub flashes: Vec<FlashMessage>,
}

/// Everything a room page render needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomContext {
    /// Token the comment form sends back
    pub csrf_token: String,
    /// The requested page of the room
    pub page: CommentPage,
}

/// How many counters and sessions one sweep removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub counters: usize,
    pub sessions: usize,
}

/// Collaborators assembled by the composition root.
#[derive(Debug)]
pub struct PipelineComponents<S, St>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
    St: SessionStore,
{
    /// Narrow limiter for contact submissions
    pub contact_limiter: RateLimiter<S>,
    /// Narrow limiter for comment submissions
    pub comment_limiter: RateLimiter<S>,
    /// Broad limiter shared by every route
    pub global_limiter: RateLimiter<S>,
    pub sessions: Arc<St>,
    pub dispatcher: NotificationDispatcher,
    pub board: CommentBoard,
    pub clock: Arc<dyn Clock>,
    /// Address contact notifications are sent to
    pub recipient: String,
    pub metrics: Metrics,
}

/// The server-side core: gates, validates and completes submissions.
#[derive(Debug)]
pub struct SubmissionPipeline<S, St>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
    St: SessionStore,
{
    contact_tiers: TieredRateLimiter<S>,
    comment_tiers: TieredRateLimiter<S>,
    read_tiers: TieredRateLimiter<S>,
    limiters: Vec<RateLimiter<S>>,
    sessions: Arc<St>,
    csrf: CsrfGuard<St>,
    flash: FlashStore<St>,
    dispatcher: NotificationDispatcher,
    board: CommentBoard,
    clock: Arc<dyn Clock>,
    recipient: String,
    metrics: Metrics,
}

impl<S, St> SubmissionPipeline<S, St>
where
    S: Storage<ClientIdentity, RateWindowCounter> + Clone,
    St: SessionStore,
{
    /// Wire the pipeline. Narrow limiters run before the global one.
    pub fn new(components: PipelineComponents<S, St>) -> Self {
        let PipelineComponents {
            contact_limiter,
            comment_limiter,
            global_limiter,
            sessions,
            dispatcher,
            board,
            clock,
            recipient,
            metrics,
        } = components;

        Self {
            contact_tiers: TieredRateLimiter::new(vec![
                contact_limiter.clone(),
                global_limiter.clone(),
            ]),
            comment_tiers: TieredRateLimiter::new(vec![
                comment_limiter.clone(),
                global_limiter.clone(),
            ]),
            read_tiers: TieredRateLimiter::new(vec![global_limiter.clone()]),
            limiters: vec![contact_limiter, comment_limiter, global_limiter],
            csrf: CsrfGuard::new(Arc::clone(&sessions)),
            flash: FlashStore::new(Arc::clone(&sessions)),
            sessions,
            dispatcher,
            board,
            clock,
            recipient,
            metrics,
        }
    }

    /// Metrics shared with the limiters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The comment board.
    pub fn board(&self) -> &CommentBoard {
        &self.board
    }

    /// The flash store.
    pub fn flash(&self) -> &FlashStore<St> {
        &self.flash
    }

    /// The anti-forgery guard.
    pub fn csrf(&self) -> &CsrfGuard<St> {
        &self.csrf
    }

    /// The presented session, if it is still live.
    pub fn live_session(&self, presented: Option<SessionId>) -> Option<SessionId> {
        presented.filter(|id| self.sessions.with_session(id, |_| ()).is_some())
    }

    /// Continue a live session, or start a new one.
    ///
    /// Only call this for requests that already passed [`Self::admit_read`]
    /// or a submission gate; rejected callers must not leave sessions behind.
    pub fn session(&self, presented: Option<SessionId>) -> SessionId {
        self.live_session(presented)
            .unwrap_or_else(|| self.sessions.create())
    }

    /// Gate a read route with the global limiter.
    pub fn admit_read(&self, identity: ClientIdentity) -> Result<(), RejectReason> {
        match check_rate(&self.read_tiers, identity) {
            StageOutcome::Continue(()) => Ok(()),
            StageOutcome::ShortCircuit(reason) => {
                self.metrics.record_rate_limited();
                debug!(%identity, "read rejected by global limiter");
                Err(reason)
            }
        }
    }

    /// Prepare a contact form render: issue the token and consume flashes.
    ///
    /// Returns None if the session does not exist.
    pub fn prepare_form(&self, session: &SessionId) -> Option<FormContext> {
        let csrf_token = self.csrf.issue(session)?;
        Some(FormContext {
            csrf_token,
            flashes: self.flash.drain_all(session),
        })
    }

    /// Prepare a room page render: issue the token and load one page.
    ///
    /// Returns None if the session does not exist.
    pub fn prepare_room(&self, room: &str, page: usize, session: &SessionId) -> Option<RoomContext> {
        let csrf_token = self.csrf.issue(session)?;
        Some(RoomContext {
            csrf_token,
            page: self.board.page(room, page),
        })
    }

    /// Run a contact form submission to completion.
    pub async fn submit_contact(&self, submission: Submission) -> PipelineRun<SubmissionOutcome> {
        let span = info_span!(
            "contact_submission",
            correlation_id = %Uuid::new_v4(),
            identity = %submission.identity,
            session = submission.session.as_ref().map(SessionId::as_str),
        );
        self.run_contact(submission).instrument(span).await
    }

    async fn run_contact(&self, submission: Submission) -> PipelineRun<SubmissionOutcome> {
        let Submission {
            identity,
            session,
            csrf_token,
            form,
        } = submission;
        self.metrics.record_received();
        let mut states = vec![PipelineState::Received];

        if let StageOutcome::ShortCircuit(reason) = check_rate(&self.contact_tiers, identity) {
            return self.reject_contact(states, reason, form);
        }
        enter(&mut states, PipelineState::RateChecked);

        let session = match check_csrf(&self.csrf, session, csrf_token.as_deref()) {
            StageOutcome::Continue(session) => session,
            StageOutcome::ShortCircuit(reason) => return self.reject_contact(states, reason, form),
        };
        enter(&mut states, PipelineState::CsrfChecked);

        let payload = match check_payload(&form, ContactPayload::validate) {
            StageOutcome::Continue(payload) => payload,
            StageOutcome::ShortCircuit(reason) => return self.reject_contact(states, reason, form),
        };
        enter(&mut states, PipelineState::Validated);

        let job = DispatchJob::for_contact(&self.recipient, &payload);
        let flash = match self.dispatcher.dispatch(&job).await {
            Ok(_) => FlashMessage::success(CONTACT_SENT),
            Err(failure) => {
                self.metrics.record_dispatch_failed();
                warn!(%failure, "contact notification not delivered");
                FlashMessage::error(CONTACT_FAILED)
            }
        };
        enter(&mut states, PipelineState::Dispatched);

        if !self.flash.push_message(&session, flash.clone()) {
            error!("session vanished before the flash message could be stored");
        }
        enter(&mut states, PipelineState::Completed);
        self.metrics.record_completed();

        PipelineRun {
            states,
            outcome: SubmissionOutcome::Redirect { flash },
        }
    }

    /// Run a comment submission to completion.
    pub async fn submit_comment(
        &self,
        room: &str,
        submission: Submission,
    ) -> PipelineRun<CommentOutcome> {
        let span = info_span!(
            "comment_submission",
            correlation_id = %Uuid::new_v4(),
            room,
            identity = %submission.identity,
            session = submission.session.as_ref().map(SessionId::as_str),
        );
        async move {
            let Submission {
                identity,
                session,
                csrf_token,
                form,
            } = submission;
            self.metrics.record_received();
            let mut states = vec![PipelineState::Received];

            if let StageOutcome::ShortCircuit(reason) = check_rate(&self.comment_tiers, identity) {
                return self.reject_comment(states, reason);
            }
            enter(&mut states, PipelineState::RateChecked);

            let session = match check_csrf(&self.csrf, session, csrf_token.as_deref()) {
                StageOutcome::Continue(session) => session,
                StageOutcome::ShortCircuit(reason) => return self.reject_comment(states, reason),
            };
            enter(&mut states, PipelineState::CsrfChecked);

            let payload = match check_payload(&form, CommentPayload::validate) {
                StageOutcome::Continue(payload) => payload,
                StageOutcome::ShortCircuit(reason) => return self.reject_comment(states, reason),
            };
            enter(&mut states, PipelineState::Validated);

            let author = self
                .sessions
                .with_session(&session, |data| data.user.clone())
                .flatten();
            self.board.post(
                room,
                CommentRecord {
                    author,
                    body: payload.message,
                    created_at: self.clock.utc_now(),
                },
            );
            enter(&mut states, PipelineState::Completed);
            self.metrics.record_completed();

            PipelineRun {
                states,
                outcome: CommentOutcome::Posted(self.board.page(room, 1)),
            }
        }
        .instrument(span)
        .await
    }

    /// Read one page of a room, gated by the global limiter.
    pub fn read_comments(
        &self,
        room: &str,
        page: usize,
        identity: ClientIdentity,
    ) -> Result<CommentPage, RejectReason> {
        self.admit_read(identity)?;
        Ok(self.board.page(room, page))
    }

    /// Drop elapsed rate windows and expired sessions.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            counters: self.limiters.iter().map(RateLimiter::sweep).sum(),
            sessions: self.sessions.sweep_expired(),
        }
    }

    fn reject_contact(
        &self,
        states: Vec<PipelineState>,
        reason: RejectReason,
        values: RawForm,
    ) -> PipelineRun<SubmissionOutcome> {
        self.record_rejection(&reason);
        let outcome = match &reason {
            RejectReason::Invalid(errors) => SubmissionOutcome::Invalid {
                values,
                errors: errors.clone(),
            },
            RejectReason::RateLimited { retry_after } => SubmissionOutcome::Rejected {
                status: StatusKind::RateLimited,
                retry_after: Some(*retry_after),
            },
            RejectReason::CsrfMismatch => SubmissionOutcome::Rejected {
                status: StatusKind::CsrfMismatch,
                retry_after: None,
            },
        };
        finish_rejected(states, reason, outcome)
    }

    fn reject_comment(
        &self,
        states: Vec<PipelineState>,
        reason: RejectReason,
    ) -> PipelineRun<CommentOutcome> {
        self.record_rejection(&reason);
        let retry_after = match &reason {
            RejectReason::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };
        let outcome = CommentOutcome::Rejected {
            status: reason.status(),
            retry_after,
        };
        finish_rejected(states, reason, outcome)
    }

    fn record_rejection(&self, reason: &RejectReason) {
        match reason {
            RejectReason::RateLimited { .. } => self.metrics.record_rate_limited(),
            RejectReason::CsrfMismatch => self.metrics.record_csrf_rejected(),
            RejectReason::Invalid(errors) => {
                self.metrics.record_validation_failed();
                debug!(fields = errors.len(), "payload failed validation");
            }
        }
    }
}

fn enter(states: &mut Vec<PipelineState>, state: PipelineState) {
    debug!(?state, "pipeline transition");
    states.push(state);
}

fn finish_rejected<O>(
    mut states: Vec<PipelineState>,
    reason: RejectReason,
    outcome: O,
) -> PipelineRun<O> {
    warn!(status = ?reason.status(), "submission rejected");
    states.push(PipelineState::Rejected(reason));
    PipelineRun { states, outcome }
}
