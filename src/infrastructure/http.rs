//! HTTP adapter.
//!
//! Maps requests onto the submission pipeline and pipeline outcomes back onto
//! responses. Sessions ride in a signed `sid` cookie whose value is
//! `{id}.{hex(hmac_sha256(secret, id))}`.

use crate::application::pipeline::{CommentOutcome, Submission};
use crate::application::ports::SessionId;
use crate::domain::identity::{ClientIdentity, IdentitySource};
use crate::domain::outcome::{RejectReason, StatusKind, SubmissionOutcome};
use crate::domain::validation::{RawForm, ValidationErrorMap};
use crate::infrastructure::gate::{FormGate, GatePipeline};
use crate::infrastructure::render;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{
        header::{COOKIE, LOCATION, RETRY_AFTER, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type HmacSha256 = Hmac<Sha256>;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "sid";

/// Form field carrying the anti-forgery token.
pub const CSRF_FIELD: &str = "_csrf";

/// Header carrying the anti-forgery token on partial-update requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<GatePipeline>,
    identity_source: IdentitySource,
    secret: Arc<[u8]>,
}

impl AppState {
    /// Handler state for a built gate.
    pub fn new(gate: &FormGate) -> Self {
        Self {
            pipeline: Arc::clone(gate.pipeline()),
            identity_source: gate.config().identity_source,
            secret: Arc::from(gate.config().session_secret.as_bytes()),
        }
    }

    fn sign(&self, id: &SessionId) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(id.as_str().as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Parse and verify the session cookie, if any.
    fn presented_session(&self, headers: &HeaderMap) -> Option<SessionId> {
        let raw = cookie_value(headers, SESSION_COOKIE)?;
        let (id, signature) = raw.rsplit_once('.')?;
        let id = SessionId::new(id);
        let expected = self.sign(&id)?;
        constant_time_eq(expected.as_bytes(), signature.as_bytes()).then_some(id)
    }

    /// The presented session if it is live. Never creates one.
    fn live_session(&self, headers: &HeaderMap) -> Option<SessionId> {
        self.pipeline.live_session(self.presented_session(headers))
    }

    /// Resolve the request's session, and the cookie to set if it changed.
    ///
    /// Creates a session when needed, so only call it once the request has
    /// passed the read gate.
    fn session(&self, headers: &HeaderMap) -> (SessionId, Option<String>) {
        let presented = self.presented_session(headers);
        let session = self.pipeline.session(presented.clone());
        if presented.as_ref() == Some(&session) {
            return (session, None);
        }
        let cookie = self.sign(&session).map(|signature| {
            format!("{SESSION_COOKIE}={session}.{signature}; Path=/; HttpOnly; SameSite=Lax")
        });
        (session, cookie)
    }

    fn identity(&self, peer: Option<SocketAddr>, headers: &HeaderMap) -> ClientIdentity {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok());
        ClientIdentity::derive(self.identity_source, peer.map(|addr| addr.ip()), forwarded)
    }
}

/// Build the router.
pub fn router(gate: &FormGate) -> Router {
    Router::new()
        .route("/contact", get(contact_form).post(contact_submit))
        .route("/chat/:room", get(room_page))
        .route("/chat/:room/post-comment", post(comment_submit))
        .route("/chat/:room/comments", get(comment_list))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(gate))
}

/// Initialize the global tracing subscriber from `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Serve the gate until Ctrl-C or SIGTERM.
///
/// Starts the background sweeper and stops it once the server has drained.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(gate: FormGate) -> std::io::Result<()> {
    let address = format!("0.0.0.0:{}", gate.config().port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;

    let sweeper = gate.start_sweeper();
    let app = router(&gate);
    info!("Server running on {address}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match sweeper.shutdown().await {
        Ok(report) => info!(
            counters = report.counters,
            sessions = report.sessions,
            "sweeper stopped"
        ),
        Err(e) => error!(error = %e, "sweeper did not stop cleanly"),
    }
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn contact_form(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let identity = state.identity(peer.map(|ConnectInfo(addr)| addr), &headers);
    if let Err(reason) = state.pipeline.admit_read(identity) {
        return read_rejection(reason);
    }

    let (session, cookie) = state.session(&headers);
    let response = match state.pipeline.prepare_form(&session) {
        Some(context) => Html(render::contact_page(
            &context,
            &RawForm::new(),
            &ValidationErrorMap::new(),
        ))
        .into_response(),
        None => internal_failure("session missing while rendering the contact form"),
    };
    with_cookie(response, cookie)
}

async fn contact_submit(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(mut form): Form<RawForm>,
) -> Response {
    let session = state.live_session(&headers);
    let csrf_token = presented_token(&headers, &mut form);
    let submission = Submission {
        identity: state.identity(peer.map(|ConnectInfo(addr)| addr), &headers),
        session: session.clone(),
        csrf_token,
        form,
    };

    let run = state.pipeline.submit_contact(submission).await;
    match run.outcome {
        SubmissionOutcome::Redirect { .. } => {
            (StatusCode::SEE_OTHER, [(LOCATION, "/contact")]).into_response()
        }
        SubmissionOutcome::Invalid { values, errors } => {
            match session.and_then(|session| state.pipeline.prepare_form(&session)) {
                Some(context) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Html(render::contact_page(&context, &values, &errors)),
                )
                    .into_response(),
                None => internal_failure("session missing while re-rendering the contact form"),
            }
        }
        SubmissionOutcome::Rejected {
            status,
            retry_after,
        } => rejection(status, retry_after),
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

async fn room_page(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<PageQuery>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let identity = state.identity(peer.map(|ConnectInfo(addr)| addr), &headers);
    if let Err(reason) = state.pipeline.admit_read(identity) {
        return read_rejection(reason);
    }

    let (session, cookie) = state.session(&headers);
    let response = match state
        .pipeline
        .prepare_room(&room, query.page.unwrap_or(1), &session)
    {
        Some(context) => Html(render::room_page(&room, &context)).into_response(),
        None => internal_failure("session missing while rendering a room"),
    };
    with_cookie(response, cookie)
}

async fn comment_submit(
    State(state): State<AppState>,
    Path(room): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(mut form): Form<RawForm>,
) -> Response {
    let csrf_token = presented_token(&headers, &mut form);
    let submission = Submission {
        identity: state.identity(peer.map(|ConnectInfo(addr)| addr), &headers),
        session: state.live_session(&headers),
        csrf_token,
        form,
    };

    let run = state.pipeline.submit_comment(&room, submission).await;
    match run.outcome {
        CommentOutcome::Posted(page) => Html(render::comment_fragment(&room, &page)).into_response(),
        CommentOutcome::Rejected {
            status,
            retry_after,
        } => rejection(status, retry_after),
    }
}

async fn comment_list(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<PageQuery>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let identity = state.identity(peer.map(|ConnectInfo(addr)| addr), &headers);
    match state
        .pipeline
        .read_comments(&room, query.page.unwrap_or(1), identity)
    {
        Ok(page) => Html(render::comment_fragment(&room, &page)).into_response(),
        Err(reason) => read_rejection(reason),
    }
}

fn read_rejection(reason: RejectReason) -> Response {
    let retry_after = match reason {
        RejectReason::RateLimited { retry_after } => Some(retry_after),
        _ => None,
    };
    rejection(reason.status(), retry_after)
}

/// The token from the form field, else from the header.
fn presented_token(headers: &HeaderMap, form: &mut RawForm) -> Option<String> {
    form.take(CSRF_FIELD).or_else(|| {
        headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

fn rejection(status: StatusKind, retry_after: Option<Duration>) -> Response {
    let code = StatusCode::from_u16(status.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    let mut response = (code, status.user_message()).into_response();
    if let Some(wait) = retry_after {
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

fn internal_failure(detail: &str) -> Response {
    error!(detail, "internal failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusKind::InternalFailure.user_message(),
    )
        .into_response()
}

fn with_cookie(mut response: Response, cookie: Option<String>) -> Response {
    if let Some(value) = cookie.and_then(|cookie| HeaderValue::from_str(&cookie).ok()) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
