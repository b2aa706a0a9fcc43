//! Per-session anti-forgery tokens.

use crate::application::ports::{SessionId, SessionStore};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Random bytes per token before hex encoding.
const TOKEN_BYTES: usize = 32;

/// Result of verifying a presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfVerdict {
    /// The token equals the session's current token
    Ok,
    /// Missing, stale, malformed, or unknown session
    Mismatch,
}

impl CsrfVerdict {
    /// Check if this verdict is Ok.
    pub fn is_ok(&self) -> bool {
        matches!(self, CsrfVerdict::Ok)
    }
}

/// Issues and verifies one token per session.
///
/// The token is generated on first issue and stays stable until the session
/// is renewed or expires.
#[derive(Debug)]
pub struct CsrfGuard<St: SessionStore> {
    sessions: Arc<St>,
}

impl<St: SessionStore> Clone for CsrfGuard<St> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<St: SessionStore> CsrfGuard<St> {
    /// Create a guard over a session store.
    pub fn new(sessions: Arc<St>) -> Self {
        Self { sessions }
    }

    /// Return the session's token, generating it on first use.
    ///
    /// Returns None if the session does not exist.
    pub fn issue(&self, session: &SessionId) -> Option<String> {
        self.sessions.with_session(session, |data| {
            data.csrf_token
                .get_or_insert_with(|| {
                    debug!(session = %session, "issued csrf token");
                    generate_token()
                })
                .clone()
        })
    }

    /// Compare a presented token with the session's current token.
    ///
    /// The comparison runs in constant time. A session without a token can
    /// never verify.
    pub fn verify(&self, session: &SessionId, presented: Option<&str>) -> CsrfVerdict {
        let matched = self
            .sessions
            .with_session(session, |data| match (&data.csrf_token, presented) {
                (Some(expected), Some(presented)) => {
                    constant_time_eq::constant_time_eq(expected.as_bytes(), presented.as_bytes())
                }
                _ => false,
            })
            .unwrap_or(false);

        if matched {
            CsrfVerdict::Ok
        } else {
            warn!(session = %session, "csrf token mismatch");
            CsrfVerdict::Mismatch
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
