//! In-memory session store with idle expiry.

use crate::application::ports::{Clock, SessionData, SessionId, SessionStore};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Session store keeping every session in a sharded map.
///
/// A session expires `ttl` after it was last touched. Expired sessions are
/// invisible immediately and physically removed by [`SessionStore::sweep_expired`].
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionData>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Create a store whose sessions live `ttl` past their last use.
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            ttl,
        }
    }

    /// Idle lifetime of a session.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self) -> SessionId {
        let id = SessionId::new(Uuid::new_v4().simple().to_string());
        self.sessions
            .insert(id.clone(), SessionData::new(self.clock.now()));
        debug!(session = %id, "session created");
        id
    }

    fn with_session<F, R>(&self, id: &SessionId, f: F) -> Option<R>
    where
        F: FnOnce(&mut SessionData) -> R,
    {
        let now = self.clock.now();
        let mut data = self.sessions.get_mut(id)?;
        if now.saturating_duration_since(data.last_seen) >= self.ttl {
            return None;
        }
        data.last_seen = now;
        Some(f(data.value_mut()))
    }

    fn remove(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, data| now.saturating_duration_since(data.last_seen) < self.ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "swept expired sessions");
        }
        removed
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
