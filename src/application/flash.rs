//! One-shot flash message queue kept in the session.

use crate::application::ports::{SessionId, SessionStore};
use crate::domain::flash::{FlashCategory, FlashMessage};
use std::sync::Arc;
use tracing::debug;

/// Per-session flash queue.
///
/// Pushes accumulate in insertion order; a drain returns all of them and
/// leaves the queue empty, so every message is seen by exactly one render.
#[derive(Debug)]
pub struct FlashStore<St: SessionStore> {
    sessions: Arc<St>,
}

impl<St: SessionStore> Clone for FlashStore<St> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<St: SessionStore> FlashStore<St> {
    /// Create a flash store over a session store.
    pub fn new(sessions: Arc<St>) -> Self {
        Self { sessions }
    }

    /// Queue a message. Returns false if the session does not exist.
    pub fn push(&self, session: &SessionId, category: FlashCategory, text: impl Into<String>) -> bool {
        let message = FlashMessage {
            category,
            text: text.into(),
        };
        self.push_message(session, message)
    }

    /// Queue a prepared message. Returns false if the session does not exist.
    pub fn push_message(&self, session: &SessionId, message: FlashMessage) -> bool {
        let category = message.category;
        let pushed = self
            .sessions
            .with_session(session, |data| data.flash.push(message))
            .is_some();
        if pushed {
            debug!(session = %session, %category, "flash queued");
        }
        pushed
    }

    /// Take every queued message, oldest first.
    pub fn drain_all(&self, session: &SessionId) -> Vec<FlashMessage> {
        self.sessions
            .with_session(session, |data| std::mem::take(&mut data.flash))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::session::InMemorySessionStore;
    use std::time::{Duration, Instant};

    fn flash() -> (FlashStore<InMemorySessionStore>, Arc<InMemorySessionStore>) {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let store = Arc::new(InMemorySessionStore::new(clock, Duration::from_secs(3600)));
        (FlashStore::new(store.clone()), store)
    }

    #[test]
    fn test_drain_is_exactly_once() {
        let (flash, store) = flash();
        let session = store.create();

        flash.push(&session, FlashCategory::Success, "sent");
        let first = flash.drain_all(&session);
        assert_eq!(first, vec![FlashMessage::success("sent")]);

        // A second render of the same page sees nothing
        assert!(flash.drain_all(&session).is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let (flash, store) = flash();
        let session = store.create();

        flash.push(&session, FlashCategory::Error, "one");
        flash.push(&session, FlashCategory::Success, "two");
        flash.push(&session, FlashCategory::Error, "three");

        let texts: Vec<_> = flash
            .drain_all(&session)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let (flash, store) = flash();
        let a = store.create();
        let b = store.create();

        flash.push(&a, FlashCategory::Success, "for a");
        assert!(flash.drain_all(&b).is_empty());
        assert_eq!(flash.drain_all(&a).len(), 1);
    }

    #[test]
    fn test_unknown_session() {
        let (flash, _store) = flash();
        let ghost = SessionId::new("ghost");
        assert!(!flash.push(&ghost, FlashCategory::Success, "lost"));
        assert!(flash.drain_all(&ghost).is_empty());
    }
}
