//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::flash::FlashMessage;
use crate::domain::submission::DispatchJob;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

/// Candidate entry for eviction consideration.
///
/// Values are cloned to avoid lifetime issues with concurrent maps.
pub struct EvictionCandidate<K, V> {
    /// The key of the entry
    pub key: K,
    /// The value of the entry (cloned)
    pub value: V,
    /// Last access time for LRU-based strategies
    pub last_access: Instant,
}

/// Port for eviction policy decisions.
///
/// Lets storage owners delegate the choice of victim when a capacity bound is
/// reached.
pub trait EvictionPolicy<K, V>: Send + Sync + Debug
where
    K: Clone,
    V: Clone,
{
    /// Select a victim from the given candidates, or None to keep everything.
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K>;

    /// Check if eviction should be triggered at the given entry count.
    fn should_evict(&self, current_entries: usize) -> bool;
}

/// Port for obtaining current time.
///
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current monotonic instant.
    fn now(&self) -> Instant;

    /// Get the current wall-clock time in UTC.
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Port for concurrent key-value storage.
///
/// Updates through `with_entry_mut` are atomic per key; different keys do not
/// contend with each other.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// The accessor receives `true` when the entry was just created.
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V, bool) -> R;

    /// Access an existing entry with mutable access.
    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R;

    /// Remove an entry, returning whether it existed.
    fn remove(&self, key: &K) -> bool;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

// Limiters clone their storage handle, so shared storage sits behind an Arc
impl<K, V, S> Storage<K, V> for Arc<S>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    S: Storage<K, V>,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V, bool) -> R,
    {
        S::with_entry_mut(self, key, factory, accessor)
    }

    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        S::with_existing_mut(self, key, accessor)
    }

    fn remove(&self, key: &K) -> bool {
        S::remove(self, key)
    }

    fn len(&self) -> usize {
        S::len(self)
    }

    fn is_empty(&self) -> bool {
        S::is_empty(self)
    }

    fn clear(&self) {
        S::clear(self)
    }

    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        S::for_each(self, f)
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        S::retain(self, f)
    }
}

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-session state.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// Anti-forgery token, generated on first issue
    pub csrf_token: Option<String>,
    /// Pending flash messages in insertion order
    pub flash: Vec<FlashMessage>,
    /// Signed-in user, if any
    pub user: Option<String>,
    /// Last time the session was touched
    pub last_seen: Instant,
}

impl SessionData {
    /// Fresh, empty session state.
    pub fn new(now: Instant) -> Self {
        Self {
            csrf_token: None,
            flash: Vec::new(),
            user: None,
            last_seen: now,
        }
    }
}

/// Port for TTL-bound session storage.
pub trait SessionStore: Send + Sync + Debug {
    /// Create a new, empty session.
    fn create(&self) -> SessionId;

    /// Access a live session. Returns None for unknown or expired ids.
    fn with_session<F, R>(&self, id: &SessionId, f: F) -> Option<R>
    where
        F: FnOnce(&mut SessionData) -> R;

    /// Remove a session.
    fn remove(&self, id: &SessionId) -> bool;

    /// Drop all expired sessions, returning how many were removed.
    fn sweep_expired(&self) -> usize;

    /// Number of stored sessions, including not-yet-swept expired ones.
    fn len(&self) -> usize;

    /// Whether the store holds no sessions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifier the mail transport assigned to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation(pub String);

/// A failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network failure or timeout; worth retrying
    Transient(String),
    /// Rejected address, authentication failure; retrying cannot help
    Permanent(String),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Transient(reason) => write!(f, "transient transport error: {reason}"),
            TransportError::Permanent(reason) => write!(f, "permanent transport error: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Port for the outbound mail transport.
///
/// One call is one delivery attempt; retries are the dispatcher's concern.
#[async_trait]
pub trait MailTransport: Send + Sync + Debug {
    /// Attempt to deliver a job once.
    async fn send(&self, job: &DispatchJob) -> Result<Confirmation, TransportError>;
}
