//! Capacity cap for tracked identities.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// Drops the stalest entry once `max_entries` identities are tracked.
///
/// For rate counters "stalest" means the window that opened first; that
/// identity is the closest to being swept anyway. The registry hands over a
/// sample rather than the whole map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LruEviction {
    max_entries: usize,
}

impl LruEviction {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Tracked identities at which a new one first forces an eviction.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K: Clone, V: Clone> EvictionPolicy<K, V> for LruEviction {
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K> {
        let stalest = candidates.iter().min_by_key(|c| c.last_access)?;
        Some(stalest.key.clone())
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }
}
