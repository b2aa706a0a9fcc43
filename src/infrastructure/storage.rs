//! DashMap-backed [`Storage`] adapter.
//!
//! Holds one rate window counter per client identity. An identity hashes to a
//! single shard, so its read-modify-write happens under that shard's lock and
//! two callers only contend when their identities share a shard.

use crate::application::ports::Storage;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Concurrent map keyed by identity, hashed with ahash.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    shards: DashMap<K, V, RandomState>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Pre-size for `capacity` identities.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shards: DashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Snapshot of one entry.
    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shards.get(key).map(|entry| entry.value().clone())
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + Debug,
    V: Send + Sync + Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V, bool) -> R,
    {
        match self.shards.entry(key) {
            Entry::Occupied(mut slot) => accessor(slot.get_mut(), false),
            Entry::Vacant(slot) => accessor(slot.insert(factory()).value_mut(), true),
        }
    }

    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut entry = self.shards.get_mut(key)?;
        Some(accessor(entry.value_mut()))
    }

    fn remove(&self, key: &K) -> bool {
        self.shards.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.shards.len()
    }

    fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    fn clear(&self) {
        self.shards.clear();
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        self.shards
            .iter()
            .for_each(|entry| f(entry.key(), entry.value()));
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.shards.retain(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::ClientIdentity;
    use crate::domain::policy::RateWindowCounter;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn addr(n: u8) -> ClientIdentity {
        ClientIdentity::Addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)))
    }

    type Counters = ShardedStorage<ClientIdentity, RateWindowCounter>;

    #[test]
    fn test_first_access_opens_counter() {
        let storage = Counters::new();
        let now = Instant::now();

        let opened = storage.with_entry_mut(addr(1), || RateWindowCounter::open(now), |_, created| created);
        assert!(opened);

        let opened = storage.with_entry_mut(
            addr(1),
            || RateWindowCounter::open(now),
            |counter, created| {
                counter.count += 1;
                created
            },
        );
        assert!(!opened);
        assert_eq!(storage.get_cloned(&addr(1)).map(|c| c.count), Some(2));
    }

    #[test]
    fn test_existing_only_touches_known_identities() {
        let storage = Counters::new();
        assert_eq!(storage.with_existing_mut(&addr(1), |c| c.count), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_retain_drops_old_windows() {
        let storage = Counters::new();
        let start = Instant::now();
        for n in 0..6u8 {
            let opened = start + Duration::from_secs(u64::from(n) * 10);
            storage.with_entry_mut(addr(n), || RateWindowCounter::open(opened), |_, _| ());
        }

        let now = start + Duration::from_secs(60);
        storage.retain(|_, counter| !counter.is_expired(now, Duration::from_secs(30)));
        assert_eq!(storage.len(), 2);
        assert!(storage.remove(&addr(5)));
        assert!(!storage.remove(&addr(5)));
    }

    #[test]
    fn test_parallel_identities() {
        let storage = Arc::new(Counters::with_capacity(256));
        let now = Instant::now();

        let workers: Vec<_> = (0..8u8)
            .map(|worker| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || {
                    for n in 0..32u8 {
                        let identity = ClientIdentity::Addr(IpAddr::V4(Ipv4Addr::new(10, worker, 0, n)));
                        storage.with_entry_mut(identity, || RateWindowCounter::open(now), |_, _| ());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(storage.len(), 256);
        storage.clear();
        assert!(storage.is_empty());
    }
}
