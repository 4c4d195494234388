//! Cache Shard
//!
//! One independently locked slice of the bounded cache: an `LruCache` under a
//! mutex. Each shard enforces its own fixed capacity; shard capacities sum to
//! the cache capacity, so the cache as a whole can never exceed it.
//!
//! `get` takes the lock exclusively because it moves the key to the front of
//! the LRU order.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::entry::CacheEntry;

/// Result of a shard lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Hit(V),
    Miss,
    /// Present but past its TTL; the entry has been dropped.
    Expired,
}

/// Single shard with a fixed entry capacity. A zero-capacity shard stores
/// nothing.
pub struct Shard<V> {
    inner: Option<Mutex<LruCache<String, CacheEntry<V>>>>,
}

impl<V: Clone> Shard<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|size| Mutex::new(LruCache::new(size))),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str, now: Instant) -> Lookup<V> {
        let Some(inner) = &self.inner else {
            return Lookup::Miss;
        };
        let mut guard = inner.lock();

        let expired = match guard.peek(key) {
            None => return Lookup::Miss,
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            guard.pop(key);
            return Lookup::Expired;
        }

        match guard.get(key) {
            Some(entry) => Lookup::Hit(entry.value().clone()),
            None => Lookup::Miss,
        }
    }

    /// Insert or overwrite, refreshing expiry. Returns the number of entries
    /// evicted to make room.
    pub fn insert(&self, key: String, value: V, ttl: Duration, now: Instant) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let mut guard = inner.lock();

        // With the old entry gone, anything `push` hands back was evicted.
        guard.pop(&key);
        match guard.push(key, CacheEntry::written_at(value, ttl, now)) {
            Some(_) => 1,
            None => 0,
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner
            .as_ref()?
            .lock()
            .pop(key)
            .map(CacheEntry::into_value)
    }

    /// Drop every expired entry, returning how many were dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let mut guard = inner.lock();

        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
    }
}

impl<V> std::fmt::Debug for Shard<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("capacity", &self.inner.as_ref().map_or(0, |i| i.lock().cap().get()))
            .finish()
    }
}
