//! Bounded Cache
//!
//! Process-local, capacity- and time-bounded cache of statistics records,
//! sitting in front of the remote store.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     BoundedCache                        │
//! │  key ──fx_hash──▶ shard[i]  (Mutex<HashMap + LRU>)      │
//! │                                                        │
//! │  Σ shard capacities == capacity                        │
//! │  entry expires `ttl` after its last write              │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - The number of live entries never exceeds `capacity`.
//! - `get` and `put` are individually atomic per key; there is no
//!   cross-key transaction.
//! - `get` never performs I/O.
//!
//! Eviction is LRU within a shard. A full shard evicts even if other shards
//! have room.

mod entry;
mod shard;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::domain::StatisticsRecord;

pub use entry::CacheEntry;
pub use shard::{Lookup, Shard};

use entry::fx_hash;

/// Default maximum number of entries
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Default time-to-live since last write (60 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default shard count
pub const DEFAULT_SHARD_COUNT: usize = 16;

// =============================================================================
// Configuration
// =============================================================================

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries (0 disables caching)
    pub capacity: usize,
    /// Entry lifetime measured from its last write
    pub ttl: Duration,
    /// Number of independently locked shards
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: DEFAULT_CACHE_TTL,
            shards: DEFAULT_SHARD_COUNT,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

// =============================================================================
// Bounded Cache
// =============================================================================

/// Thread-safe, sharded, capacity- and TTL-bounded cache.
pub struct BoundedCache<V> {
    shards: Box<[Shard<V>]>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

/// Cache of statistics records keyed by their store key.
pub type StatisticsCache = BoundedCache<StatisticsRecord>;

impl<V: Clone> BoundedCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let shard_count = config.shards.max(1).min(config.capacity.max(1));
        let base = config.capacity / shard_count;
        let remainder = config.capacity % shard_count;

        let shards: Vec<Shard<V>> = (0..shard_count)
            .map(|i| Shard::new(base + usize::from(i < remainder)))
            .collect();

        Self {
            shards: shards.into_boxed_slice(),
            ttl: config.ttl,
            capacity: config.capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard<V> {
        let idx = (fx_hash(key.as_bytes()) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Look up a live entry. Expired entries are dropped and reported absent.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.shard(key).get(key, Instant::now()) {
            Lookup::Hit(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Expired => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite, restarting the entry's TTL.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let evicted = self.shard(&key).insert(key, value, self.ttl, Instant::now());
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.shard(key).remove(key)
    }

    /// Drop all expired entries now instead of lazily on lookup.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let purged: usize = self.shards.iter().map(|s| s.purge_expired(now)).sum();
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub fn clear(&self) {
        self.shards.iter().for_each(Shard::clear);
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions(),
        }
    }
}

impl<V: Clone> Default for BoundedCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V> std::fmt::Debug for BoundedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    pub expirations: u64,
    pub evictions: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small(capacity: usize) -> BoundedCache<u64> {
        BoundedCache::new(CacheConfig::default().with_capacity(capacity))
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 100_000);
        assert_eq!(config.ttl, Duration::from_secs(3600));

        let cache: BoundedCache<u64> = BoundedCache::default();
        assert_eq!(cache.capacity(), 100_000);
        assert_eq!(cache.shard_count(), DEFAULT_SHARD_COUNT);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_get() {
        let cache = small(10);
        cache.put("statistics:US:page:home", 10);

        assert_eq!(cache.get("statistics:US:page:home"), Some(10));
        assert_eq!(cache.get("statistics:US:page:about"), None);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hit_ratio(), 0.5);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = small(10);
        cache.put("k", 1);
        cache.put("k", 2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_capacity_bound() {
        let cache = small(50);
        for i in 0..500u64 {
            cache.put(format!("key-{}", i), i);
            assert!(cache.len() <= 50);
        }
        assert!(cache.evictions() >= 450);
    }

    #[test]
    fn test_small_capacity_uses_fewer_shards() {
        let cache = small(3);
        assert_eq!(cache.shard_count(), 3);

        for i in 0..20u64 {
            cache.put(format!("key-{}", i), i);
        }
        assert!(cache.len() <= 3);
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = small(0);
        cache.put("k", 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: BoundedCache<u64> = BoundedCache::new(
            CacheConfig::default()
                .with_capacity(10)
                .with_ttl(Duration::from_millis(20)),
        );

        cache.put("k", 1);
        assert_eq!(cache.get("k"), Some(1));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache: BoundedCache<u64> =
            BoundedCache::new(CacheConfig::default().with_ttl(Duration::ZERO));
        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = small(10);
        cache.put("a", 1);
        cache.put("b", 2);

        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.remove("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache: Arc<BoundedCache<u64>> =
            Arc::new(BoundedCache::new(CacheConfig::default().with_capacity(1000)));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        let key = format!("obj-{}-{}", t, i);
                        cache.put(key.clone(), i);
                        if let Some(v) = cache.get(&key) {
                            assert_eq!(v, i);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 1000);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: no sequence of puts leaves more than `capacity` entries.
        #[test]
        fn prop_capacity_never_exceeded(
            capacity in 0usize..64,
            keys in prop::collection::vec(0u32..256, 0..512),
        ) {
            let cache = small(capacity);
            for k in keys {
                cache.put(format!("key-{}", k), k as u64);
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
