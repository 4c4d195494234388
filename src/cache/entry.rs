//! Cache entry and key hashing.

use std::time::{Duration, Instant};

/// Fast non-cryptographic hash (FxHash algorithm), used for shard selection.
#[inline]
pub(crate) fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

/// A cached value with its expiry deadline.
///
/// Expiry is measured from the last write; reads do not extend it.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    written_at: Instant,
    /// `None` when `ttl` is too large to represent; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn written_at(value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            written_at: now,
            expires_at: now.checked_add(ttl),
        }
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Time since the entry was written.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.written_at)
    }

    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}
