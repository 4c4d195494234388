//! In-Memory Statistics Store
//!
//! Implements the `StatisticsStore` port over a `DashMap`. Used for local
//! runs (`--store memory`) and as the test double for the engine: it counts
//! every call, can inject failures per key and operation, and can suspend
//! on each call to force interleaving between concurrent pipelines.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::domain::ports::{StatisticsStore, StoreResult};
use crate::domain::StatisticsRecord;
use crate::error::StoreError;

/// Store operation, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Scan,
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub records: usize,
    pub gets: u64,
    pub sets: u64,
    pub scans: u64,
}

/// In-memory store backed by `DashMap`.
#[derive(Debug, Default)]
pub struct InMemoryStatisticsStore {
    records: DashMap<String, StatisticsRecord>,
    gets: AtomicU64,
    sets: AtomicU64,
    scans: AtomicU64,
    /// (operation, key or prefix) pairs that fail
    failures: RwLock<HashSet<(StoreOp, String)>>,
    latency: Option<Duration>,
}

impl InMemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend on every call. `Duration::ZERO` yields to the scheduler once.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `op` fail for `key` (or, for scans, for that prefix).
    pub fn fail_on(&self, op: StoreOp, key: impl Into<String>) {
        self.failures.write().insert((op, key.into()));
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Seed a record without going through the async API.
    pub fn insert(&self, key: impl Into<String>, record: StatisticsRecord) {
        self.records.insert(key.into(), record);
    }

    /// Read a record without counting it as a store call.
    pub fn record(&self, key: &str) -> Option<StatisticsRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            records: self.len(),
            gets: self.gets(),
            sets: self.sets(),
            scans: self.scans(),
        }
    }

    async fn suspend(&self) {
        match self.latency {
            Some(Duration::ZERO) => tokio::task::yield_now().await,
            Some(latency) => tokio::time::sleep(latency).await,
            None => {}
        }
    }

    fn check(&self, op: StoreOp, key: &str) -> StoreResult<()> {
        if self.failures.read().contains(&(op, key.to_string())) {
            return Err(StoreError::new(key, format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl StatisticsStore for InMemoryStatisticsStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StatisticsRecord>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.suspend().await;
        self.check(StoreOp::Get, key)?;
        Ok(self.record(key))
    }

    async fn set(&self, key: &str, value: &StatisticsRecord) -> StoreResult<()> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.suspend().await;
        self.check(StoreOp::Set, key)?;
        self.records.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<StatisticsRecord>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.suspend().await;
        self.check(StoreOp::Scan, prefix)?;
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
