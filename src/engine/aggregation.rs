//! Aggregation Engine
//!
//! Folds one validated increment into a page's running total and, when the
//! new total beats the country's top record, replaces the top record.
//!
//! # Protocol
//!
//! ```text
//!  read   page ─┐                 ┌─ write page (store, then cache)
//!               ├─ compare/add ───┤
//!  read   top  ─┘                 └─ write top  (store, then cache) if new total > top
//! ```
//!
//! Both reads go through the cache (read-through). Both writes are
//! write-through and run independently: a failed write is reported in the
//! [`UpdateOutcome`] but never rolls back the other one.
//!
//! # Concurrency
//!
//! With [`WriteOrdering::Unordered`] the read-compare-write sequence is not
//! atomic. Two pipelines that read the same page or top record before either
//! writes will lose one of the updates (last remote write wins). With
//! [`WriteOrdering::PerCountry`] every update for a country runs under that
//! country's async mutex, which closes the window inside this process.
//!
//! Dropping the returned future before completion abandons the steps not yet
//! started. A write already handed to the store is not undone.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::cache::StatisticsCache;
use crate::domain::{
    CountryCode, PageRecord, StatisticsKey, StatisticsRecord, StatisticsStore, StoreResult,
    ValidatedUpdate,
};
use crate::error::{Error, Result, StoreError, WriteFailures};
use crate::metrics::METRICS;

// =============================================================================
// Configuration
// =============================================================================

/// How concurrent updates to the same country are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteOrdering {
    /// No coordination; concurrent updates may be lost.
    #[default]
    Unordered,
    /// Updates for one country are serialized through a per-country lock.
    PerCountry,
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub write_ordering: WriteOrdering,
}

// =============================================================================
// Outcome
// =============================================================================

/// Status of the top-record write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopWrite {
    /// The new total did not exceed the current top record.
    NotRequired,
    Written,
    Failed(StoreError),
}

/// What an update did. The read phase succeeded if this value exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The page record the engine tried to persist.
    pub page: PageRecord,
    pub page_write: std::result::Result<(), StoreError>,
    pub top_write: TopWrite,
}

impl UpdateOutcome {
    /// Both required writes landed.
    pub fn is_complete(&self) -> bool {
        self.page_write.is_ok() && !matches!(self.top_write, TopWrite::Failed(_))
    }

    /// Whether this update replaced the country's top record.
    pub fn top_replaced(&self) -> bool {
        self.top_write == TopWrite::Written
    }

    /// Collapse to success, or `Error::WriteFailed` naming the failed writes.
    pub fn into_result(self) -> Result<()> {
        let page = self.page_write.err();
        let top = match self.top_write {
            TopWrite::Failed(e) => Some(e),
            TopWrite::NotRequired | TopWrite::Written => None,
        };

        if page.is_none() && top.is_none() {
            Ok(())
        } else {
            Err(Error::WriteFailed(WriteFailures { page, top }))
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Read-compare-write orchestration over the cache and the remote store.
pub struct AggregationEngine {
    store: Arc<dyn StatisticsStore>,
    cache: Arc<StatisticsCache>,
    config: EngineConfig,
    country_locks: DashMap<CountryCode, Arc<Mutex<()>>>,
}

impl AggregationEngine {
    pub fn new(
        store: Arc<dyn StatisticsStore>,
        cache: Arc<StatisticsCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            country_locks: DashMap::new(),
        }
    }

    /// Apply one validated increment.
    ///
    /// Returns `Err` only when the read phase fails, in which case nothing
    /// was written. Write failures are reported inside the outcome.
    #[instrument(skip(self, update), fields(country = %update.country, page = %update.page, delta = update.delta))]
    pub async fn update_statistics(&self, update: &ValidatedUpdate) -> Result<UpdateOutcome> {
        match self.config.write_ordering {
            WriteOrdering::Unordered => self.apply(update).await,
            WriteOrdering::PerCountry => {
                let lock = self.country_lock(&update.country);
                let _guard = lock.lock().await;
                self.apply(update).await
            }
        }
    }

    fn country_lock(&self, country: &CountryCode) -> Arc<Mutex<()>> {
        self.country_locks
            .entry(country.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    async fn apply(&self, update: &ValidatedUpdate) -> Result<UpdateOutcome> {
        let ValidatedUpdate {
            country,
            page,
            delta,
        } = update;

        let page_key = StatisticsKey::page(country, page).to_string();
        let top_key = StatisticsKey::top(country).to_string();

        let (current_page, current_top) = futures::try_join!(
            self.cache_or_remote(&page_key),
            self.cache_or_remote(&top_key)
        )?;

        let current_views = current_page.map_or(0, |record| record.views);
        let top_views = current_top.map_or(0, |record| record.views);

        let new_views = current_views.saturating_add(*delta);
        let replace_top = new_views > top_views;
        debug!(
            current_views,
            new_views, top_views, replace_top, "Computed new page total"
        );

        let updated = StatisticsRecord::new(country.clone(), page.clone(), new_views);

        let top_write = async {
            if !replace_top {
                return TopWrite::NotRequired;
            }
            match self.write_through(&top_key, &updated).await {
                Ok(()) => TopWrite::Written,
                Err(e) => TopWrite::Failed(e),
            }
        };
        let (page_write, top_write) =
            futures::join!(self.write_through(&page_key, &updated), top_write);

        if let Err(e) = &page_write {
            warn!("Page record write failed: {}", e);
        }
        if let TopWrite::Failed(e) = &top_write {
            warn!("Top record write failed: {}", e);
        }

        Ok(UpdateOutcome {
            page: updated,
            page_write,
            top_write,
        })
    }

    /// Cache first; on a miss read the store and cache what it returned.
    async fn cache_or_remote(&self, key: &str) -> StoreResult<Option<StatisticsRecord>> {
        if let Some(record) = self.cache.get(key) {
            METRICS.record_cache_lookup(true);
            return Ok(Some(record));
        }
        METRICS.record_cache_lookup(false);

        let remote = self.store.get(key).await.inspect_err(|e| {
            METRICS.record_store_error("get");
            warn!("Store read failed: {}", e);
        })?;

        if let Some(record) = &remote {
            self.cache.put(key, record.clone());
        }
        Ok(remote)
    }

    /// Store first; the cache only sees values the store accepted.
    async fn write_through(&self, key: &str, record: &StatisticsRecord) -> StoreResult<()> {
        self.store
            .set(key, record)
            .await
            .inspect_err(|_| METRICS.record_store_error("set"))?;
        self.cache.put(key, record.clone());
        Ok(())
    }
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("store", &self.store.name())
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
