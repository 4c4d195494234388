//! Domain Ports (Port/Adapter Pattern)
//!
//! The remote key-value store is the only external dependency of the
//! aggregation core. Adapters in [`crate::adapters`] implement it.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ AggregationEngine │ TopRecordsQuery          │
//! └──────────────────────────────────────────────┘
//!                       │ StatisticsStore
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │ InMemoryStatisticsStore │ HttpKvStore        │
//! └──────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::StoreError;

use super::model::StatisticsRecord;

/// Result of a single remote store call.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Port for the remote key-value store holding statistics records.
///
/// Every call is one network round-trip and one suspension point for the
/// caller. Adapters never retry; failures carry the failing key.
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn StatisticsStore> = Arc::new(InMemoryStatisticsStore::new());
/// store.set("top_statistics:US", &record).await?;
/// let tops = store.scan_prefix("top_statistics:").await?;
/// ```
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Point read. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<StatisticsRecord>>;

    /// Point write, overwriting any existing value.
    async fn set(&self, key: &str, value: &StatisticsRecord) -> StoreResult<()>;

    /// All values whose key starts with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<StatisticsRecord>>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
