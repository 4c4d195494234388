//! Infrastructure Adapters
//!
//! Implementations of the [`StatisticsStore`](crate::domain::StatisticsStore)
//! port, following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Usage
//!
//! ```ignore
//! use pageview_stats::adapters::{HttpKvConfig, HttpKvStore, InMemoryStatisticsStore};
//!
//! let store = HttpKvStore::new(HttpKvConfig {
//!     base_url: "http://kv.internal:7379".into(),
//!     ..Default::default()
//! })?;
//! let record = store.get("top_statistics:US").await?;
//! ```

mod http_kv;
mod memory;

pub use http_kv::{HttpKvConfig, HttpKvStore};
pub use memory::{InMemoryStatisticsStore, MemoryStoreStats, StoreOp};
