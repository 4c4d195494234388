//! Page-View Statistics Service
//!
//! Per-country page-view counters plus the single most viewed page of each
//! country, kept in a remote key-value store behind a bounded local cache.
//!
//! # Architecture
//!
//! ```text
//! HTTP API → StatisticsService → Validator
//!                              → AggregationEngine → BoundedCache
//!                                                  → StatisticsStore (remote)
//!                              → TopRecordsQuery   → StatisticsStore (remote)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Remote store adapters implementing domain ports
//! - [`api`] - HTTP transport
//! - [`cache`] - Bounded, expiring read-through cache
//! - [`domain`] - Records, key scheme, validation and ports
//! - [`engine`] - Aggregation and top-record reporting
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics
//! - [`service`] - Facade over the two external operations

pub mod adapters;
pub mod api;
pub mod cache;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod service;

// Re-export commonly used types
pub use cache::{BoundedCache, CacheConfig, StatisticsCache};
pub use domain::{CountryRegistry, PageViewUpdate, StatisticsStore, TopStatistics};
pub use engine::{EngineConfig, UpdateOutcome, WriteOrdering};
pub use error::{Error, Result};
pub use service::{ServiceConfig, StatisticsService};
