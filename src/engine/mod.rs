//! Aggregation core
//!
//! - [`AggregationEngine`] - read-compare-write of one update across the
//!   page record and the country's top record
//! - [`TopRecordsQuery`] - scan of all top records for reporting

mod aggregation;
mod proptest;
mod query;

pub use aggregation::{AggregationEngine, EngineConfig, TopWrite, UpdateOutcome, WriteOrdering};
pub use query::{fold_top_records, TopRecordsQuery};
