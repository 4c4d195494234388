//! Domain Layer
//!
//! - **Model** (`model.rs`) - identifiers, records and the store key scheme
//! - **Validation** (`validation.rs`) - request checks and the country registry
//! - **Ports** (`ports.rs`) - trait abstraction for the remote store
//!
//! # Usage
//!
//! ```ignore
//! use pageview_stats::domain::{StatisticsKey, StatisticsStore, Validator};
//!
//! let update = Validator::default().validate("us", "home", 10)?;
//! let key = StatisticsKey::page(&update.country, &update.page);
//! let current = store.get(&key.to_string()).await?;
//! ```

pub mod model;
pub mod ports;
pub mod validation;

pub use model::{
    CountryCode, CountryStatistics, PageId, PageRecord, PageViewUpdate, StatisticsKey,
    StatisticsRecord, TopRecord, TopStatistics, PAGE_KEY_PREFIX, TOP_KEY_PREFIX,
};
pub use ports::{StatisticsStore, StoreResult};
pub use validation::{CountryRegistry, ValidatedUpdate, Validator, DEFAULT_COUNTRY_CODES};
