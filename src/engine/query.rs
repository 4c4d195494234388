//! Top Records Query
//!
//! Reads every per-country top record straight from the remote store. The
//! local cache is bypassed so the report reflects the store's current state.

use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{CountryStatistics, StatisticsStore, TopRecord, TopStatistics, TOP_KEY_PREFIX};
use crate::error::Result;
use crate::metrics::METRICS;

pub struct TopRecordsQuery {
    store: Arc<dyn StatisticsStore>,
}

impl TopRecordsQuery {
    pub fn new(store: Arc<dyn StatisticsStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn get_top_records(&self) -> Result<TopStatistics> {
        let records = self
            .store
            .scan_prefix(TOP_KEY_PREFIX)
            .await
            .inspect_err(|_| METRICS.record_store_error("scan"))?;

        debug!("Scanned {} top records", records.len());
        Ok(fold_top_records(records))
    }
}

/// Fold scanned top records into a per-country map. When a country shows up
/// more than once the first record seen wins.
pub fn fold_top_records(records: impl IntoIterator<Item = TopRecord>) -> TopStatistics {
    let mut top = TopStatistics::new();

    for record in records {
        match top.entry(record.country.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(CountryStatistics::from(&record));
            }
            Entry::Occupied(_) => {
                debug!(country = %record.country, "Discarding duplicate top record");
            }
        }
    }

    top
}
