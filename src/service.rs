//! Statistics Service
//!
//! Entry point for the two external operations:
//!
//! - **UpdateStatistics** - validate, then run the aggregation engine
//! - **GetTopStatistics** - scan and fold all top records
//!
//! The service owns the cache it hands to the engine. Nothing is global;
//! tests build a service over an in-memory store.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::cache::{CacheConfig, CacheStats, StatisticsCache};
use crate::domain::{CountryRegistry, PageViewUpdate, StatisticsStore, TopStatistics, Validator};
use crate::engine::{AggregationEngine, EngineConfig, TopRecordsQuery, UpdateOutcome};
use crate::error::{Error, Result};
use crate::metrics::{outcome, METRICS};

/// Service configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub countries: CountryRegistry,
    pub engine: EngineConfig,
}

pub struct StatisticsService {
    validator: Validator,
    engine: AggregationEngine,
    query: TopRecordsQuery,
    cache: Arc<StatisticsCache>,
    store: Arc<dyn StatisticsStore>,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn StatisticsStore>, config: ServiceConfig) -> Self {
        let cache = Arc::new(StatisticsCache::new(config.cache));
        Self::with_cache(store, cache, config.countries, config.engine)
    }

    /// Build around an existing cache, e.g. one shared with another service.
    pub fn with_cache(
        store: Arc<dyn StatisticsStore>,
        cache: Arc<StatisticsCache>,
        countries: CountryRegistry,
        engine_config: EngineConfig,
    ) -> Self {
        info!(
            store = store.name(),
            cache_capacity = cache.capacity(),
            cache_ttl_secs = cache.ttl().as_secs(),
            countries = countries.len(),
            "Statistics service initialized"
        );

        Self {
            validator: Validator::new(countries),
            engine: AggregationEngine::new(store.clone(), cache.clone(), engine_config),
            query: TopRecordsQuery::new(store.clone()),
            cache,
            store,
        }
    }

    /// Fold `request.views_to_add` into the page total for `country_code`.
    ///
    /// Validation failures return before any store access. A read failure
    /// returns `Error::Store`. Write failures are reported in the outcome;
    /// use [`UpdateOutcome::into_result`] to turn them into an error.
    #[instrument(skip(self, request), fields(page = %request.page_name, views = request.views_to_add))]
    pub async fn update_statistics(
        &self,
        country_code: &str,
        request: &PageViewUpdate,
    ) -> Result<UpdateOutcome> {
        let _timer = METRICS.start_update_timer();

        let update = match self.validator.validate(
            country_code,
            &request.page_name,
            request.views_to_add,
        ) {
            Ok(update) => update,
            Err(e) => {
                METRICS.record_update(outcome::INVALID);
                return Err(Error::Validation(e));
            }
        };

        let result = self.engine.update_statistics(&update).await;
        METRICS.record_update(match &result {
            Ok(o) if o.is_complete() => outcome::OK,
            Ok(_) => outcome::WRITE_FAILED,
            Err(_) => outcome::READ_FAILED,
        });
        result
    }

    /// Current top page per country, read from the store.
    pub async fn get_top_statistics(&self) -> Result<TopStatistics> {
        self.query.get_top_records().await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await.map_err(Error::Store)
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn cache(&self) -> &StatisticsCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for StatisticsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsService")
            .field("engine", &self.engine)
            .field("countries", self.validator.registry())
            .finish()
    }
}
