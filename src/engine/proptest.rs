//! Property-Based Tests for the Aggregation Engine
//!
//! # Test Properties
//!
//! 1. **Page Totals**: applied sequentially, a page's counter equals the sum
//!    of every delta applied to that (country, page) pair
//! 2. **Top Convergence**: the top record of each country holds the maximum
//!    page total of that country
//! 3. **Cache Transparency**: results do not depend on cache capacity

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use super::aggregation::{AggregationEngine, EngineConfig};
use crate::adapters::InMemoryStatisticsStore;
use crate::cache::{CacheConfig, StatisticsCache};
use crate::domain::{StatisticsKey, ValidatedUpdate, Validator};

const COUNTRIES: &[&str] = &["US", "RU", "CY"];
const PAGES: &[&str] = &["home", "about", "news", "contact", "blog"];

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for a single (country, page, delta) update.
fn update_strategy() -> impl Strategy<Value = (usize, usize, i64)> {
    (0..COUNTRIES.len(), 0..PAGES.len(), 1i64..1_000)
}

/// Strategy for a sequence of updates.
fn updates_strategy() -> impl Strategy<Value = Vec<(usize, usize, i64)>> {
    prop::collection::vec(update_strategy(), 1..60)
}

fn engine(cache_capacity: usize) -> (Arc<InMemoryStatisticsStore>, AggregationEngine) {
    let store = Arc::new(InMemoryStatisticsStore::new());
    let cache = Arc::new(StatisticsCache::new(
        CacheConfig::default().with_capacity(cache_capacity),
    ));
    let engine = AggregationEngine::new(store.clone(), cache, EngineConfig::default());
    (store, engine)
}

fn validated(updates: &[(usize, usize, i64)]) -> Vec<ValidatedUpdate> {
    let validator = Validator::default();
    updates
        .iter()
        .map(|&(c, p, d)| validator.validate(COUNTRIES[c], PAGES[p], d))
        .collect::<Result<_, _>>()
        .expect("strategy only yields valid updates")
}

fn apply_all(engine: &AggregationEngine, updates: &[ValidatedUpdate]) {
    tokio_test::block_on(async {
        for update in updates {
            let outcome = engine.update_statistics(update).await.unwrap();
            assert!(outcome.is_complete());
        }
    });
}

/// Expected per-page totals.
fn expected_totals(updates: &[(usize, usize, i64)]) -> HashMap<(usize, usize), u64> {
    let mut totals = HashMap::new();
    for &(c, p, d) in updates {
        *totals.entry((c, p)).or_insert(0u64) += d as u64;
    }
    totals
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: sequential updates sum exactly per (country, page).
    #[test]
    fn prop_page_total_is_sum_of_deltas(updates in updates_strategy()) {
        let (store, engine) = engine(1_000);
        apply_all(&engine, &validated(&updates));

        for ((c, p), total) in expected_totals(&updates) {
            let update = &validated(&[(c, p, 1)])[0];
            let key = StatisticsKey::page(&update.country, &update.page).to_string();
            prop_assert_eq!(store.record(&key).map(|r| r.views), Some(total));
        }
    }

    /// Property: each country's top record holds its maximum page total.
    #[test]
    fn prop_top_record_is_country_maximum(updates in updates_strategy()) {
        let (store, engine) = engine(1_000);
        apply_all(&engine, &validated(&updates));

        let totals = expected_totals(&updates);
        for (c, country) in COUNTRIES.iter().enumerate() {
            let max = totals
                .iter()
                .filter(|((tc, _), _)| *tc == c)
                .map(|(_, total)| *total)
                .max();

            let top = store.record(&format!("top_statistics:{}", country));
            prop_assert_eq!(top.as_ref().map(|r| r.views), max);

            if let Some(top) = top {
                let page_key = format!("statistics:{}:page:{}", country, top.page);
                prop_assert_eq!(store.record(&page_key).map(|r| r.views), Some(top.views));
            }
        }
    }

    /// Property: a tiny or disabled cache yields the same store state.
    #[test]
    fn prop_cache_capacity_does_not_change_results(
        updates in updates_strategy(),
        capacity in 0usize..4,
    ) {
        let validated = validated(&updates);

        let (large_store, large) = engine(1_000);
        let (small_store, small) = engine(capacity);
        apply_all(&large, &validated);
        apply_all(&small, &validated);

        for country in COUNTRIES {
            let key = format!("top_statistics:{}", country);
            prop_assert_eq!(large_store.record(&key), small_store.record(&key));
        }
        prop_assert_eq!(large_store.len(), small_store.len());
    }
}
