//! Prometheus metrics for the statistics service.
//!
//! Metrics live in a private [`Registry`] rather than the prometheus default
//! one and are exposed as text by the `/metrics` endpoint.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramTimer, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use crate::error::{Error, Result};

/// Process-wide service metrics.
pub static METRICS: Lazy<ServiceMetrics> = Lazy::new(ServiceMetrics::new);

/// Update outcome label values
pub mod outcome {
    pub const OK: &str = "ok";
    pub const INVALID: &str = "invalid";
    pub const READ_FAILED: &str = "read_failed";
    pub const WRITE_FAILED: &str = "write_failed";
}

pub struct ServiceMetrics {
    registry: Registry,
    updates: IntCounterVec,
    store_errors: IntCounterVec,
    cache_lookups: IntCounterVec,
    update_duration: Histogram,
}

impl ServiceMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let updates = IntCounterVec::new(
            Opts::new("pageview_updates_total", "Page-view updates by outcome"),
            &["outcome"],
        )
        .expect("valid metric definition");
        let store_errors = IntCounterVec::new(
            Opts::new(
                "pageview_store_errors_total",
                "Remote store failures by operation",
            ),
            &["op"],
        )
        .expect("valid metric definition");
        let cache_lookups = IntCounterVec::new(
            Opts::new("pageview_cache_lookups_total", "Local cache lookups by result"),
            &["result"],
        )
        .expect("valid metric definition");
        let update_duration = Histogram::with_opts(HistogramOpts::new(
            "pageview_update_duration_seconds",
            "Latency of UpdateStatistics",
        ))
        .expect("valid metric definition");

        for collector in [
            Box::new(updates.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(store_errors.clone()),
            Box::new(cache_lookups.clone()),
            Box::new(update_duration.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric registered once");
        }

        Self {
            registry,
            updates,
            store_errors,
            cache_lookups,
            update_duration,
        }
    }

    pub fn record_update(&self, outcome: &str) {
        self.updates.with_label_values(&[outcome]).inc();
    }

    pub fn record_store_error(&self, op: &str) {
        self.store_errors.with_label_values(&[op]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    /// Observes the elapsed time into the update histogram when dropped.
    pub fn start_update_timer(&self) -> HistogramTimer {
        self.update_duration.start_timer()
    }

    pub fn updates(&self, outcome: &str) -> u64 {
        self.updates.with_label_values(&[outcome]).get()
    }

    /// Encode all metrics in the text exposition format.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
