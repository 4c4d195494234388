//! Page-View Statistics Service
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Page-View Statistics                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐    ┌──────────────┐    ┌──────────────────┐    │
//! │  │ HTTP API │───▶│  Aggregation │───▶│  Bounded Cache   │    │
//! │  │          │    │    Engine    │───▶│  Remote KV Store │    │
//! │  └──────────┘    └──────────────┘    └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pageview_stats::adapters::{HttpKvConfig, HttpKvStore, InMemoryStatisticsStore};
use pageview_stats::api;
use pageview_stats::error::{Error, Result};
use pageview_stats::{
    CacheConfig, CountryRegistry, EngineConfig, ServiceConfig, StatisticsService,
    StatisticsStore, WriteOrdering,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    /// Process-local map, for development
    Memory,
    /// Remote key-value store over HTTP
    Http,
}

/// Page-view statistics service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Remote store backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "http")]
    store: StoreBackend,

    /// Remote store base URL
    #[arg(long, env = "STORE_URL", default_value = "http://127.0.0.1:7379")]
    store_url: String,

    /// Bearer token for the remote store
    #[arg(long, env = "STORE_TOKEN")]
    store_token: Option<String>,

    /// Remote store request timeout in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    store_timeout_ms: u64,

    /// Maximum number of cached records (0 disables the cache)
    #[arg(long, env = "CACHE_CAPACITY", default_value = "100000")]
    cache_capacity: usize,

    /// Cache entry lifetime in minutes, measured from the last write
    #[arg(long, env = "CACHE_TTL_MINUTES", default_value = "60")]
    cache_ttl_minutes: u64,

    /// Accepted country codes, comma separated
    #[arg(long, env = "COUNTRY_CODES", default_value = "RU,US,CY")]
    countries: String,

    /// Serialize updates per country within this process
    #[arg(long, env = "SERIALIZE_COUNTRY_WRITES")]
    serialize_country_writes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting page-view statistics service");
    info!("  Store backend: {:?}", args.store);
    info!("  Cache capacity: {}", args.cache_capacity);
    info!("  Cache TTL: {} minutes", args.cache_ttl_minutes);
    info!("  Serialized country writes: {}", args.serialize_country_writes);

    let store = build_store(&args).await?;
    let config = service_config(&args)?;
    let service = Arc::new(StatisticsService::new(store, config));

    let shutdown = CancellationToken::new();

    // Expired entries are also dropped lazily on read; this bounds memory
    // held by keys that are never read again.
    let purge_service = service.clone();
    let purge_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let purged = purge_service.cache().purge_expired();
                    if purged > 0 {
                        info!("Purged {} expired cache entries", purged);
                    }
                }
                _ = purge_shutdown.cancelled() => break,
            }
        }
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_shutdown.cancel();
    });

    let addr: SocketAddr = args
        .listen_addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind API server: {}", e)))?;

    api::serve(listener, service, shutdown).await?;

    info!("Service shutdown complete");
    Ok(())
}

async fn build_store(args: &Args) -> Result<Arc<dyn StatisticsStore>> {
    match args.store {
        StoreBackend::Memory => {
            warn!("Using in-memory store; statistics are lost on restart");
            Ok(Arc::new(InMemoryStatisticsStore::new()))
        }
        StoreBackend::Http => {
            let store = HttpKvStore::new(HttpKvConfig {
                base_url: args.store_url.clone(),
                timeout: Duration::from_millis(args.store_timeout_ms),
                token: args.store_token.clone(),
            })?;

            info!("  Store URL: {}", store.base_url());
            if let Err(e) = store.health_check().await {
                error!("Remote store health check failed: {}", e);
                error!("Continuing anyway - requests will fail until the store is reachable");
            } else {
                info!("Remote store connection healthy");
            }

            Ok(Arc::new(store))
        }
    }
}

fn service_config(args: &Args) -> Result<ServiceConfig> {
    let countries = CountryRegistry::parse(&args.countries)?;
    info!(
        "  Countries: {}",
        countries.codes().collect::<Vec<_>>().join(",")
    );

    Ok(ServiceConfig {
        cache: CacheConfig::default()
            .with_capacity(args.cache_capacity)
            .with_ttl(Duration::from_secs(args.cache_ttl_minutes.saturating_mul(60))),
        countries,
        engine: EngineConfig {
            write_ordering: if args.serialize_country_writes {
                WriteOrdering::PerCountry
            } else {
                WriteOrdering::Unordered
            },
        },
    })
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["pageview-stats"]);
        assert_eq!(args.store, StoreBackend::Http);
        assert_eq!(args.cache_capacity, 100_000);
        assert_eq!(args.cache_ttl_minutes, 60);

        let config = service_config(&args).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.engine.write_ordering, WriteOrdering::Unordered);
        assert!(config.countries.contains("cy"));
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "pageview-stats",
            "--store",
            "memory",
            "--countries",
            "de,fr",
            "--serialize-country-writes",
            "--cache-capacity",
            "0",
        ]);
        let config = service_config(&args).unwrap();

        assert_eq!(args.store, StoreBackend::Memory);
        assert_eq!(config.cache.capacity, 0);
        assert_eq!(config.engine.write_ordering, WriteOrdering::PerCountry);
        assert!(config.countries.contains("DE"));
        assert!(!config.countries.contains("US"));
    }

    #[test]
    fn test_empty_country_list_rejected() {
        let args = Args::parse_from(["pageview-stats", "--countries", " , "]);
        assert!(service_config(&args).is_err());
    }
}
