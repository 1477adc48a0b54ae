//! Tiered Images - an image hosting server with per-tier thumbnails.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_images::{
    config::{Config, StorageBackend},
    create_router, create_s3_client, AssetStore, CachedAssetStore, ExpiryBounds,
    LocalAssetStore, MemoryAssetStore, RouterConfig, S3AssetStore, ServiceSettings, Services,
    SystemClock,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Tiered Images v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Storage: {}", config.storage);
    match config.storage {
        StorageBackend::Local => info!("  Media root: {}", config.media_root.display()),
        StorageBackend::S3 => {
            info!("  S3 bucket: {}", config.bucket().unwrap_or_default());
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);
        }
        StorageBackend::Memory => warn!("  Memory storage: images are lost on exit"),
    }
    info!(
        "  Expiring links: {}s to {}s",
        config.expire_after_min, config.expire_after_max
    );
    info!(
        "  Cache: {}MB assets, max height TTL {}s",
        config.asset_cache_bytes / (1024 * 1024),
        config.max_height_cache_ttl
    );

    let store = match build_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = ServiceSettings {
        expiry_bounds: ExpiryBounds::new(config.expire_after_min, config.expire_after_max),
        max_height_ttl: chrono::Duration::seconds(config.max_height_cache_ttl),
    };
    let services = Services::new(store, Arc::new(SystemClock), settings);
    services.catalog.seed_builtin().await;

    for binding in &config.user_tiers {
        if let Err(e) = services
            .catalog
            .bind_user(binding.user.clone(), &binding.tier)
            .await
        {
            error!("Cannot bind user '{}': {}", binding.user, e);
            return ExitCode::FAILURE;
        }
        info!("  User '{}' -> {}", binding.user, binding.tier);
    }

    if config.link_purge_interval > 0 {
        spawn_link_purger(services.clone(), config.link_purge_interval);
    }

    let router = create_router(services, build_router_config(&config));

    let addr = config.bind_address();
    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Open the configured backend behind the LRU read cache.
async fn build_store(config: &Config) -> Result<Arc<dyn AssetStore>, String> {
    fn cached<S: AssetStore + 'static>(inner: S, bytes: usize) -> Arc<dyn AssetStore> {
        Arc::new(CachedAssetStore::new(inner, bytes))
    }

    let store = match config.storage {
        StorageBackend::Local => {
            let local = LocalAssetStore::new(config.media_root.clone())
                .await
                .map_err(|e| e.to_string())?;
            cached(local, config.asset_cache_bytes)
        }
        StorageBackend::S3 => {
            let bucket = config
                .bucket()
                .ok_or_else(|| "S3 bucket is not set".to_string())?;
            let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
            cached(S3AssetStore::new(client, bucket), config.asset_cache_bytes)
        }
        StorageBackend::Memory => cached(MemoryAssetStore::new(), config.asset_cache_bytes),
    };
    Ok(store)
}

/// Periodically delete expired link records.
fn spawn_link_purger(services: Services, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            services.links.purge_expired().await;
        }
    });
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiered_images=debug,tower_http=debug"
    } else {
        "tiered_images=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
