//! Key-sync Controller
//!
//! Keeps versioned key-value stores and their keys in line with a YAML
//! manifest:
//! - stores are created (or adopted by id) and awaited until READY
//! - keys are written under the store's ETag, never blindly overwritten
//! - stores marked absent are deleted and awaited until gone

use key_sync::config::SyncConfig;
use key_sync::controller::Controller;
use key_sync::reconciler::{Reconciler, WaitSettings};
use std::sync::Arc;
use store_client::HttpStoreClient;
use sync_core::{ConcurrencyController, KeyedLockRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting key-sync controller");

    let config = SyncConfig::from_env()?;
    info!("Configuration:");
    info!("  Store API URL: {}", config.kvs_url);
    info!("  Manifest: {}", config.manifest_path.display());
    info!("  Interval: {:?}", config.interval);
    info!(
        "  Store waits: timeout {:?}, min interval {:?}, initial delay {:?}",
        config.wait_timeout, config.wait_min_interval, config.wait_delay
    );

    let client = HttpStoreClient::new(config.kvs_url.clone())?;
    let reconciler = Reconciler::new(
        Box::new(client),
        ConcurrencyController::new(Arc::new(KeyedLockRegistry::new())),
        WaitSettings::from_config(&config),
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });

    Controller::new(reconciler, &config).run(cancel).await?;
    Ok(())
}
