//! Mabox - ephemeral file sharing
//!
//! Accepts uploads, hands out time-limited download links and purges files
//! once their TTL has elapsed.

mod config;
mod error;
mod server;
mod types;
mod upload;

use crate::config::Config;
use crate::error::Result;
use crate::server::{create_router, start_server, ServerState, SharedState};
use ephemeral_store::{EphemeralStore, Sweeper};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("mabox_server=info".parse()?)
        .add_directive("ephemeral_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Mabox server...");

    let config = Config::from_env();
    info!("Port: {}", config.port);
    info!("Upload dir: {:?}", config.upload_dir);
    info!("Public URL: {}", config.public_url);
    info!("Sweep interval: {} seconds", config.sweep_interval.as_secs());
    info!(
        "Max upload size: {} MB",
        config.max_upload_bytes / (1024 * 1024)
    );

    let store = EphemeralStore::new(&config.upload_dir, &config.public_url);
    store.init().await?;

    // Staged files left by an interrupted run can never complete
    let staging_dir = config.staging_dir();
    if let Err(e) = tokio::fs::remove_dir_all(&staging_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = ?staging_dir, error = %e, "Failed to clear staging directory");
        }
    }
    tokio::fs::create_dir_all(&staging_dir).await?;

    if config.reconcile_on_start {
        let removed = store.reconcile().await?;
        info!(removed, "Removed orphaned blobs from a previous run");
    }

    let sweeper = Sweeper::new(store.clone(), config.sweep_interval).start();

    let state: SharedState = Arc::new(ServerState::new(
        store,
        staging_dir,
        config.max_upload_bytes,
    ));
    let router = create_router(state, config.public_path.clone());

    let served = start_server(router, config.port, shutdown_signal()).await;

    sweeper.stop().await;

    served?;
    info!("Mabox server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
