use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::filesystem::FilesystemBlobStore;
use tokio::signal;
use tracing::{Level, info, warn};

use filevault::config::AppConfig;
use filevault::database::init_db;
use filevault::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;

    let blob_store = FilesystemBlobStore::new(
        config.storage.root.clone(),
        config.storage.max_blob_size,
    )
    .await
    .context("Failed to initialize blob store")?;

    match blob_store
        .purge_stale_temp(Duration::from_secs(config.storage.stale_temp_secs))
        .await
    {
        Ok(0) => {}
        Ok(n) => info!("Removed {n} stale temp blobs"),
        Err(e) => warn!("Failed to purge stale temp blobs: {e}"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = filevault::build_router(AppState::new(db, Arc::new(blob_store), config));

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
