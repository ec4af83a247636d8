//! The cartcast worker daemon.
//!
//! One process, one ring member: JSON-file list store, relay-backed
//! heartbeat gossip, and the RPC listener clients and peers talk to.

use std::sync::Arc;

use dotenv::dotenv;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cartcast_core::bus::{MessageBus, RelayBus};
use cartcast_core::config::NodeConfig;
use cartcast_core::storage::JsonFileStorage;
use cartcast_worker::Worker;

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::from_env();
    let store_path = config.data_dir.join("shopping_lists.json");

    let storage = Arc::new(JsonFileStorage::open(store_path).await?);
    let bus: Arc<dyn MessageBus> = Arc::new(RelayBus::new(&config.relay_addr));

    let worker = Worker::start(config, storage, bus).await?;
    tracing::info!(id = %worker.id(), addr = %worker.addr(), "cartcast worker ready");

    wait_for_shutdown_signal().await;

    // No leave message goes out: peers notice the silence and evict this
    // node by heartbeat timeout.
    worker.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}
