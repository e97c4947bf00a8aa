//! probestore server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - PROBESTORE_HOST: Bind address (default: 0.0.0.0)
//! - PROBESTORE_PORT: Port number (default: 8080)
//! - PROBESTORE_DIR: Directory for hourly record files (default: ./records)
//! - PROBESTORE_PREFIX: Record file name prefix (default: observations)
//! - PROBESTORE_RETENTION_HOURS: Hours of files to keep (default: 24)
//! - PROBESTORE_SYNC_INTERVAL_SECS: Flush interval of the active file (default: 5)
//! - PROBESTORE_INBOX_CAPACITY: Writer queue length (default: 100)
//! - RUST_LOG: Log level (default: info)

use probestore::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "probestore=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("probestore configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Directory: {}", config.store.directory.display());
    tracing::info!("  Prefix: {}", config.store.prefix);
    tracing::info!("  Retention: {} hours", config.store.effective_retention_hours());
    tracing::info!("  Sync interval: {:?}", config.store.sync_interval);

    run_server(config).await
}
