//! echohub - one chat backend, two front doors.
//!
//! IRC clients and hub (WebSocket) clients share channels, history and
//! presence. Every business operation runs through one chat service and fans
//! out to both protocols.

mod broadcast;
mod chat;
mod config;
mod crypto;
mod db;
mod error;
mod format;
mod handlers;
mod http;
mod hub;
mod metrics;
mod network;
mod server;
mod state;

use crate::config::Config;
use crate::server::Server;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        network = %config.server.network,
        irc = %config.listen.address,
        hub = ?config.websocket.as_ref().map(|ws| ws.address),
        "Starting echohub"
    );

    if config.security.is_weak_key() {
        warn!("security.message_key is short; use a long random secret in production");
    }

    let shutdown = CancellationToken::new();
    let server = Server::start(&config, shutdown.clone()).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested");
    server.stop("Server shutting down").await;

    Ok(())
}
