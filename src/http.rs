//! HTTP server for the Prometheus metrics endpoint.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Handler for GET /metrics.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Serve `/metrics` on `0.0.0.0:port` until `shutdown` fires.
pub async fn run_http_server(port: u16, shutdown: CancellationToken) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics HTTP server");
            return;
        }
    };
    tracing::info!(%addr, "Prometheus HTTP server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }
}
