//! Liveness endpoint.

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

pub const HEALTH_BODY: &str = "Bot is running";

pub fn router() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// GET /health
async fn health_handler() -> &'static str {
    HEALTH_BODY
}

/// Bind `addr` and serve the health router in the background.
pub async fn spawn(addr: &str) -> anyhow::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind health endpoint on {addr}"))?;
    info!(%addr, "health endpoint listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            error!(error = %e, "health endpoint failed");
        }
    }))
}
