//! Inbound HTTP surface: status, scan trigger, history, and the SSE stream.

mod routes;
mod sse;

use crate::services::Collector;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
}

pub fn router(collector: Arc<Collector>) -> Router {
    Router::new()
        .route("/api/status", get(routes::status))
        .route("/api/do", post(routes::do_action))
        .route("/api/history", get(routes::history))
        .route("/api/sse", get(sse::stream))
        .with_state(AppState { collector })
}

/// Binds the listen port and serves until shutdown. A refused bind is the
/// one fatal startup error this daemon has.
pub async fn serve(
    collector: Arc<Collector>,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("cannot bind port {port}"))?;
    log::info!("Listening on http://0.0.0.0:{port}");
    axum::serve(listener, router(collector))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")?;
    Ok(())
}
