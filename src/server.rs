//! Server assembly: routes, shared state and the serve loop.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::gateway::{self, GatewayContext};
use crate::rest;

/// Assemble the full router: socket gateway, REST mirror and health probe.
pub fn build_router(ctx: GatewayContext) -> Router {
    Router::new()
        .route("/ws", get(gateway::ws_handler))
        .route("/health", get(health))
        .merge(rest::router())
        .with_state(ctx)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind and serve until ctrl-c.
pub async fn run(addr: SocketAddr, ctx: GatewayContext) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "session server listening");
    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
