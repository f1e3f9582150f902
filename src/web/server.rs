use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::AppState;
use super::routes::create_routes;
use crate::config::Config;

/// Router with request tracing, without binding a socket.
pub fn create_app(state: AppState) -> Router {
    create_routes(state).layer(TraceLayer::new_for_http())
}

pub async fn start_server(state: AppState, config: &Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST or PORT")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Position receipt API listening on http://{}", addr);

    axum::serve(
        listener,
        create_app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
    .context("Server error")?;

    Ok(())
}
