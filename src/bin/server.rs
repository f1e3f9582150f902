use anyhow::Result;
use position_receipt::config::Config;
use position_receipt::web::AppState;
use position_receipt::web::server::start_server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Position Receipt API");

    let config = Config::from_env()?;
    info!(
        base_endpoints = config.base_rpc_urls.len(),
        solana_endpoints = config.solana_rpc_urls.len(),
        jupiter_key = config.jupiter_api_key.is_some(),
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)?;

    if let Err(e) = start_server(state, &config).await {
        error!("Server error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
