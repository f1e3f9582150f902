//! HTTP surface: position receipts plus liveness and readiness checks.

pub mod handlers;
pub mod params;
pub mod rate_limit;
pub mod routes;
pub mod server;

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::receipt::ReceiptService;
use crate::rpc::RpcClient;

use self::rate_limit::RateLimiter;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub receipts: Arc<ReceiptService>,
    /// Probed by `/health/ready`.
    pub base_rpc: RpcClient,
    pub solana_rpc: RpcClient,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        receipts: ReceiptService,
        base_rpc: RpcClient,
        solana_rpc: RpcClient,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            receipts: Arc::new(receipts),
            base_rpc,
            solana_rpc,
            limiter: Arc::new(limiter),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let base_rpc = RpcClient::new(&config.base_rpc_urls, "base")?;
        let solana_rpc = RpcClient::new(&config.solana_rpc_urls, "solana")?;
        let receipts = ReceiptService::from_clients(
            base_rpc.clone(),
            solana_rpc.clone(),
            config.jupiter_api_key.clone(),
        );
        let limiter = RateLimiter::new(config.rate_limit_per_ip, config.rate_limit_per_target);
        Ok(Self::new(receipts, base_rpc, solana_rpc, limiter))
    }
}
