use anyhow::{Context, Result};
use std::time::Duration;

use crate::models::Depth;

const DEFAULT_BASE_RPC_URL: &str = "https://mainnet.base.org";
const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_rpc_urls: Vec<String>,
    pub solana_rpc_urls: Vec<String>,
    pub jupiter_api_key: Option<String>,
    pub host: String,
    pub port: u16,
    pub rate_limit_per_ip: usize,
    pub rate_limit_per_target: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let base_rpc_urls = endpoint_list(
            &env_or("BASE_RPC_URL", DEFAULT_BASE_RPC_URL),
            &env_or("BASE_RPC_FALLBACKS", ""),
        );
        let solana_rpc_urls = endpoint_list(
            &env_or("SOLANA_RPC_URL", DEFAULT_SOLANA_RPC_URL),
            &env_or("SOLANA_RPC_FALLBACKS", ""),
        );

        let jupiter_api_key = std::env::var("JUPITER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let host = env_or("HOST", "0.0.0.0");
        let port = env_or("PORT", "8000")
            .parse()
            .context("PORT must be a valid port number")?;

        let rate_limit_per_ip = env_or("RATE_LIMIT_PER_IP", "60")
            .parse()
            .context("RATE_LIMIT_PER_IP must be a positive integer")?;
        let rate_limit_per_target = env_or("RATE_LIMIT_PER_WT", "10")
            .parse()
            .context("RATE_LIMIT_PER_WT must be a positive integer")?;

        Ok(Config {
            base_rpc_urls,
            solana_rpc_urls,
            jupiter_api_key,
            host,
            port,
            rate_limit_per_ip,
            rate_limit_per_target,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Primary URL first, then the comma-separated fallbacks, skipping blanks and duplicates.
pub fn endpoint_list(primary: &str, fallbacks: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for url in std::iter::once(primary).chain(fallbacks.split(',')) {
        let url = url.trim();
        if !url.is_empty() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Lookback window and budget for one depth tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthProfile {
    pub base_days: u64,
    pub sol_sigs: u32,
    pub max_rpc_calls: u32,
    pub max_time: Duration,
}

impl Depth {
    pub fn profile(&self) -> DepthProfile {
        match self {
            Depth::Fast => DepthProfile {
                base_days: 30,
                sol_sigs: 200,
                max_rpc_calls: 8,
                max_time: Duration::from_secs(1),
            },
            Depth::Standard => DepthProfile {
                base_days: 90,
                sol_sigs: 500,
                max_rpc_calls: 12,
                max_time: Duration::from_secs(2),
            },
            Depth::Deep => DepthProfile {
                base_days: 180,
                sol_sigs: 1000,
                max_rpc_calls: 16,
                max_time: Duration::from_secs(3),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BaseTransferBudget {
    pub max_rpc_calls: u32,
    pub max_time: Duration,
    pub chunk_size: u64,
    pub target_in: usize,
    pub target_out: usize,
}

impl Default for BaseTransferBudget {
    fn default() -> Self {
        Self {
            max_rpc_calls: 10,
            max_time: Duration::from_secs(1),
            chunk_size: 25_000,
            target_in: 5,
            target_out: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolanaTransferBudget {
    pub max_tx_parsed: u32,
    pub max_time: Duration,
    pub sig_fetch_limit: u32,
    pub target_in: usize,
    pub target_out: usize,
    pub batch_size: usize,
}

impl Default for SolanaTransferBudget {
    fn default() -> Self {
        Self {
            max_tx_parsed: 20,
            max_time: Duration::from_secs(1),
            sig_fetch_limit: 30,
            target_in: 5,
            target_out: 5,
            batch_size: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_list_dedupes_and_skips_blanks() {
        let urls = endpoint_list("https://a", " https://b, ,https://a,https://c ");
        assert_eq!(urls, vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn depth_profiles_grow_with_depth() {
        let fast = Depth::Fast.profile();
        let deep = Depth::Deep.profile();
        assert_eq!(fast.base_days, 30);
        assert_eq!(Depth::Standard.profile().max_rpc_calls, 12);
        assert_eq!(deep.sol_sigs, 1000);
        assert_eq!(deep.max_time, Duration::from_secs(3));
    }
}
