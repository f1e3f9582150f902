pub mod base;
pub mod solana;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::ScanError;
use crate::models::{Chain, Depth, FirstSeenResult, TransferSet};

pub use base::BaseScanner;
pub use solana::SolanaScanner;

/// History scans for one chain, each bounded by its own budget.
#[async_trait]
pub trait ChainScanner: Send + Sync {
    fn chain(&self) -> Chain;

    async fn estimate_first_seen(
        &self,
        address: &str,
        token: &str,
        depth: Depth,
    ) -> Result<FirstSeenResult, ScanError>;

    async fn recent_transfers(
        &self,
        address: &str,
        token: &str,
        decimals: u8,
        limit: usize,
    ) -> Result<TransferSet, ScanError>;
}

#[derive(Clone, Default)]
pub struct ScannerRegistry {
    scanners: HashMap<Chain, Arc<dyn ChainScanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scanner: Arc<dyn ChainScanner>) {
        self.scanners.insert(scanner.chain(), scanner);
    }

    pub fn with(mut self, scanner: Arc<dyn ChainScanner>) -> Self {
        self.register(scanner);
        self
    }

    pub fn get(&self, chain: Chain) -> Option<&Arc<dyn ChainScanner>> {
        self.scanners.get(&chain)
    }

    fn resolve(&self, chain: &str) -> Option<&Arc<dyn ChainScanner>> {
        chain.parse::<Chain>().ok().and_then(|c| self.get(c))
    }

    /// Never fails: unknown chains and scanner errors become a low-confidence result.
    pub async fn estimate_first_seen(
        &self,
        chain: &str,
        address: &str,
        token: &str,
        depth: Depth,
    ) -> FirstSeenResult {
        let Some(scanner) = self.resolve(chain) else {
            return FirstSeenResult::degraded("none", format!("Unsupported chain: {chain}"));
        };

        match scanner.estimate_first_seen(address, token, depth).await {
            Ok(result) => result,
            Err(e) => {
                warn!(chain, address, token, error = %e, "first-seen estimation failed");
                FirstSeenResult::degraded("error", format!("First-seen estimation failed: {e}"))
            }
        }
    }

    /// Never fails: unknown chains and scanner errors become an empty set.
    pub async fn recent_transfers(
        &self,
        chain: &str,
        address: &str,
        token: &str,
        decimals: u8,
        limit: usize,
    ) -> TransferSet {
        let Some(scanner) = self.resolve(chain) else {
            return TransferSet::empty();
        };

        match scanner.recent_transfers(address, token, decimals, limit).await {
            Ok(set) => set,
            Err(e) => {
                warn!(chain, address, token, error = %e, "transfer scan failed");
                TransferSet::empty()
            }
        }
    }
}
