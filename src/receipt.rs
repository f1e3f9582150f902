use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::balance::BalanceService;
use crate::cache::TtlCache;
use crate::error::ReceiptError;
use crate::insights::{self, Flag, FlagScope, Inputs};
use crate::metadata::{MetadataService, TokenMetadata, is_native_token};
use crate::models::{Chain, Depth, FirstSeenResult, TransferRecord, TransferSet};
use crate::price::{PRICE_TTL, PriceService};
use crate::rpc::RpcClient;
use crate::scanner::{BaseScanner, ScannerRegistry, SolanaScanner};

pub const RECENT_TRANSFER_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReceipt {
    pub address: String,
    pub chain: Chain,
    pub token: TokenMetadata,
    pub current_balance: String,
    pub current_value_usd: Option<f64>,
    pub price_per_token: Option<f64>,
    pub first_seen_approx: FirstSeenResult,
    pub holding_duration_days: Option<i64>,
    pub last_transfer_in: Option<TransferRecord>,
    pub last_transfer_out: Option<TransferRecord>,
    pub recent_transfers: TransferSet,
    pub flags: Vec<Flag>,
    pub flag_scope: FlagScope,
    pub notes: Vec<String>,
}

/// Fans a request out to the collaborators and assembles the receipt.
///
/// Balance and metadata failures fail the request. First-seen and transfer
/// history are enrichment and degrade to low-confidence / empty results.
#[derive(Clone)]
pub struct ReceiptService {
    balances: BalanceService,
    metadata: MetadataService,
    prices: PriceService,
    scanners: ScannerRegistry,
    clock: fn() -> DateTime<Utc>,
}

impl ReceiptService {
    pub fn new(
        balances: BalanceService,
        metadata: MetadataService,
        prices: PriceService,
        scanners: ScannerRegistry,
    ) -> Self {
        Self {
            balances,
            metadata,
            prices,
            scanners,
            clock: Utc::now,
        }
    }

    /// Wires every collaborator against one RPC client per chain, each with a
    /// fresh cache.
    pub fn from_clients(base: RpcClient, solana: RpcClient, jupiter_api_key: Option<String>) -> Self {
        let http = reqwest::Client::new();
        let scanners = ScannerRegistry::new()
            .with(Arc::new(BaseScanner::new(base.clone())))
            .with(Arc::new(SolanaScanner::new(solana.clone())));
        Self::new(
            BalanceService::new(base.clone(), solana.clone(), TtlCache::unbounded()),
            MetadataService::new(base, solana, http.clone(), TtlCache::unbounded()),
            PriceService::new(http, jupiter_api_key, TtlCache::with_ttl(PRICE_TTL)),
            scanners,
        )
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scanners(&self) -> &ScannerRegistry {
        &self.scanners
    }

    pub fn metadata(&self) -> &MetadataService {
        &self.metadata
    }

    pub async fn build(
        &self,
        chain: Chain,
        address: &str,
        token: &str,
        depth: Depth,
    ) -> Result<PositionReceipt, ReceiptError> {
        let native = is_native_token(chain, token);

        let metadata_then_transfers = async {
            let meta = self.metadata.resolve(chain, token).await?;
            let transfers = if native {
                TransferSet::empty()
            } else {
                self.scanners
                    .recent_transfers(chain.as_str(), address, token, meta.decimals, RECENT_TRANSFER_LIMIT)
                    .await
            };
            Ok::<_, ReceiptError>((meta, transfers))
        };

        let first_seen = async {
            if native {
                FirstSeenResult::degraded(
                    "skipped",
                    "First-seen estimation not available for native tokens",
                )
            } else {
                self.scanners
                    .estimate_first_seen(chain.as_str(), address, token, depth)
                    .await
            }
        };

        let (balance, meta_and_transfers, price, first_seen) = tokio::join!(
            self.balances.fetch(chain, address, token),
            metadata_then_transfers,
            self.prices.price(chain, token),
            first_seen,
        );

        let balance = balance.inspect_err(|e| warn!(%chain, address, token, error = %e, "balance fetch failed"))?;
        let (meta, transfers) = meta_and_transfers
            .inspect_err(|e| warn!(%chain, token, error = %e, "metadata resolution failed"))?;

        let now = (self.clock)();
        let holding_duration_days = first_seen
            .confidence
            .is_trusted()
            .then(|| first_seen.timestamp_utc())
            .flatten()
            .map(|ts| (now - ts).num_days());

        let current_value_usd = price
            .filter(|_| !balance.is_zero())
            .and_then(|p| balance.formatted.parse::<f64>().ok().map(|amount| amount * p))
            .map(|value| (value * 100.0).round() / 100.0);

        let inputs = Inputs {
            chain,
            balance: &balance,
            value_usd: current_value_usd,
            first_seen: &first_seen,
            transfers: &transfers,
            token: &meta,
            now,
        };
        let flags = insights::detect_flags(&inputs);
        let notes = insights::generate_notes(&flags, &inputs);
        let flag_scope = insights::build_flag_scope(chain, depth, &first_seen, &transfers);

        info!(
            %chain,
            address,
            symbol = %meta.symbol,
            confidence = %first_seen.confidence,
            inbound = transfers.inbound.len(),
            outbound = transfers.outbound.len(),
            "built position receipt"
        );

        Ok(PositionReceipt {
            address: address.to_string(),
            chain,
            current_balance: balance.formatted.clone(),
            current_value_usd,
            price_per_token: price,
            holding_duration_days,
            last_transfer_in: transfers.last_in().cloned(),
            last_transfer_out: transfers.last_out().cloned(),
            first_seen_approx: first_seen,
            recent_transfers: transfers,
            flags,
            flag_scope,
            notes,
            token: meta,
        })
    }
}
