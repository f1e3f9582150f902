use alloy_primitives::U256;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use super::ChainScanner;
use crate::budget::{ScanBudget, ScanStats, UnitOutcome};
use crate::config::SolanaTransferBudget;
use crate::error::ScanError;
use crate::events::format_amount;
use crate::models::{Chain, Confidence, Depth, FirstSeenResult, TransferRecord, TransferSet, format_iso};
use crate::rpc::RpcClient;
use crate::rpc::solana::{MAX_SIGNATURE_PAGE, SignatureInfo, TokenBalance, TransactionDetail};

pub const METHOD: &str = "token_account_scan";

/// Newest-first signatures fetched for one token account in a single page.
#[derive(Debug, Clone)]
pub struct SignatureWindow {
    pub account: String,
    pub limit: u32,
    pub signatures: Vec<SignatureInfo>,
}

impl SignatureWindow {
    pub fn oldest_block_time(&self) -> Option<i64> {
        self.signatures.iter().filter_map(|s| s.block_time).min()
    }

    /// A full page means older history may exist past the fetch limit.
    pub fn is_full_page(&self) -> bool {
        self.signatures.len() as u64 >= u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureScan {
    pub earliest: Option<i64>,
    pub total_accounts: usize,
    pub accounts_scanned: usize,
    pub signatures_scanned: u32,
    pub hit_cap: bool,
}

pub fn classify(scan: &SignatureScan, max_sigs: u32) -> (Confidence, String) {
    let (sigs, accounts) = (scan.signatures_scanned, scan.accounts_scanned);
    if scan.earliest.is_none() {
        (
            Confidence::Low,
            "No transaction history found for token accounts".to_string(),
        )
    } else if scan.hit_cap {
        (
            Confidence::Low,
            format!(
                "Scan limit reached ({sigs} signatures across {accounts} accounts). Actual first receipt could be earlier."
            ),
        )
    } else if accounts == scan.total_accounts && sigs < max_sigs {
        (
            Confidence::High,
            format!("Full history scanned across {accounts} token account(s)"),
        )
    } else {
        (
            Confidence::Medium,
            format!("Scanned {sigs} signatures across {accounts} account(s)"),
        )
    }
}

pub struct SolanaScanner {
    rpc: RpcClient,
    transfer_budget: SolanaTransferBudget,
}

impl SolanaScanner {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            transfer_budget: SolanaTransferBudget::default(),
        }
    }

    pub fn with_transfer_budget(mut self, budget: SolanaTransferBudget) -> Self {
        self.transfer_budget = budget;
        self
    }

    async fn scan_first_seen(
        &self,
        owner: &str,
        mint: &str,
        depth: Depth,
    ) -> Result<FirstSeenResult, ScanError> {
        let profile = depth.profile();
        let max_sigs = profile.sol_sigs;
        let budget = ScanBudget::time_only(profile.max_time);
        let mut stats = ScanStats::default();

        let accounts = self
            .rpc
            .get_token_accounts_by_owner(owner, mint, Some(&budget))
            .await?;
        if accounts.is_empty() {
            stats.rpc_calls = budget.calls_used();
            return Ok(FirstSeenResult {
                scan_window: "0 accounts".to_string(),
                stats,
                ..FirstSeenResult::degraded(METHOD, "No token account found for this mint")
            });
        }

        let mut scan = SignatureScan {
            total_accounts: accounts.len(),
            ..SignatureScan::default()
        };

        for account in &accounts {
            if budget.time_exceeded() {
                scan.hit_cap = true;
                break;
            }
            let remaining = max_sigs.saturating_sub(scan.signatures_scanned);
            if remaining == 0 {
                scan.hit_cap = true;
                break;
            }

            let limit = remaining.min(MAX_SIGNATURE_PAGE);
            let outcome = UnitOutcome::capture(
                self.rpc
                    .get_signatures_for_address(&account.pubkey, limit, None, Some(&budget))
                    .await,
                "signature_window",
            );
            stats.note_outcome(&outcome);
            let UnitOutcome::Done(signatures) = outcome else {
                continue;
            };

            let window = SignatureWindow {
                account: account.pubkey.clone(),
                limit,
                signatures,
            };
            scan.accounts_scanned += 1;
            scan.signatures_scanned += window.signatures.len() as u32;

            if let Some(oldest) = window.oldest_block_time() {
                scan.earliest = Some(scan.earliest.map_or(oldest, |e| e.min(oldest)));
            }
            if window.is_full_page() {
                debug!(account = %window.account, limit, "signature page full");
                scan.hit_cap = true;
            }
        }

        stats.rpc_calls = budget.calls_used();
        stats.signatures_scanned = u64::from(scan.signatures_scanned);
        let (confidence, note) = classify(&scan, max_sigs);
        info!(
            accounts = scan.total_accounts,
            signatures = scan.signatures_scanned,
            confidence = %confidence,
            "first-seen signature scan finished"
        );

        Ok(FirstSeenResult {
            timestamp: scan.earliest.and_then(format_iso),
            confidence,
            method: METHOD.to_string(),
            scan_window: format!(
                "{} signatures / {} accounts",
                scan.signatures_scanned, scan.accounts_scanned
            ),
            note,
            stats,
        })
    }

    async fn scan_transfers(
        &self,
        owner: &str,
        mint: &str,
        decimals: u8,
        limit: usize,
    ) -> Result<TransferSet, ScanError> {
        let cfg = self.transfer_budget;
        let budget = ScanBudget::time_only(cfg.max_time);
        let mut stats = ScanStats::default();

        let accounts = self
            .rpc
            .get_token_accounts_by_owner(owner, mint, Some(&budget))
            .await?;
        let Some(account) = accounts.first() else {
            return Ok(TransferSet::empty());
        };
        let token_account = account.pubkey.as_str();

        let signatures = self
            .rpc
            .get_signatures_for_address(token_account, cfg.sig_fetch_limit, None, Some(&budget))
            .await?;
        stats.signatures_scanned = signatures.len() as u64;

        let mut inbound: Vec<TransferRecord> = Vec::new();
        let mut outbound: Vec<TransferRecord> = Vec::new();
        let mut truncated = false;
        let mut next = 0;

        while next < signatures.len() {
            if inbound.len() >= cfg.target_in && outbound.len() >= cfg.target_out {
                break;
            }
            if budget.time_exceeded() || stats.tx_parsed >= cfg.max_tx_parsed {
                truncated = true;
                break;
            }

            let room = (cfg.max_tx_parsed - stats.tx_parsed) as usize;
            let end = (next + cfg.batch_size.max(1).min(room)).min(signatures.len());
            let batch = &signatures[next..end];

            let results = join_all(
                batch
                    .iter()
                    .map(|sig| self.rpc.get_transaction(&sig.signature, Some(&budget))),
            )
            .await;
            stats.tx_parsed += batch.len() as u32;
            next = end;

            for (sig, result) in batch.iter().zip(results) {
                let outcome = UnitOutcome::capture(result, "transaction");
                stats.note_outcome(&outcome);
                let UnitOutcome::Done(Some(tx)) = outcome else {
                    continue;
                };
                if let Some(record) = transfer_record(&tx, sig, token_account, owner, mint, decimals) {
                    match record {
                        (Flow::Inbound, record) => inbound.push(record),
                        (Flow::Outbound, record) => outbound.push(record),
                    }
                }
            }
        }

        stats.rpc_calls = budget.calls_used();
        debug!(
            inbound = inbound.len(),
            outbound = outbound.len(),
            tx_parsed = stats.tx_parsed,
            truncated,
            "transaction scan finished"
        );
        Ok(TransferSet::finalize(inbound, outbound, truncated, limit, stats))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Inbound,
    Outbound,
}

fn belongs_to(tx: &TransactionDetail, balance: &TokenBalance, token_account: &str, owner: &str) -> bool {
    if let Some(key) = balance.account_index.and_then(|i| tx.account_key(i)) {
        return key == token_account;
    }
    balance.owner.as_deref().is_none_or(|o| o == owner)
}

fn token_balance(
    tx: &TransactionDetail,
    balances: &[TokenBalance],
    token_account: &str,
    owner: &str,
    mint: &str,
) -> i128 {
    balances
        .iter()
        .find(|b| b.mint == mint && belongs_to(tx, b, token_account, owner))
        .and_then(|b| b.ui_token_amount.amount.parse().ok())
        .unwrap_or(0)
}

/// Signed change of this token account's balance in `tx` (post minus pre).
pub fn balance_delta(tx: &TransactionDetail, token_account: &str, owner: &str, mint: &str) -> Option<i128> {
    let meta = tx.meta.as_ref()?;
    let pre = token_balance(tx, &meta.pre_token_balances, token_account, owner, mint);
    let post = token_balance(tx, &meta.post_token_balances, token_account, owner, mint);
    Some(post - pre)
}

fn transfer_info(ix: &Value) -> Option<&Value> {
    let parsed = ix.get("parsed")?;
    match parsed.get("type")?.as_str()? {
        "transfer" | "transferChecked" => parsed.get("info"),
        _ => None,
    }
}

/// Other side of the transfer: the source for inbound, the destination for
/// outbound, falling back to the signing authority.
fn counterparty(tx: &TransactionDetail, token_account: &str, flow: Flow) -> Option<String> {
    let (ours, theirs) = match flow {
        Flow::Inbound => ("destination", "source"),
        Flow::Outbound => ("source", "destination"),
    };
    let transfers: Vec<&Value> = tx.all_instructions().filter_map(transfer_info).collect();
    let info = transfers
        .iter()
        .find(|info| info.get(ours).and_then(Value::as_str) == Some(token_account))
        .or_else(|| transfers.first())?;

    info.get(theirs)
        .and_then(Value::as_str)
        .or_else(|| info.get("authority").and_then(Value::as_str))
        .map(str::to_string)
}

fn transfer_record(
    tx: &TransactionDetail,
    sig: &SignatureInfo,
    token_account: &str,
    owner: &str,
    mint: &str,
    decimals: u8,
) -> Option<(Flow, TransferRecord)> {
    let delta = balance_delta(tx, token_account, owner, mint)?;
    if delta == 0 {
        return None;
    }

    let block_time = tx.block_time.or(sig.block_time);
    let timestamp = block_time.and_then(format_iso);
    let amount = format_amount(U256::from(delta.unsigned_abs()), decimals);
    let tx_hash = tx
        .transaction
        .signatures
        .first()
        .cloned()
        .unwrap_or_else(|| sig.signature.clone());
    let order_key = block_time.map_or(0, |t| t.max(0) as u64);

    Some(if delta > 0 {
        let from = counterparty(tx, token_account, Flow::Inbound);
        (Flow::Inbound, TransferRecord::inbound(timestamp, amount, tx_hash, from, order_key))
    } else {
        let to = counterparty(tx, token_account, Flow::Outbound);
        (Flow::Outbound, TransferRecord::outbound(timestamp, amount, tx_hash, to, order_key))
    })
}

#[async_trait]
impl ChainScanner for SolanaScanner {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn estimate_first_seen(
        &self,
        address: &str,
        token: &str,
        depth: Depth,
    ) -> Result<FirstSeenResult, ScanError> {
        self.scan_first_seen(address, token, depth).await
    }

    async fn recent_transfers(
        &self,
        address: &str,
        token: &str,
        decimals: u8,
        limit: usize,
    ) -> Result<TransferSet, ScanError> {
        self.scan_transfers(address, token, decimals, limit).await
    }
}
