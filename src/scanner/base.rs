use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::ChainScanner;
use crate::budget::{ScanBudget, ScanStats, UnitOutcome};
use crate::config::BaseTransferBudget;
use crate::error::{RpcError, ScanError};
use crate::events::{TRANSFER_TOPIC, decode_transfer_log, format_amount, log_block_number, pad_address};
use crate::models::{Chain, Confidence, Depth, FirstSeenResult, TransferRecord, TransferSet, format_iso};
use crate::rpc::RpcClient;
use crate::rpc::evm::LogQuery;

const FIRST_SEEN_CHUNK: u64 = 50_000;
const AVG_BLOCK_TIME_SECS: f64 = 2.0;
const NARROW_THRESHOLD: u64 = 10_000;
const BOUNDARY_BLOCKS: u64 = 1_000;
const SECS_PER_DAY: i64 = 86_400;

pub const METHOD: &str = "chunked_log_scan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending,
}

/// Fixed-size partition of a block range, consumed chunk by chunk.
///
/// Ascending cursors walk `[start, end]` oldest first; descending cursors walk
/// from a block back to genesis. Chunk bounds are inclusive.
#[derive(Debug, Clone)]
pub struct ChainCursor {
    cursor: Option<u64>,
    end: u64,
    size: u64,
    direction: Direction,
}

impl ChainCursor {
    pub fn ascending(start: u64, end: u64, size: u64) -> Self {
        Self {
            cursor: Some(start),
            end,
            size,
            direction: Direction::Ascending,
        }
    }

    pub fn descending(from: u64, size: u64) -> Self {
        Self {
            cursor: Some(from),
            end: 0,
            size,
            direction: Direction::Descending,
        }
    }
}

impl Iterator for ChainCursor {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor?;
        match self.direction {
            Direction::Ascending => {
                if cursor >= self.end {
                    self.cursor = None;
                    return None;
                }
                let chunk_end = cursor.saturating_add(self.size).min(self.end);
                self.cursor = chunk_end.checked_add(1);
                Some((cursor, chunk_end))
            }
            Direction::Descending => {
                let chunk_start = cursor.saturating_sub(self.size);
                self.cursor = chunk_start.checked_sub(1);
                Some((chunk_start, cursor))
            }
        }
    }
}

/// Extrapolates the block produced at `target_ts` from the current block.
pub fn scan_start_block(current_block: u64, current_ts: i64, target_ts: i64) -> u64 {
    let blocks_back = ((current_ts - target_ts) as f64 / AVG_BLOCK_TIME_SECS) as i128;
    (current_block as i128 - blocks_back).clamp(0, current_block as i128) as u64
}

fn earliest_block(logs: &[Value]) -> Option<u64> {
    logs.iter().filter_map(log_block_number).min()
}

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// What a first-seen scan found, before it is turned into a confidence label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstSeenScan {
    pub scan_start: u64,
    pub candidate: Option<u64>,
    pub candidate_ts: Option<i64>,
    pub hit_cap: bool,
}

pub fn classify(scan: &FirstSeenScan, days: u64) -> (Confidence, String) {
    match scan.candidate {
        None => {
            let mut note = format!("No Transfer events found within {days}-day scan window");
            if scan.hit_cap {
                note.push_str(" (scan budget exhausted)");
            }
            (Confidence::Low, note)
        }
        Some(block) if block.saturating_sub(scan.scan_start) < BOUNDARY_BLOCKS => (
            Confidence::Low,
            "First event found near scan window boundary; actual first receipt may be earlier"
                .to_string(),
        ),
        Some(_) if scan.hit_cap => (
            Confidence::Low,
            "Scan budget exhausted; result may not reflect earliest receipt".to_string(),
        ),
        Some(block) if scan.candidate_ts.is_none() => (
            Confidence::Low,
            format!("First Transfer event found at block {block} but its timestamp could not be resolved"),
        ),
        Some(_) => (
            Confidence::Medium,
            format!("Based on first Transfer event within {days}-day window"),
        ),
    }
}

pub struct BaseScanner {
    rpc: RpcClient,
    transfer_budget: BaseTransferBudget,
    clock: fn() -> i64,
}

impl BaseScanner {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            transfer_budget: BaseTransferBudget::default(),
            clock: system_clock,
        }
    }

    /// Replaces the wall clock used to place the lookback window.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_transfer_budget(mut self, budget: BaseTransferBudget) -> Self {
        self.transfer_budget = budget;
        self
    }

    async fn scan_first_seen(
        &self,
        address: Address,
        token: Address,
        depth: Depth,
    ) -> Result<FirstSeenResult, ScanError> {
        let profile = depth.profile();
        let budget = ScanBudget::start(profile.max_rpc_calls, profile.max_time);
        let mut stats = ScanStats::default();

        let current_block = self.rpc.block_number(Some(&budget)).await?;
        let current_ts = self.rpc.block_timestamp(current_block, Some(&budget)).await?;
        let target_ts = (self.clock)() - profile.base_days as i64 * SECS_PER_DAY;

        let mut scan = FirstSeenScan {
            scan_start: scan_start_block(current_block, current_ts, target_ts),
            ..FirstSeenScan::default()
        };
        debug!(
            current_block,
            scan_start = scan.scan_start,
            depth = %depth,
            "starting first-seen log scan"
        );

        let topics = [Some(TRANSFER_TOPIC), None, Some(pad_address(address))];

        for (chunk_start, chunk_end) in
            ChainCursor::ascending(scan.scan_start, current_block, FIRST_SEEN_CHUNK)
        {
            if budget.is_exhausted() {
                scan.hit_cap = true;
                break;
            }

            let query = LogQuery {
                token,
                from_block: chunk_start,
                to_block: chunk_end,
                topics,
            };
            let result = self.rpc.get_logs(&query, Some(&budget)).await;
            scan.hit_cap |= matches!(result, Err(RpcError::BudgetExhausted));
            let outcome = UnitOutcome::capture(result, "log_chunk");
            stats.note_outcome(&outcome);
            stats.blocks_scanned += query.span();

            let UnitOutcome::Done(logs) = outcome else {
                continue;
            };
            let Some(mut earliest) = earliest_block(&logs) else {
                continue;
            };

            // One narrowing pass, only when the timestamp lookup still fits afterwards.
            if earliest.saturating_sub(chunk_start) > NARROW_THRESHOLD && budget.has_room_for(2) {
                let narrow = LogQuery {
                    to_block: chunk_start + (earliest - chunk_start) / 2,
                    ..query.clone()
                };
                match self.rpc.get_logs(&narrow, Some(&budget)).await {
                    Ok(sub_logs) => {
                        if let Some(block) = earliest_block(&sub_logs) {
                            earliest = earliest.min(block);
                        }
                    }
                    Err(e) => warn!(
                        from_block = narrow.from_block,
                        to_block = narrow.to_block,
                        error = %e,
                        "narrowing sub-scan failed"
                    ),
                }
            }

            scan.candidate = Some(earliest);
            if !budget.is_exhausted() {
                match self.rpc.block_timestamp(earliest, Some(&budget)).await {
                    Ok(ts) => scan.candidate_ts = Some(ts),
                    Err(e) => warn!(block = earliest, error = %e, "failed to resolve block timestamp"),
                }
            }
            break;
        }

        stats.rpc_calls = budget.calls_used();
        let (confidence, note) = classify(&scan, profile.base_days);
        info!(
            candidate = ?scan.candidate,
            confidence = %confidence,
            rpc_calls = stats.rpc_calls,
            "first-seen log scan finished"
        );

        Ok(FirstSeenResult {
            timestamp: scan.candidate_ts.and_then(format_iso),
            confidence,
            method: METHOD.to_string(),
            scan_window: format!("{} days", profile.base_days),
            note,
            stats,
        })
    }

    async fn scan_transfers(
        &self,
        address: Address,
        token: Address,
        decimals: u8,
        limit: usize,
    ) -> Result<TransferSet, ScanError> {
        let cfg = self.transfer_budget;
        let budget = ScanBudget::start(cfg.max_rpc_calls, cfg.max_time);
        let mut stats = ScanStats::default();

        let current_block = self.rpc.block_number(Some(&budget)).await?;
        let padded = pad_address(address);

        let mut inbound: Vec<TransferRecord> = Vec::new();
        let mut outbound: Vec<TransferRecord> = Vec::new();
        let mut truncated = false;

        for (chunk_start, chunk_end) in ChainCursor::descending(current_block, cfg.chunk_size) {
            if inbound.len() >= cfg.target_in && outbound.len() >= cfg.target_out {
                break;
            }
            if budget.is_exhausted() {
                truncated = true;
                break;
            }
            stats.blocks_scanned += chunk_end - chunk_start + 1;

            if inbound.len() < cfg.target_in {
                let query = LogQuery {
                    token,
                    from_block: chunk_start,
                    to_block: chunk_end,
                    topics: [Some(TRANSFER_TOPIC), None, Some(padded)],
                };
                let result = self.rpc.get_logs(&query, Some(&budget)).await;
                truncated |= matches!(result, Err(RpcError::BudgetExhausted));
                let outcome = UnitOutcome::capture(result, "inbound_logs");
                stats.note_outcome(&outcome);
                if let UnitOutcome::Done(logs) = outcome {
                    inbound.extend(parse_transfer_logs(&logs, decimals, Flow::Inbound));
                }
            }

            if outbound.len() < cfg.target_out {
                if budget.is_exhausted() {
                    truncated = true;
                    break;
                }
                let query = LogQuery {
                    token,
                    from_block: chunk_start,
                    to_block: chunk_end,
                    topics: [Some(TRANSFER_TOPIC), Some(padded), None],
                };
                let result = self.rpc.get_logs(&query, Some(&budget)).await;
                truncated |= matches!(result, Err(RpcError::BudgetExhausted));
                let outcome = UnitOutcome::capture(result, "outbound_logs");
                stats.note_outcome(&outcome);
                if let UnitOutcome::Done(logs) = outcome {
                    outbound.extend(parse_transfer_logs(&logs, decimals, Flow::Outbound));
                }
            }
        }

        stats.rpc_calls = budget.calls_used();
        debug!(
            inbound = inbound.len(),
            outbound = outbound.len(),
            truncated,
            rpc_calls = stats.rpc_calls,
            "transfer log scan finished"
        );
        Ok(TransferSet::finalize(inbound, outbound, truncated, limit, stats))
    }
}

#[derive(Debug, Clone, Copy)]
enum Flow {
    Inbound,
    Outbound,
}

fn parse_transfer_logs(logs: &[Value], decimals: u8, flow: Flow) -> Vec<TransferRecord> {
    logs.iter()
        .filter_map(|raw| match decode_transfer_log(raw) {
            Ok(log) => {
                let timestamp = Some(format!("block:{}", log.block_number));
                let amount = format_amount(log.value, decimals);
                Some(match flow {
                    Flow::Inbound => TransferRecord::inbound(
                        timestamp,
                        amount,
                        log.tx_hash,
                        Some(format!("{:#x}", log.from)),
                        log.block_number,
                    ),
                    Flow::Outbound => TransferRecord::outbound(
                        timestamp,
                        amount,
                        log.tx_hash,
                        Some(format!("{:#x}", log.to)),
                        log.block_number,
                    ),
                })
            }
            Err(e) => {
                debug!(error = %e, "skipping undecodable transfer log");
                None
            }
        })
        .collect()
}

fn parse_address(value: &str) -> Result<Address, ScanError> {
    Address::from_str(value).map_err(|_| ScanError::InvalidAddress(value.to_string()))
}

#[async_trait]
impl ChainScanner for BaseScanner {
    fn chain(&self) -> Chain {
        Chain::Base
    }

    async fn estimate_first_seen(
        &self,
        address: &str,
        token: &str,
        depth: Depth,
    ) -> Result<FirstSeenResult, ScanError> {
        self.scan_first_seen(parse_address(address)?, parse_address(token)?, depth)
            .await
    }

    async fn recent_transfers(
        &self,
        address: &str,
        token: &str,
        decimals: u8,
        limit: usize,
    ) -> Result<TransferSet, ScanError> {
        self.scan_transfers(parse_address(address)?, parse_address(token)?, decimals, limit)
            .await
    }
}
