//! Scans against a slow node: the wall-clock half of the budget cuts them short
//! long before the call cap is reached.

mod common;

use common::*;
use position_receipt::config::{BaseTransferBudget, SolanaTransferBudget};
use position_receipt::models::{Confidence, Depth};
use position_receipt::scanner::{BaseScanner, ChainScanner, SolanaScanner};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const HEAD: u64 = 20_000_000;

/// Base node with no matching logs that takes `latency` to answer anything.
fn slow_empty_base(latency: Duration) -> Arc<ScriptedTransport> {
    ScriptedTransport::with_latency(latency, |method, params| match method {
        "eth_blockNumber" => Ok(json!(hex(HEAD))),
        "eth_getBlockByNumber" => Ok(block_response(HEAD, params)),
        "eth_getLogs" => Ok(json!([])),
        other => method_not_found(other),
    })
}

#[tokio::test(start_paused = true)]
async fn base_first_seen_gives_up_at_the_deadline() {
    let transport = slow_empty_base(Duration::from_millis(300));
    let result = BaseScanner::new(client(&transport))
        .with_clock(fixed_clock)
        .estimate_first_seen(WALLET, TOKEN, Depth::Fast)
        .await
        .unwrap();

    // head + header + two log chunks, then the second ends past 1 s.
    assert_eq!(transport.total(), 4);
    assert!(result.stats.rpc_calls < Depth::Fast.profile().max_rpc_calls);
    assert_eq!(result.confidence, Confidence::Low);
    assert_eq!(
        result.note,
        "No Transfer events found within 30-day scan window (scan budget exhausted)"
    );
}

#[tokio::test(start_paused = true)]
async fn solana_first_seen_stops_partway_through_the_accounts() {
    let pubkeys = ["AccountOne", "AccountTwo", "AccountThree", "AccountFour", "AccountFive"];
    let accounts: Vec<Value> = pubkeys
        .iter()
        .map(|pubkey| token_account(pubkey, SOL_MINT, 1_000, 5))
        .collect();
    let transport =
        ScriptedTransport::with_latency(Duration::from_millis(400), move |method, params| {
            match method {
                "getTokenAccountsByOwner" => Ok(json!({ "value": accounts })),
                "getSignaturesForAddress" => Ok(signatures(
                    params[0].as_str().unwrap_or_default(),
                    &[NOW - DAY, NOW - 2 * DAY, NOW - 3 * DAY],
                )),
                other => method_not_found(other),
            }
        });

    let result = SolanaScanner::new(client(&transport))
        .estimate_first_seen(SOL_WALLET, SOL_MINT, Depth::Fast)
        .await
        .unwrap();

    assert_eq!(transport.count("getSignaturesForAddress"), 2);
    assert_eq!(result.confidence, Confidence::Low);
    assert_eq!(result.scan_window, "6 signatures / 2 accounts");
    assert_eq!(
        result.note,
        "Scan limit reached (6 signatures across 2 accounts). Actual first receipt could be earlier."
    );
}

#[tokio::test(start_paused = true)]
async fn base_transfers_truncate_on_time_alone() {
    let transport = slow_empty_base(Duration::from_millis(300));
    let set = BaseScanner::new(client(&transport))
        .with_transfer_budget(BaseTransferBudget {
            max_rpc_calls: 1_000,
            ..BaseTransferBudget::default()
        })
        .recent_transfers(WALLET, TOKEN, 18, 5)
        .await
        .unwrap();

    assert!(set.truncated);
    assert!(set.inbound.is_empty() && set.outbound.is_empty());
    // head, one full chunk, then the inbound half of the next.
    assert_eq!(transport.count("eth_getLogs"), 3);
    assert_eq!(set.stats.rpc_calls, 4);
}

#[tokio::test(start_paused = true)]
async fn solana_transfers_truncate_on_time_alone() {
    const ATA: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const PEER: &str = "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1";
    let accounts = vec![token_account(ATA, SOL_MINT, 10_000, 5)];
    let block_times = vec![NOW - DAY; 30];

    let transport =
        ScriptedTransport::with_latency(Duration::from_millis(300), move |method, params| {
            match method {
                "getTokenAccountsByOwner" => Ok(json!({ "value": accounts })),
                "getSignaturesForAddress" => Ok(signatures("sig", &block_times)),
                // Balance unchanged: never counts towards either target.
                "getTransaction" => Ok(spl_transaction(
                    params[0].as_str().unwrap_or_default(),
                    NOW - DAY,
                    ATA,
                    10_000,
                    10_000,
                    PEER,
                )),
                other => method_not_found(other),
            }
        });

    let set = SolanaScanner::new(client(&transport))
        .with_transfer_budget(SolanaTransferBudget {
            max_tx_parsed: 1_000,
            ..SolanaTransferBudget::default()
        })
        .recent_transfers(SOL_WALLET, SOL_MINT, 5, 5)
        .await
        .unwrap();

    assert!(set.truncated);
    // Two concurrent batches of five fit before the 1 s deadline.
    assert_eq!(set.stats.tx_parsed, 10);
    assert_eq!(transport.count("getTransaction"), 10);
    assert_eq!(set.stats.signatures_scanned, 30);
}
