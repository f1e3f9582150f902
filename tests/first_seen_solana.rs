mod common;

use common::*;
use position_receipt::models::{Confidence, Depth, format_iso};
use position_receipt::scanner::{ChainScanner, SolanaScanner};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

const ACCOUNT_A: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
const ACCOUNT_B: &str = "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1";

/// Wallet holding the mint in the given accounts, each with its own signature history.
fn wallet_with_accounts(history: Vec<(&'static str, Vec<i64>)>) -> Arc<ScriptedTransport> {
    let accounts: Vec<Value> = history
        .iter()
        .map(|(pubkey, _)| token_account(pubkey, SOL_MINT, 1_000, 5))
        .collect();
    let by_account: HashMap<&'static str, Vec<i64>> = history.into_iter().collect();

    ScriptedTransport::new(move |method, params| match method {
        "getTokenAccountsByOwner" => Ok(json!({ "context": { "slot": 1 }, "value": accounts })),
        "getSignaturesForAddress" => {
            let account = params[0].as_str().unwrap_or_default();
            let limit = params[1]["limit"].as_u64().unwrap_or(1000) as usize;
            let times = by_account.get(account).cloned().unwrap_or_default();
            let page: Vec<i64> = times.into_iter().take(limit).collect();
            Ok(signatures(account, &page))
        }
        other => method_not_found(other),
    })
}

#[tokio::test]
async fn oldest_signature_across_all_accounts_wins() {
    let transport = wallet_with_accounts(vec![
        (ACCOUNT_A, vec![NOW - DAY, NOW - 5 * DAY, NOW - 10 * DAY]),
        (ACCOUNT_B, vec![NOW - 20 * DAY, NOW - 200 * DAY]),
    ]);

    let result = SolanaScanner::new(client(&transport))
        .estimate_first_seen(SOL_WALLET, SOL_MINT, Depth::Standard)
        .await
        .unwrap();

    assert_eq!(result.timestamp, format_iso(NOW - 200 * DAY));
    assert_eq!(result.confidence, Confidence::High);
    assert_eq!(result.method, "token_account_scan");
    assert_eq!(result.scan_window, "5 signatures / 2 accounts");
    assert_eq!(result.note, "Full history scanned across 2 token account(s)");
    assert_eq!(transport.count("getSignaturesForAddress"), 2);
    assert_eq!(result.stats.signatures_scanned, 5);
}

#[tokio::test]
async fn remaining_signature_allowance_shrinks_per_account() {
    let transport = wallet_with_accounts(vec![
        (ACCOUNT_A, vec![NOW - DAY; 150]),
        (ACCOUNT_B, vec![NOW - 2 * DAY; 10]),
    ]);

    SolanaScanner::new(client(&transport))
        .estimate_first_seen(SOL_WALLET, SOL_MINT, Depth::Fast)
        .await
        .unwrap();

    let limits: Vec<u64> = transport
        .calls()
        .iter()
        .filter(|(m, _)| m == "getSignaturesForAddress")
        .map(|(_, p)| p[1]["limit"].as_u64().unwrap())
        .collect();
    assert_eq!(limits, vec![200, 50]);
}

#[tokio::test]
async fn full_signature_page_is_low_confidence() {
    let transport = wallet_with_accounts(vec![(ACCOUNT_A, vec![NOW - 3 * DAY; 200])]);

    let result = SolanaScanner::new(client(&transport))
        .estimate_first_seen(SOL_WALLET, SOL_MINT, Depth::Fast)
        .await
        .unwrap();

    assert_eq!(result.confidence, Confidence::Low);
    assert!(result.note.starts_with("Scan limit reached (200 signatures across 1 accounts)"));
    assert_eq!(result.timestamp, format_iso(NOW - 3 * DAY));
}

#[tokio::test]
async fn wallet_without_token_accounts() {
    let transport = wallet_with_accounts(vec![]);

    let result = SolanaScanner::new(client(&transport))
        .estimate_first_seen(SOL_WALLET, SOL_MINT, Depth::Standard)
        .await
        .unwrap();

    assert_eq!(result.timestamp, None);
    assert_eq!(result.confidence, Confidence::Low);
    assert_eq!(result.scan_window, "0 accounts");
    assert_eq!(result.note, "No token account found for this mint");
    assert_eq!(transport.total(), 1);
}

#[tokio::test]
async fn failing_account_is_skipped() {
    let accounts = vec![
        token_account(ACCOUNT_A, SOL_MINT, 1, 5),
        token_account(ACCOUNT_B, SOL_MINT, 1, 5),
    ];
    let transport = ScriptedTransport::new(move |method, params| match method {
        "getTokenAccountsByOwner" => Ok(json!({ "value": accounts })),
        "getSignaturesForAddress" if params[0] == ACCOUNT_A => {
            Err(position_receipt::error::RpcError::Rpc {
                code: -32009,
                message: "long-term storage unavailable".into(),
            })
        }
        "getSignaturesForAddress" => Ok(signatures("b", &[NOW - 40 * DAY])),
        other => method_not_found(other),
    });

    let result = SolanaScanner::new(client(&transport))
        .estimate_first_seen(SOL_WALLET, SOL_MINT, Depth::Standard)
        .await
        .unwrap();

    assert_eq!(result.timestamp, format_iso(NOW - 40 * DAY));
    assert_eq!(result.confidence, Confidence::Medium);
    assert_eq!(result.stats.units_skipped, 1);
    assert_eq!(result.scan_window, "1 signatures / 1 accounts");
}
