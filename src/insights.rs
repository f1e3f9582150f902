use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::balance::Balance;
use crate::metadata::{BASE_WETH, TokenMetadata, WSOL_MINT};
use crate::models::{Chain, Confidence, Depth, FirstSeenResult, TransferSet};

const DUST_USD: f64 = 1.0;
const LARGE_HOLDER_USD: f64 = 10_000.0;
const RECENT_DAYS: i64 = 7;

const BASE_DEX_ROUTERS: [&str; 5] = [
    "0x2626664c2603336e57b271c5c0b26f421741e481",
    "0x3fc91a3afd70395cd496c647d5a6cc9d4b2b7fad",
    "0x6131b5fae19ea4f9d964eac0408e4408b66337b5",
    "0x1111111254eeb25477b68fb85ed929f73a960582",
    "0x6352a56caadc4f1e25cd6c75970fa768a3304e64",
];

const SOLANA_DEX_ROUTERS: [&str; 4] = [
    "jup6lkbzbjs1jkkwapdhny74zcz3tluzoi5qnyvtav4",
    "whirlbmiicvdio4qvufm5kag6ct8vwpyzgff3uctycc",
    "675kpx9mhtjs2zt1qfr1nyhuzelxfqm9h24wfsut1mp8",
    "cammczo5yl8w4vff8kvhrk22ggusp5vtaw7grrkgrwqk",
];

const DISTRIBUTOR_CONTRACTS: [&str; 2] = [
    "0x777777c338d5487fdecc5b15949cc8e9f69a7899",
    "0x000000000000cd17345801aa8147b8d3950260ff",
];

const LP_SYMBOLS: [&str; 5] = ["UNI-V2", "SLP", "CAKE-LP", "JLP", "ORCA-LP"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    ZeroBalance,
    DustAmount,
    LargeHolder,
    RecentlyAcquired,
    SingleTransferIn,
    MultipleInflows,
    FrequentTrader,
    DexRouterSource,
    PossibleAirdrop,
    WrappedToken,
    LpToken,
}

/// How much history the flags were derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlagScope {
    BlockWindow {
        #[serde(rename = "blocksScanned")]
        blocks_scanned: u64,
        #[serde(rename = "approxDays")]
        approx_days: u64,
        depth: Depth,
    },
    SignatureWindow {
        #[serde(rename = "signaturesScanned")]
        signatures_scanned: u64,
        #[serde(rename = "txParsed")]
        tx_parsed: u32,
        depth: Depth,
    },
}

pub struct Inputs<'a> {
    pub chain: Chain,
    pub balance: &'a Balance,
    pub value_usd: Option<f64>,
    pub first_seen: &'a FirstSeenResult,
    pub transfers: &'a TransferSet,
    pub token: &'a TokenMetadata,
    pub now: DateTime<Utc>,
}

impl Inputs<'_> {
    fn days_held(&self) -> Option<i64> {
        self.first_seen
            .timestamp_utc()
            .map(|ts| (self.now - ts).num_days())
    }
}

fn routers(chain: Chain) -> &'static [&'static str] {
    match chain {
        Chain::Base => &BASE_DEX_ROUTERS,
        Chain::Solana => &SOLANA_DEX_ROUTERS,
    }
}

fn is_wrapped(chain: Chain, token: &str) -> bool {
    match chain {
        Chain::Base => token.eq_ignore_ascii_case(BASE_WETH),
        Chain::Solana => token.eq_ignore_ascii_case(WSOL_MINT),
    }
}

pub fn detect_flags(inputs: &Inputs<'_>) -> Vec<Flag> {
    if inputs.balance.is_zero() {
        return vec![Flag::ZeroBalance];
    }

    let mut flags = Vec::new();

    if let Some(value) = inputs.value_usd {
        if value < DUST_USD {
            flags.push(Flag::DustAmount);
        }
        if value > LARGE_HOLDER_USD {
            flags.push(Flag::LargeHolder);
        }
    }

    if inputs.first_seen.confidence.is_trusted()
        && inputs.days_held().is_some_and(|days| days < RECENT_DAYS)
    {
        flags.push(Flag::RecentlyAcquired);
    }

    let inbound = &inputs.transfers.inbound;
    let in_count = inbound.len();
    let out_count = inputs.transfers.outbound.len();

    if in_count == 1 && out_count == 0 {
        flags.push(Flag::SingleTransferIn);
    } else if in_count >= 3 {
        flags.push(Flag::MultipleInflows);
    }
    if in_count + out_count >= 10 {
        flags.push(Flag::FrequentTrader);
    }

    let known_routers = routers(inputs.chain);
    let from_router = inbound.iter().any(|t| {
        t.from
            .as_deref()
            .is_some_and(|from| known_routers.contains(&from.to_lowercase().as_str()))
    });
    if from_router {
        flags.push(Flag::DexRouterSource);
    }

    if in_count == 1 {
        let from = inbound[0].from.as_deref().unwrap_or_default().to_lowercase();
        if DISTRIBUTOR_CONTRACTS.contains(&from.as_str()) {
            flags.push(Flag::PossibleAirdrop);
        }
    }

    if is_wrapped(inputs.chain, &inputs.token.address) {
        flags.push(Flag::WrappedToken);
    }
    if LP_SYMBOLS.contains(&inputs.token.symbol.to_uppercase().as_str()) {
        flags.push(Flag::LpToken);
    }

    flags
}

pub fn generate_notes(flags: &[Flag], inputs: &Inputs<'_>) -> Vec<String> {
    if flags.contains(&Flag::ZeroBalance) {
        return vec!["Wallet currently holds zero of this token".to_string()];
    }

    let mut notes: Vec<String> = Vec::new();
    let has = |flag: Flag| flags.contains(&flag);

    if has(Flag::MultipleInflows) {
        notes.push("Position built over time across multiple transactions, not a single buy".into());
    }
    if has(Flag::SingleTransferIn) {
        notes.push("Entire position acquired in a single transaction (within scanned window)".into());
    }
    if has(Flag::PossibleAirdrop) {
        notes.push("Position appears to have been received via airdrop distribution".into());
    }
    if has(Flag::RecentlyAcquired) {
        if let Some(days) = inputs.days_held() {
            notes.push(format!("Token acquired approximately {days} days ago"));
        }
    }
    if has(Flag::FrequentTrader) {
        notes.push("High transfer frequency; this wallet actively trades this token".into());
    }
    if has(Flag::DexRouterSource) {
        notes.push("Token acquired via DEX swap; holding duration based on on-chain receipt".into());
    }

    if inputs.first_seen.confidence == Confidence::Low {
        notes.push(
            "Holding duration estimate has low confidence; scan window may not cover full history"
                .into(),
        );
    }

    let total_out: f64 = inputs
        .transfers
        .outbound
        .iter()
        .filter_map(|t| t.amount.parse::<f64>().ok())
        .sum();
    if total_out > 0.0 && !inputs.balance.is_zero() {
        notes.push("Net inflow exceeds current balance; some tokens were transferred out".into());
    }

    if inputs.transfers.truncated {
        notes.push("Transfer history was truncated due to scan limits; partial view only".into());
    }
    if has(Flag::LpToken) {
        notes.push("This is a liquidity pool token; value depends on underlying pool assets".into());
    }
    if has(Flag::WrappedToken) {
        notes.push("This is a wrapped version of a native asset".into());
    }

    notes
}

/// Scope of the flags, summed over the first-seen and transfer scans.
pub fn build_flag_scope(
    chain: Chain,
    depth: Depth,
    first_seen: &FirstSeenResult,
    transfers: &TransferSet,
) -> FlagScope {
    match chain {
        Chain::Base => FlagScope::BlockWindow {
            blocks_scanned: first_seen.stats.blocks_scanned + transfers.stats.blocks_scanned,
            approx_days: depth.profile().base_days,
            depth,
        },
        Chain::Solana => FlagScope::SignatureWindow {
            signatures_scanned: first_seen.stats.signatures_scanned
                + transfers.stats.signatures_scanned,
            tx_parsed: transfers.stats.tx_parsed,
            depth,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransferRecord, format_iso};
    use alloy_primitives::U256;

    fn token(address: &str, symbol: &str) -> TokenMetadata {
        TokenMetadata {
            address: address.into(),
            symbol: symbol.into(),
            name: symbol.into(),
            decimals: 18,
            logo: None,
        }
    }

    fn first_seen(confidence: Confidence, ts: Option<i64>) -> FirstSeenResult {
        FirstSeenResult {
            timestamp: ts.and_then(format_iso),
            confidence,
            ..FirstSeenResult::degraded("chunked_log_scan", "")
        }
    }

    fn inbound(from: &str) -> TransferRecord {
        TransferRecord::inbound(None, "10".into(), "0xhash".into(), Some(from.into()), 1)
    }

    fn outbound(amount: &str) -> TransferRecord {
        TransferRecord::outbound(None, amount.into(), "0xhash".into(), Some("0xdead".into()), 1)
    }

    const NOW: i64 = 1_750_000_000;

    fn run(
        balance: &Balance,
        value_usd: Option<f64>,
        seen: &FirstSeenResult,
        transfers: &TransferSet,
        meta: &TokenMetadata,
    ) -> (Vec<Flag>, Vec<String>) {
        let inputs = Inputs {
            chain: Chain::Base,
            balance,
            value_usd,
            first_seen: seen,
            transfers,
            token: meta,
            now: DateTime::<Utc>::from_timestamp(NOW, 0).unwrap(),
        };
        let flags = detect_flags(&inputs);
        let notes = generate_notes(&flags, &inputs);
        (flags, notes)
    }

    #[test]
    fn zero_balance_short_circuits() {
        let (flags, notes) = run(
            &Balance::zero(),
            Some(50_000.0),
            &first_seen(Confidence::Medium, Some(NOW)),
            &TransferSet::empty(),
            &token("0x1", "X"),
        );
        assert_eq!(flags, vec![Flag::ZeroBalance]);
        assert_eq!(notes, vec!["Wallet currently holds zero of this token"]);
    }

    #[test]
    fn value_and_recency_flags() {
        let balance = Balance::new(U256::from(5u64), 0);
        let seen = first_seen(Confidence::Medium, Some(NOW - 2 * 86_400));
        let (flags, notes) = run(&balance, Some(0.5), &seen, &TransferSet::empty(), &token("0x1", "X"));
        assert!(flags.contains(&Flag::DustAmount));
        assert!(flags.contains(&Flag::RecentlyAcquired));
        assert!(notes.contains(&"Token acquired approximately 2 days ago".to_string()));

        let low = first_seen(Confidence::Low, Some(NOW - 2 * 86_400));
        let (flags, notes) = run(&balance, Some(20_000.0), &low, &TransferSet::empty(), &token("0x1", "X"));
        assert!(flags.contains(&Flag::LargeHolder));
        assert!(!flags.contains(&Flag::RecentlyAcquired));
        assert!(notes.iter().any(|n| n.contains("low confidence")));
    }

    #[test]
    fn transfer_pattern_flags() {
        let balance = Balance::new(U256::from(5u64), 0);
        let seen = first_seen(Confidence::Medium, Some(NOW - 400 * 86_400));

        let single = TransferSet {
            inbound: vec![inbound("0x777777C338d5487fdecc5b15949cC8e9f69a7899")],
            ..TransferSet::empty()
        };
        let (flags, _) = run(&balance, None, &seen, &single, &token("0x1", "X"));
        assert_eq!(flags, vec![Flag::SingleTransferIn, Flag::PossibleAirdrop]);

        let busy = TransferSet {
            inbound: (0..5)
                .map(|_| inbound("0x2626664c2603336E57B271c5C0b26F421741e481"))
                .collect(),
            outbound: (0..5).map(|_| outbound("1.5")).collect(),
            truncated: true,
            ..TransferSet::empty()
        };
        let (flags, notes) = run(&balance, None, &seen, &busy, &token("0x1", "X"));
        assert!(flags.contains(&Flag::MultipleInflows));
        assert!(flags.contains(&Flag::FrequentTrader));
        assert!(flags.contains(&Flag::DexRouterSource));
        assert!(notes.iter().any(|n| n.contains("transferred out")));
        assert!(notes.iter().any(|n| n.contains("truncated")));
    }

    #[test]
    fn token_type_flags() {
        let balance = Balance::new(U256::from(5u64), 0);
        let seen = first_seen(Confidence::Medium, None);
        let (flags, _) = run(&balance, None, &seen, &TransferSet::empty(), &token(BASE_WETH, "WETH"));
        assert_eq!(flags, vec![Flag::WrappedToken]);
        let (flags, notes) = run(&balance, None, &seen, &TransferSet::empty(), &token("0x1", "uni-v2"));
        assert_eq!(flags, vec![Flag::LpToken]);
        assert!(notes.iter().any(|n| n.contains("liquidity pool")));
    }

    #[test]
    fn flag_scope_serializes_with_type_tag() {
        let scope = FlagScope::SignatureWindow {
            signatures_scanned: 42,
            tx_parsed: 10,
            depth: Depth::Fast,
        };
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["type"], "signature_window");
        assert_eq!(json["signaturesScanned"], 42);
        assert_eq!(json["depth"], "fast");
    }
}
