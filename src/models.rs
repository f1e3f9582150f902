use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::budget::ScanStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Base,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Base, Chain::Solana];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Base => "base",
            Chain::Solana => "solana",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Chain::Base),
            "solana" => Ok(Chain::Solana),
            other => Err(format!("Unsupported chain: {other}")),
        }
    }
}

/// How far back and how thoroughly a scan searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Fast,
    #[default]
    Standard,
    Deep,
}

impl Depth {
    pub const ALL: [Depth; 3] = [Depth::Fast, Depth::Standard, Depth::Deep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Fast => "fast",
            Depth::Standard => "standard",
            Depth::Deep => "deep",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Depth::Fast),
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            other => Err(format!(
                "Invalid depth '{other}'. Must be one of: deep, fast, standard"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    /// Medium and high estimates are trusted enough to derive durations from.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Confidence::Medium | Confidence::High)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstSeenResult {
    pub timestamp: Option<String>,
    pub confidence: Confidence,
    pub method: String,
    pub scan_window: String,
    pub note: String,
    #[serde(skip)]
    pub stats: ScanStats,
}

impl FirstSeenResult {
    /// Empty low-confidence result used whenever no estimate could be made.
    pub fn degraded(method: &str, note: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            confidence: Confidence::Low,
            method: method.to_string(),
            scan_window: "0".to_string(),
            note: note.into(),
            stats: ScanStats::default(),
        }
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_iso)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub timestamp: Option<String>,
    pub amount: String,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Block number (Base) or block time (Solana); newest sorts highest.
    #[serde(skip)]
    pub order_key: u64,
}

impl TransferRecord {
    pub fn inbound(
        timestamp: Option<String>,
        amount: String,
        tx_hash: String,
        from: Option<String>,
        order_key: u64,
    ) -> Self {
        Self {
            timestamp,
            amount,
            tx_hash,
            from,
            to: None,
            order_key,
        }
    }

    pub fn outbound(
        timestamp: Option<String>,
        amount: String,
        tx_hash: String,
        to: Option<String>,
        order_key: u64,
    ) -> Self {
        Self {
            timestamp,
            amount,
            tx_hash,
            from: None,
            to,
            order_key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSet {
    pub inbound: Vec<TransferRecord>,
    pub outbound: Vec<TransferRecord>,
    pub truncated: bool,
    #[serde(skip)]
    pub stats: ScanStats,
}

impl TransferSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sorts both directions newest-first and keeps at most `limit` of each.
    pub fn finalize(
        mut inbound: Vec<TransferRecord>,
        mut outbound: Vec<TransferRecord>,
        truncated: bool,
        limit: usize,
        stats: ScanStats,
    ) -> Self {
        inbound.sort_by(|a, b| b.order_key.cmp(&a.order_key));
        outbound.sort_by(|a, b| b.order_key.cmp(&a.order_key));
        inbound.truncate(limit);
        outbound.truncate(limit);
        Self {
            inbound,
            outbound,
            truncated,
            stats,
        }
    }

    pub fn last_in(&self) -> Option<&TransferRecord> {
        self.inbound.first()
    }

    pub fn last_out(&self) -> Option<&TransferRecord> {
        self.outbound.first()
    }
}

pub fn format_iso(unix_secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_and_depth_parse_exact_lowercase() {
        assert_eq!("base".parse::<Chain>(), Ok(Chain::Base));
        assert_eq!("solana".parse::<Chain>(), Ok(Chain::Solana));
        assert!("Base".parse::<Chain>().is_err());
        assert!("polygon".parse::<Chain>().is_err());

        assert_eq!("deep".parse::<Depth>(), Ok(Depth::Deep));
        assert!("DEEP".parse::<Depth>().is_err());
        assert_eq!(Depth::default(), Depth::Standard);
    }

    #[test]
    fn first_seen_serializes_camel_case() {
        let result = FirstSeenResult {
            timestamp: format_iso(1_700_000_000),
            confidence: Confidence::Medium,
            method: "chunked_log_scan".into(),
            scan_window: "90 days".into(),
            note: "n".into(),
            stats: ScanStats::default(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
        assert_eq!(json["confidence"], "medium");
        assert_eq!(json["scanWindow"], "90 days");
        assert!(json.get("stats").is_none());
    }

    #[test]
    fn transfer_records_only_carry_their_counterparty() {
        let inbound = TransferRecord::inbound(None, "1".into(), "0xa".into(), Some("0xb".into()), 1);
        let json = serde_json::to_value(&inbound).unwrap();
        assert_eq!(json["from"], "0xb");
        assert!(json.get("to").is_none());
        assert_eq!(json["txHash"], "0xa");
    }

    #[test]
    fn finalize_sorts_newest_first_and_caps() {
        let records: Vec<_> = (0..8)
            .map(|i| TransferRecord::inbound(None, "1".into(), format!("0x{i}"), None, i))
            .collect();
        let set = TransferSet::finalize(records, Vec::new(), false, 5, ScanStats::default());
        assert_eq!(set.inbound.len(), 5);
        assert_eq!(set.inbound[0].order_key, 7);
        assert_eq!(set.last_in().map(|r| r.tx_hash.as_str()), Some("0x7"));
        assert!(set.last_out().is_none());
    }

    #[test]
    fn iso_round_trip() {
        let ts = format_iso(0).unwrap();
        assert_eq!(ts, "1970-01-01T00:00:00Z");
        assert_eq!(parse_iso(&ts).unwrap().timestamp(), 0);
    }
}
