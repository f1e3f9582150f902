use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Chain, Depth};

static EVM_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").ok());
static SOLANA_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").ok());

fn matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    Option::as_ref(pattern).is_some_and(|re| re.is_match(value))
}

pub fn validate_chain(chain: &str) -> Result<Chain, String> {
    chain.parse().map_err(|_| {
        let mut names: Vec<&str> = Chain::ALL.iter().map(Chain::as_str).collect();
        names.sort_unstable();
        format!("Invalid chain '{chain}'. Must be one of: {}", names.join(", "))
    })
}

pub fn validate_address(chain: Chain, address: &str) -> Result<(), String> {
    if address.is_empty() {
        return Err("address is required".into());
    }
    match chain {
        Chain::Base if !matches(&EVM_ADDRESS, address) => Err(format!(
            "Invalid Base address: {address}. Must be 0x-prefixed, 40 hex characters."
        )),
        Chain::Solana if !matches(&SOLANA_ADDRESS, address) => Err(format!(
            "Invalid Solana address: {address}. Must be base58, 32-44 characters."
        )),
        _ => Ok(()),
    }
}

/// Like [`validate_address`], but the `eth` / `sol` tickers are accepted on either chain.
pub fn validate_token(chain: Chain, token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("token is required".into());
    }
    if is_native_ticker(token) {
        return Ok(());
    }
    match chain {
        Chain::Base if !matches(&EVM_ADDRESS, token) => Err(format!(
            "Invalid token address: {token}. Must be 0x-prefixed, 40 hex characters."
        )),
        Chain::Solana if !matches(&SOLANA_ADDRESS, token) => Err(format!(
            "Invalid token mint: {token}. Must be base58, 32-44 characters."
        )),
        _ => Ok(()),
    }
}

pub fn validate_depth(depth: &str) -> Result<Depth, String> {
    depth.parse()
}

pub fn is_native_ticker(token: &str) -> bool {
    token.eq_ignore_ascii_case("eth") || token.eq_ignore_ascii_case("sol")
}
