use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent, SolType, sol_data};
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Context;
use serde_json::Value;

use crate::rpc::evm::parse_quantity;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function balanceOf(address owner) external view returns (uint256);
    function decimals() external view returns (uint8);
    function name() external view returns (string);
    function symbol() external view returns (string);
}

pub const TRANSFER_TOPIC: B256 = Transfer::SIGNATURE_HASH;

/// Decoded ERC-20 `Transfer` together with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: String,
}

pub fn decode_transfer_event(log: &Log) -> anyhow::Result<Transfer> {
    let log_data = log.data();
    let decoded = Transfer::decode_raw_log(log.topics(), &log_data.data)?;
    Ok(decoded)
}

/// Decodes one raw `eth_getLogs` entry.
pub fn decode_transfer_log(raw: &Value) -> anyhow::Result<TransferLog> {
    let log: Log = serde_json::from_value(raw.clone()).context("Malformed log entry")?;
    let event = decode_transfer_event(&log)?;
    let block_number = log.block_number.context("Log has no block number")?;
    let tx_hash = log
        .transaction_hash
        .map(|hash| format!("{hash:#x}"))
        .unwrap_or_default();

    Ok(TransferLog {
        from: event.from,
        to: event.to,
        value: event.value,
        block_number,
        tx_hash,
    })
}

/// Block number of a raw log without decoding the rest of it.
pub fn log_block_number(raw: &Value) -> Option<u64> {
    parse_quantity(&raw["blockNumber"]).ok()
}

/// 32-byte left-padded topic form of an address.
pub fn pad_address(address: Address) -> B256 {
    address.into_word()
}

/// Decimal string with trailing zeros removed; falls back to the raw integer.
pub fn format_amount(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(text) if text.contains('.') => {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        Ok(text) => text,
        Err(_) => value.to_string(),
    }
}

pub fn balance_of_calldata(owner: Address) -> Bytes {
    Bytes::from(balanceOfCall { owner }.abi_encode())
}

pub fn decimals_calldata() -> Bytes {
    Bytes::from(decimalsCall {}.abi_encode())
}

pub fn name_calldata() -> Bytes {
    Bytes::from(nameCall {}.abi_encode())
}

pub fn symbol_calldata() -> Bytes {
    Bytes::from(symbolCall {}.abi_encode())
}

pub fn decode_uint(data: &[u8]) -> Option<U256> {
    <sol_data::Uint<256> as SolType>::abi_decode(data).ok()
}

/// ABI string return value. Older tokens return `bytes32` instead.
pub fn decode_string(data: &[u8]) -> Option<String> {
    if let Ok(text) = <sol_data::String as SolType>::abi_decode(data) {
        return Some(text);
    }
    if data.len() == 32 {
        let text: String = data
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as char)
            .collect();
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}
