#![allow(dead_code)]

use async_trait::async_trait;
use position_receipt::error::RpcError;
use position_receipt::events::TRANSFER_TOPIC;
use position_receipt::rpc::{RpcClient, RpcTransport};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NOW: i64 = 1_750_000_000;
pub const DAY: i64 = 86_400;

pub const WALLET: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
pub const TOKEN: &str = "0x4ed4e862860bed51a9570b96d89af5e1b0efefed";
pub const OTHER: &str = "0x1111111111111111111111111111111111111111";

pub const SOL_WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const SOL_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

pub fn fixed_clock() -> i64 {
    NOW
}

type Handler = dyn Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync;

/// In-memory transport: every call is logged and answered by a closure.
pub struct ScriptedTransport {
    endpoints: Vec<String>,
    handler: Box<Handler>,
    latency: Duration,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_latency(Duration::ZERO, handler)
    }

    /// Every answer arrives `latency` after the request, on the tokio clock.
    pub fn with_latency(
        latency: Duration,
        handler: impl Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            endpoints: vec!["scripted://primary".to_string()],
            handler: Box::new(handler),
            latency,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn send(&self, _index: usize, method: &str, params: &Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(method, params)
    }
}

pub fn client(transport: &Arc<ScriptedTransport>) -> RpcClient {
    RpcClient::with_transport(transport.clone(), "scripted")
}

pub fn hex(n: u64) -> String {
    format!("{n:#x}")
}

pub fn unhex(value: &Value) -> u64 {
    u64::from_str_radix(value.as_str().unwrap().trim_start_matches("0x"), 16).unwrap()
}

pub fn pad(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

/// `(fromBlock, toBlock)` of an `eth_getLogs` call.
pub fn log_range(params: &Value) -> (u64, u64) {
    (unhex(&params[0]["fromBlock"]), unhex(&params[0]["toBlock"]))
}

/// True for the inbound query shape (`topics[1]` wildcard, `topics[2]` = wallet).
pub fn is_inbound_query(params: &Value) -> bool {
    params[0]["topics"][1].is_null()
}

pub fn transfer_log(from: &str, to: &str, value: u64, block: u64) -> Value {
    json!({
        "address": TOKEN,
        "topics": [format!("{TRANSFER_TOPIC:#x}"), pad(from), pad(to)],
        "data": format!("0x{value:064x}"),
        "blockNumber": hex(block),
        "blockHash": format!("0x{:064x}", block),
        "transactionHash": format!("0x{:064x}", block * 10 + 1),
        "transactionIndex": "0x0",
        "logIndex": "0x0",
        "removed": false,
    })
}

/// Block timestamps for a chain whose head is `head` at `NOW`, 2 s per block.
pub fn block_response(head: u64, params: &Value) -> Value {
    let block = unhex(&params[0]);
    json!({ "number": hex(block), "timestamp": hex((NOW - (head - block) as i64 * 2) as u64) })
}

pub fn token_account(pubkey: &str, mint: &str, amount: u64, decimals: u8) -> Value {
    json!({
        "pubkey": pubkey,
        "account": { "data": { "parsed": { "info": {
            "mint": mint,
            "owner": SOL_WALLET,
            "tokenAmount": { "amount": amount.to_string(), "decimals": decimals }
        }}}}
    })
}

pub fn signatures(prefix: &str, block_times: &[i64]) -> Value {
    Value::Array(
        block_times
            .iter()
            .enumerate()
            .map(|(i, t)| json!({ "signature": format!("{prefix}{i}"), "blockTime": t, "err": null }))
            .collect(),
    )
}

/// Parsed SPL transaction moving `pre -> post` on `account` via a `transferChecked`.
pub fn spl_transaction(
    signature: &str,
    block_time: i64,
    account: &str,
    pre: u64,
    post: u64,
    counterparty: &str,
) -> Value {
    let (source, destination) = if post >= pre {
        (counterparty, account)
    } else {
        (account, counterparty)
    };
    let balance = |amount: u64| {
        json!([{
            "accountIndex": 1,
            "mint": SOL_MINT,
            "owner": SOL_WALLET,
            "uiTokenAmount": { "amount": amount.to_string(), "decimals": 5 }
        }])
    };
    json!({
        "blockTime": block_time,
        "meta": {
            "err": null,
            "preTokenBalances": balance(pre),
            "postTokenBalances": balance(post),
            "innerInstructions": []
        },
        "transaction": {
            "signatures": [signature],
            "message": {
                "accountKeys": [{ "pubkey": SOL_WALLET }, { "pubkey": account }, { "pubkey": counterparty }],
                "instructions": [{
                    "program": "spl-token",
                    "parsed": {
                        "type": "transferChecked",
                        "info": { "source": source, "destination": destination, "authority": SOL_WALLET }
                    }
                }]
            }
        }
    })
}

pub fn method_not_found(method: &str) -> Result<Value, RpcError> {
    Err(RpcError::Rpc {
        code: -32601,
        message: format!("method {method} not scripted"),
    })
}
