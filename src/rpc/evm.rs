use alloy::rpc::types::Filter;
use alloy_primitives::{Address, B256, Bytes, U64, U256, hex};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::info;

use super::RpcClient;
use crate::budget::ScanBudget;
use crate::error::RpcError;

const SUB_RANGE_BLOCKS: u64 = 1_000;
const MIN_SPLIT_SPAN: u64 = 200;

static SUGGESTED_RANGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"retry with the range (\d+)-(\d+)").ok());

/// Block-ranged `eth_getLogs` filter for one token contract.
///
/// `topics[0]` is the event signature; `None` entries are wildcards.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub token: Address,
    pub from_block: u64,
    pub to_block: u64,
    pub topics: [Option<B256>; 3],
}

impl LogQuery {
    fn filter(&self, from_block: u64, to_block: u64) -> Filter {
        let [signature, topic1, topic2] = self.topics;
        let mut filter = Filter::new()
            .address(self.token)
            .from_block(from_block)
            .to_block(to_block);
        if let Some(signature) = signature {
            filter = filter.event_signature(signature);
        }
        if let Some(topic) = topic1 {
            filter = filter.topic1(topic);
        }
        if let Some(topic) = topic2 {
            filter = filter.topic2(topic);
        }
        filter
    }

    fn params(&self, from_block: u64, to_block: u64) -> Result<Value, RpcError> {
        let filter = serde_json::to_value(self.filter(from_block, to_block))
            .map_err(|e| RpcError::Decode(format!("log filter: {e}")))?;
        Ok(json!([filter]))
    }

    pub fn span(&self) -> u64 {
        self.to_block.saturating_sub(self.from_block) + 1
    }
}

/// The one header field the scanners need from `eth_getBlockByNumber`.
#[derive(Debug, Deserialize)]
struct BlockStamp {
    timestamp: U64,
}

pub fn parse_quantity(value: &Value) -> Result<u64, RpcError> {
    U64::deserialize(value)
        .map(|n| n.to::<u64>())
        .map_err(|e| RpcError::Decode(format!("bad quantity {value}: {e}")))
}

/// Sub-range width a provider asks for ("... retry with the range 100-599").
fn suggested_width(error_text: &str) -> Option<u64> {
    let re = SUGGESTED_RANGE.as_ref()?;
    let captures = re.captures(error_text)?;
    let from: u64 = captures.get(1)?.as_str().parse().ok()?;
    let to: u64 = captures.get(2)?.as_str().parse().ok()?;
    to.checked_sub(from).map(|w| (w + 1).max(1))
}

impl RpcClient {
    pub async fn block_number(&self, budget: Option<&ScanBudget>) -> Result<u64, RpcError> {
        let result = self.call_within("eth_blockNumber", json!([]), budget).await?;
        parse_quantity(&result)
    }

    pub async fn block_timestamp(
        &self,
        block: u64,
        budget: Option<&ScanBudget>,
    ) -> Result<i64, RpcError> {
        let result = self
            .call_within("eth_getBlockByNumber", json!([U64::from(block), false]), budget)
            .await?;
        let stamp = Option::<BlockStamp>::deserialize(&result)
            .map_err(|e| RpcError::Decode(format!("block {block}: {e}")))?
            .ok_or_else(|| RpcError::Decode(format!("block {block} not found")))?;
        let ts = stamp.timestamp.to::<u64>();
        i64::try_from(ts).map_err(|_| RpcError::Decode(format!("timestamp out of range: {ts}")))
    }

    pub async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let result = self
            .call(
                "eth_call",
                json!([{ "to": format!("{to:#x}"), "data": hex::encode_prefixed(&data) }, "latest"]),
            )
            .await?;
        let text = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("eth_call result is not a string".into()))?;
        Bytes::from_str(text).map_err(|e| RpcError::Decode(format!("eth_call result: {e}")))
    }

    pub async fn get_eth_balance(&self, address: Address) -> Result<U256, RpcError> {
        let result = self
            .call("eth_getBalance", json!([format!("{address:#x}"), "latest"]))
            .await?;
        let text = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("eth_getBalance result is not a string".into()))?;
        U256::from_str(text).map_err(|e| RpcError::Decode(format!("balance {text}: {e}")))
    }

    /// Fetches logs for `query`, transparently splitting the range when the
    /// provider rejects it as too large. Results keep block order.
    pub async fn get_logs(
        &self,
        query: &LogQuery,
        budget: Option<&ScanBudget>,
    ) -> Result<Vec<Value>, RpcError> {
        let err = match self
            .fetch_logs(query, query.from_block, query.to_block, budget)
            .await
        {
            Ok(logs) => return Ok(logs),
            Err(e) => e,
        };

        if !err.is_range_too_large() || query.span() <= MIN_SPLIT_SPAN {
            return Err(err);
        }

        let width = suggested_width(&err.to_string()).unwrap_or(SUB_RANGE_BLOCKS);
        info!(
            label = self.label(),
            from_block = query.from_block,
            to_block = query.to_block,
            width,
            "log range rejected, splitting"
        );

        let mut logs = Vec::new();
        let mut from = query.from_block;
        while from <= query.to_block {
            if budget.is_some_and(|b| b.is_exhausted()) {
                return Err(RpcError::BudgetExhausted);
            }
            let to = from.saturating_add(width - 1).min(query.to_block);
            logs.extend(self.fetch_logs(query, from, to, budget).await?);
            if to == u64::MAX {
                break;
            }
            from = to + 1;
        }
        Ok(logs)
    }

    async fn fetch_logs(
        &self,
        query: &LogQuery,
        from_block: u64,
        to_block: u64,
        budget: Option<&ScanBudget>,
    ) -> Result<Vec<Value>, RpcError> {
        let result = self
            .call_within("eth_getLogs", query.params(from_block, to_block)?, budget)
            .await?;
        match result {
            Value::Array(logs) => Ok(logs),
            Value::Null => Ok(Vec::new()),
            other => Err(RpcError::Decode(format!("eth_getLogs returned {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity(&json!("0x1312d00")).unwrap(), 20_000_000);
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert!(parse_quantity(&json!("latest")).is_err());
        assert!(parse_quantity(&Value::Null).is_err());
    }

    #[test]
    fn reads_provider_suggested_range() {
        let text = "query exceeds max results 10000, retry with the range 1000-1499";
        assert_eq!(suggested_width(text), Some(500));
        assert_eq!(suggested_width("block range too large"), None);
    }

    #[test]
    fn log_query_serializes_wildcards_as_null() {
        let query = LogQuery {
            token: Address::repeat_byte(0x11),
            from_block: 16,
            to_block: 32,
            topics: [Some(B256::repeat_byte(0xaa)), None, Some(B256::ZERO)],
        };
        let params = query.params(16, 32).unwrap();
        let filter = &params[0];
        assert_eq!(filter["fromBlock"], "0x10");
        assert_eq!(filter["toBlock"], "0x20");
        assert_eq!(filter["address"], format!("0x{}", "11".repeat(20)));
        assert_eq!(filter["topics"][0], format!("0x{}", "aa".repeat(32)));
        assert!(filter["topics"][1].is_null());
        assert_eq!(filter["topics"][2], format!("0x{}", "00".repeat(32)));
        assert_eq!(query.span(), 17);
    }

    #[test]
    fn trailing_wildcard_topics_are_dropped() {
        let query = LogQuery {
            token: Address::repeat_byte(0x22),
            from_block: 1,
            to_block: 1,
            topics: [Some(B256::repeat_byte(0xaa)), Some(B256::repeat_byte(0xbb)), None],
        };
        let params = query.params(1, 1).unwrap();
        let topics = params[0]["topics"].as_array().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[1], format!("0x{}", "bb".repeat(32)));
    }

    #[tokio::test]
    async fn block_timestamp_reads_the_header_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x10","timestamp":"0x6553f100"}}"#)
            .create_async()
            .await;
        let client = RpcClient::new(&[server.url()], "test").unwrap();
        assert_eq!(client.block_timestamp(16, None).await.unwrap(), 1_700_000_000);
    }

    #[tokio::test]
    async fn missing_block_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;
        let client = RpcClient::new(&[server.url()], "test").unwrap();
        let err = client.block_timestamp(16, None).await.unwrap_err();
        assert!(matches!(err, RpcError::Decode(ref m) if m.contains("not found")));
    }
}
