use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::debug;

use super::RpcClient;
use crate::budget::ScanBudget;
use crate::error::RpcError;

/// Largest page `getSignaturesForAddress` serves.
pub const MAX_SIGNATURE_PAGE: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub pubkey: String,
    pub mint: String,
    pub amount: u128,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionDetail {
    pub block_time: Option<i64>,
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionMeta {
    pub err: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(deserialize_with = "null_as_default")]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(deserialize_with = "null_as_default")]
    pub inner_instructions: Vec<InnerInstructions>,
}

/// Nodes send `null` for these lists on old or failed transactions.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InnerInstructions {
    pub instructions: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransactionBody {
    pub signatures: Vec<String>,
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionMessage {
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<Value>,
}

/// `jsonParsed` encodes keys as objects, `json` as bare strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Parsed { pubkey: String },
    Plain(String),
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            AccountKey::Parsed { pubkey } => pubkey,
            AccountKey::Plain(key) => key,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenBalance {
    pub account_index: Option<usize>,
    pub mint: String,
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UiTokenAmount {
    pub amount: String,
    pub decimals: u8,
}

impl TransactionDetail {
    pub fn account_key(&self, index: usize) -> Option<&str> {
        self.transaction
            .message
            .account_keys
            .get(index)
            .map(AccountKey::pubkey)
    }

    /// Outer instructions followed by inner (CPI) instructions.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Value> {
        let inner = self
            .meta
            .iter()
            .flat_map(|m| m.inner_instructions.iter())
            .flat_map(|group| group.instructions.iter());
        self.transaction.message.instructions.iter().chain(inner)
    }
}

fn parse_token_account(entry: &Value) -> Option<TokenAccount> {
    let info = &entry["account"]["data"]["parsed"]["info"];
    let amount = &info["tokenAmount"];
    Some(TokenAccount {
        pubkey: entry["pubkey"].as_str()?.to_string(),
        mint: info["mint"].as_str().unwrap_or_default().to_string(),
        amount: amount["amount"].as_str()?.parse().ok()?,
        decimals: u8::try_from(amount["decimals"].as_u64()?).ok()?,
    })
}

impl RpcClient {
    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &str,
        mint: &str,
        budget: Option<&ScanBudget>,
    ) -> Result<Vec<TokenAccount>, RpcError> {
        let result = self
            .call_within(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
                budget,
            )
            .await?;

        let entries = result["value"].as_array().cloned().unwrap_or_default();
        let accounts: Vec<TokenAccount> = entries
            .iter()
            .filter_map(|entry| {
                let parsed = parse_token_account(entry);
                if parsed.is_none() {
                    debug!(entry = %entry, "skipping malformed token account");
                }
                parsed
            })
            .collect();
        Ok(accounts)
    }

    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: u32,
        before: Option<&str>,
        budget: Option<&ScanBudget>,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let mut options = json!({ "limit": limit.clamp(1, MAX_SIGNATURE_PAGE) });
        if let Some(before) = before {
            options["before"] = json!(before);
        }

        let result = self
            .call_within("getSignaturesForAddress", json!([address, options]), budget)
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("getSignaturesForAddress: {e}")))
    }

    pub async fn get_transaction(
        &self,
        signature: &str,
        budget: Option<&ScanBudget>,
    ) -> Result<Option<TransactionDetail>, RpcError> {
        let result = self
            .call_within(
                "getTransaction",
                json!([
                    signature,
                    { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
                ]),
                budget,
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| RpcError::Decode(format!("getTransaction {signature}: {e}")))
    }

    pub async fn get_sol_balance(&self, address: &str) -> Result<u64, RpcError> {
        let result = self.call("getBalance", json!([address])).await?;
        result["value"]
            .as_u64()
            .ok_or_else(|| RpcError::Decode("getBalance value is not an integer".into()))
    }

    pub async fn get_account_info(&self, address: &str) -> Result<Option<Value>, RpcError> {
        let result = self
            .call("getAccountInfo", json!([address, { "encoding": "jsonParsed" }]))
            .await?;
        Ok(match &result["value"] {
            Value::Null => None,
            value => Some(value.clone()),
        })
    }

    pub async fn get_health(&self) -> Result<Value, RpcError> {
        self.call("getHealth", json!([])).await
    }
}
