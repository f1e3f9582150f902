use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

use crate::cache::TtlCache;
use crate::error::ReceiptError;
use crate::events::{balance_of_calldata, decimals_calldata, decode_uint, format_amount};
use crate::metadata::{decimals_or_default, is_native_token};
use crate::models::Chain;
use crate::rpc::RpcClient;

const ETH_DECIMALS: u8 = 18;
const SOL_DECIMALS: u8 = 9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    #[serde(serialize_with = "serialize_u256")]
    pub raw: U256,
    pub decimals: u8,
    pub formatted: String,
}

fn serialize_u256<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

impl Balance {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self {
            raw,
            decimals,
            formatted: format_amount(raw, decimals),
        }
    }

    pub fn zero() -> Self {
        Self::new(U256::ZERO, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

/// ERC-20 decimals keyed by lowercased contract address.
pub type DecimalsCache = TtlCache<String, u8>;

#[derive(Clone)]
pub struct BalanceService {
    base: RpcClient,
    solana: RpcClient,
    decimals: DecimalsCache,
}

impl BalanceService {
    pub fn new(base: RpcClient, solana: RpcClient, decimals: DecimalsCache) -> Self {
        Self {
            base,
            solana,
            decimals,
        }
    }

    pub async fn fetch(&self, chain: Chain, address: &str, token: &str) -> Result<Balance, ReceiptError> {
        match chain {
            Chain::Base => self.fetch_base(address, token).await,
            Chain::Solana => self.fetch_solana(address, token).await,
        }
    }

    async fn fetch_base(&self, address: &str, token: &str) -> Result<Balance, ReceiptError> {
        let owner = parse_address(address)?;
        if is_native_token(Chain::Base, token) {
            let wei = self.base.get_eth_balance(owner).await?;
            return Ok(Balance::new(wei, ETH_DECIMALS));
        }

        let contract = parse_address(token)?;
        let data = self.base.eth_call(contract, balance_of_calldata(owner)).await?;
        let raw = decode_uint(&data).unwrap_or(U256::ZERO);
        let decimals = self.erc20_decimals(contract).await?;
        Ok(Balance::new(raw, decimals))
    }

    async fn erc20_decimals(&self, contract: Address) -> Result<u8, ReceiptError> {
        let key = format!("{contract:#x}");
        if let Some(decimals) = self.decimals.get(&key).await {
            return Ok(decimals);
        }
        let data = self.base.eth_call(contract, decimals_calldata()).await?;
        let decimals = decimals_or_default(&data);
        debug!(token = %key, decimals, "cached token decimals");
        Ok(self.decimals.insert_if_absent(key, decimals).await)
    }

    async fn fetch_solana(&self, address: &str, mint: &str) -> Result<Balance, ReceiptError> {
        if is_native_token(Chain::Solana, mint) {
            let lamports = self.solana.get_sol_balance(address).await?;
            return Ok(Balance::new(U256::from(lamports), SOL_DECIMALS));
        }

        let accounts = self
            .solana
            .get_token_accounts_by_owner(address, mint, None)
            .await?;
        let Some(first) = accounts.first() else {
            return Ok(Balance::zero());
        };
        let total: u128 = accounts.iter().map(|a| a.amount).sum();
        Ok(Balance::new(U256::from(total), first.decimals))
    }
}

fn parse_address(value: &str) -> Result<Address, ReceiptError> {
    Address::from_str(value).map_err(|_| ReceiptError::InvalidAddress(value.to_string()))
}
