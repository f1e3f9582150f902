use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::{ReceiptError, RpcError};
use crate::events::{decimals_calldata, decode_string, decode_uint, name_calldata, symbol_calldata};
use crate::models::Chain;
use crate::rpc::RpcClient;

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const BASE_WETH: &str = "0x4200000000000000000000000000000000000006";
pub const DEFAULT_JUPITER_TOKEN_URL: &str = "https://tokens.jup.ag/token";

const JUPITER_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub logo: Option<String>,
}

struct KnownToken {
    chain: Chain,
    address: &'static str,
    symbol: &'static str,
    name: &'static str,
    decimals: u8,
}

const fn known(
    chain: Chain,
    address: &'static str,
    symbol: &'static str,
    name: &'static str,
    decimals: u8,
) -> KnownToken {
    KnownToken {
        chain,
        address,
        symbol,
        name,
        decimals,
    }
}

static REGISTRY: [KnownToken; 9] = [
    known(Chain::Base, "0x4ed4E862860beD51a9570b96d89aF5E1B0Efefed", "DEGEN", "Degen", 18),
    known(Chain::Base, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "USDC", "USD Coin", 6),
    known(Chain::Base, "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb", "DAI", "Dai Stablecoin", 18),
    known(Chain::Base, BASE_WETH, "WETH", "Wrapped Ether", 18),
    known(Chain::Base, ZERO_ADDRESS, "ETH", "Ether", 18),
    known(Chain::Solana, WSOL_MINT, "SOL", "Solana", 9),
    known(Chain::Solana, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC", "USD Coin", 6),
    known(Chain::Solana, "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", "BONK", "Bonk", 5),
    known(Chain::Solana, "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", "JUP", "Jupiter", 6),
];

/// Native coin of `chain`, by ticker or by its canonical address.
pub fn is_native_token(chain: Chain, token: &str) -> bool {
    let lower = token.to_lowercase();
    if lower == "eth" || lower == "sol" {
        return true;
    }
    match chain {
        Chain::Base => lower == ZERO_ADDRESS,
        Chain::Solana => token == WSOL_MINT,
    }
}

/// Address used to price a token; native coins are priced through their wrapped form.
pub fn price_address(chain: Chain, token: &str) -> &str {
    match (chain, is_native_token(chain, token)) {
        (Chain::Base, true) => BASE_WETH,
        (Chain::Solana, true) => WSOL_MINT,
        _ => token,
    }
}

fn registry_entry(chain: Chain, token: &str) -> Option<&'static KnownToken> {
    let address = match (chain, is_native_token(chain, token)) {
        (Chain::Base, true) => ZERO_ADDRESS,
        (Chain::Solana, true) => WSOL_MINT,
        _ => token,
    };
    REGISTRY
        .iter()
        .find(|t| t.chain == chain && t.address.eq_ignore_ascii_case(address))
}

pub fn registry_lookup(chain: Chain, token: &str) -> Option<TokenMetadata> {
    registry_entry(chain, token).map(|t| TokenMetadata {
        address: token.to_string(),
        symbol: t.symbol.to_string(),
        name: t.name.to_string(),
        decimals: t.decimals,
        logo: None,
    })
}

/// Resolves a ticker such as `USDC` to the registered address on `chain`.
pub fn resolve_symbol(chain: Chain, symbol: &str) -> Option<&'static str> {
    REGISTRY
        .iter()
        .find(|t| t.chain == chain && t.symbol.eq_ignore_ascii_case(symbol))
        .map(|t| t.address)
}

/// Resolved metadata keyed by chain and lowercased token address.
pub type MetadataCache = TtlCache<(Chain, String), TokenMetadata>;

/// Registry, then cache, then on-chain lookup. The cache is shared by every
/// clone and is expected to be unbounded.
#[derive(Clone)]
pub struct MetadataService {
    base: RpcClient,
    solana: RpcClient,
    http: reqwest::Client,
    jupiter_token_url: String,
    cache: MetadataCache,
}

impl MetadataService {
    pub fn new(
        base: RpcClient,
        solana: RpcClient,
        http: reqwest::Client,
        cache: MetadataCache,
    ) -> Self {
        Self {
            base,
            solana,
            http,
            jupiter_token_url: DEFAULT_JUPITER_TOKEN_URL.to_string(),
            cache,
        }
    }

    pub fn with_jupiter_token_url(mut self, url: &str) -> Self {
        self.jupiter_token_url = url.trim_end_matches('/').to_string();
        self
    }

    pub async fn resolve(&self, chain: Chain, token: &str) -> Result<TokenMetadata, ReceiptError> {
        if let Some(meta) = registry_lookup(chain, token) {
            return Ok(meta);
        }

        let key = (chain, token.to_lowercase());
        if let Some(meta) = self.cache.get(&key).await {
            return Ok(meta);
        }

        let meta = match chain {
            Chain::Base => self.resolve_evm(token).await?,
            Chain::Solana => self.resolve_solana(token).await?,
        };
        info!(chain = %chain, token, symbol = %meta.symbol, "resolved token metadata");
        Ok(self.cache.insert_if_absent(key, meta).await)
    }

    async fn resolve_evm(&self, token: &str) -> Result<TokenMetadata, ReceiptError> {
        let contract = Address::from_str(token)
            .map_err(|_| ReceiptError::InvalidAddress(token.to_string()))?;

        let (name, symbol, decimals) = tokio::join!(
            self.base.eth_call(contract, name_calldata()),
            self.base.eth_call(contract, symbol_calldata()),
            self.base.eth_call(contract, decimals_calldata()),
        );

        let name = match name {
            Ok(data) => decode_string(&data),
            Err(e) => {
                warn!(token, error = %e, "failed to fetch token name");
                None
            }
        };
        let symbol = decode_string(&symbol?).filter(|s| !s.is_empty()).ok_or_else(|| {
            ReceiptError::Metadata(format!(
                "Could not resolve token metadata for {token}: no symbol returned"
            ))
        })?;
        let decimals = decimals_or_default(&decimals?);

        Ok(TokenMetadata {
            address: token.to_string(),
            name: name.filter(|n| !n.is_empty()).unwrap_or_else(|| symbol.clone()),
            symbol,
            decimals,
            logo: None,
        })
    }

    async fn resolve_solana(&self, mint: &str) -> Result<TokenMetadata, ReceiptError> {
        let (listed, onchain) = tokio::join!(self.fetch_jupiter_token(mint), self.mint_decimals(mint));
        if let Some(mut meta) = listed {
            if meta.decimals == 0 {
                meta.decimals = onchain.ok().flatten().unwrap_or(0);
            }
            return Ok(meta);
        }

        let Some(decimals) = onchain? else {
            return Err(ReceiptError::TokenNotFound {
                chain: Chain::Solana,
                token: mint.to_string(),
            });
        };

        let short: String = mint.chars().take(6).collect();
        Ok(TokenMetadata {
            address: mint.to_string(),
            symbol: format!("{short}..."),
            name: format!("{short}..."),
            decimals,
            logo: None,
        })
    }

    /// Listed tokens only; any failure means "not listed".
    async fn fetch_jupiter_token(&self, mint: &str) -> Option<TokenMetadata> {
        let url = format!("{}/{}", self.jupiter_token_url, mint);
        let response = match self.http.get(&url).timeout(JUPITER_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(mint, error = %e, "Jupiter token API unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }

        let data: Value = response.json().await.ok()?;
        let symbol = data["symbol"].as_str().filter(|s| !s.is_empty())?.to_string();
        Some(TokenMetadata {
            address: mint.to_string(),
            name: data["name"].as_str().unwrap_or(&symbol).to_string(),
            decimals: data["decimals"]
                .as_u64()
                .and_then(|d| u8::try_from(d).ok())
                .unwrap_or(0),
            logo: data["logoURI"].as_str().map(str::to_string),
            symbol,
        })
    }

    /// `None` when the mint account does not exist.
    async fn mint_decimals(&self, mint: &str) -> Result<Option<u8>, RpcError> {
        let Some(account) = self.solana.get_account_info(mint).await? else {
            return Ok(None);
        };
        let parsed = &account["data"]["parsed"];
        if parsed["type"].as_str() == Some("mint") {
            let decimals = parsed["info"]["decimals"].as_u64().unwrap_or(0);
            return Ok(Some(u8::try_from(decimals).unwrap_or(0)));
        }
        Ok(Some(0))
    }
}

/// ERC-20 `decimals()` result; 18 when the call returns nothing.
pub fn decimals_or_default(data: &[u8]) -> u8 {
    if data.is_empty() {
        return 18;
    }
    decode_uint(data)
        .and_then(|d| u8::try_from(d).ok())
        .unwrap_or(18)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_ignores_case_and_keeps_requested_address() {
        let token = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";
        let meta = registry_lookup(Chain::Base, token).unwrap();
        assert_eq!(meta.symbol, "USDC");
        assert_eq!(meta.decimals, 6);
        assert_eq!(meta.address, token);
        assert!(registry_lookup(Chain::Solana, token).is_none());

        let eth = registry_lookup(Chain::Base, "eth").unwrap();
        assert_eq!(eth.symbol, "ETH");
        assert_eq!(eth.address, "eth");
        assert_eq!(price_address(Chain::Base, "eth"), BASE_WETH);
        assert_eq!(price_address(Chain::Solana, "SOL"), WSOL_MINT);
    }

    #[test]
    fn symbols_resolve_per_chain() {
        assert_eq!(
            resolve_symbol(Chain::Solana, "usdc"),
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
        );
        assert_eq!(
            resolve_symbol(Chain::Base, "WETH"),
            Some("0x4200000000000000000000000000000000000006")
        );
        assert_eq!(resolve_symbol(Chain::Base, "PEPE"), None);
    }

    #[test]
    fn native_tokens() {
        assert!(is_native_token(Chain::Base, "ETH"));
        assert!(is_native_token(Chain::Base, ZERO_ADDRESS));
        assert!(is_native_token(Chain::Solana, "sol"));
        assert!(is_native_token(Chain::Solana, WSOL_MINT));
        assert!(!is_native_token(Chain::Solana, &WSOL_MINT.to_lowercase()));
        assert!(!is_native_token(Chain::Base, BASE_WETH));
    }

    #[tokio::test]
    async fn injected_cache_answers_before_the_chain() {
        let offline = || RpcClient::new(&["http://127.0.0.1:9".to_string()], "offline").unwrap();
        let token = "0x1234567890AbcdEF1234567890aBcdef12345678";
        let cached = TokenMetadata {
            address: token.to_string(),
            symbol: "TST".into(),
            name: "Test".into(),
            decimals: 9,
            logo: None,
        };
        let cache = MetadataCache::unbounded();
        cache.insert((Chain::Base, token.to_lowercase()), cached.clone()).await;

        let service = MetadataService::new(offline(), offline(), reqwest::Client::new(), cache);
        assert_eq!(service.resolve(Chain::Base, token).await.unwrap(), cached);
    }

    #[test]
    fn decimals_default_to_eighteen() {
        assert_eq!(decimals_or_default(&[]), 18);
        let mut word = [0u8; 32];
        word[31] = 6;
        assert_eq!(decimals_or_default(&word), 6);
    }
}
