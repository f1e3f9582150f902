use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::metadata::price_address;
use crate::models::Chain;

pub const DEFAULT_JUPITER_PRICE_URL: &str = "https://api.jup.ag/price/v2";
pub const DEFAULT_DEXSCREENER_URL: &str = "https://api.dexscreener.com/latest/dex/tokens";

const PRICE_TIMEOUT: Duration = Duration::from_millis(300);
pub const PRICE_TTL: Duration = Duration::from_secs(30);
const CIRCUIT_OPEN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceProvider {
    Jupiter,
    DexScreener,
}

impl PriceProvider {
    pub fn for_chain(chain: Chain) -> Self {
        match chain {
            Chain::Solana => PriceProvider::Jupiter,
            Chain::Base => PriceProvider::DexScreener,
        }
    }
}

/// Providers that rate-limited or rejected us, with the instant they may be tried again.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    open_until: Arc<Mutex<HashMap<PriceProvider, Instant>>>,
}

impl CircuitBreaker {
    pub fn is_open(&self, provider: PriceProvider) -> bool {
        let Ok(mut open_until) = self.open_until.lock() else {
            return false;
        };
        match open_until.get(&provider) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                open_until.remove(&provider);
                false
            }
            None => false,
        }
    }

    pub fn trip(&self, provider: PriceProvider) {
        if let Ok(mut open_until) = self.open_until.lock() {
            open_until.insert(provider, Instant::now() + CIRCUIT_OPEN);
        }
        warn!(?provider, "price provider circuit opened");
    }
}

/// USD prices keyed by `chain:address`; built with [`PRICE_TTL`].
pub type PriceCache = TtlCache<String, f64>;

/// Spot USD prices. Never fails: every problem collapses to `None`.
#[derive(Clone)]
pub struct PriceService {
    http: reqwest::Client,
    jupiter_url: String,
    dexscreener_url: String,
    jupiter_api_key: Option<String>,
    cache: PriceCache,
    breaker: CircuitBreaker,
}

impl PriceService {
    pub fn new(http: reqwest::Client, jupiter_api_key: Option<String>, cache: PriceCache) -> Self {
        Self {
            http,
            jupiter_url: DEFAULT_JUPITER_PRICE_URL.to_string(),
            dexscreener_url: DEFAULT_DEXSCREENER_URL.to_string(),
            jupiter_api_key,
            cache,
            breaker: CircuitBreaker::default(),
        }
    }

    pub fn with_urls(mut self, jupiter_url: &str, dexscreener_url: &str) -> Self {
        self.jupiter_url = jupiter_url.trim_end_matches('/').to_string();
        self.dexscreener_url = dexscreener_url.trim_end_matches('/').to_string();
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn price(&self, chain: Chain, token: &str) -> Option<f64> {
        let token = price_address(chain, token);
        let key = format!("{chain}:{}", token.to_lowercase());
        if let Some(price) = self.cache.get(&key).await {
            return Some(price);
        }

        let price = match timeout(PRICE_TIMEOUT, self.fetch(chain, token)).await {
            Ok(price) => price?,
            Err(_) => {
                debug!(chain = %chain, token, "price fetch timed out");
                return None;
            }
        };
        self.cache.insert(key, price).await;
        Some(price)
    }

    async fn fetch(&self, chain: Chain, token: &str) -> Option<f64> {
        let provider = PriceProvider::for_chain(chain);
        if self.breaker.is_open(provider) {
            return None;
        }

        let result = match provider {
            PriceProvider::Jupiter => self.fetch_jupiter(token).await,
            PriceProvider::DexScreener => self.fetch_dexscreener(token).await,
        };
        match result {
            Ok(price) => price,
            Err(e) => {
                warn!(?provider, token, error = %e, "price API error");
                None
            }
        }
    }

    async fn fetch_jupiter(&self, mint: &str) -> Result<Option<f64>, reqwest::Error> {
        let mut request = self.http.get(&self.jupiter_url).query(&[("ids", mint)]);
        if let Some(key) = &self.jupiter_api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        if status == 401 || status == 429 {
            self.breaker.trip(PriceProvider::Jupiter);
            return Ok(None);
        }

        let body: Value = response.json().await?;
        Ok(parse_price(&body["data"][mint]["price"]))
    }

    async fn fetch_dexscreener(&self, token: &str) -> Result<Option<f64>, reqwest::Error> {
        let url = format!("{}/{}", self.dexscreener_url, token);
        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            self.breaker.trip(PriceProvider::DexScreener);
            return Ok(None);
        }

        let body: Value = response.json().await?;
        Ok(body["pairs"]
            .as_array()
            .and_then(|pairs| pairs.first())
            .and_then(|pair| parse_price(&pair["priceUsd"])))
    }
}

/// Providers send prices as strings or numbers.
fn parse_price(value: &Value) -> Option<f64> {
    let price: Option<f64> = match value {
        Value::String(text) => text.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    price.filter(|p| p.is_finite() && *p > 0.0)
}
