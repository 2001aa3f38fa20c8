//! Spot price client (token -> USD).

use alloy::primitives::Address;
use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Cache key for the native asset price.
const NATIVE_KEY: Address = Address::ZERO;

/// Cached spot price with timestamp for TTL expiration.
#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    usd: f64,
    cached_at: Instant,
}

/// Spot price client with a short-TTL cache.
#[derive(Debug)]
pub struct SpotPriceClient {
    client: reqwest::Client,
    base_url: String,
    cache: DashMap<Address, CachedPrice>,
    cache_ttl: Duration,
}

impl SpotPriceClient {
    pub fn new() -> Self {
        Self::with_base_url("https://api.coingecko.com/api/v3")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(30),
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Current USD spot price of an ERC-20 token.
    #[instrument(skip(self), fields(asset = %asset))]
    pub async fn price_usd(&self, asset: Address) -> Result<f64> {
        if let Some(cached) = self.cached(&asset) {
            return Ok(cached);
        }

        // Price APIs want lowercase hex addresses
        let addr = format!("{asset}").to_lowercase();
        let url = format!("{}/simple/token_price/ethereum", self.base_url);
        let body: Value = self
            .client
            .get(&url)
            .query(&[("contract_addresses", addr.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?
            .json()
            .await?;

        let usd = body
            .get(&addr)
            .and_then(|v| v.get("usd"))
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("no spot price for {asset}"))?;

        self.store(asset, usd);
        debug!(usd, "Spot price fetched");
        Ok(usd)
    }

    /// Current USD spot price of the chain's native asset.
    #[instrument(skip(self))]
    pub async fn native_price_usd(&self) -> Result<f64> {
        if let Some(cached) = self.cached(&NATIVE_KEY) {
            return Ok(cached);
        }

        let url = format!("{}/simple/price", self.base_url);
        let body: Value = self
            .client
            .get(&url)
            .query(&[("ids", "ethereum"), ("vs_currencies", "usd")])
            .send()
            .await?
            .json()
            .await?;

        let usd = body
            .get("ethereum")
            .and_then(|v| v.get("usd"))
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("no native spot price"))?;

        self.store(NATIVE_KEY, usd);
        debug!(usd, "Native spot price fetched");
        Ok(usd)
    }

    fn cached(&self, key: &Address) -> Option<f64> {
        let entry = self.cache.get(key)?;
        if entry.cached_at.elapsed() < self.cache_ttl {
            Some(entry.usd)
        } else {
            None
        }
    }

    fn store(&self, key: Address, usd: f64) {
        self.cache.insert(
            key,
            CachedPrice {
                usd,
                cached_at: Instant::now(),
            },
        );
    }
}

impl Default for SpotPriceClient {
    fn default() -> Self {
        Self::new()
    }
}
