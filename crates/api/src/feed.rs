//! Liquidation-candidate feed client.
//!
//! The protocol API reports positions at or near liquidation, one page per
//! request. Numeric fields arrive as JSON strings with full precision, so
//! they deserialize into `Decimal`; addresses parse into canonical
//! `alloy::Address` form so downstream comparisons and map keys never see a
//! casing mismatch.

use alloy::primitives::Address;
use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Default liquidations endpoint.
const DEFAULT_FEED_URL: &str = "https://protocol-api.aave.com/data/users/liquidations";

/// Candidate-position feed client.
#[derive(Debug, Clone)]
pub struct PositionFeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl PositionFeedClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_FEED_URL.to_string(),
        }
    }

    /// Create a client with a custom endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch one page of candidate positions.
    #[instrument(skip(self))]
    pub async fn fetch_candidates(&self) -> Result<Vec<Cdp>> {
        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("candidate feed returned {}", response.status());
        }

        let data: CandidatesResponse = response.json().await?;
        debug!(count = data.data.len(), "Fetched candidate positions");

        Ok(data.data)
    }
}

impl Default for PositionFeedClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Response wrapper for the liquidations endpoint.
#[derive(Debug, Deserialize)]
pub struct CandidatesResponse {
    pub data: Vec<Cdp>,
}

/// One candidate CDP: a borrow against a borrower's collateral set.
#[derive(Debug, Clone, Deserialize)]
pub struct Cdp {
    /// Borrowed amount in human units
    #[serde(
        rename = "principalBorrows",
        deserialize_with = "deserialize_decimal"
    )]
    pub principal_borrows: Decimal,

    /// Borrowed reserve
    pub reserve: Reserve,

    /// Borrower with their full collateral set
    pub user: CdpUser,
}

/// A reserve (asset listed on the lending protocol).
#[derive(Debug, Clone, Deserialize)]
pub struct Reserve {
    /// Asset symbol
    pub symbol: String,

    /// Token decimals (string or number in the API)
    #[serde(deserialize_with = "deserialize_u8")]
    pub decimals: u8,

    /// Token address, canonicalized
    #[serde(rename = "id", deserialize_with = "deserialize_address")]
    pub id: Address,
}

/// The borrower side of a CDP.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpUser {
    /// Borrower address, canonicalized
    #[serde(rename = "id", deserialize_with = "deserialize_address")]
    pub id: Address,

    /// Total borrows in USD as reported by the feed
    #[serde(
        rename = "totalBorrowsUSD",
        deserialize_with = "deserialize_decimal"
    )]
    pub total_borrows_usd: Decimal,

    /// Health factor as reported by the feed (eventually consistent)
    #[serde(
        rename = "healthFactor",
        deserialize_with = "deserialize_f64"
    )]
    pub health_factor: f64,

    /// Collateral entries
    #[serde(rename = "reservesData", default)]
    pub reserves_data: Vec<CollateralReserve>,
}

/// One collateral entry of a borrower.
#[derive(Debug, Clone, Deserialize)]
pub struct CollateralReserve {
    /// Deposited balance in human units
    #[serde(
        rename = "principalATokenBalance",
        deserialize_with = "deserialize_decimal"
    )]
    pub principal_atoken_balance: Decimal,

    /// Collateral reserve
    pub reserve: Reserve,

    /// USD value of the balance at snapshot time
    #[serde(
        rename = "currentUnderlyingBalanceUSD",
        deserialize_with = "deserialize_decimal"
    )]
    pub current_underlying_balance_usd: Decimal,
}

// Custom deserializers: the feed is inconsistent about string vs. number.

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(f64),
}

fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => {
            Decimal::from_f64(n).ok_or_else(|| serde::de::Error::custom("non-finite number"))
        }
    }
}

fn deserialize_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}

fn deserialize_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n as u8),
    }
}

fn deserialize_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
