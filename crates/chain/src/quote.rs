//! Swap-quote oracle binding and bounded-retry wrapper.
//!
//! The aggregator's `getExpectedReturn` view call returns the expected output
//! amount and the routing weight distribution across its liquidity sources.
//! RPC nodes drop these heavy view calls often enough that a single attempt is
//! useless in practice; [`RetryingQuoteClient`] re-issues the call immediately
//! (no backoff) up to a fixed attempt budget.

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

sol! {
    #[sol(rpc)]
    interface IOneSplit {
        function getExpectedReturn(
            address fromToken,
            address toToken,
            uint256 amount,
            uint256 parts,
            uint256 flags
        ) external view returns (uint256 returnAmount, uint256[] memory distribution);
    }
}

/// Route split granularity requested from the aggregator.
const QUOTE_PARTS: u64 = 100;
/// No feature flags: all liquidity sources enabled.
const QUOTE_FLAGS: u64 = 0;

/// Default attempt budget for quote calls.
pub const DEFAULT_QUOTE_ATTEMPTS: u32 = 20;

/// Expected output and routing weights for a token pair and amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Expected output amount in the destination asset's smallest unit
    pub return_amount: U256,
    /// Routing weights across the aggregator's liquidity sources
    pub distribution: Vec<U256>,
}

/// Quote oracle failures.
#[derive(Debug, Clone, Error)]
pub enum QuoteError {
    /// A single oracle call failed (transport or oracle-side).
    #[error("quote oracle call failed: {0}")]
    Oracle(String),
    /// The attempt budget was exhausted; carries the oracle's last message.
    #[error("quote failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl QuoteError {
    /// The underlying oracle message, for diagnostics.
    pub fn message(&self) -> &str {
        match self {
            QuoteError::Oracle(msg) => msg,
            QuoteError::Exhausted { last, .. } => last,
        }
    }
}

/// A swap-quote oracle: expected output amount and routing weights for
/// exchanging `amount` of `from` into `to`.
///
/// `amount` must already be scaled to the source asset's smallest unit.
/// Implementations must be side-effect free beyond the outbound call.
#[async_trait]
pub trait QuoteOracle: Send + Sync + Debug {
    async fn expected_return(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Quote, QuoteError>;
}

/// On-chain aggregator quote oracle.
#[derive(Debug, Clone)]
pub struct OneSplitQuoter {
    rpc_url: String,
    address: Address,
}

impl OneSplitQuoter {
    pub fn new(rpc_url: impl Into<String>, address: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            address,
        }
    }
}

#[async_trait]
impl QuoteOracle for OneSplitQuoter {
    async fn expected_return(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Quote, QuoteError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| QuoteError::Oracle(format!("invalid rpc url: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);
        let aggregator = IOneSplit::new(self.address, &provider);

        let out = aggregator
            .getExpectedReturn(
                from,
                to,
                amount,
                U256::from(QUOTE_PARTS),
                U256::from(QUOTE_FLAGS),
            )
            .call()
            .await
            .map_err(|e| QuoteError::Oracle(e.to_string()))?;

        Ok(Quote {
            return_amount: out.returnAmount,
            distribution: out.distribution,
        })
    }
}

/// Bounded-retry wrapper around a quote oracle.
///
/// Each retry is an immediate re-issue; identical queries are never cached or
/// deduplicated. After the budget is exhausted the error retains the oracle's
/// last failure message.
#[derive(Debug, Clone)]
pub struct RetryingQuoteClient {
    oracle: Arc<dyn QuoteOracle>,
    max_attempts: u32,
}

impl RetryingQuoteClient {
    pub fn new(oracle: Arc<dyn QuoteOracle>) -> Self {
        Self {
            oracle,
            max_attempts: DEFAULT_QUOTE_ATTEMPTS,
        }
    }

    /// Set the attempt budget (minimum 1).
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Query the oracle, retrying up to the attempt budget.
    pub async fn quote(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Quote, QuoteError> {
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            match self.oracle.expected_return(from, to, amount).await {
                Ok(quote) => {
                    if attempt > 1 {
                        debug!(attempt, %from, %to, "Quote succeeded after retry");
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    warn!(attempt, max = self.max_attempts, error = %e, "Quote attempt failed");
                    last = e.message().to_string();
                }
            }
        }

        Err(QuoteError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}
