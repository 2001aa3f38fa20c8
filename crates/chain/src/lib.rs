//! Chain interaction layer for the flash-loan liquidation bot.
//!
//! This crate provides:
//! - Provider management: lending-pool health reads, dry-run calls with
//!   revert decoding, gas estimation
//! - Swap-quote oracle binding with a bounded-retry wrapper
//! - Flash-liquidator contract calldata encoding
//! - Transaction signing and fire-and-forget broadcast with local nonce
//!   management

mod contracts;
mod provider;
pub mod quote;
mod signer;

pub use contracts::{FlashLiquidatorContract, LiquidateArgs};
pub use provider::{decode_revert, ProviderManager, SimulationError};
pub use quote::{
    OneSplitQuoter, Quote, QuoteError, QuoteOracle, RetryingQuoteClient, DEFAULT_QUOTE_ATTEMPTS,
};
pub use signer::{NonceManager, TransactionSender};
