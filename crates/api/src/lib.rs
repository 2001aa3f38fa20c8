//! External service clients for the flash-loan liquidation bot.
//!
//! This crate provides HTTP clients for:
//! - The protocol's liquidation-candidate feed
//! - Gas-price oracles, behind a background-refreshed multi-tier cache
//! - Spot prices (token -> USD)

mod feed;
mod gas;
mod spot;

pub use feed::{Cdp, CdpUser, CollateralReserve, PositionFeedClient, Reserve};
pub use gas::{
    GasOracleEndpoint, GasPriceSnapshot, GasPriceTracker, TickError, TierFields,
    GAS_REFRESH_INTERVAL,
};
pub use spot::SpotPriceClient;
