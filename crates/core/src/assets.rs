//! Flash-loanable market table.
//!
//! The flash-loan provider only supports a small fixed set of markets,
//! identified on-chain by a numeric market id. The borrowed or collateral
//! asset of a position must be looked up here to select a routing strategy;
//! WETH doubles as the bridge asset when neither side is flash-loanable.

use alloy::primitives::{address, Address};
use std::collections::HashMap;

/// A flash-loanable market entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashMarket {
    /// Asset symbol (e.g., "WETH", "DAI")
    pub symbol: &'static str,
    /// Underlying token contract address
    pub token: Address,
    /// Market id expected by the flash-loan provider
    pub market_id: u8,
    /// Token decimals
    pub decimals: u8,
}

impl FlashMarket {
    const fn new(symbol: &'static str, token: Address, market_id: u8, decimals: u8) -> Self {
        Self {
            symbol,
            token,
            market_id,
            decimals,
        }
    }
}

/// WETH - Wrapped Ether (also the bridge asset)
pub const WETH: FlashMarket = FlashMarket::new(
    "WETH",
    address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
    0,
    18,
);

/// DAI - Dai Stablecoin
pub const DAI: FlashMarket = FlashMarket::new(
    "DAI",
    address!("6B175474E89094C44Da98b954EedeAC495271d0F"),
    1,
    18,
);

/// USDC - USD Coin (6 decimals)
pub const USDC: FlashMarket = FlashMarket::new(
    "USDC",
    address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    2,
    6,
);

/// SAI - Single-collateral Dai (legacy)
pub const SAI: FlashMarket = FlashMarket::new(
    "SAI",
    address!("89d24A6b4CcB1B6fAA2625fE562bDD9a23260359"),
    3,
    18,
);

/// All flash-loanable markets.
pub static FLASH_MARKETS: &[FlashMarket] = &[WETH, DAI, USDC, SAI];

/// Market registry for lookups by token address.
#[derive(Debug, Clone)]
pub struct MarketRegistry {
    by_token: HashMap<Address, &'static FlashMarket>,
}

impl MarketRegistry {
    /// Create a new registry from the static market table.
    pub fn new() -> Self {
        let mut by_token = HashMap::with_capacity(FLASH_MARKETS.len());
        for market in FLASH_MARKETS {
            by_token.insert(market.token, market);
        }
        Self { by_token }
    }

    /// Get the market for a token address, if the token is flash-loanable.
    pub fn get(&self, token: &Address) -> Option<&'static FlashMarket> {
        self.by_token.get(token).copied()
    }

    /// Check whether a token is flash-loanable.
    pub fn is_flash_loanable(&self, token: &Address) -> bool {
        self.by_token.contains_key(token)
    }

    /// The designated bridge asset for positions where neither side is
    /// flash-loanable.
    pub fn bridge(&self) -> &'static FlashMarket {
        &WETH
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
