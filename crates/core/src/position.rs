//! Candidate position snapshot.
//!
//! A read-only view of one borrow against a borrower's collateral set, as
//! reported by the upstream feed. Amounts stay in human units (`Decimal`)
//! until route planning scales them to smallest units; the feed is eventually
//! consistent, so nothing here is authoritative until the on-chain health
//! re-check passes.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use smallvec::SmallVec;

use flashliq_api::{Cdp, CollateralReserve, Reserve};

/// Reserve identity: address, symbol, decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl From<Reserve> for ReserveInfo {
    fn from(reserve: Reserve) -> Self {
        Self {
            address: reserve.id,
            symbol: reserve.symbol,
            decimals: reserve.decimals,
        }
    }
}

/// One collateral entry of a borrower.
#[derive(Debug, Clone, PartialEq)]
pub struct CollateralEntry {
    pub reserve: ReserveInfo,
    /// Deposited balance in human units
    pub balance: Decimal,
    /// USD value at snapshot time
    pub value_usd: Decimal,
}

impl From<CollateralReserve> for CollateralEntry {
    fn from(entry: CollateralReserve) -> Self {
        Self {
            reserve: entry.reserve.into(),
            balance: entry.principal_atoken_balance,
            value_usd: entry.current_underlying_balance_usd,
        }
    }
}

/// A candidate position: one borrow plus the borrower's collateral set.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Borrower address
    pub borrower: Address,
    /// Borrowed reserve
    pub borrowed: ReserveInfo,
    /// Borrowed amount in human units
    pub borrowed_amount: Decimal,
    /// Borrower's total borrows in USD, as reported by the feed
    pub total_borrows_usd: Decimal,
    /// Health factor as reported by the feed
    pub health_factor: f64,
    /// Collateral entries
    pub collaterals: SmallVec<[CollateralEntry; 4]>,
}

impl Position {
    /// The collateral entry with the highest USD value; this is the one the
    /// planner seizes.
    pub fn largest_collateral(&self) -> Option<&CollateralEntry> {
        self.collaterals
            .iter()
            .max_by(|a, b| a.value_usd.cmp(&b.value_usd))
    }

    /// Cheap local pre-filter applied before the expensive on-chain health
    /// re-check: the reported borrow value must exceed the minimum and the
    /// reported health factor must be positive.
    pub fn passes_prefilter(&self, min_borrow_usd: Decimal) -> bool {
        self.total_borrows_usd > min_borrow_usd && self.health_factor > 0.0
    }
}

impl From<Cdp> for Position {
    fn from(cdp: Cdp) -> Self {
        Self {
            borrower: cdp.user.id,
            borrowed: cdp.reserve.into(),
            borrowed_amount: cdp.principal_borrows,
            total_borrows_usd: cdp.user.total_borrows_usd,
            health_factor: cdp.user.health_factor,
            collaterals: cdp.user.reserves_data.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserve(symbol: &str, byte: u8, decimals: u8) -> ReserveInfo {
        ReserveInfo {
            address: Address::repeat_byte(byte),
            symbol: symbol.to_string(),
            decimals,
        }
    }

    fn collateral(symbol: &str, byte: u8, balance: i64, value_usd: i64) -> CollateralEntry {
        CollateralEntry {
            reserve: reserve(symbol, byte, 18),
            balance: Decimal::from(balance),
            value_usd: Decimal::from(value_usd),
        }
    }

    fn position(total_borrows_usd: i64, health_factor: f64) -> Position {
        Position {
            borrower: Address::repeat_byte(0xaa),
            borrowed: reserve("DAI", 0x01, 18),
            borrowed_amount: Decimal::from(1000),
            total_borrows_usd: Decimal::from(total_borrows_usd),
            health_factor,
            collaterals: SmallVec::new(),
        }
    }

    #[test]
    fn test_largest_collateral() {
        let mut pos = position(1000, 0.95);
        pos.collaterals.push(collateral("WETH", 0x02, 1, 2000));
        pos.collaterals.push(collateral("USDC", 0x03, 500, 500));
        pos.collaterals.push(collateral("WBTC", 0x04, 1, 1800));

        let largest = pos.largest_collateral().unwrap();
        assert_eq!(largest.reserve.symbol, "WETH");
    }

    #[test]
    fn test_largest_collateral_empty() {
        let pos = position(1000, 0.95);
        assert!(pos.largest_collateral().is_none());
    }

    #[test]
    fn test_prefilter() {
        let min = Decimal::ONE;

        // Healthy-looking candidate passes
        assert!(position(1000, 0.95).passes_prefilter(min));

        // Borrow value at the minimum is excluded (strictly greater required)
        assert!(!position(1, 0.95).passes_prefilter(min));

        // Zero or negative reported health factor is excluded
        assert!(!position(1000, 0.0).passes_prefilter(min));
        assert!(!position(1000, -1.0).passes_prefilter(min));
    }
}
