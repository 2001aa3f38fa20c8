//! Flash-loan route planning.
//!
//! Exactly one of three mutually exclusive strategies produces every plan,
//! selected by whether the borrowed asset or the collateral asset is
//! flash-loanable. The borrowed asset always wins when both qualify.
//!
//! All amounts sent to the quote oracle are scaled [`TokenAmount`]s; the
//! human-unit `Decimal` values from the feed never cross this boundary.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::amount::{AmountError, TokenAmount};
use crate::assets::{FlashMarket, MarketRegistry};
use crate::position::{CollateralEntry, ReserveInfo};
use flashliq_chain::{QuoteError, RetryingQuoteClient};

/// What a swap leg is for, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPurpose {
    /// Before liquidation: obtain the asset needed to repay the debt.
    PreLiquidation,
    /// After liquidation: convert seized collateral back to the flash asset.
    PostLiquidation,
    /// Convert leftover borrowed asset back after repayment.
    LeftoverReserve,
}

/// One quoted swap leg of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLeg {
    pub purpose: SwapPurpose,
    pub from: Address,
    pub to: Address,
    /// Routing weights across the aggregator's liquidity sources
    pub distribution: Vec<U256>,
}

/// The routing strategy that produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStrategy {
    /// The borrowed asset itself is flash-loanable: borrow exactly the amount
    /// owed and swap seized collateral back for repayment.
    Borrowed(&'static FlashMarket),
    /// Only the collateral asset is flash-loanable: swap collateral into the
    /// debt asset before liquidation, swap leftovers back after.
    Collateral(&'static FlashMarket),
    /// Neither is flash-loanable: route through the bridge asset.
    Bridge(&'static FlashMarket),
}

impl RouteStrategy {
    /// The market being flash-borrowed.
    pub fn market(&self) -> &'static FlashMarket {
        match self {
            RouteStrategy::Borrowed(m)
            | RouteStrategy::Collateral(m)
            | RouteStrategy::Bridge(m) => m,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RouteStrategy::Borrowed(_) => "borrowed-asset",
            RouteStrategy::Collateral(_) => "collateral-asset",
            RouteStrategy::Bridge(_) => "bridge-asset",
        }
    }
}

/// Select the routing strategy for a (borrowed, collateral) asset pair.
/// The borrowed asset's membership always takes precedence.
pub fn classify(
    registry: &MarketRegistry,
    borrowed: &Address,
    collateral: &Address,
) -> RouteStrategy {
    if let Some(market) = registry.get(borrowed) {
        return RouteStrategy::Borrowed(market);
    }
    if let Some(market) = registry.get(collateral) {
        return RouteStrategy::Collateral(market);
    }
    RouteStrategy::Bridge(registry.bridge())
}

/// A complete flash-loan plan for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub strategy: RouteStrategy,
    /// Amount to flash-borrow, in the flash asset's smallest unit
    pub flash_amount: TokenAmount,
    /// Quoted swap legs, tagged by purpose
    pub legs: Vec<SwapLeg>,
    /// Bridge-strategy margin headroom above the raw quote; swapped back
    /// separately after repayment
    pub leftover_reserve: Option<TokenAmount>,
}

impl RoutePlan {
    pub fn flash_market(&self) -> &'static FlashMarket {
        self.strategy.market()
    }

    fn distribution_for(&self, purpose: SwapPurpose) -> Vec<U256> {
        self.legs
            .iter()
            .find(|leg| leg.purpose == purpose)
            .map(|leg| leg.distribution.clone())
            .unwrap_or_default()
    }

    /// Routing weights for the pre-liquidation swap (empty if none).
    pub fn distribution_to(&self) -> Vec<U256> {
        self.distribution_for(SwapPurpose::PreLiquidation)
    }

    /// Routing weights for the post-liquidation swap (empty if none).
    pub fn distribution_from(&self) -> Vec<U256> {
        self.distribution_for(SwapPurpose::PostLiquidation)
    }
}

/// Route planning failures; terminal for the candidate, not the pass.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Flash-loan route planner.
#[derive(Debug, Clone)]
pub struct RoutePlanner {
    registry: MarketRegistry,
    quotes: RetryingQuoteClient,
}

impl RoutePlanner {
    pub fn new(quotes: RetryingQuoteClient) -> Self {
        Self {
            registry: MarketRegistry::new(),
            quotes,
        }
    }

    pub fn registry(&self) -> &MarketRegistry {
        &self.registry
    }

    /// Plan the flash loan and swap routes for liquidating `borrowed_amount`
    /// of `borrowed` against the selected `collateral` entry.
    #[instrument(skip(self, collateral), fields(borrowed = %borrowed.symbol, collateral = %collateral.reserve.symbol))]
    pub async fn plan(
        &self,
        borrowed: &ReserveInfo,
        borrowed_amount: Decimal,
        collateral: &CollateralEntry,
    ) -> Result<RoutePlan, PlanError> {
        let owed = TokenAmount::from_units(borrowed_amount, borrowed.decimals)?;
        let collateral_balance =
            TokenAmount::from_units(collateral.balance, collateral.reserve.decimals)?;

        let strategy = classify(&self.registry, &borrowed.address, &collateral.reserve.address);
        debug!(strategy = strategy.name(), "Routing strategy selected");

        match strategy {
            RouteStrategy::Borrowed(_) => {
                self.plan_borrowed(strategy, borrowed, owed, collateral, collateral_balance)
                    .await
            }
            RouteStrategy::Collateral(market) => {
                self.plan_collateral(strategy, market, borrowed, collateral, collateral_balance)
                    .await
            }
            RouteStrategy::Bridge(market) => {
                self.plan_bridge(strategy, market, borrowed, owed, collateral, collateral_balance)
                    .await
            }
        }
    }

    /// Strategy 1: flash-borrow exactly the amount owed; one query for the
    /// post-liquidation swap sized at the full collateral balance.
    async fn plan_borrowed(
        &self,
        strategy: RouteStrategy,
        borrowed: &ReserveInfo,
        owed: TokenAmount,
        collateral: &CollateralEntry,
        collateral_balance: TokenAmount,
    ) -> Result<RoutePlan, PlanError> {
        let quote = self
            .quotes
            .quote(
                collateral.reserve.address,
                borrowed.address,
                collateral_balance.raw(),
            )
            .await?;

        Ok(RoutePlan {
            strategy,
            flash_amount: owed,
            legs: vec![SwapLeg {
                purpose: SwapPurpose::PostLiquidation,
                from: collateral.reserve.address,
                to: borrowed.address,
                distribution: quote.distribution,
            }],
            leftover_reserve: None,
        })
    }

    /// Strategy 2: flash-borrow the collateral asset, sized by quoting the
    /// full collateral balance into the debt asset; leftovers of the debt
    /// asset are swapped back afterwards.
    async fn plan_collateral(
        &self,
        strategy: RouteStrategy,
        market: &'static FlashMarket,
        borrowed: &ReserveInfo,
        collateral: &CollateralEntry,
        collateral_balance: TokenAmount,
    ) -> Result<RoutePlan, PlanError> {
        let repay_quote = self
            .quotes
            .quote(
                collateral.reserve.address,
                borrowed.address,
                collateral_balance.raw(),
            )
            .await?;

        let flash_amount = TokenAmount::from_raw(repay_quote.return_amount, market.decimals);

        let reserve_quote = self
            .quotes
            .quote(
                borrowed.address,
                collateral.reserve.address,
                repay_quote.return_amount,
            )
            .await?;

        Ok(RoutePlan {
            strategy,
            flash_amount,
            legs: vec![
                SwapLeg {
                    purpose: SwapPurpose::PreLiquidation,
                    from: collateral.reserve.address,
                    to: borrowed.address,
                    distribution: repay_quote.distribution,
                },
                SwapLeg {
                    purpose: SwapPurpose::LeftoverReserve,
                    from: borrowed.address,
                    to: collateral.reserve.address,
                    distribution: reserve_quote.distribution,
                },
            ],
            leftover_reserve: None,
        })
    }

    /// Strategy 3: flash-borrow the bridge asset. The sizing query output is
    /// inflated by the fixed 5% margin against slippage between quote and
    /// execution; the headroom is recorded as the leftover reserve.
    async fn plan_bridge(
        &self,
        strategy: RouteStrategy,
        market: &'static FlashMarket,
        borrowed: &ReserveInfo,
        owed: TokenAmount,
        collateral: &CollateralEntry,
        collateral_balance: TokenAmount,
    ) -> Result<RoutePlan, PlanError> {
        // How much bridge asset the owed amount is worth
        let sizing_quote = self
            .quotes
            .quote(borrowed.address, market.token, owed.raw())
            .await?;

        let raw_need = TokenAmount::from_raw(sizing_quote.return_amount, market.decimals);
        let flash_amount = raw_need.with_safety_margin();
        let leftover_reserve = flash_amount.checked_sub(&raw_need);

        // Bridge -> debt asset, at the margin-inflated amount
        let to_quote = self
            .quotes
            .quote(market.token, borrowed.address, flash_amount.raw())
            .await?;

        // Collateral -> bridge, at the full collateral balance
        let from_quote = self
            .quotes
            .quote(
                collateral.reserve.address,
                market.token,
                collateral_balance.raw(),
            )
            .await?;

        Ok(RoutePlan {
            strategy,
            flash_amount,
            legs: vec![
                SwapLeg {
                    purpose: SwapPurpose::PreLiquidation,
                    from: market.token,
                    to: borrowed.address,
                    distribution: to_quote.distribution,
                },
                SwapLeg {
                    purpose: SwapPurpose::PostLiquidation,
                    from: collateral.reserve.address,
                    to: market.token,
                    distribution: from_quote.distribution,
                },
            ],
            leftover_reserve,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::pow10;
    use crate::assets::{DAI, USDC, WETH};
    use async_trait::async_trait;
    use flashliq_chain::{Quote, QuoteOracle};
    use std::sync::{Arc, Mutex};

    /// Oracle that answers from a script and records every call.
    #[derive(Debug)]
    struct ScriptedOracle {
        responses: Mutex<Vec<Quote>>,
        calls: Mutex<Vec<(Address, Address, U256)>>,
    }

    impl ScriptedOracle {
        fn new(responses: Vec<Quote>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Address, Address, U256)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuoteOracle for ScriptedOracle {
        async fn expected_return(
            &self,
            from: Address,
            to: Address,
            amount: U256,
        ) -> Result<Quote, flashliq_chain::QuoteError> {
            self.calls.lock().unwrap().push((from, to, amount));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(flashliq_chain::QuoteError::Oracle(
                    "script exhausted".to_string(),
                ));
            }
            Ok(responses.remove(0))
        }
    }

    fn quote(return_amount: u64, weights: &[u64]) -> Quote {
        Quote {
            return_amount: U256::from(return_amount),
            distribution: weights.iter().map(|w| U256::from(*w)).collect(),
        }
    }

    fn reserve(market: &FlashMarket) -> ReserveInfo {
        ReserveInfo {
            address: market.token,
            symbol: market.symbol.to_string(),
            decimals: market.decimals,
        }
    }

    fn other_reserve(byte: u8, symbol: &str) -> ReserveInfo {
        ReserveInfo {
            address: Address::repeat_byte(byte),
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }

    fn collateral_entry(reserve: ReserveInfo, balance: i64, value_usd: i64) -> CollateralEntry {
        CollateralEntry {
            reserve,
            balance: Decimal::from(balance),
            value_usd: Decimal::from(value_usd),
        }
    }

    fn planner(oracle: Arc<ScriptedOracle>) -> RoutePlanner {
        RoutePlanner::new(RetryingQuoteClient::new(oracle).with_attempts(1))
    }

    #[test]
    fn test_classification_precedence() {
        let registry = MarketRegistry::new();

        // Borrowed flash-loanable wins even when collateral also qualifies
        let strategy = classify(&registry, &DAI.token, &USDC.token);
        assert!(matches!(strategy, RouteStrategy::Borrowed(m) if m.symbol == "DAI"));

        // Only collateral flash-loanable
        let unlisted = Address::repeat_byte(0x42);
        let strategy = classify(&registry, &unlisted, &USDC.token);
        assert!(matches!(strategy, RouteStrategy::Collateral(m) if m.symbol == "USDC"));

        // Neither: bridge through WETH
        let strategy = classify(&registry, &unlisted, &Address::repeat_byte(0x43));
        assert!(matches!(strategy, RouteStrategy::Bridge(m) if m.symbol == "WETH"));
    }

    #[tokio::test]
    async fn test_borrowed_strategy_end_to_end() {
        // DAI borrowed (flash-loanable), WETH collateral worth $2000:
        // one quote WETH -> DAI at the full collateral balance,
        // flash amount = 1000 * 10^18.
        let oracle = ScriptedOracle::new(vec![quote(999_000, &[60, 40, 0, 0])]);
        let planner = planner(oracle.clone());

        let borrowed = reserve(&DAI);
        let collateral = collateral_entry(reserve(&WETH), 1, 2000);

        let plan = planner
            .plan(&borrowed, Decimal::from(1000), &collateral)
            .await
            .unwrap();

        assert!(matches!(plan.strategy, RouteStrategy::Borrowed(m) if m.symbol == "DAI"));
        assert_eq!(plan.flash_amount.raw(), U256::from(1000u64) * pow10(18));
        assert_eq!(plan.flash_market().market_id, DAI.market_id);

        // Exactly one query, collateral -> borrowed, full balance scaled
        let calls = oracle.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, WETH.token);
        assert_eq!(calls[0].1, DAI.token);
        assert_eq!(calls[0].2, U256::from(1u64) * pow10(18));

        // The single leg is the post-liquidation swap
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].purpose, SwapPurpose::PostLiquidation);
        assert!(plan.distribution_to().is_empty());
        assert_eq!(plan.distribution_from().len(), 4);
        assert!(plan.leftover_reserve.is_none());
    }

    #[tokio::test]
    async fn test_collateral_strategy() {
        // Borrowed asset unlisted, USDC collateral: two queries.
        let oracle = ScriptedOracle::new(vec![
            quote(750_000_000, &[100, 0]), // collateral -> borrowed
            quote(480_000, &[0, 100]),     // borrowed -> collateral (reserve)
        ]);
        let planner = planner(oracle.clone());

        let borrowed = other_reserve(0x42, "XYZ");
        let collateral = collateral_entry(reserve(&USDC), 500, 500);

        let plan = planner
            .plan(&borrowed, Decimal::from(700), &collateral)
            .await
            .unwrap();

        assert!(matches!(plan.strategy, RouteStrategy::Collateral(m) if m.symbol == "USDC"));
        // Flash amount derived from the sizing query
        assert_eq!(plan.flash_amount.raw(), U256::from(750_000_000u64));
        assert_eq!(plan.flash_amount.decimals(), USDC.decimals);

        let calls = oracle.calls();
        assert_eq!(calls.len(), 2);
        // First query at the full collateral balance (500 USDC, 6 decimals)
        assert_eq!(calls[0].2, U256::from(500u64) * pow10(6));
        // Second query sized at the first query's output
        assert_eq!(calls[1].2, U256::from(750_000_000u64));

        assert_eq!(plan.legs[0].purpose, SwapPurpose::PreLiquidation);
        assert_eq!(plan.legs[1].purpose, SwapPurpose::LeftoverReserve);
    }

    #[tokio::test]
    async fn test_bridge_strategy_applies_margin() {
        // Neither side flash-loanable: three queries through WETH.
        let oracle = ScriptedOracle::new(vec![
            quote(1000, &[100]),    // borrowed -> bridge (sizing)
            quote(680, &[50, 50]),  // bridge -> borrowed
            quote(990, &[25, 75]),  // collateral -> bridge
        ]);
        let planner = planner(oracle.clone());

        let borrowed = other_reserve(0x42, "XYZ");
        let collateral = collateral_entry(other_reserve(0x43, "ABC"), 2, 990);

        let plan = planner
            .plan(&borrowed, Decimal::from(700), &collateral)
            .await
            .unwrap();

        assert!(matches!(plan.strategy, RouteStrategy::Bridge(m) if m.symbol == "WETH"));
        // margined = 1000 + floor(1000 * 5 / 100) = 1050
        assert_eq!(plan.flash_amount.raw(), U256::from(1050u64));
        // The 5% headroom is the leftover reserve
        assert_eq!(plan.leftover_reserve.unwrap().raw(), U256::from(50u64));

        let calls = oracle.calls();
        assert_eq!(calls.len(), 3);
        // Sizing query at the owed amount
        assert_eq!(calls[0].0, borrowed.address);
        assert_eq!(calls[0].1, WETH.token);
        assert_eq!(calls[0].2, U256::from(700u64) * pow10(18));
        // Pre-liquidation swap sized at the margin-inflated amount
        assert_eq!(calls[1].2, U256::from(1050u64));
        // Post-liquidation swap at the full collateral balance
        assert_eq!(calls[2].2, U256::from(2u64) * pow10(18));

        assert_eq!(plan.distribution_to(), vec![U256::from(50u64), U256::from(50u64)]);
        assert_eq!(plan.distribution_from(), vec![U256::from(25u64), U256::from(75u64)]);
    }

    #[tokio::test]
    async fn test_planning_is_deterministic() {
        // Same position and same scripted responses twice -> identical plans.
        let borrowed = reserve(&DAI);
        let collateral = collateral_entry(reserve(&WETH), 1, 2000);

        let mut plans = Vec::new();
        for _ in 0..2 {
            let oracle = ScriptedOracle::new(vec![quote(999_000, &[60, 40])]);
            let planner = planner(oracle);
            plans.push(
                planner
                    .plan(&borrowed, Decimal::from(1000), &collateral)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(plans[0], plans[1]);
    }

    #[tokio::test]
    async fn test_quote_failure_is_terminal() {
        let oracle = ScriptedOracle::new(vec![]);
        let planner = planner(oracle);

        let borrowed = reserve(&DAI);
        let collateral = collateral_entry(reserve(&WETH), 1, 2000);

        let err = planner
            .plan(&borrowed, Decimal::from(1000), &collateral)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Quote(_)));
    }
}
