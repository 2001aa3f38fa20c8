//! Net-profit evaluation for simulated liquidations.
//!
//! The simulated `liquidate` call returns a raw profit amount in the flash
//! asset's smallest unit. Converting it to USD goes through the flash
//! market's table decimals — never through a sentinel address comparison —
//! so the conversion branch cannot disagree with the asset.

use alloy::primitives::U256;
use thiserror::Error;
use tracing::debug;

use crate::amount::TokenAmount;
use crate::assets::FlashMarket;

/// Fixed safety margin (USD) absorbing estimation error between simulation
/// and execution: price movement, slippage beyond quoted routes, gas drift.
pub const DEFAULT_SAFETY_MARGIN_USD: f64 = 0.2;

/// Submit/skip decision for one evaluated candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Submit,
    Skip,
}

/// Result of evaluating one simulated liquidation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Raw simulated return (flash asset smallest unit)
    pub return_raw: U256,
    /// Simulated return in human units of the flash asset
    pub return_units: f64,
    /// Estimated profit in USD
    pub profit_usd: f64,
    /// Estimated gas cost in USD
    pub gas_cost_usd: f64,
    pub decision: Decision,
}

/// Spot-price failures surface as a hard stop for the candidate's profit
/// decision; the pipeline maps them to a skip.
#[derive(Debug, Clone, Error)]
pub enum EvaluationError {
    #[error("invalid {context} price: {value}")]
    InvalidPrice { context: &'static str, value: f64 },
}

/// Profit evaluator with a fixed USD safety margin.
#[derive(Debug, Clone, Copy)]
pub struct ProfitEvaluator {
    safety_margin_usd: f64,
}

impl ProfitEvaluator {
    pub fn new() -> Self {
        Self {
            safety_margin_usd: DEFAULT_SAFETY_MARGIN_USD,
        }
    }

    pub fn with_margin(safety_margin_usd: f64) -> Self {
        Self { safety_margin_usd }
    }

    pub fn safety_margin_usd(&self) -> f64 {
        self.safety_margin_usd
    }

    /// Evaluate a simulated liquidation.
    ///
    /// - `return_raw`: simulated return in the flash asset's smallest unit
    /// - `flash_market`: the flash-borrowed market (supplies the decimals)
    /// - `flash_spot_usd`: spot price of the flash asset
    /// - `gas_used`: gas estimate for the transaction
    /// - `gas_price_gwei`: the tier the transaction was built with
    /// - `native_spot_usd`: spot price of the chain's native asset
    pub fn evaluate(
        &self,
        return_raw: U256,
        flash_market: &FlashMarket,
        flash_spot_usd: f64,
        gas_used: u64,
        gas_price_gwei: f64,
        native_spot_usd: f64,
    ) -> Result<EvaluationResult, EvaluationError> {
        let return_units = TokenAmount::from_raw(return_raw, flash_market.decimals).to_units_f64();

        let profit_usd = return_units * flash_spot_usd;
        if !profit_usd.is_finite() {
            return Err(EvaluationError::InvalidPrice {
                context: "flash asset",
                value: profit_usd,
            });
        }

        // gwei -> native: 1 gwei = 1e-9 native units
        let gas_cost_usd = gas_used as f64 * gas_price_gwei * 1e-9 * native_spot_usd;
        if !gas_cost_usd.is_finite() {
            return Err(EvaluationError::InvalidPrice {
                context: "native asset",
                value: gas_cost_usd,
            });
        }

        let decision = if profit_usd > gas_cost_usd + self.safety_margin_usd {
            Decision::Submit
        } else {
            Decision::Skip
        };

        debug!(
            profit_usd,
            gas_cost_usd,
            margin_usd = self.safety_margin_usd,
            decision = ?decision,
            "Liquidation evaluated"
        );

        Ok(EvaluationResult {
            return_raw,
            return_units,
            profit_usd,
            gas_cost_usd,
            decision,
        })
    }
}

impl Default for ProfitEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::pow10;
    use crate::assets::{DAI, USDC, WETH};

    #[test]
    fn test_decision_boundary() {
        let evaluator = ProfitEvaluator::new();

        // profit 10.19, gas 10.0, margin 0.2 -> 10.19 <= 10.2 -> skip
        // 10.19 DAI at $1
        let raw = U256::from(1019u64) * pow10(16); // 10.19 * 10^18
        let result = evaluator
            .evaluate(raw, &DAI, 1.0, 500_000, 10.0, 2000.0)
            .unwrap();
        assert!((result.gas_cost_usd - 10.0).abs() < 1e-9);
        assert_eq!(result.decision, Decision::Skip);

        // profit 10.21 -> 10.21 > 10.2 -> submit
        let raw = U256::from(1021u64) * pow10(16);
        let result = evaluator
            .evaluate(raw, &DAI, 1.0, 500_000, 10.0, 2000.0)
            .unwrap();
        assert_eq!(result.decision, Decision::Submit);
    }

    #[test]
    fn test_six_decimal_conversion() {
        // 1.5 USDC raw = 1_500_000; conversion goes through the table row
        let evaluator = ProfitEvaluator::new();
        let result = evaluator
            .evaluate(U256::from(1_500_000u64), &USDC, 1.0, 0, 0.0, 2000.0)
            .unwrap();
        assert!((result.return_units - 1.5).abs() < 1e-9);
        assert!((result.profit_usd - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_gas_cost_computation() {
        // 2M gas at 20 gwei with native at $2000:
        // 2e6 * 20e-9 * 2000 = 80 USD
        let evaluator = ProfitEvaluator::new();
        let result = evaluator
            .evaluate(U256::ZERO, &WETH, 2000.0, 2_000_000, 20.0, 2000.0)
            .unwrap();
        assert!((result.gas_cost_usd - 80.0).abs() < 1e-6);
        assert_eq!(result.decision, Decision::Skip);
    }

    #[test]
    fn test_infinite_price_is_hard_failure() {
        let evaluator = ProfitEvaluator::new();

        // Infinite flash-asset spot price must not read as profit
        let raw = U256::from(1u64) * pow10(18);
        let err = evaluator
            .evaluate(raw, &WETH, f64::INFINITY, 500_000, 10.0, 2000.0)
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::InvalidPrice { context: "flash asset", .. }
        ));

        // Same for the native asset price on the gas side
        let err = evaluator
            .evaluate(raw, &WETH, 2000.0, 500_000, 10.0, f64::INFINITY)
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::InvalidPrice { context: "native asset", .. }
        ));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let evaluator = ProfitEvaluator::new();
        let raw = U256::from(5u64) * pow10(18);
        let a = evaluator.evaluate(raw, &DAI, 1.0, 400_000, 15.0, 1800.0).unwrap();
        let b = evaluator.evaluate(raw, &DAI, 1.0, 400_000, 15.0, 1800.0).unwrap();
        assert_eq!(a, b);
    }
}
