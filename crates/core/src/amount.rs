//! Typed token amounts with a decimal-precision tag.
//!
//! Every amount that crosses the quote-oracle or transaction boundary must
//! already be scaled to the asset's smallest unit. Mixing scaled and unscaled
//! values is the main correctness hazard in route planning, so raw `U256`
//! amounts are wrapped in [`TokenAmount`] together with the decimals they were
//! scaled by; arithmetic across mismatched tags is rejected.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Safety margin applied to bridge-asset flash loans: 5%.
const SAFETY_MARGIN_NUM: u64 = 5;
const SAFETY_MARGIN_DEN: u64 = 100;

/// Pre-computed powers of 10 for fast decimal scaling.
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38).
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Errors converting human-scale decimals into raw token amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must be non-negative, got {0}")]
    Negative(Decimal),
    #[error("unsupported token decimals: {0}")]
    DecimalsOutOfRange(u8),
}

/// A raw token amount in the asset's smallest unit, tagged with the decimal
/// precision it was scaled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

impl TokenAmount {
    /// Scale a human-readable decimal amount to the asset's smallest unit.
    /// Fractional digits beyond the asset's precision are truncated, never
    /// rounded.
    pub fn from_units(value: Decimal, decimals: u8) -> Result<Self, AmountError> {
        if decimals > 38 {
            return Err(AmountError::DecimalsOutOfRange(decimals));
        }
        if value.is_sign_negative() {
            return Err(AmountError::Negative(value));
        }

        let truncated = value.trunc_with_scale(decimals as u32);
        let mantissa = truncated.mantissa().unsigned_abs();
        let shift = decimals as u32 - truncated.scale();

        Ok(Self {
            raw: U256::from(mantissa) * pow10(shift as u8),
            decimals,
        })
    }

    /// Wrap an already-scaled raw amount.
    pub const fn from_raw(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub const fn zero(decimals: u8) -> Self {
        Self {
            raw: U256::ZERO,
            decimals,
        }
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub const fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Convert back to human-readable units as f64. Display and USD math
    /// only, not exact arithmetic.
    pub fn to_units_f64(&self) -> f64 {
        let mut value = 0.0_f64;
        for (i, limb) in self.raw.as_limbs().iter().enumerate() {
            value += *limb as f64 * 2.0_f64.powi(64 * i as i32);
        }
        value / 10.0_f64.powi(self.decimals as i32)
    }

    /// Apply the fixed 5% flash-loan safety margin:
    /// `margined = raw + floor(raw * 5 / 100)`.
    pub fn with_safety_margin(&self) -> Self {
        let margin = self.raw * U256::from(SAFETY_MARGIN_NUM) / U256::from(SAFETY_MARGIN_DEN);
        Self {
            raw: self.raw + margin,
            decimals: self.decimals,
        }
    }

    /// Subtract another amount of the same asset precision. Returns `None`
    /// on precision mismatch or underflow.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        if self.decimals != other.decimals {
            return None;
        }
        self.raw.checked_sub(other.raw).map(|raw| Self {
            raw,
            decimals: self.decimals,
        })
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}e-{}", self.raw, self.decimals)
    }
}
