//! Liquidation bot core logic.
//!
//! This crate provides the decision layer of the flash-loan liquidation bot:
//! - Flash-loanable market table and registry
//! - Typed scaled amounts guarding the decimal-precision boundary
//! - Candidate position snapshots with collateral selection
//! - Three-strategy flash-loan route planning
//! - Net-profit evaluation with a fixed USD safety margin
//! - Pipeline orchestration: filter, re-check, route, simulate, decide,
//!   submit

mod amount;
mod assets;
pub mod config;
mod evaluator;
mod pipeline;
mod planner;
mod position;

pub use amount::{pow10, AmountError, TokenAmount};
pub use assets::{FlashMarket, MarketRegistry, DAI, FLASH_MARKETS, SAI, USDC, WETH};
pub use config::{config, init_config, BotConfig, GasConfig, PipelineConfig, QuoteConfig};
pub use evaluator::{
    Decision, EvaluationError, EvaluationResult, ProfitEvaluator, DEFAULT_SAFETY_MARGIN_USD,
};
pub use pipeline::{
    CandidateOutcome, CandidateState, LiquidationPipeline, PassReport, PendingTransaction,
    SkipReason,
};
pub use planner::{
    classify, PlanError, RoutePlan, RoutePlanner, RouteStrategy, SwapLeg, SwapPurpose,
};
pub use position::{CollateralEntry, Position, ReserveInfo};
