//! Liquidation pipeline orchestration.
//!
//! Candidates progress through
//! `Discovered -> HealthRechecked -> Routed -> Simulated ->
//! {Submitted | Skipped | Failed}`, strictly one at a time; every external
//! call of a candidate completes before the next candidate begins. All
//! per-candidate errors are caught at the candidate boundary so one bad
//! candidate never aborts the pass; only pass-level connectivity failures
//! propagate to the caller.

use alloy::primitives::{Address, Bytes, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::config;
use crate::evaluator::{Decision, ProfitEvaluator};
use crate::planner::{RoutePlan, RoutePlanner};
use crate::position::Position;
use flashliq_api::{GasPriceTracker, PositionFeedClient, SpotPriceClient};
use flashliq_chain::{
    FlashLiquidatorContract, LiquidateArgs, ProviderManager, SimulationError, TransactionSender,
};

/// Candidate lifecycle states, in order of progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Discovered,
    HealthRechecked,
    Routed,
    Simulated,
}

/// Why a candidate was skipped without an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Reported borrow value or health factor failed the cheap pre-filter.
    BelowThreshold,
    /// The authoritative health factor is back above 1; the feed was stale.
    Stale { health_factor: f64 },
    /// Simulated profit does not clear gas cost plus the safety margin.
    Unprofitable { profit_usd: f64, gas_cost_usd: f64 },
    /// Spot-price lookup failed or produced an invalid number.
    InvalidPrice(String),
    /// Dry-run mode: the submission decision was positive but withheld.
    DryRun { profit_usd: f64 },
}

/// Terminal outcome of one candidate in one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Submitted {
        borrower: Address,
        tx_hash: B256,
        profit_usd: f64,
    },
    Skipped {
        borrower: Address,
        reason: SkipReason,
    },
    Failed {
        borrower: Address,
        /// Last state reached before the failure
        state: CandidateState,
        reason: String,
    },
}

/// A fully-built liquidation transaction. Immutable once built; used for
/// exactly one simulate + optional submit, never reused or retried.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub flash_asset: Address,
    pub plan: RoutePlan,
    pub to: Address,
    pub calldata: Bytes,
    pub gas_limit: u64,
    pub gas_price_gwei: f64,
    pub nonce: u64,
}

/// Summary of one pipeline pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<CandidateOutcome>,
}

impl PassReport {
    fn new(started_at: DateTime<Utc>, discovered: usize) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            discovered,
            submitted: 0,
            skipped: 0,
            failed: 0,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, outcome: CandidateOutcome) {
        match &outcome {
            CandidateOutcome::Submitted { .. } => self.submitted += 1,
            CandidateOutcome::Skipped { .. } => self.skipped += 1,
            CandidateOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// The liquidation pipeline: candidate filter -> health re-check -> route
/// plan -> transaction build -> simulate -> decide -> submit.
pub struct LiquidationPipeline {
    feed: Arc<PositionFeedClient>,
    provider: Arc<ProviderManager>,
    planner: RoutePlanner,
    evaluator: ProfitEvaluator,
    gas: Arc<GasPriceTracker>,
    spot: Arc<SpotPriceClient>,
    contract: FlashLiquidatorContract,
    sender: Arc<TransactionSender>,
}

impl LiquidationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Arc<PositionFeedClient>,
        provider: Arc<ProviderManager>,
        planner: RoutePlanner,
        evaluator: ProfitEvaluator,
        gas: Arc<GasPriceTracker>,
        spot: Arc<SpotPriceClient>,
        contract: FlashLiquidatorContract,
        sender: Arc<TransactionSender>,
    ) -> Self {
        Self {
            feed,
            provider,
            planner,
            evaluator,
            gas,
            spot,
            contract,
            sender,
        }
    }

    /// Run continuously: one pass, fixed sleep, restart unconditionally.
    /// A pass that ends with per-candidate failures does not block the next
    /// pass; only connectivity errors end the loop.
    pub async fn run(&self) -> Result<()> {
        loop {
            let report = self.run_once().await?;
            info!(
                discovered = report.discovered,
                submitted = report.submitted,
                skipped = report.skipped,
                failed = report.failed,
                "Pass complete"
            );
            tokio::time::sleep(config().pipeline.pass_interval()).await;
        }
    }

    /// Process one page of candidates sequentially and report the outcomes.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<PassReport> {
        let started_at = Utc::now();

        let candidates = self
            .feed
            .fetch_candidates()
            .await
            .context("candidate feed unreachable")?;

        let mut report = PassReport::new(started_at, candidates.len());

        for cdp in candidates {
            let position = Position::from(cdp);
            let outcome = self.process_candidate(&position).await;

            match &outcome {
                CandidateOutcome::Submitted {
                    tx_hash,
                    profit_usd,
                    ..
                } => {
                    info!(
                        borrower = %position.borrower,
                        tx_hash = %tx_hash,
                        profit_usd,
                        "Liquidation submitted"
                    );
                }
                CandidateOutcome::Skipped { reason, .. } => {
                    debug!(borrower = %position.borrower, reason = ?reason, "Candidate skipped");
                }
                CandidateOutcome::Failed { state, reason, .. } => {
                    warn!(
                        borrower = %position.borrower,
                        state = ?state,
                        reason = %reason,
                        "Candidate failed"
                    );
                }
            }

            report.record(outcome);
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Drive one candidate through the state machine. Never returns an
    /// error: everything that can go wrong becomes a terminal outcome.
    #[instrument(skip(self, position), fields(borrower = %position.borrower))]
    pub async fn process_candidate(&self, position: &Position) -> CandidateOutcome {
        let borrower = position.borrower;
        let cfg = &config().pipeline;

        // Discovered: cheap local pre-filter before any chain call
        if !position.passes_prefilter(cfg.min_borrow_threshold()) {
            return CandidateOutcome::Skipped {
                borrower,
                reason: SkipReason::BelowThreshold,
            };
        }

        // Discovered -> HealthRechecked: authoritative on-chain re-check
        let health_factor = match self.provider.health_factor(borrower).await {
            Ok(hf) => hf,
            Err(e) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::Discovered,
                    reason: format!("health re-check failed: {e:#}"),
                }
            }
        };
        if is_stale(health_factor) {
            // Expected steady-state occurrence with an eventually-consistent
            // feed; dropped, not retried.
            return CandidateOutcome::Skipped {
                borrower,
                reason: SkipReason::Stale { health_factor },
            };
        }

        // HealthRechecked -> Routed: plan against the largest collateral
        let Some(collateral) = position.largest_collateral() else {
            return CandidateOutcome::Failed {
                borrower,
                state: CandidateState::HealthRechecked,
                reason: "no collateral entries".to_string(),
            };
        };
        let plan = match self
            .planner
            .plan(&position.borrowed, position.borrowed_amount, collateral)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::HealthRechecked,
                    reason: format!("route planning failed: {e}"),
                }
            }
        };

        // Routed -> Simulated: build the transaction once, then dry-run it
        let tx = match self.build_transaction(position, collateral.reserve.address, plan).await {
            Ok(tx) => tx,
            Err(e) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::Routed,
                    reason: format!("transaction build failed: {e:#}"),
                }
            }
        };

        let gas_used = match self
            .provider
            .estimate_gas(self.sender.address, tx.to, tx.calldata.clone())
            .await
        {
            Ok(gas) => gas,
            Err(SimulationError::Reverted { reason }) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::Routed,
                    reason: format!("gas estimation reverted: {reason}"),
                }
            }
            Err(e) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::Routed,
                    reason: format!("gas estimation failed: {e}"),
                }
            }
        };

        let return_data = match self
            .provider
            .simulate(self.sender.address, tx.to, tx.calldata.clone(), tx.gas_limit)
            .await
        {
            Ok(data) => data,
            Err(SimulationError::Reverted { reason }) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::Routed,
                    reason: format!("simulation reverted: {reason}"),
                }
            }
            Err(e) => {
                return CandidateOutcome::Failed {
                    borrower,
                    state: CandidateState::Routed,
                    reason: format!("simulation failed: {e}"),
                }
            }
        };

        let Some(return_raw) = FlashLiquidatorContract::decode_profit(&return_data) else {
            return CandidateOutcome::Failed {
                borrower,
                state: CandidateState::Simulated,
                reason: "undecodable simulation return".to_string(),
            };
        };

        // Simulated -> Submitted | Skipped: profit decision gates submission
        let flash_spot = match self.spot.price_usd(tx.flash_asset).await {
            Ok(price) => price,
            Err(e) => {
                return CandidateOutcome::Skipped {
                    borrower,
                    reason: SkipReason::InvalidPrice(format!("{e:#}")),
                }
            }
        };
        let native_spot = match self.spot.native_price_usd().await {
            Ok(price) => price,
            Err(e) => {
                return CandidateOutcome::Skipped {
                    borrower,
                    reason: SkipReason::InvalidPrice(format!("{e:#}")),
                }
            }
        };

        let evaluation = match self.evaluator.evaluate(
            return_raw,
            tx.plan.flash_market(),
            flash_spot,
            gas_used,
            tx.gas_price_gwei,
            native_spot,
        ) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                return CandidateOutcome::Skipped {
                    borrower,
                    reason: SkipReason::InvalidPrice(e.to_string()),
                }
            }
        };

        if evaluation.decision == Decision::Skip {
            return CandidateOutcome::Skipped {
                borrower,
                reason: SkipReason::Unprofitable {
                    profit_usd: evaluation.profit_usd,
                    gas_cost_usd: evaluation.gas_cost_usd,
                },
            };
        }

        if cfg.dry_run {
            info!(
                borrower = %borrower,
                profit_usd = evaluation.profit_usd,
                "Dry run: submission withheld"
            );
            return CandidateOutcome::Skipped {
                borrower,
                reason: SkipReason::DryRun {
                    profit_usd: evaluation.profit_usd,
                },
            };
        }

        // Fire-and-forget broadcast; the discarded PendingTransaction is
        // never retried.
        match self
            .sender
            .send_transaction(
                tx.to,
                tx.calldata.clone(),
                gwei_to_wei(tx.gas_price_gwei),
                Some(tx.nonce),
            )
            .await
        {
            Ok(tx_hash) => CandidateOutcome::Submitted {
                borrower,
                tx_hash,
                profit_usd: evaluation.profit_usd,
            },
            Err(e) => CandidateOutcome::Failed {
                borrower,
                state: CandidateState::Simulated,
                reason: format!("broadcast failed: {e:#}"),
            },
        }
    }

    /// Assemble the pending transaction from a route plan.
    async fn build_transaction(
        &self,
        position: &Position,
        collateral_asset: Address,
        plan: RoutePlan,
    ) -> Result<PendingTransaction> {
        let args = LiquidateArgs {
            flash_token_id: plan.flash_market().market_id,
            flash_token_amount: plan.flash_amount.raw(),
            user: position.borrower,
            reserve: position.borrowed.address,
            collateral: collateral_asset,
            distribution_to: plan.distribution_to(),
            distribution_from: plan.distribution_from(),
        };
        let calldata = self.contract.encode_liquidate(&args);

        let snapshot = self.gas.snapshot();
        let nonce = self.sender.chain_nonce().await?;

        Ok(PendingTransaction {
            flash_asset: plan.flash_market().token,
            plan,
            to: self.contract.address(),
            calldata,
            gas_limit: config().pipeline.gas_limit,
            gas_price_gwei: snapshot.fast,
            nonce,
        })
    }
}

/// A re-checked health factor at or above 1.0 means the position is no
/// longer liquidatable and the feed data was stale.
fn is_stale(health_factor: f64) -> bool {
    health_factor >= 1.0
}

/// Convert a gwei tier to wei for transaction pricing.
fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * 1e9) as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_gate_is_monotonic() {
        // HF >= 1 is always dropped, boundary included
        assert!(is_stale(1.0));
        assert!(is_stale(1.0001));
        assert!(is_stale(f64::MAX));

        assert!(!is_stale(0.9999));
        assert!(!is_stale(0.5));
    }

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(1.0), 1_000_000_000);
        assert_eq!(gwei_to_wei(20.0), 20_000_000_000);
        assert_eq!(gwei_to_wei(12.5), 12_500_000_000);
    }

    #[test]
    fn test_pass_report_tally() {
        let mut report = PassReport::new(Utc::now(), 3);

        report.record(CandidateOutcome::Submitted {
            borrower: Address::ZERO,
            tx_hash: B256::ZERO,
            profit_usd: 5.0,
        });
        report.record(CandidateOutcome::Skipped {
            borrower: Address::ZERO,
            reason: SkipReason::Stale { health_factor: 1.2 },
        });
        report.record(CandidateOutcome::Failed {
            borrower: Address::ZERO,
            state: CandidateState::Routed,
            reason: "simulation reverted: X".to_string(),
        });

        assert_eq!(report.discovered, 3);
        assert_eq!(report.submitted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes.len(), 3);
    }
}
