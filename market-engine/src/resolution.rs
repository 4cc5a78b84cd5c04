//! Market resolution
//!
//! Declares the winning option, records the resolution atomically with the
//! market's status flip, then hands the payout plan to the distributor.
//! A no-winners outcome never distributes: every active stake is refunded
//! and the resolution recorded as such. Partially failed runs, payout and
//! refund alike, are retriable via [`MarketEngine::retry_distribution`];
//! the plan is recomputed from the fees stored on the resolution, so a
//! retry pays exactly what the original run would have.

use crate::{
    config::FeeConfig,
    engine::MarketEngine,
    payout::calculate_payouts,
    types::{PayoutCalculation, RefundResult, ResolutionSummary},
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use token_ledger::{
    types::{MarketStatus, Resolution, ResolutionStatus},
    Market,
};
use uuid::Uuid;

impl MarketEngine {
    /// Resolve a market and distribute payouts
    pub async fn resolve_market(
        &self,
        market_id: Uuid,
        winning_option_id: &str,
        evidence: Vec<String>,
        resolved_by: &str,
        creator_fee_pct: Decimal,
    ) -> Result<ResolutionSummary> {
        let storage = self.ledger.storage();

        let market = storage.get_market(market_id)?;
        if !matches!(
            market.status,
            MarketStatus::Active | MarketStatus::PendingResolution
        ) {
            return Err(Error::MarketNotActive(format!(
                "market {} is {:?}",
                market_id, market.status
            )));
        }
        if storage.resolution_for_market(market_id)?.is_some() {
            return Err(Error::MarketNotActive(format!(
                "market {} already has a resolution",
                market_id
            )));
        }

        let commitments = storage.commitments_for_market(market_id)?;
        let calculation = match calculate_payouts(
            &market,
            &commitments,
            winning_option_id,
            creator_fee_pct,
            &self.config.fees,
        ) {
            Ok(calculation) => calculation,
            Err(Error::NoWinners { unallocated }) => {
                return self
                    .resolve_with_refund(
                        &market,
                        winning_option_id,
                        evidence,
                        resolved_by,
                        creator_fee_pct,
                        unallocated,
                    )
                    .await;
            }
            Err(e) => return Err(e),
        };

        let resolution = Resolution {
            resolution_id: Uuid::now_v7(),
            market_id,
            winning_option_id: winning_option_id.to_string(),
            resolved_by: resolved_by.to_string(),
            resolved_at: Utc::now(),
            evidence,
            creator_fee_pct,
            house_fee_pct: self.config.fees.house_fee_pct,
            total_payout: calculation.total_payout,
            winner_count: calculation.winner_count,
            status: ResolutionStatus::PayoutPending,
        };
        self.record_resolution(&market, &resolution)?;

        tracing::info!(
            market_id = %market_id,
            resolution_id = %resolution.resolution_id,
            winning_option_id,
            winners = calculation.winner_count,
            total_payout = %calculation.total_payout,
            "Market resolved, distributing payouts"
        );

        let result = self
            .distributor
            .distribute(resolution.resolution_id, &calculation)
            .await?;

        let status = if result.success() {
            ResolutionStatus::Completed
        } else {
            ResolutionStatus::PartiallyFailed
        };
        self.update_resolution_status(&resolution, status)?;

        Ok(ResolutionSummary {
            success: result.success(),
            resolution_id: resolution.resolution_id,
            total_payout: calculation.total_payout,
            winner_count: calculation.winner_count,
            distributed_users: result.completed + result.skipped,
            errors: result.errors,
            no_winners_refund: false,
            resolved_at: resolution.resolved_at,
        })
    }

    /// Re-run a partially failed distribution
    ///
    /// Completed per-user records are skipped, so only the failed remainder
    /// is applied. A no-winners resolution re-runs its refund pass instead,
    /// skipping already refunded stakes.
    pub async fn retry_distribution(&self, resolution_id: Uuid) -> Result<ResolutionSummary> {
        let storage = self.ledger.storage();
        let resolution = storage.get_resolution(resolution_id)?;

        if resolution.status == ResolutionStatus::NoWinnersRefunded {
            let refunds = self.refund_active_commitments(resolution.market_id).await?;
            return Ok(refund_summary(&resolution, &refunds));
        }

        // The fees stored on the resolution, not the current config, decide
        // the plan: users paid on retry get the same amount as the rest
        let fees = FeeConfig {
            house_fee_pct: resolution.house_fee_pct,
            ..self.config.fees.clone()
        };
        let market = storage.get_market(resolution.market_id)?;
        let commitments = storage.commitments_for_market(resolution.market_id)?;
        let calculation: PayoutCalculation = calculate_payouts(
            &market,
            &commitments,
            &resolution.winning_option_id,
            resolution.creator_fee_pct,
            &fees,
        )?;

        let result = self
            .distributor
            .distribute(resolution_id, &calculation)
            .await?;

        let status = if result.success() {
            ResolutionStatus::Completed
        } else {
            ResolutionStatus::PartiallyFailed
        };
        self.update_resolution_status(&resolution, status)?;

        Ok(ResolutionSummary {
            success: result.success(),
            resolution_id,
            total_payout: calculation.total_payout,
            winner_count: calculation.winner_count,
            distributed_users: result.completed + result.skipped,
            errors: result.errors,
            no_winners_refund: false,
            resolved_at: resolution.resolved_at,
        })
    }

    /// No-winners path: record the resolution and refund every active stake
    async fn resolve_with_refund(
        &self,
        market: &Market,
        winning_option_id: &str,
        evidence: Vec<String>,
        resolved_by: &str,
        creator_fee_pct: Decimal,
        unallocated: Decimal,
    ) -> Result<ResolutionSummary> {
        let resolution = Resolution {
            resolution_id: Uuid::now_v7(),
            market_id: market.market_id,
            winning_option_id: winning_option_id.to_string(),
            resolved_by: resolved_by.to_string(),
            resolved_at: Utc::now(),
            evidence,
            creator_fee_pct,
            house_fee_pct: self.config.fees.house_fee_pct,
            total_payout: Decimal::ZERO,
            winner_count: 0,
            status: ResolutionStatus::NoWinnersRefunded,
        };
        self.record_resolution(market, &resolution)?;

        let refunds = self.refund_active_commitments(market.market_id).await?;
        tracing::warn!(
            market_id = %market.market_id,
            resolution_id = %resolution.resolution_id,
            winning_option_id,
            unallocated = %unallocated,
            refunded = refunds.refunded,
            failed = refunds.failed,
            "Winning option had no commitments; all stakes refunded"
        );

        Ok(refund_summary(&resolution, &refunds))
    }

    /// Persist the resolution and the market's `Resolved` flip in one unit
    fn record_resolution(&self, market: &Market, resolution: &Resolution) -> Result<()> {
        let mut resolved = market.clone();
        resolved.status = MarketStatus::Resolved;
        resolved.version = market.version + 1;
        resolved.updated_at = Utc::now();

        let mut unit = self.ledger.storage().begin_unit();
        unit.put_resolution(resolution)?;
        unit.put_market(&resolved)?;
        unit.guard_market(market.market_id, market.version);

        // A racing commitment landed between our read and this write; the
        // caller re-invokes resolution against fresh state
        unit.commit().map_err(|e| match e {
            token_ledger::Error::VersionConflict(detail) => {
                token_ledger::Error::ConcurrencyExhausted(format!(
                    "market {} changed during resolution: {}",
                    market.market_id, detail
                ))
                .into()
            }
            other => Error::from(other),
        })
    }

    /// Flip the resolution's distribution status
    fn update_resolution_status(
        &self,
        resolution: &Resolution,
        status: ResolutionStatus,
    ) -> Result<()> {
        let mut updated = resolution.clone();
        updated.status = status;

        let mut unit = self.ledger.storage().begin_unit();
        unit.put_resolution(&updated)?;
        unit.commit()?;
        Ok(())
    }
}

/// Summary for a refund pass, original run and retry alike
fn refund_summary(resolution: &Resolution, refunds: &RefundResult) -> ResolutionSummary {
    ResolutionSummary {
        success: refunds.success(),
        resolution_id: resolution.resolution_id,
        total_payout: Decimal::ZERO,
        winner_count: 0,
        distributed_users: refunds.refunded + refunds.skipped,
        errors: refunds.errors.clone(),
        no_winners_refund: true,
        resolved_at: resolution.resolved_at,
    }
}
