//! Payout distribution
//!
//! Applies a payout plan through the ledger, one atomic unit per user:
//! the aggregated win/loss mutations, the commitment status flips and the
//! distribution record commit together. One user's failure never blocks
//! the rest; failures are collected and the run retried later, with the
//! `(resolution_id, user_id)` record making retries idempotent.

use crate::{
    types::{DistributionError, DistributionResult, PayoutCalculation},
    Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use token_ledger::{
    ledger::BalanceLedger,
    types::{CommitmentStatus, DistributionStatus, Mutation, PayoutDistribution},
    UserId,
};
use uuid::Uuid;

/// Per-user aggregation of a payout plan
#[derive(Debug, Default)]
struct UserShare {
    payout: Decimal,
    winning_stake: Decimal,
    losing_stake: Decimal,
    winning_commitments: Vec<Uuid>,
    losing_commitments: Vec<Uuid>,
}

/// Applies payout plans through the ledger
#[derive(Debug)]
pub struct Distributor {
    ledger: Arc<BalanceLedger>,
    max_retries: u32,
}

impl Distributor {
    /// Create a distributor over the ledger
    pub fn new(ledger: Arc<BalanceLedger>, max_retries: u32) -> Self {
        Self {
            ledger,
            max_retries: max_retries.max(1),
        }
    }

    /// Apply a payout plan for a resolution
    pub async fn distribute(
        &self,
        resolution_id: Uuid,
        calculation: &PayoutCalculation,
    ) -> Result<DistributionResult> {
        let shares = group_by_user(calculation);

        let mut result = DistributionResult {
            resolution_id,
            completed: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (user_id, share) in &shares {
            let existing = self
                .ledger
                .storage()
                .get_distribution(resolution_id, user_id)?;
            if matches!(
                existing,
                Some(PayoutDistribution {
                    status: DistributionStatus::Completed,
                    ..
                })
            ) {
                result.skipped += 1;
                continue;
            }

            match self.apply_user_share(resolution_id, user_id, share).await {
                Ok(()) => result.completed += 1,
                Err(error) => {
                    let message = error.to_string();
                    tracing::error!(
                        resolution_id = %resolution_id,
                        user_id = %user_id,
                        "Distribution failed for user: {}",
                        message
                    );
                    self.record_failure(resolution_id, user_id, share, &message);
                    result.failed += 1;
                    result.errors.push(DistributionError {
                        user_id: user_id.clone(),
                        message,
                    });
                }
            }
        }

        if result.errors.is_empty() {
            self.ledger.metrics().distributions_total.inc();
        } else {
            self.ledger.metrics().distribution_failures_total.inc();
        }

        tracing::info!(
            resolution_id = %resolution_id,
            completed = result.completed,
            skipped = result.skipped,
            failed = result.failed,
            "Distribution run finished"
        );
        Ok(result)
    }

    /// One user's mutations, commitment flips and distribution record
    async fn apply_user_share(
        &self,
        resolution_id: Uuid,
        user_id: &UserId,
        share: &UserShare,
    ) -> Result<()> {
        let storage = self.ledger.storage();
        let _lock = self.ledger.lock_user(user_id).await;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let balance = self.ledger.get_balance(user_id).await?;
            let mut unit = storage.begin_unit();
            let mut current = balance;
            let mut transaction_ids = Vec::new();

            let mut metadata = HashMap::new();
            metadata.insert("operation".to_string(), "payout".to_string());
            metadata.insert("resolution_id".to_string(), resolution_id.to_string());

            if share.winning_stake > Decimal::ZERO {
                let staged = self.ledger.stage_mutation(
                    &mut unit,
                    &current,
                    &Mutation::Win {
                        payout: share.payout,
                        stake_released: share.winning_stake,
                    },
                    Some(resolution_id),
                    metadata.clone(),
                )?;
                transaction_ids.push(staged.transaction_id);
                current = staged.balance;
            }
            if share.losing_stake > Decimal::ZERO {
                let staged = self.ledger.stage_mutation(
                    &mut unit,
                    &current,
                    &Mutation::Loss {
                        stake: share.losing_stake,
                    },
                    Some(resolution_id),
                    metadata.clone(),
                )?;
                transaction_ids.push(staged.transaction_id);
            }

            let resolved_at = Utc::now();
            for (ids, status) in [
                (&share.winning_commitments, CommitmentStatus::Won),
                (&share.losing_commitments, CommitmentStatus::Lost),
            ] {
                for commitment_id in ids {
                    let mut commitment = storage.get_commitment(*commitment_id)?;
                    commitment.status = status;
                    commitment.resolved_at = Some(resolved_at);
                    unit.put_commitment(&commitment)?;
                }
            }

            unit.put_distribution(&PayoutDistribution {
                resolution_id,
                user_id: user_id.clone(),
                total_payout: share.payout,
                total_profit: share.payout - share.winning_stake,
                total_lost: share.losing_stake,
                winning_commitments: share.winning_commitments.clone(),
                losing_commitments: share.losing_commitments.clone(),
                transaction_ids,
                status: DistributionStatus::Completed,
                error: None,
                updated_at: resolved_at,
            })?;

            match unit.commit() {
                Ok(()) => return Ok(()),
                Err(token_ledger::Error::VersionConflict(detail)) => {
                    if attempts >= self.max_retries {
                        return Err(token_ledger::Error::ConcurrencyExhausted(format!(
                            "distribution for user {} gave up after {} attempts: {}",
                            user_id, attempts, detail
                        ))
                        .into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Best-effort failure record so retries and dashboards see the state
    fn record_failure(
        &self,
        resolution_id: Uuid,
        user_id: &UserId,
        share: &UserShare,
        message: &str,
    ) {
        let storage = self.ledger.storage();
        let mut unit = storage.begin_unit();
        let staged = unit.put_distribution(&PayoutDistribution {
            resolution_id,
            user_id: user_id.clone(),
            total_payout: share.payout,
            total_profit: share.payout - share.winning_stake,
            total_lost: share.losing_stake,
            winning_commitments: share.winning_commitments.clone(),
            losing_commitments: share.losing_commitments.clone(),
            transaction_ids: Vec::new(),
            status: DistributionStatus::Failed,
            error: Some(message.to_string()),
            updated_at: Utc::now(),
        });
        let write = match staged {
            Ok(()) => unit.commit(),
            Err(e) => Err(e),
        };
        if let Err(e) = write {
            tracing::error!(
                resolution_id = %resolution_id,
                user_id = %user_id,
                "Failed to record distribution failure: {}",
                e
            );
        }
    }
}

/// Group winner and loser entries into one share per user
///
/// BTreeMap keeps the application order deterministic across runs.
fn group_by_user(calculation: &PayoutCalculation) -> BTreeMap<UserId, UserShare> {
    let mut shares: BTreeMap<UserId, UserShare> = BTreeMap::new();

    for winner in &calculation.winners {
        let share = shares.entry(winner.user_id.clone()).or_default();
        share.payout += winner.payout;
        share.winning_stake += winner.tokens_committed;
        share.winning_commitments.push(winner.commitment_id);
    }
    for loser in &calculation.losers {
        let share = shares.entry(loser.user_id.clone()).or_default();
        share.losing_stake += loser.tokens_committed;
        share.losing_commitments.push(loser.commitment_id);
    }

    shares
}
