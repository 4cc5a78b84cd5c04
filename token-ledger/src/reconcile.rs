//! Reconciliation between stored balances and derived state
//!
//! The transaction log plus active commitments are the source of truth.
//! `check_drift` recomputes a user's balance from them without writing;
//! `reconcile` rewrites the stored row to the derived values under the
//! same optimistic guard every other writer uses.

use crate::{
    ledger::BalanceLedger,
    types::{CommitmentStatus, TransactionKind, UserBalance, UserId},
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Balance recomputed from the transaction log and active commitments
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedBalance {
    /// Lifetime tokens credited (purchases + payouts)
    pub total_earned: Decimal,
    /// Lifetime tokens debited (losses + released winning stakes)
    pub total_spent: Decimal,
    /// Stake currently held by active commitments
    pub committed_tokens: Decimal,
    /// Spendable remainder
    pub available_tokens: Decimal,
}

/// Outcome of a drift check for one user
#[derive(Debug, Clone)]
pub struct DriftReport {
    /// User checked
    pub user_id: UserId,
    /// Balance as stored
    pub stored: UserBalance,
    /// Balance as derived from the log
    pub derived: DerivedBalance,
    /// Fields whose stored value disagrees with the derived value
    pub drifted_fields: Vec<&'static str>,
}

impl DriftReport {
    /// Whether any field drifted
    pub fn has_drift(&self) -> bool {
        !self.drifted_fields.is_empty()
    }
}

/// Recomputes balances from the transaction log and repairs drift
#[derive(Debug)]
pub struct Reconciler {
    ledger: Arc<BalanceLedger>,
}

impl Reconciler {
    /// Create a reconciler over the ledger
    pub fn new(ledger: Arc<BalanceLedger>) -> Self {
        Self { ledger }
    }

    /// Derive a user's balance from the transaction log and commitments
    pub fn derive(&self, user_id: &UserId) -> Result<DerivedBalance> {
        let storage = self.ledger.storage();
        let transactions = storage.transactions_for_user(user_id, 0, usize::MAX)?;

        let mut total_earned = Decimal::ZERO;
        let mut total_spent = Decimal::ZERO;

        for tx in &transactions {
            match tx.kind {
                TransactionKind::Purchase => total_earned += tx.amount,
                TransactionKind::Win => {
                    total_earned += tx.amount;
                    total_spent += tx.stake_released.unwrap_or(tx.amount);
                }
                TransactionKind::Loss => total_spent += tx.amount,
                // Stake moves between buckets; lifetime totals unchanged
                TransactionKind::Commit | TransactionKind::Refund => {}
            }
        }

        let committed_tokens: Decimal = storage
            .commitments_for_user(user_id)?
            .iter()
            .filter(|c| c.status == CommitmentStatus::Active)
            .map(|c| c.tokens_committed)
            .sum();

        let available_tokens = (total_earned - total_spent - committed_tokens).max(Decimal::ZERO);

        Ok(DerivedBalance {
            total_earned,
            total_spent,
            committed_tokens,
            available_tokens,
        })
    }

    /// Read-only drift check for one user
    pub async fn check_drift(&self, user_id: &UserId) -> Result<DriftReport> {
        let stored = self.ledger.get_balance(user_id).await?;
        let derived = self.derive(user_id)?;

        let mut drifted_fields = Vec::new();
        if stored.available_tokens != derived.available_tokens {
            drifted_fields.push("available_tokens");
        }
        if stored.committed_tokens != derived.committed_tokens {
            drifted_fields.push("committed_tokens");
        }
        if stored.total_earned != derived.total_earned {
            drifted_fields.push("total_earned");
        }
        if stored.total_spent != derived.total_spent {
            drifted_fields.push("total_spent");
        }

        if !drifted_fields.is_empty() {
            tracing::warn!(
                user_id = %user_id,
                fields = ?drifted_fields,
                stored_available = %stored.available_tokens,
                derived_available = %derived.available_tokens,
                "Balance drift detected"
            );
        }

        Ok(DriftReport {
            user_id: user_id.clone(),
            stored,
            derived,
            drifted_fields,
        })
    }

    /// Repair a user's stored balance to match the derived values
    ///
    /// No-op when the check finds no drift. The corrective write bumps
    /// the version and goes through the same guard as normal mutations,
    /// so a concurrent writer invalidates it rather than being clobbered.
    pub async fn reconcile(&self, user_id: &UserId) -> Result<DriftReport> {
        let _lock = self.ledger.lock_user(user_id).await;

        let report = self.check_drift(user_id).await?;
        if !report.has_drift() {
            return Ok(report);
        }

        let corrected = UserBalance {
            user_id: user_id.clone(),
            available_tokens: report.derived.available_tokens,
            committed_tokens: report.derived.committed_tokens,
            total_earned: report.derived.total_earned,
            total_spent: report.derived.total_spent,
            version: report.stored.version + 1,
            last_updated: Utc::now(),
        };

        let storage = self.ledger.storage();
        let mut unit = storage.begin_unit();
        unit.put_balance(&corrected)?;
        unit.guard_balance(user_id, Some(report.stored.version));

        match unit.commit() {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    fields = ?report.drifted_fields,
                    "Balance reconciled"
                );
                Ok(report)
            }
            Err(Error::VersionConflict(detail)) => Err(Error::ConcurrencyExhausted(format!(
                "reconcile for user {} raced a concurrent writer: {}",
                user_id, detail
            ))),
            Err(e) => Err(e),
        }
    }
}
