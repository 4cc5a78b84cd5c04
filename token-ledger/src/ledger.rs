//! Balance ledger — the only writer of account state
//!
//! Every mutation is executed inside a single atomic unit with the matching
//! transaction-log append. Writers are optimistic: the unit carries the
//! `version` observed at read time, and a stale version at commit is
//! retried up to a configured bound before surfacing `ConcurrencyExhausted`.
//!
//! A per-user mutex (DashMap of locks) serializes same-account writers so
//! contended accounts converge without burning retries; the version guard
//! remains the correctness backstop for writers that bypass the lock.

use crate::{
    metrics::Metrics,
    storage::{AtomicUnit, Storage},
    types::{Mutation, TokenTransaction, TransactionStatus, UserBalance, UserId},
    Config, Error, Result,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Per-user token account ledger
pub struct BalanceLedger {
    /// Storage backend
    storage: Arc<Storage>,

    /// Max commit attempts per mutation
    max_retries: u32,

    /// Per-user write locks
    locks: DashMap<UserId, Arc<Mutex<()>>>,

    /// Prometheus metrics
    metrics: Metrics,
}

impl BalanceLedger {
    /// Create a ledger over existing storage
    pub fn new(storage: Arc<Storage>, config: &Config) -> Result<Self> {
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            storage,
            max_retries: config.concurrency.max_retries.max(1),
            locks: DashMap::new(),
            metrics,
        })
    }

    /// Storage handle (read access for collaborating components)
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Metrics registry handle
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Acquire the per-user write lock
    ///
    /// Held by callers that build multi-write atomic units around
    /// [`Self::stage_mutation`] so same-account writers serialize.
    pub async fn lock_user(&self, user_id: &UserId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(user_id.clone())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Get a user's balance, creating a zeroed account on first access
    pub async fn get_balance(&self, user_id: &UserId) -> Result<UserBalance> {
        if let Some(balance) = self.storage.get_balance(user_id)? {
            return Ok(balance);
        }

        let zeroed = UserBalance::zeroed(user_id.clone());
        let mut unit = self.storage.begin_unit();
        unit.put_balance(&zeroed)?;
        unit.guard_balance(user_id, None);

        match unit.commit() {
            Ok(()) => Ok(zeroed),
            // Lost the creation race; the other writer's row is authoritative
            Err(Error::VersionConflict(_)) => self
                .storage
                .get_balance(user_id)?
                .ok_or_else(|| Error::InvariantViolation(format!("balance {} vanished", user_id))),
            Err(e) => Err(e),
        }
    }

    /// Apply a mutation atomically with its transaction-log append
    pub async fn apply_mutation(
        &self,
        user_id: &UserId,
        mutation: Mutation,
        related_id: Option<Uuid>,
        metadata: HashMap<String, String>,
    ) -> Result<UserBalance> {
        let _lock = self.lock_user(user_id).await;
        let timer = self.metrics.mutation_duration.start_timer();

        let mut attempts = 0;
        loop {
            attempts += 1;

            let current = self.get_balance(user_id).await?;
            let mut unit = self.storage.begin_unit();
            let staged = match self.stage_mutation(
                &mut unit,
                &current,
                &mutation,
                related_id,
                metadata.clone(),
            ) {
                Ok(staged) => staged,
                Err(e) => {
                    if matches!(e, Error::InsufficientBalance { .. }) {
                        self.metrics.insufficient_balance_total.inc();
                    }
                    return Err(e);
                }
            };

            match unit.commit() {
                Ok(()) => {
                    self.metrics.mutations_total.inc();
                    timer.observe_duration();
                    tracing::debug!(
                        user_id = %user_id,
                        kind = ?mutation.kind(),
                        amount = %mutation.amount(),
                        version = staged.balance.version,
                        "Balance mutation applied"
                    );
                    return Ok(staged.balance);
                }
                Err(Error::VersionConflict(detail)) => {
                    self.metrics.version_conflicts_total.inc();
                    if attempts >= self.max_retries {
                        self.metrics.retries_exhausted_total.inc();
                        return Err(Error::ConcurrencyExhausted(format!(
                            "mutation for user {} gave up after {} attempts: {}",
                            user_id, attempts, detail
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stage a mutation into a caller-owned atomic unit
    ///
    /// Computes the successor balance, stages its write plus the matching
    /// transaction record, and adds the optimistic guard on `current`'s
    /// version. Callers chaining multiple mutations in one unit pass each
    /// staged balance as the next `current`; the guard keeps the first
    /// version read.
    pub fn stage_mutation(
        &self,
        unit: &mut AtomicUnit<'_>,
        current: &UserBalance,
        mutation: &Mutation,
        related_id: Option<Uuid>,
        metadata: HashMap<String, String>,
    ) -> Result<StagedMutation> {
        let next = current.apply(mutation)?;

        let transaction = TokenTransaction {
            transaction_id: Uuid::now_v7(),
            user_id: current.user_id.clone(),
            kind: mutation.kind(),
            amount: mutation.amount(),
            stake_released: mutation.stake_released(),
            balance_before: current.available_tokens,
            balance_after: next.available_tokens,
            related_id,
            metadata,
            timestamp: next.last_updated,
            status: TransactionStatus::Completed,
        };

        unit.put_balance(&next)?;
        unit.put_transaction(&transaction)?;
        unit.guard_balance(&current.user_id, Some(current.version));

        Ok(StagedMutation {
            balance: next,
            transaction_id: transaction.transaction_id,
        })
    }

    /// Get a user's transaction history, ordered by timestamp
    pub async fn transactions(
        &self,
        user_id: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TokenTransaction>> {
        self.storage.transactions_for_user(user_id, offset, limit)
    }
}

impl std::fmt::Debug for BalanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceLedger")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Result of staging a mutation into an atomic unit
#[derive(Debug, Clone)]
pub struct StagedMutation {
    /// Successor balance (not yet durable until the unit commits)
    pub balance: UserBalance,

    /// Transaction record id created for this mutation
    pub transaction_id: Uuid,
}
