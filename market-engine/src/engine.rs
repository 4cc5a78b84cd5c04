//! Market engine facade
//!
//! Owns the ledger and exposes the market lifecycle. Commitment creation,
//! resolution and payout distribution live in their own modules but hang
//! off this type so callers wire exactly one dependency.

use crate::{
    config::EngineConfig,
    distribution::Distributor,
    types::{DistributionError, RefundResult},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use token_ledger::{
    ledger::BalanceLedger,
    storage::{Storage, StorageStats},
    types::{CommitmentStatus, MarketOption, MarketStatus, Mutation},
    Market, UserBalance, UserId,
};
use uuid::Uuid;

/// Definition of one market option at creation time
#[derive(Debug, Clone)]
pub struct OptionDef {
    /// Option identifier, unique within the market
    pub option_id: String,

    /// Display text
    pub text: String,
}

/// Prediction-market engine over the token ledger
#[derive(Debug)]
pub struct MarketEngine {
    pub(crate) ledger: Arc<BalanceLedger>,
    pub(crate) distributor: Distributor,
    pub(crate) config: EngineConfig,
}

impl MarketEngine {
    /// Open the engine, creating storage under the configured data dir
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config.ledger)?);
        let ledger = Arc::new(BalanceLedger::new(storage, &config.ledger)?);
        Ok(Self::with_ledger(ledger, config))
    }

    /// Build the engine over an existing ledger (tests inject fakes here)
    pub fn with_ledger(ledger: Arc<BalanceLedger>, config: EngineConfig) -> Self {
        let distributor = Distributor::new(ledger.clone(), config.ledger.concurrency.max_retries);
        Self {
            ledger,
            distributor,
            config,
        }
    }

    /// Ledger handle
    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    /// Credit purchased tokens to a user
    pub async fn purchase_tokens(
        &self,
        user_id: &UserId,
        amount: Decimal,
    ) -> Result<UserBalance> {
        let mut metadata = HashMap::new();
        metadata.insert("operation".to_string(), "purchase".to_string());
        Ok(self
            .ledger
            .apply_mutation(user_id, Mutation::Purchase { amount }, None, metadata)
            .await?)
    }

    /// Create a market with at least two uniquely-identified options
    pub async fn create_market(
        &self,
        question: impl Into<String>,
        options: Vec<OptionDef>,
        ends_at: DateTime<Utc>,
    ) -> Result<Market> {
        if options.len() < 2 {
            return Err(Error::InvalidMarket(format!(
                "market needs at least 2 options, got {}",
                options.len()
            )));
        }
        let mut seen = HashSet::new();
        for option in &options {
            if option.option_id.is_empty() || !seen.insert(option.option_id.as_str()) {
                return Err(Error::InvalidMarket(format!(
                    "option id {:?} empty or duplicated",
                    option.option_id
                )));
            }
        }

        let now = Utc::now();
        let market = Market {
            market_id: Uuid::now_v7(),
            question: question.into(),
            status: MarketStatus::Active,
            options: options
                .into_iter()
                .map(|def| MarketOption {
                    option_id: def.option_id,
                    text: def.text,
                    total_tokens: Decimal::ZERO,
                    participant_count: 0,
                })
                .collect(),
            total_participants: 0,
            total_tokens_staked: Decimal::ZERO,
            ends_at,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut unit = self.ledger.storage().begin_unit();
        unit.put_market(&market)?;
        unit.commit()?;

        tracing::info!(
            market_id = %market.market_id,
            options = market.options.len(),
            "Market created"
        );
        Ok(market)
    }

    /// Get a market by id
    pub fn get_market(&self, market_id: Uuid) -> Result<Market> {
        Ok(self.ledger.storage().get_market(market_id)?)
    }

    /// Unordered paginated market listing
    pub fn list_markets(&self, offset: usize, limit: usize) -> Result<Vec<Market>> {
        Ok(self.ledger.storage().markets(offset, limit)?)
    }

    /// Approximate row counts for operational dashboards
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(self.ledger.storage().get_stats()?)
    }

    /// Close the commitment window, leaving the market awaiting resolution
    pub async fn mark_pending_resolution(&self, market_id: Uuid) -> Result<Market> {
        self.transition_market(market_id, MarketStatus::PendingResolution, |market| {
            market.status == MarketStatus::Active
        })
        .await
    }

    /// Cancel a market and refund every active stake
    ///
    /// Refund failures do not roll back the cancellation; the failed
    /// remainder is retriable via [`MarketEngine::retry_cancellation_refunds`].
    pub async fn cancel_market(&self, market_id: Uuid) -> Result<(Market, RefundResult)> {
        let market = self
            .transition_market(market_id, MarketStatus::Cancelled, |market| {
                matches!(
                    market.status,
                    MarketStatus::Active | MarketStatus::PendingResolution
                )
            })
            .await?;

        let refunds = self.refund_active_commitments(market_id).await?;
        tracing::info!(
            market_id = %market_id,
            refunded = refunds.refunded,
            failed = refunds.failed,
            "Market cancelled, active stakes refunded"
        );
        Ok((market, refunds))
    }

    /// Re-run the refund pass for a cancelled market
    ///
    /// Already refunded stakes are skipped, so only the failed remainder
    /// is applied.
    pub async fn retry_cancellation_refunds(&self, market_id: Uuid) -> Result<RefundResult> {
        let market = self.ledger.storage().get_market(market_id)?;
        if market.status != MarketStatus::Cancelled {
            return Err(Error::MarketNotActive(format!(
                "market {} is {:?}, not cancelled",
                market_id, market.status
            )));
        }
        self.refund_active_commitments(market_id).await
    }

    /// Refund every active commitment on a market, one atomic unit per stake
    ///
    /// Used by cancellation and by the no-winners resolution path. Already
    /// non-active commitments are left alone, so the pass is idempotent.
    /// One stake's failure never blocks the rest; failures are collected
    /// and the pass re-run later.
    pub(crate) async fn refund_active_commitments(&self, market_id: Uuid) -> Result<RefundResult> {
        let storage = self.ledger.storage();
        let commitments = storage.commitments_for_market(market_id)?;

        let mut result = RefundResult {
            market_id,
            refunded: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
        };
        for commitment in commitments {
            if commitment.status != CommitmentStatus::Active {
                result.skipped += 1;
                continue;
            }

            match self
                .refund_one(market_id, commitment.commitment_id, &commitment.user_id)
                .await
            {
                Ok(true) => result.refunded += 1,
                Ok(false) => result.skipped += 1,
                Err(error) => {
                    let message = error.to_string();
                    tracing::error!(
                        market_id = %market_id,
                        commitment_id = %commitment.commitment_id,
                        user_id = %commitment.user_id,
                        "Refund failed for stake: {}",
                        message
                    );
                    result.failed += 1;
                    result.errors.push(DistributionError {
                        user_id: commitment.user_id.clone(),
                        message,
                    });
                }
            }
        }

        Ok(result)
    }

    /// Refund one stake; `false` when another refund already won
    async fn refund_one(
        &self,
        market_id: Uuid,
        commitment_id: Uuid,
        user_id: &UserId,
    ) -> Result<bool> {
        let storage = self.ledger.storage();
        let max_retries = self.config.ledger.concurrency.max_retries.max(1);
        let _lock = self.ledger.lock_user(user_id).await;

        let mut attempts = 0;
        loop {
            attempts += 1;

            // Re-read under the lock: a concurrent refund may have won
            let commitment = storage.get_commitment(commitment_id)?;
            if commitment.status != CommitmentStatus::Active {
                return Ok(false);
            }

            let balance = self.ledger.get_balance(&commitment.user_id).await?;
            let mut metadata = HashMap::new();
            metadata.insert("operation".to_string(), "refund".to_string());
            metadata.insert("commitment_id".to_string(), commitment_id.to_string());

            let mut unit = storage.begin_unit();
            self.ledger.stage_mutation(
                &mut unit,
                &balance,
                &Mutation::Refund {
                    stake: commitment.tokens_committed,
                },
                Some(market_id),
                metadata,
            )?;

            let mut cancelled = commitment.clone();
            cancelled.status = CommitmentStatus::Cancelled;
            cancelled.resolved_at = Some(Utc::now());
            unit.put_commitment(&cancelled)?;

            match unit.commit() {
                Ok(()) => return Ok(true),
                Err(token_ledger::Error::VersionConflict(detail)) => {
                    if attempts >= max_retries {
                        return Err(token_ledger::Error::ConcurrencyExhausted(format!(
                            "refund of commitment {} gave up after {} attempts: {}",
                            commitment_id, attempts, detail
                        ))
                        .into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Status transition under the market's optimistic guard
    async fn transition_market(
        &self,
        market_id: Uuid,
        to: MarketStatus,
        allowed: impl Fn(&Market) -> bool,
    ) -> Result<Market> {
        let storage = self.ledger.storage();
        let max_retries = self.config.ledger.concurrency.max_retries.max(1);

        let mut attempts = 0;
        loop {
            attempts += 1;

            let market = storage.get_market(market_id)?;
            if !allowed(&market) {
                return Err(Error::MarketNotActive(format!(
                    "market {} is {:?}",
                    market_id, market.status
                )));
            }

            let mut updated = market.clone();
            updated.status = to;
            updated.version = market.version + 1;
            updated.updated_at = Utc::now();

            let mut unit = storage.begin_unit();
            unit.put_market(&updated)?;
            unit.guard_market(market_id, market.version);

            match unit.commit() {
                Ok(()) => return Ok(updated),
                Err(token_ledger::Error::VersionConflict(detail)) => {
                    if attempts >= max_retries {
                        return Err(token_ledger::Error::ConcurrencyExhausted(format!(
                            "market {} transition gave up after {} attempts: {}",
                            market_id, attempts, detail
                        ))
                        .into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
