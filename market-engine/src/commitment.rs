//! Commitment creation
//!
//! One stake = one atomic unit: the balance commit, the transaction-log
//! append, the commitment row with its market snapshot, and the market
//! counter bumps all land together or not at all. Market counters are
//! guarded by the market version; a racing commitment retries with fresh
//! counters rather than losing an update.

use crate::{
    engine::MarketEngine,
    odds::compute_odds,
    types::{CommitmentRequest, CommitmentResponse},
    Error, Result,
};
use chrono::Utc;
use std::collections::HashMap;
use token_ledger::{
    types::{CommitmentStatus, MarketSnapshot, MarketStatus, Mutation, OptionSnapshot},
    Commitment, Market, UserId,
};
use uuid::Uuid;

impl MarketEngine {
    /// Create a stake, returning the API envelope
    ///
    /// Infallible wrapper over [`Self::create_commitment`]: every error is
    /// folded into the envelope with its stable code.
    pub async fn create_commitment_response(
        &self,
        request: &CommitmentRequest,
    ) -> CommitmentResponse {
        match self.create_commitment(request).await {
            Ok(commitment) => CommitmentResponse::ok(commitment),
            Err(error) => {
                tracing::warn!(
                    user_id = %request.user_id,
                    market_id = %request.market_id,
                    code = error.code(),
                    "Commitment rejected: {}",
                    error
                );
                CommitmentResponse::err(&error)
            }
        }
    }

    /// Validate and create a stake
    ///
    /// The market is checked first, so a bad request against a missing or
    /// closed market reports the market's state rather than the request's.
    pub async fn create_commitment(&self, request: &CommitmentRequest) -> Result<Commitment> {
        let user_id = UserId::new(request.user_id.clone());
        let storage = self.ledger.storage();
        let max_retries = self.config.ledger.concurrency.max_retries.max(1);

        let _lock = self.ledger.lock_user(&user_id).await;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let market = storage.get_market(request.market_id)?;
            if market.status != MarketStatus::Active {
                return Err(Error::MarketNotActive(format!(
                    "market {} is {:?}",
                    market.market_id, market.status
                )));
            }
            if Utc::now() >= market.ends_at {
                return Err(Error::MarketEnded(format!(
                    "market {} ended at {}",
                    market.market_id, market.ends_at
                )));
            }
            if request.tokens_to_commit < self.config.stakes.min_stake
                || request.tokens_to_commit > self.config.stakes.max_stake
            {
                return Err(Error::InvalidAmount(format!(
                    "stake {} outside [{}, {}]",
                    request.tokens_to_commit,
                    self.config.stakes.min_stake,
                    self.config.stakes.max_stake
                )));
            }

            let target = request.target()?;
            let resolved = target.resolve(&market)?;
            let odds = compute_odds(&market, &resolved.option_id, &self.config.odds);

            let mut metadata = HashMap::new();
            metadata.insert("operation".to_string(), "commit".to_string());
            metadata.insert("option_id".to_string(), resolved.option_id.clone());
            metadata.insert(
                "addressing_method".to_string(),
                resolved.method.as_str().to_string(),
            );
            if let Some(disagreement) = &resolved.disagreement {
                metadata.insert("addressing_disagreement".to_string(), disagreement.clone());
            }
            if let Some(client) = &request.client_info {
                metadata.insert("source".to_string(), client.source.clone());
            }

            let balance = self.ledger.get_balance(&user_id).await?;
            let mut unit = storage.begin_unit();
            self.ledger.stage_mutation(
                &mut unit,
                &balance,
                &Mutation::Commit {
                    amount: request.tokens_to_commit,
                },
                Some(market.market_id),
                metadata,
            )?;

            let commitment = Commitment {
                commitment_id: Uuid::now_v7(),
                user_id: user_id.clone(),
                market_id: market.market_id,
                option_id: Some(resolved.option_id.clone()),
                position: resolved.position,
                tokens_committed: request.tokens_to_commit,
                odds,
                potential_winning: request.tokens_to_commit * odds,
                status: CommitmentStatus::Active,
                committed_at: Utc::now(),
                resolved_at: None,
                snapshot: snapshot_market(&market, &self.config.odds),
            };
            unit.put_commitment(&commitment)?;

            let mut updated = market.clone();
            if let Some(index) = updated.option_index(&resolved.option_id) {
                updated.options[index].total_tokens += request.tokens_to_commit;
                updated.options[index].participant_count += 1;
            }
            updated.total_tokens_staked += request.tokens_to_commit;
            updated.total_participants += 1;
            updated.version = market.version + 1;
            updated.updated_at = Utc::now();
            unit.put_market(&updated)?;
            unit.guard_market(market.market_id, market.version);

            match unit.commit() {
                Ok(()) => {
                    tracing::info!(
                        commitment_id = %commitment.commitment_id,
                        user_id = %user_id,
                        market_id = %market.market_id,
                        option_id = %resolved.option_id,
                        tokens = %request.tokens_to_commit,
                        odds = %odds,
                        "Commitment created"
                    );
                    return Ok(commitment);
                }
                Err(token_ledger::Error::VersionConflict(detail)) => {
                    if attempts >= max_retries {
                        return Err(token_ledger::Error::ConcurrencyExhausted(format!(
                            "commitment for user {} gave up after {} attempts: {}",
                            user_id, attempts, detail
                        ))
                        .into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Capture per-option odds/counter state for every option in the market
fn snapshot_market(market: &Market, odds_config: &crate::config::OddsConfig) -> MarketSnapshot {
    MarketSnapshot {
        options: market
            .options
            .iter()
            .map(|option| OptionSnapshot {
                option_id: option.option_id.clone(),
                total_tokens: option.total_tokens,
                participant_count: option.participant_count,
                odds: compute_odds(market, &option.option_id, odds_config),
            })
            .collect(),
        total_tokens_staked: market.total_tokens_staked,
        total_participants: market.total_participants,
        captured_at: Utc::now(),
    }
}
