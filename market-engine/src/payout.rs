//! Resolution payout calculator
//!
//! Pure planning: given a market, its commitments and the winning option,
//! produce the full payout plan with fees, proportional winner slices and a
//! per-commitment addressing audit. Never writes; execution lives in
//! [`crate::distribution`].

use crate::{
    config::FeeConfig,
    types::{AddressingAudit, LoserEntry, PayoutCalculation, WinnerPayout},
    Error, Result,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use token_ledger::{Commitment, Market};

/// Decimal places payouts are truncated to
const PAYOUT_SCALE: u32 = 4;

/// Compute the payout plan for a resolution
///
/// Each commitment's side is decided by the same addressing resolver used
/// at commit time, applied to whichever of its fields is present. Truncating
/// each payout keeps `Σ payouts <= winner_pool` exact; the remainder stays
/// with the house.
pub fn calculate_payouts(
    market: &Market,
    commitments: &[Commitment],
    winning_option_id: &str,
    creator_fee_pct: Decimal,
    fees: &FeeConfig,
) -> Result<PayoutCalculation> {
    if market.option(winning_option_id).is_none() {
        return Err(token_ledger::Error::OptionNotFound(winning_option_id.to_string()).into());
    }
    if creator_fee_pct < Decimal::ZERO || creator_fee_pct > fees.max_creator_fee_pct {
        return Err(Error::InvalidFee(format!(
            "creator fee {} outside [0, {}]",
            creator_fee_pct, fees.max_creator_fee_pct
        )));
    }

    let mut winners: Vec<&Commitment> = Vec::new();
    let mut losers: Vec<LoserEntry> = Vec::new();
    let mut audit: Vec<AddressingAudit> = Vec::new();
    let mut seen: HashSet<uuid::Uuid> = HashSet::new();

    for commitment in commitments {
        if !seen.insert(commitment.commitment_id) {
            return Err(token_ledger::Error::InvariantViolation(format!(
                "commitment {} appears twice in the input set",
                commitment.commitment_id
            ))
            .into());
        }

        let resolved = commitment.target()?.resolve(market)?;
        let winner = resolved.option_id == winning_option_id;

        audit.push(AddressingAudit {
            commitment_id: commitment.commitment_id,
            resolved_option_id: resolved.option_id,
            method: resolved.method,
            winner,
            disagreement: resolved.disagreement,
        });

        if winner {
            winners.push(commitment);
        } else {
            losers.push(LoserEntry {
                commitment_id: commitment.commitment_id,
                user_id: commitment.user_id.clone(),
                tokens_committed: commitment.tokens_committed,
            });
        }
    }

    let total_pool: Decimal = commitments.iter().map(|c| c.tokens_committed).sum();
    let house_fee = total_pool * fees.house_fee_pct;
    let creator_fee = total_pool * creator_fee_pct;
    let winner_pool = total_pool - house_fee - creator_fee;

    if winners.is_empty() {
        return Err(Error::NoWinners {
            unallocated: winner_pool,
        });
    }

    let winning_total: Decimal = winners.iter().map(|c| c.tokens_committed).sum();
    let winner_payouts: Vec<WinnerPayout> = winners
        .iter()
        .map(|commitment| {
            let win_share = commitment.tokens_committed / winning_total;
            let payout = (winner_pool * win_share)
                .round_dp_with_strategy(PAYOUT_SCALE, RoundingStrategy::ToZero);
            WinnerPayout {
                commitment_id: commitment.commitment_id,
                user_id: commitment.user_id.clone(),
                tokens_committed: commitment.tokens_committed,
                win_share,
                payout,
                profit: payout - commitment.tokens_committed,
            }
        })
        .collect();

    let total_payout: Decimal = winner_payouts.iter().map(|w| w.payout).sum();

    // Aggregate verification: full coverage and the payout bound
    if winner_payouts.len() + losers.len() != commitments.len() {
        return Err(token_ledger::Error::InvariantViolation(format!(
            "{} winners + {} losers != {} commitments",
            winner_payouts.len(),
            losers.len(),
            commitments.len()
        ))
        .into());
    }
    if total_payout > winner_pool {
        return Err(token_ledger::Error::InvariantViolation(format!(
            "payouts {} exceed winner pool {}",
            total_payout, winner_pool
        ))
        .into());
    }

    Ok(PayoutCalculation {
        market_id: market.market_id,
        winning_option_id: winning_option_id.to_string(),
        total_pool,
        house_fee,
        creator_fee,
        winner_pool,
        winner_count: winner_payouts.len() as u64,
        winners: winner_payouts,
        losers,
        audit,
        total_payout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use token_ledger::types::{
        CommitmentStatus, MarketOption, MarketSnapshot, MarketStatus, Position,
    };
    use token_ledger::UserId;
    use uuid::Uuid;

    fn market(options: &[&str]) -> Market {
        Market {
            market_id: Uuid::new_v4(),
            question: "test?".to_string(),
            status: MarketStatus::PendingResolution,
            options: options
                .iter()
                .map(|id| MarketOption {
                    option_id: id.to_string(),
                    text: id.to_string(),
                    total_tokens: Decimal::ZERO,
                    participant_count: 0,
                })
                .collect(),
            total_participants: 0,
            total_tokens_staked: Decimal::ZERO,
            ends_at: Utc::now(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn commitment(
        user: &str,
        tokens: i64,
        position: Option<Position>,
        option_id: Option<&str>,
    ) -> Commitment {
        Commitment {
            commitment_id: Uuid::new_v4(),
            user_id: UserId::new(user),
            market_id: Uuid::new_v4(),
            option_id: option_id.map(|s| s.to_string()),
            position,
            tokens_committed: Decimal::from(tokens),
            odds: Decimal::TWO,
            potential_winning: Decimal::from(tokens * 2),
            status: CommitmentStatus::Active,
            committed_at: Utc::now(),
            resolved_at: None,
            snapshot: MarketSnapshot {
                options: vec![],
                total_tokens_staked: Decimal::ZERO,
                total_participants: 0,
                captured_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_two_sided_market_exact_pool() {
        // 2000-token pool, 5% house + 2% creator => 1860 winner pool,
        // single yes winner takes it all
        let market = market(&["yes-opt", "no-opt"]);
        let commitments = vec![
            commitment("alice", 500, Some(Position::Yes), None),
            commitment("bob", 1500, Some(Position::No), None),
        ];

        let calc = calculate_payouts(
            &market,
            &commitments,
            "yes-opt",
            Decimal::new(2, 2),
            &FeeConfig::default(),
        )
        .unwrap();

        assert_eq!(calc.total_pool, Decimal::from(2000));
        assert_eq!(calc.house_fee, Decimal::from(100));
        assert_eq!(calc.creator_fee, Decimal::from(40));
        assert_eq!(calc.winner_pool, Decimal::from(1860));
        assert_eq!(calc.winner_count, 1);
        assert_eq!(calc.winners[0].win_share, Decimal::ONE);
        assert_eq!(calc.winners[0].payout, Decimal::from(1860));
        assert_eq!(calc.winners[0].profit, Decimal::from(1360));
        assert_eq!(calc.total_payout, calc.winner_pool);
        assert_eq!(calc.losers.len(), 1);
    }

    #[test]
    fn test_proportional_split_bounded() {
        // Uneven three-way split: truncation keeps the sum under the pool
        let market = market(&["a", "b", "c"]);
        let commitments = vec![
            commitment("u1", 100, None, Some("a")),
            commitment("u2", 200, None, Some("a")),
            commitment("u3", 33, None, Some("a")),
            commitment("u4", 667, None, Some("b")),
        ];

        let calc = calculate_payouts(
            &market,
            &commitments,
            "a",
            Decimal::ZERO,
            &FeeConfig::default(),
        )
        .unwrap();

        assert_eq!(calc.winner_count, 3);
        assert!(calc.total_payout <= calc.winner_pool);
        let share_sum: Decimal = calc.winners.iter().map(|w| w.win_share).sum();
        assert!((share_sum - Decimal::ONE).abs() < Decimal::new(1, 10));
        assert_eq!(
            calc.winners.len() + calc.losers.len(),
            calc.audit.len()
        );
    }

    #[test]
    fn test_mixed_addressing_formats() {
        // Legacy position-only, canonical id-only and dual-field rows all
        // land on the same side
        let market = market(&["first", "second"]);
        let commitments = vec![
            commitment("u1", 100, Some(Position::Yes), None),
            commitment("u2", 100, None, Some("first")),
            commitment("u3", 100, Some(Position::Yes), Some("first")),
            commitment("u4", 100, Some(Position::No), None),
        ];

        let calc = calculate_payouts(
            &market,
            &commitments,
            "first",
            Decimal::ZERO,
            &FeeConfig::default(),
        )
        .unwrap();

        assert_eq!(calc.winner_count, 3);
        let methods: Vec<_> = calc
            .audit
            .iter()
            .filter(|a| a.winner)
            .map(|a| a.method)
            .collect();
        use token_ledger::types::AddressingMethod::*;
        assert!(methods.contains(&PositionBased));
        assert!(methods.contains(&OptionIdBased));
        assert!(methods.contains(&Hybrid));
    }

    #[test]
    fn test_no_winners_surfaced() {
        let market = market(&["a", "b", "c"]);
        let commitments = vec![
            commitment("u1", 100, None, Some("a")),
            commitment("u2", 300, None, Some("b")),
        ];

        let result = calculate_payouts(
            &market,
            &commitments,
            "c",
            Decimal::ZERO,
            &FeeConfig::default(),
        );
        match result {
            Err(Error::NoWinners { unallocated }) => {
                assert_eq!(unallocated, Decimal::from(380)); // 400 - 5% house
            }
            other => panic!("expected NoWinners, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_excessive_creator_fee_rejected() {
        let market = market(&["a", "b"]);
        let commitments = vec![commitment("u1", 100, None, Some("a"))];
        let result = calculate_payouts(
            &market,
            &commitments,
            "a",
            Decimal::new(11, 2),
            &FeeConfig::default(),
        );
        assert!(matches!(result, Err(Error::InvalidFee(_))));
    }

    #[test]
    fn test_unknown_winning_option_rejected() {
        let market = market(&["a", "b"]);
        let result = calculate_payouts(&market, &[], "zzz", Decimal::ZERO, &FeeConfig::default());
        assert_eq!(result.unwrap_err().code(), "OPTION_NOT_FOUND");
    }

    #[test]
    fn test_duplicate_commitment_rejected() {
        let market = market(&["a", "b"]);
        let c = commitment("u1", 100, None, Some("a"));
        let commitments = vec![c.clone(), c];
        let result = calculate_payouts(
            &market,
            &commitments,
            "a",
            Decimal::ZERO,
            &FeeConfig::default(),
        );
        assert_eq!(result.unwrap_err().code(), "INVARIANT_VIOLATION");
    }
}
