//! Odds computation
//!
//! Odds are the inverse of the target option's share of the staked pool,
//! clamped to the configured band. They are a snapshot: computed at commit
//! time, stored on the commitment, and never recomputed afterwards.

use crate::config::OddsConfig;
use rust_decimal::Decimal;
use token_ledger::Market;

/// Odds for staking on `option_id` given current market state
///
/// `1 / max(target_share, epsilon)`, clamped to `[floor, cap]`. A market
/// with zero tokens staked has no share to invert and gets the default.
pub fn compute_odds(market: &Market, option_id: &str, config: &OddsConfig) -> Decimal {
    if market.total_tokens_staked <= Decimal::ZERO {
        return config.default_odds;
    }

    let target_tokens = market
        .option(option_id)
        .map(|o| o.total_tokens)
        .unwrap_or(Decimal::ZERO);

    let share = (target_tokens / market.total_tokens_staked).max(config.epsilon);
    (Decimal::ONE / share).clamp(config.floor, config.cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use token_ledger::types::{MarketOption, MarketStatus};
    use uuid::Uuid;

    fn market(stakes: &[(&str, i64)]) -> Market {
        let total: i64 = stakes.iter().map(|(_, t)| t).sum();
        Market {
            market_id: Uuid::new_v4(),
            question: "test?".to_string(),
            status: MarketStatus::Active,
            options: stakes
                .iter()
                .map(|(id, tokens)| MarketOption {
                    option_id: id.to_string(),
                    text: id.to_string(),
                    total_tokens: Decimal::from(*tokens),
                    participant_count: 0,
                })
                .collect(),
            total_participants: 0,
            total_tokens_staked: Decimal::from(total),
            ends_at: Utc::now() + chrono::Duration::hours(1),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_market_gets_default() {
        let market = market(&[("a", 0), ("b", 0)]);
        assert_eq!(
            compute_odds(&market, "a", &OddsConfig::default()),
            Decimal::TWO
        );
    }

    #[test]
    fn test_even_split_clamps_to_floor() {
        // 50% share inverts to 2.0, inside the band
        let market = market(&[("a", 500), ("b", 500)]);
        assert_eq!(
            compute_odds(&market, "a", &OddsConfig::default()),
            Decimal::TWO
        );
    }

    #[test]
    fn test_dominant_option_hits_floor() {
        // 99% share inverts below 1.1
        let market = market(&[("a", 990), ("b", 10)]);
        assert_eq!(
            compute_odds(&market, "a", &OddsConfig::default()),
            Decimal::new(11, 1)
        );
    }

    #[test]
    fn test_longshot_hits_cap() {
        // Empty target option: share floored at epsilon, inverse capped at 10
        let market = market(&[("a", 1000), ("b", 0)]);
        assert_eq!(
            compute_odds(&market, "b", &OddsConfig::default()),
            Decimal::from(10)
        );
    }

    #[test]
    fn test_odds_always_in_band() {
        let config = OddsConfig::default();
        for target in [1i64, 10, 100, 400, 700, 999] {
            let market = market(&[("a", target), ("b", 1000 - target)]);
            let odds = compute_odds(&market, "a", &config);
            assert!(odds >= config.floor && odds <= config.cap, "odds {}", odds);
        }
    }
}
