//! Aggregate market analytics for dashboards
//!
//! Read-only views over market counters. Legacy dashboards still render a
//! yes/no split, so every market also gets a two-way collapse: the focus
//! option (winning option once resolved, first option otherwise) versus
//! the rest.

use crate::{engine::MarketEngine, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use token_ledger::{types::MarketStatus, Market};
use uuid::Uuid;

/// Percentage decimal places in analytics payloads
const PCT_SCALE: u32 = 2;

/// Per-option analytics row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionAnalytics {
    /// Option id
    pub option_id: String,

    /// Display text
    pub text: String,

    /// Tokens staked on this option
    pub total_tokens: Decimal,

    /// Commitments targeting this option
    pub participant_count: u64,

    /// Share of all staked tokens, in percent
    pub percentage: Decimal,
}

/// Aggregate analytics for one market
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalytics {
    /// Market id
    pub market_id: Uuid,

    /// Market question
    pub question: String,

    /// Market status
    pub status: MarketStatus,

    /// Tokens staked across all options
    pub total_tokens: Decimal,

    /// Commitments across all options
    pub participant_count: u64,

    /// Per-option breakdown
    pub options: Vec<OptionAnalytics>,

    /// Two-way collapse: focus option's share
    pub yes_percentage: Decimal,

    /// Two-way collapse: everything else's share
    pub no_percentage: Decimal,
}

impl MarketAnalytics {
    /// JSON payload for dashboard consumers
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl MarketEngine {
    /// Analytics for one market
    ///
    /// The yes/no collapse uses the resolved winning option as the focus
    /// when one exists, otherwise the market's first option.
    pub fn market_analytics(&self, market_id: Uuid) -> Result<MarketAnalytics> {
        let storage = self.ledger.storage();
        let market = storage.get_market(market_id)?;

        let focus = storage
            .resolution_for_market(market_id)?
            .map(|r| r.winning_option_id)
            .unwrap_or_else(|| market.options[0].option_id.clone());

        Ok(build_analytics(&market, &focus))
    }

    /// Analytics for a page of markets
    pub fn list_analytics(&self, offset: usize, limit: usize) -> Result<Vec<MarketAnalytics>> {
        self.list_markets(offset, limit)?
            .iter()
            .map(|market| self.market_analytics(market.market_id))
            .collect()
    }
}

fn build_analytics(market: &Market, focus_option_id: &str) -> MarketAnalytics {
    let total = market.total_tokens_staked;
    let pct = |tokens: Decimal| -> Decimal {
        if total <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            (tokens / total * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(PCT_SCALE, RoundingStrategy::MidpointNearestEven)
        }
    };

    let options: Vec<OptionAnalytics> = market
        .options
        .iter()
        .map(|option| OptionAnalytics {
            option_id: option.option_id.clone(),
            text: option.text.clone(),
            total_tokens: option.total_tokens,
            participant_count: option.participant_count,
            percentage: pct(option.total_tokens),
        })
        .collect();

    let focus_tokens = market
        .option(focus_option_id)
        .map(|o| o.total_tokens)
        .unwrap_or(Decimal::ZERO);
    let yes_percentage = pct(focus_tokens);
    let no_percentage = if total <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        Decimal::ONE_HUNDRED - yes_percentage
    };

    MarketAnalytics {
        market_id: market.market_id,
        question: market.question.clone(),
        status: market.status,
        total_tokens: total,
        participant_count: market.total_participants,
        options,
        yes_percentage,
        no_percentage,
    }
}
