//! Core types for the token ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for token amounts)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// User identifier (platform account id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-user token account
///
/// Owned exclusively by the [`crate::ledger::BalanceLedger`]; every mutation
/// increments `version` by exactly 1 and is written atomically with the
/// matching [`TokenTransaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    /// Account owner
    pub user_id: UserId,

    /// Tokens free to commit
    pub available_tokens: Decimal,

    /// Tokens locked in active commitments
    pub committed_tokens: Decimal,

    /// Lifetime tokens credited (purchases + payouts)
    pub total_earned: Decimal,

    /// Lifetime tokens debited (lost + released stakes)
    pub total_spent: Decimal,

    /// Optimistic-lock counter, +1 per successful mutation
    pub version: u64,

    /// Last mutation timestamp
    pub last_updated: DateTime<Utc>,
}

impl UserBalance {
    /// A fresh zeroed account for first access
    pub fn zeroed(user_id: UserId) -> Self {
        Self {
            user_id,
            available_tokens: Decimal::ZERO,
            committed_tokens: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            version: 0,
            last_updated: Utc::now(),
        }
    }

    /// Conservation invariant: available + committed == earned - spent
    pub fn conserves(&self) -> bool {
        self.available_tokens + self.committed_tokens == self.total_earned - self.total_spent
    }

    /// Apply a mutation, returning the successor balance
    ///
    /// Every mutation kind preserves the conservation invariant on its own.
    /// A resulting negative `available`/`committed` is an invariant
    /// violation and fails the whole atomic unit.
    pub fn apply(&self, mutation: &Mutation) -> crate::Result<UserBalance> {
        let mut next = self.clone();

        match mutation {
            Mutation::Purchase { amount } => {
                require_positive(*amount, "purchase amount")?;
                next.available_tokens += *amount;
                next.total_earned += *amount;
            }
            Mutation::Commit { amount } => {
                require_positive(*amount, "commit amount")?;
                if self.available_tokens < *amount {
                    return Err(crate::Error::InsufficientBalance {
                        required: *amount,
                        available: self.available_tokens,
                    });
                }
                next.available_tokens -= *amount;
                next.committed_tokens += *amount;
            }
            Mutation::Win {
                payout,
                stake_released,
            } => {
                require_positive(*stake_released, "released stake")?;
                if *payout < Decimal::ZERO {
                    return Err(crate::Error::InvariantViolation(
                        "win payout must be non-negative".to_string(),
                    ));
                }
                next.committed_tokens -= *stake_released;
                next.available_tokens += *payout;
                next.total_earned += *payout;
                next.total_spent += *stake_released;
            }
            Mutation::Loss { stake } => {
                require_positive(*stake, "lost stake")?;
                next.committed_tokens -= *stake;
                next.total_spent += *stake;
            }
            Mutation::Refund { stake } => {
                require_positive(*stake, "refunded stake")?;
                next.committed_tokens -= *stake;
                next.available_tokens += *stake;
            }
        }

        if next.available_tokens < Decimal::ZERO || next.committed_tokens < Decimal::ZERO {
            return Err(crate::Error::InvariantViolation(format!(
                "mutation would leave user {} with available={} committed={}",
                self.user_id, next.available_tokens, next.committed_tokens
            )));
        }

        next.version = self.version + 1;
        next.last_updated = Utc::now();

        Ok(next)
    }
}

fn require_positive(amount: Decimal, what: &str) -> crate::Result<()> {
    if amount <= Decimal::ZERO {
        return Err(crate::Error::InvariantViolation(format!(
            "{} must be positive, got {}",
            what, amount
        )));
    }
    Ok(())
}

/// Balance mutation
///
/// `Win` carries both the payout credited to `available` and the stake
/// released from `committed`; a single figure cannot satisfy conservation
/// when payout != stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Token purchase: available += amount, earned += amount
    Purchase {
        /// Tokens purchased
        amount: Decimal,
    },
    /// Stake commitment: available -= amount, committed += amount
    Commit {
        /// Tokens to lock
        amount: Decimal,
    },
    /// Winning payout: releases the stake, credits the payout
    Win {
        /// Tokens credited to available/earned
        payout: Decimal,
        /// Stake leaving committed (added to spent)
        stake_released: Decimal,
    },
    /// Losing stake: committed -= stake, spent += stake
    Loss {
        /// Stake forfeited
        stake: Decimal,
    },
    /// Stake refund: committed -= stake, available += stake
    Refund {
        /// Stake returned
        stake: Decimal,
    },
}

impl Mutation {
    /// Transaction kind recorded in the log for this mutation
    pub fn kind(&self) -> TransactionKind {
        match self {
            Mutation::Purchase { .. } => TransactionKind::Purchase,
            Mutation::Commit { .. } => TransactionKind::Commit,
            Mutation::Win { .. } => TransactionKind::Win,
            Mutation::Loss { .. } => TransactionKind::Loss,
            Mutation::Refund { .. } => TransactionKind::Refund,
        }
    }

    /// Principal amount recorded in the log
    pub fn amount(&self) -> Decimal {
        match self {
            Mutation::Purchase { amount } | Mutation::Commit { amount } => *amount,
            Mutation::Win { payout, .. } => *payout,
            Mutation::Loss { stake } | Mutation::Refund { stake } => *stake,
        }
    }

    /// Stake released by this mutation, if any (win only)
    pub fn stake_released(&self) -> Option<Decimal> {
        match self {
            Mutation::Win { stake_released, .. } => Some(*stake_released),
            _ => None,
        }
    }
}

/// Transaction kind (mirrors the mutation that produced it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    /// Token purchase
    Purchase = 1,
    /// Stake commitment
    Commit = 2,
    /// Winning payout
    Win = 3,
    /// Losing stake
    Loss = 4,
    /// Stake refund
    Refund = 5,
}

/// Transaction status
///
/// Failed units never reach the log, so only completed records are
/// persisted; the enum exists for schema evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Applied and durable
    Completed = 1,
}

/// Immutable transaction-log record
///
/// Created 1:1 with every [`UserBalance`] mutation in the same atomic unit.
/// Append-only; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub transaction_id: Uuid,

    /// Account mutated
    pub user_id: UserId,

    /// Mutation kind
    pub kind: TransactionKind,

    /// Principal amount (payout for wins)
    pub amount: Decimal,

    /// Stake released from committed (win records only)
    pub stake_released: Option<Decimal>,

    /// Available tokens before the mutation
    pub balance_before: Decimal,

    /// Available tokens after the mutation
    pub balance_after: Decimal,

    /// Market or resolution this mutation belongs to
    pub related_id: Option<Uuid>,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Record timestamp
    pub timestamp: DateTime<Utc>,

    /// Record status
    pub status: TransactionStatus,
}

/// Market status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MarketStatus {
    /// Accepting commitments
    Active = 1,
    /// Ended, awaiting resolution
    PendingResolution = 2,
    /// Winning option declared
    Resolved = 3,
    /// Cancelled, stakes refunded
    Cancelled = 4,
}

/// A selectable outcome within a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOption {
    /// Option identifier, unique within the market
    pub option_id: String,

    /// Display text
    pub text: String,

    /// Tokens staked on this option
    pub total_tokens: Decimal,

    /// Number of commitments targeting this option
    pub participant_count: u64,
}

/// Prediction market
///
/// Two options = legacy "binary" market, more = multi-option; the type is
/// derived from the options list and never stored as a separate flag.
/// Carries a `version` so option/aggregate counters get the same
/// lost-update protection as balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Market identifier
    pub market_id: Uuid,

    /// Question being predicted
    pub question: String,

    /// Current status
    pub status: MarketStatus,

    /// Outcome options (length >= 2)
    pub options: Vec<MarketOption>,

    /// Total commitments across all options
    pub total_participants: u64,

    /// Total tokens staked across all options
    pub total_tokens_staked: Decimal,

    /// Commitment deadline
    pub ends_at: DateTime<Utc>,

    /// Optimistic-lock counter for counter updates
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last counter/status update
    pub updated_at: DateTime<Utc>,
}

impl Market {
    /// Legacy two-option market?
    pub fn is_binary(&self) -> bool {
        self.options.len() == 2
    }

    /// Look up an option by id
    pub fn option(&self, option_id: &str) -> Option<&MarketOption> {
        self.options.iter().find(|o| o.option_id == option_id)
    }

    /// Index of an option within the options list
    pub fn option_index(&self, option_id: &str) -> Option<usize> {
        self.options.iter().position(|o| o.option_id == option_id)
    }

    /// Legacy position for an option: yes = first, no = second, none beyond
    pub fn position_for(&self, option_id: &str) -> Option<Position> {
        match self.option_index(option_id)? {
            0 => Some(Position::Yes),
            1 => Some(Position::No),
            _ => None,
        }
    }
}

/// Legacy binary-market position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Position {
    /// First option
    Yes = 1,
    /// Second option
    No = 2,
}

impl Position {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Yes => "yes",
            Position::No => "no",
        }
    }

    /// Parse from wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(Position::Yes),
            "no" => Some(Position::No),
            _ => None,
        }
    }

    /// Option index this position maps to
    pub fn option_index(&self) -> usize {
        match self {
            Position::Yes => 0,
            Position::No => 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a stake addresses its target option
///
/// The platform grew from binary `yes`/`no` positions to canonical option
/// ids; requests and stored commitments may carry either or both. This is
/// the single resolver for both — resolved once at commit time and once per
/// commitment at payout time, never re-derived ad hoc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeTarget {
    /// Legacy addressing: yes/no position only
    Position(Position),
    /// Canonical addressing: option id only
    Option(String),
    /// Both fields present
    Both {
        /// Legacy position
        position: Position,
        /// Canonical option id
        option_id: String,
    },
}

/// Which addressing field decided the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressingMethod {
    /// Legacy position field decided
    PositionBased,
    /// Canonical option id decided
    OptionIdBased,
    /// Both fields present and agreed
    Hybrid,
}

impl AddressingMethod {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressingMethod::PositionBased => "position-based",
            AddressingMethod::OptionIdBased => "optionId-based",
            AddressingMethod::Hybrid => "hybrid",
        }
    }
}

/// Outcome of resolving a [`StakeTarget`] against a market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Canonical option id chosen
    pub option_id: String,

    /// Legacy position derived from the chosen option, if derivable
    pub position: Option<Position>,

    /// Which addressing field decided
    pub method: AddressingMethod,

    /// Recorded when the two fields disagreed and one was overridden
    pub disagreement: Option<String>,
}

impl StakeTarget {
    /// Resolve the target option against a market
    ///
    /// On 2-option markets `position` is authoritative; a disagreeing
    /// `option_id` is overridden (non-fatal) and the disagreement recorded.
    /// On larger markets `option_id` is authoritative and a bare `position`
    /// falls back to the first/second option. An explicit but unknown
    /// `option_id` with no position to fall back on fails `OptionNotFound`.
    pub fn resolve(&self, market: &Market) -> crate::Result<ResolvedTarget> {
        if market.options.len() < 2 {
            return Err(crate::Error::InvariantViolation(format!(
                "market {} has fewer than 2 options",
                market.market_id
            )));
        }

        let by_position = |position: Position| -> String {
            market.options[position.option_index()].option_id.clone()
        };

        if market.is_binary() {
            match self {
                StakeTarget::Position(position) => {
                    let option_id = by_position(*position);
                    Ok(ResolvedTarget {
                        position: market.position_for(&option_id),
                        option_id,
                        method: AddressingMethod::PositionBased,
                        disagreement: None,
                    })
                }
                StakeTarget::Option(option_id) => {
                    if market.option(option_id).is_none() {
                        return Err(crate::Error::OptionNotFound(option_id.clone()));
                    }
                    Ok(ResolvedTarget {
                        position: market.position_for(option_id),
                        option_id: option_id.clone(),
                        method: AddressingMethod::OptionIdBased,
                        disagreement: None,
                    })
                }
                StakeTarget::Both {
                    position,
                    option_id,
                } => {
                    // Position is authoritative on binary markets
                    let chosen = by_position(*position);
                    if *option_id == chosen {
                        Ok(ResolvedTarget {
                            position: Some(*position),
                            option_id: chosen,
                            method: AddressingMethod::Hybrid,
                            disagreement: None,
                        })
                    } else {
                        Ok(ResolvedTarget {
                            position: Some(*position),
                            disagreement: Some(format!(
                                "option id {} overridden by position {} -> {}",
                                option_id, position, chosen
                            )),
                            option_id: chosen,
                            method: AddressingMethod::PositionBased,
                        })
                    }
                }
            }
        } else {
            match self {
                StakeTarget::Option(option_id) => {
                    if market.option(option_id).is_none() {
                        return Err(crate::Error::OptionNotFound(option_id.clone()));
                    }
                    Ok(ResolvedTarget {
                        position: market.position_for(option_id),
                        option_id: option_id.clone(),
                        method: AddressingMethod::OptionIdBased,
                        disagreement: None,
                    })
                }
                StakeTarget::Position(position) => {
                    // Legacy fallback: yes/no map to first/second option
                    let option_id = by_position(*position);
                    Ok(ResolvedTarget {
                        position: market.position_for(&option_id),
                        option_id,
                        method: AddressingMethod::PositionBased,
                        disagreement: None,
                    })
                }
                StakeTarget::Both {
                    position,
                    option_id,
                } => {
                    // Option id is authoritative on multi-option markets
                    if market.option(option_id).is_none() {
                        return Err(crate::Error::OptionNotFound(option_id.clone()));
                    }
                    let derived = market.position_for(option_id);
                    if derived == Some(*position) {
                        Ok(ResolvedTarget {
                            position: derived,
                            option_id: option_id.clone(),
                            method: AddressingMethod::Hybrid,
                            disagreement: None,
                        })
                    } else {
                        Ok(ResolvedTarget {
                            position: derived,
                            option_id: option_id.clone(),
                            method: AddressingMethod::OptionIdBased,
                            disagreement: Some(format!(
                                "position {} overridden by option id {}",
                                position, option_id
                            )),
                        })
                    }
                }
            }
        }
    }
}

/// Commitment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommitmentStatus {
    /// Stake locked, market unresolved
    Active = 1,
    /// Resolved as winner
    Won = 2,
    /// Resolved as loser
    Lost = 3,
    /// Refunded (market cancelled or no winners)
    Cancelled = 4,
}

/// Per-option state captured when a commitment was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSnapshot {
    /// Option id
    pub option_id: String,

    /// Tokens staked at capture time
    pub total_tokens: Decimal,

    /// Commitments at capture time
    pub participant_count: u64,

    /// Odds at capture time
    pub odds: Decimal,
}

/// Full market state captured when a commitment was created
///
/// Covers every option in the market, not only the targeted one, so
/// dashboards and audits can reconstruct historical odds without
/// re-deriving them from evolving market counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// All options at capture time
    pub options: Vec<OptionSnapshot>,

    /// Market-wide tokens at capture time
    pub total_tokens_staked: Decimal,

    /// Market-wide commitments at capture time
    pub total_participants: u64,

    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

/// One user's token stake on one market option
///
/// Carries both addressing fields for compatibility: `position` (legacy,
/// meaningful for 2-option markets) and `option_id` (canonical). The engine
/// writes both whenever derivable; historical rows may carry only one.
/// Mutated only by resolution (status/resolved_at); never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commitment {
    /// Commitment identifier
    pub commitment_id: Uuid,

    /// Staking user
    pub user_id: UserId,

    /// Market staked on
    pub market_id: Uuid,

    /// Canonical option addressing
    pub option_id: Option<String>,

    /// Legacy position addressing
    pub position: Option<Position>,

    /// Stake size
    pub tokens_committed: Decimal,

    /// Odds snapshot at commit time
    pub odds: Decimal,

    /// Stake times odds at commit time
    pub potential_winning: Decimal,

    /// Current status
    pub status: CommitmentStatus,

    /// Creation timestamp
    pub committed_at: DateTime<Utc>,

    /// Resolution timestamp, once resolved
    pub resolved_at: Option<DateTime<Utc>>,

    /// Market odds/option state at commit time
    pub snapshot: MarketSnapshot,
}

impl Commitment {
    /// Reconstruct the stake target from the stored addressing fields
    ///
    /// A record with neither field is unresolvable and surfaces
    /// `AmbiguousTarget` — a data-corruption signal, never swallowed.
    pub fn target(&self) -> crate::Result<StakeTarget> {
        match (&self.position, &self.option_id) {
            (Some(position), Some(option_id)) => Ok(StakeTarget::Both {
                position: *position,
                option_id: option_id.clone(),
            }),
            (Some(position), None) => Ok(StakeTarget::Position(*position)),
            (None, Some(option_id)) => Ok(StakeTarget::Option(option_id.clone())),
            (None, None) => Err(crate::Error::AmbiguousTarget(format!(
                "commitment {} carries neither position nor option id",
                self.commitment_id
            ))),
        }
    }
}

/// Resolution status (distribution progress)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResolutionStatus {
    /// Resolution recorded, payouts not yet applied
    PayoutPending = 1,
    /// All per-user distributions completed
    Completed = 2,
    /// Some per-user distributions failed; retriable
    PartiallyFailed = 3,
    /// Winning option had no commitments; all stakes refunded
    NoWinnersRefunded = 4,
}

/// Declared outcome of a market
///
/// Created once per market resolution; immutable after creation except for
/// the distribution status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Resolution identifier
    pub resolution_id: Uuid,

    /// Resolved market
    pub market_id: Uuid,

    /// Declared winning option
    pub winning_option_id: String,

    /// Admin who resolved
    pub resolved_by: String,

    /// Resolution timestamp
    pub resolved_at: DateTime<Utc>,

    /// Supporting evidence references
    pub evidence: Vec<String>,

    /// Creator fee fraction applied (caller-supplied)
    pub creator_fee_pct: Decimal,

    /// House fee fraction in force when the market resolved
    ///
    /// Stored so a distribution retry reproduces the original plan even if
    /// the configured fee has changed since.
    pub house_fee_pct: Decimal,

    /// Sum of winner payouts
    pub total_payout: Decimal,

    /// Number of winning commitments
    pub winner_count: u64,

    /// Distribution progress
    pub status: ResolutionStatus,
}

/// Distribution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DistributionStatus {
    /// Not yet applied
    Pending = 1,
    /// Balance mutations applied
    Completed = 2,
    /// Application failed; retriable
    Failed = 3,
}

/// Per-user, per-resolution payout record
///
/// Aggregates all of a user's commitments in the resolved market. The
/// `(resolution_id, user_id)` key makes retried distributions idempotent:
/// a completed row is skipped, never reapplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutDistribution {
    /// Resolution this payout belongs to
    pub resolution_id: Uuid,

    /// Paid (or debited) user
    pub user_id: UserId,

    /// Tokens credited to available
    pub total_payout: Decimal,

    /// Payout minus winning stakes (can be negative after fees)
    pub total_profit: Decimal,

    /// Tokens forfeited on losing stakes
    pub total_lost: Decimal,

    /// Winning commitment ids
    pub winning_commitments: Vec<Uuid>,

    /// Losing commitment ids
    pub losing_commitments: Vec<Uuid>,

    /// Ledger transactions created by this distribution
    pub transaction_ids: Vec<Uuid>,

    /// Application status
    pub status: DistributionStatus,

    /// Failure detail when status is `Failed`
    pub error: Option<String>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}
