//! Request, response and payout-plan types
//!
//! The engine consumes untyped API requests and normalizes them at the
//! boundary: addressing fields become a [`StakeTarget`] exactly once, and
//! every later consumer works with the normalized form.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use token_ledger::types::{AddressingMethod, Position, StakeTarget};
use token_ledger::{Commitment, UserId};
use uuid::Uuid;

/// Stake request as received from the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentRequest {
    /// Staking user
    pub user_id: String,

    /// Market to stake on
    pub market_id: Uuid,

    /// Tokens to commit
    pub tokens_to_commit: Decimal,

    /// Legacy position field ("yes"/"no")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,

    /// Canonical option id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_id: Option<String>,

    /// Caller attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
}

/// Caller attribution for audit metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Originating surface ("web", "mobile", ...)
    pub source: String,
}

impl CommitmentRequest {
    /// Normalize the raw addressing fields into a stake target
    ///
    /// A request with neither field, or a position string that is not
    /// `yes`/`no`, fails `AmbiguousTarget` before any state is touched.
    pub fn target(&self) -> crate::Result<StakeTarget> {
        let position = match &self.position {
            Some(raw) => Some(Position::parse(raw).ok_or_else(|| {
                token_ledger::Error::AmbiguousTarget(format!("unknown position {:?}", raw))
            })?),
            None => None,
        };

        match (position, &self.option_id) {
            (Some(position), Some(option_id)) => Ok(StakeTarget::Both {
                position,
                option_id: option_id.clone(),
            }),
            (Some(position), None) => Ok(StakeTarget::Position(position)),
            (None, Some(option_id)) => Ok(StakeTarget::Option(option_id.clone())),
            (None, None) => Err(token_ledger::Error::AmbiguousTarget(
                "request carries neither position nor optionId".to_string(),
            )
            .into()),
        }
    }
}

/// API result envelope for commitment creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentResponse {
    /// Whether the commitment was created
    pub success: bool,

    /// Created commitment id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commitment_id: Option<Uuid>,

    /// Created commitment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Commitment>,

    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Machine-readable error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable error code
    pub code: String,

    /// Human-readable message
    pub message: String,
}

impl CommitmentResponse {
    /// Successful envelope
    pub fn ok(commitment: Commitment) -> Self {
        Self {
            success: true,
            commitment_id: Some(commitment.commitment_id),
            commitment: Some(commitment),
            error: None,
        }
    }

    /// Failure envelope
    pub fn err(error: &crate::Error) -> Self {
        Self {
            success: false,
            commitment_id: None,
            commitment: None,
            error: Some(ErrorBody {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
        }
    }
}

/// One winner's slice of the payout plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerPayout {
    /// Winning commitment
    pub commitment_id: Uuid,

    /// Paid user
    pub user_id: UserId,

    /// Stake that won
    pub tokens_committed: Decimal,

    /// Fraction of the winning-side stake
    pub win_share: Decimal,

    /// Tokens paid from the winner pool
    pub payout: Decimal,

    /// Payout minus stake (negative when fees exceed the upside)
    pub profit: Decimal,
}

/// One loser's entry in the payout plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoserEntry {
    /// Losing commitment
    pub commitment_id: Uuid,

    /// Debited user
    pub user_id: UserId,

    /// Stake forfeited
    pub tokens_committed: Decimal,
}

/// Per-commitment record of which addressing field decided its side
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressingAudit {
    /// Audited commitment
    pub commitment_id: Uuid,

    /// Option the commitment resolved to
    pub resolved_option_id: String,

    /// Field that decided
    pub method: AddressingMethod,

    /// Whether the commitment won
    pub winner: bool,

    /// Recorded when position and option id disagreed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disagreement: Option<String>,
}

/// Complete payout plan for one resolution; pure data, no writes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutCalculation {
    /// Resolved market
    pub market_id: Uuid,

    /// Declared winning option
    pub winning_option_id: String,

    /// All staked tokens across every commitment
    pub total_pool: Decimal,

    /// Platform cut
    pub house_fee: Decimal,

    /// Market creator's cut
    pub creator_fee: Decimal,

    /// Pool distributed among winners
    pub winner_pool: Decimal,

    /// Winner slices, payouts summing to at most `winner_pool`
    pub winners: Vec<WinnerPayout>,

    /// Losing stakes
    pub losers: Vec<LoserEntry>,

    /// Per-commitment addressing audit trail
    pub audit: Vec<AddressingAudit>,

    /// Sum of winner payouts
    pub total_payout: Decimal,

    /// Number of winning commitments
    pub winner_count: u64,
}

/// One failed per-user distribution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionError {
    /// User whose distribution failed
    pub user_id: UserId,

    /// Failure detail
    pub message: String,
}

/// Outcome of applying a payout plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResult {
    /// Resolution the plan belonged to
    pub resolution_id: Uuid,

    /// Users whose mutations were applied in this run
    pub completed: usize,

    /// Users skipped because a completed record already existed
    pub skipped: usize,

    /// Users whose mutations failed
    pub failed: usize,

    /// Failure details, one per failed user
    pub errors: Vec<DistributionError>,
}

impl DistributionResult {
    /// Whether every user's distribution is applied
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert a partial failure into an error, passing full success through
    pub fn into_result(self) -> crate::Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(crate::Error::DistributionPartialFailure {
                failed: self.failed,
                total: self.completed + self.skipped + self.failed,
            })
        }
    }
}

/// Outcome of a refund pass over a market's active stakes
///
/// Produced by cancellation and by the no-winners resolution path. The
/// pass skips already non-active commitments, so re-running it applies
/// only the failed remainder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    /// Market whose stakes were refunded
    pub market_id: Uuid,

    /// Stakes refunded in this run
    pub refunded: usize,

    /// Stakes skipped because they were already non-active
    pub skipped: usize,

    /// Stakes whose refund failed
    pub failed: usize,

    /// Failure details, one per failed stake
    pub errors: Vec<DistributionError>,
}

impl RefundResult {
    /// Whether every active stake was refunded
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// API result envelope for market resolution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSummary {
    /// Whether resolution and distribution fully succeeded
    pub success: bool,

    /// Created resolution
    pub resolution_id: Uuid,

    /// Sum of winner payouts
    pub total_payout: Decimal,

    /// Number of winning commitments
    pub winner_count: u64,

    /// Users paid or debited in this run
    pub distributed_users: usize,

    /// Per-user failures, empty on success
    pub errors: Vec<DistributionError>,

    /// Whether the market resolved with no winners and refunded all stakes
    pub no_winners_refund: bool,

    /// Resolution timestamp
    pub resolved_at: DateTime<Utc>,
}
