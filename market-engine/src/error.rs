//! Error types for the market engine

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying ledger error
    #[error(transparent)]
    Ledger(#[from] token_ledger::Error),

    /// Market is not accepting the attempted operation
    #[error("Market not active: {0}")]
    MarketNotActive(String),

    /// Commitment window has closed
    #[error("Market ended: {0}")]
    MarketEnded(String),

    /// Stake outside the configured bounds
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Market definition rejected
    #[error("Invalid market: {0}")]
    InvalidMarket(String),

    /// Creator fee outside the allowed range
    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    /// Winning option had no commitments; resolution must refund instead
    #[error("No winning commitments; {unallocated} tokens unallocated")]
    NoWinners {
        /// Pool that would have gone undistributed
        unallocated: Decimal,
    },

    /// Some per-user distributions failed; retriable
    #[error("Distribution partially failed: {failed} of {total} users")]
    DistributionPartialFailure {
        /// Users whose distribution failed
        failed: usize,
        /// Users in the distribution
        total: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code for API envelopes
    pub fn code(&self) -> &'static str {
        match self {
            Error::Ledger(inner) => match inner {
                token_ledger::Error::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
                token_ledger::Error::MarketNotFound(_) => "MARKET_NOT_FOUND",
                token_ledger::Error::CommitmentNotFound(_) => "COMMITMENT_NOT_FOUND",
                token_ledger::Error::ResolutionNotFound(_) => "RESOLUTION_NOT_FOUND",
                token_ledger::Error::OptionNotFound(_) => "OPTION_NOT_FOUND",
                token_ledger::Error::AmbiguousTarget(_) => "AMBIGUOUS_TARGET",
                token_ledger::Error::ConcurrencyExhausted(_) => "CONCURRENCY_EXHAUSTED",
                token_ledger::Error::InvariantViolation(_) => "INVARIANT_VIOLATION",
                _ => "LEDGER_ERROR",
            },
            Error::MarketNotActive(_) => "MARKET_NOT_ACTIVE",
            Error::MarketEnded(_) => "MARKET_ENDED",
            Error::InvalidAmount(_) => "INVALID_AMOUNT",
            Error::InvalidMarket(_) => "INVALID_MARKET",
            Error::InvalidFee(_) => "INVALID_FEE",
            Error::NoWinners { .. } => "NO_WINNERS",
            Error::DistributionPartialFailure { .. } => "DISTRIBUTION_PARTIAL_FAILURE",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }
}
