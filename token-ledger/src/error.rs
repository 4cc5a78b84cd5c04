//! Error types for the token ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Not enough available tokens to commit
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Tokens the mutation needed
        required: Decimal,
        /// Tokens actually available
        available: Decimal,
    },

    /// Invariant violation (negative balance, conservation breach, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Optimistic version guard failed; retried internally
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Optimistic retries exhausted; callers treat as retryable
    #[error("Concurrency exhausted: {0}")]
    ConcurrencyExhausted(String),

    /// Market not found
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    /// Commitment not found
    #[error("Commitment not found: {0}")]
    CommitmentNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Resolution not found
    #[error("Resolution not found: {0}")]
    ResolutionNotFound(String),

    /// Option id does not exist on the market
    #[error("Option not found: {0}")]
    OptionNotFound(String),

    /// Neither position nor option id resolvable
    #[error("Ambiguous target: {0}")]
    AmbiguousTarget(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
