//! Foresight Token Ledger
//!
//! Per-user token accounts with an append-only transaction log over RocksDB.
//!
//! # Architecture
//!
//! - **Single source of truth**: balances derive from the transaction log
//! - **Atomic units**: every mutation commits with its log append in one batch
//! - **Optimistic versioning**: stale writers retry, never clobber
//! - **Reconciliation**: drift between stored and derived state is repairable
//!
//! # Invariants
//!
//! - Conservation: available + committed == total_earned - total_spent
//! - No negative balances in any bucket
//! - Version strictly increments on every committed write

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod reconcile;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    Commitment, CommitmentStatus, Market, MarketOption, MarketStatus, Mutation,
    PayoutDistribution, Position, Resolution, ResolutionStatus, StakeTarget,
    TokenTransaction, TransactionKind, UserBalance, UserId,
};
pub use ledger::BalanceLedger;
pub use reconcile::Reconciler;
pub use config::Config;
