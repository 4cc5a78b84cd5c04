//! Foresight Market Engine
//!
//! Prediction-market commitment, resolution and payout engine over the
//! token ledger.
//!
//! # Architecture
//!
//! - **Commitment engine**: validates stakes, resolves legacy/canonical
//!   option addressing once at the boundary, and writes the stake, its
//!   ledger mutation and the market counter bumps in one atomic unit
//! - **Payout calculator**: pure planning from market + commitments to a
//!   fee-adjusted, audited payout plan
//! - **Distributor**: applies the plan one atomic unit per user, idempotent
//!   under retry
//! - **Analytics**: read-only dashboard aggregates with a legacy yes/no
//!   collapse

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod analytics;
pub mod commitment;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod odds;
pub mod payout;
pub mod resolution;
pub mod types;

// Re-exports
pub use config::EngineConfig;
pub use engine::{MarketEngine, OptionDef};
pub use error::{Error, Result};
pub use payout::calculate_payouts;
pub use types::{
    CommitmentRequest, CommitmentResponse, DistributionResult, PayoutCalculation, RefundResult,
    ResolutionSummary,
};
