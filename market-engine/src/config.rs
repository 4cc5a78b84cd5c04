//! Configuration for the market engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ledger configuration (storage, concurrency)
    pub ledger: token_ledger::Config,

    /// Stake bounds
    pub stakes: StakeConfig,

    /// Odds computation parameters
    pub odds: OddsConfig,

    /// Fee policy
    pub fees: FeeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger: token_ledger::Config::default(),
            stakes: StakeConfig::default(),
            odds: OddsConfig::default(),
            fees: FeeConfig::default(),
        }
    }
}

/// Stake bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeConfig {
    /// Minimum tokens per commitment
    pub min_stake: Decimal,

    /// Maximum tokens per commitment
    pub max_stake: Decimal,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            min_stake: Decimal::ONE,
            max_stake: Decimal::from(1000),
        }
    }
}

/// Odds computation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsConfig {
    /// Odds on a market with no stakes yet
    pub default_odds: Decimal,

    /// Lowest odds a commitment can receive
    pub floor: Decimal,

    /// Highest odds a commitment can receive
    pub cap: Decimal,

    /// Lower bound on the target's pool share before inversion
    pub epsilon: Decimal,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            default_odds: Decimal::TWO,
            floor: Decimal::new(11, 1),  // 1.1
            cap: Decimal::from(10),
            epsilon: Decimal::new(1, 2), // 0.01
        }
    }
}

/// Fee policy
///
/// The house fee is a platform constant; the creator fee is supplied per
/// resolution and validated against `max_creator_fee_pct`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Platform cut of the total pool
    pub house_fee_pct: Decimal,

    /// Upper bound on the per-resolution creator fee
    pub max_creator_fee_pct: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            house_fee_pct: Decimal::new(5, 2),        // 0.05
            max_creator_fee_pct: Decimal::new(10, 2), // 0.10
        }
    }
}

impl EngineConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> crate::Result<()> {
        if self.stakes.min_stake <= Decimal::ZERO || self.stakes.max_stake < self.stakes.min_stake {
            return Err(crate::Error::Config(format!(
                "invalid stake bounds: min={} max={}",
                self.stakes.min_stake, self.stakes.max_stake
            )));
        }
        if self.odds.floor <= Decimal::ONE || self.odds.cap < self.odds.floor {
            return Err(crate::Error::Config(format!(
                "invalid odds bounds: floor={} cap={}",
                self.odds.floor, self.odds.cap
            )));
        }
        if self.fees.house_fee_pct < Decimal::ZERO
            || self.fees.house_fee_pct >= Decimal::ONE
            || self.fees.max_creator_fee_pct < Decimal::ZERO
            || self.fees.house_fee_pct + self.fees.max_creator_fee_pct >= Decimal::ONE
        {
            return Err(crate::Error::Config(format!(
                "invalid fee policy: house={} max_creator={}",
                self.fees.house_fee_pct, self.fees.max_creator_fee_pct
            )));
        }
        Ok(())
    }
}
