//! Governor configuration loaded from TOML.

use crate::error::{GovernanceError, Result};
use crate::pricing::PricingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cost-governance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Daily spending limit in USD.
    #[serde(default = "default_daily_budget")]
    pub daily_budget_limit_usd: f64,
    /// Maximum cost of a single operation in USD.
    #[serde(default = "default_operation_limit")]
    pub max_operation_cost_usd: f64,
    /// Days of ledger records to retain when pruning.
    #[serde(default = "default_ledger_retention")]
    pub ledger_retention_days: u32,
    /// Days of violation records to retain when pruning.
    #[serde(default = "default_violation_retention")]
    pub violation_retention_days: u32,
    /// Days of daily history records to retain when pruning.
    #[serde(default = "default_history_retention")]
    pub history_retention_days: u32,
    /// Pricing rates.
    #[serde(default)]
    pub pricing: PricingConfig,
}

fn default_daily_budget() -> f64 {
    5.0
}

fn default_operation_limit() -> f64 {
    1.0
}

fn default_ledger_retention() -> u32 {
    90
}

fn default_violation_retention() -> u32 {
    90
}

fn default_history_retention() -> u32 {
    365
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            daily_budget_limit_usd: default_daily_budget(),
            max_operation_cost_usd: default_operation_limit(),
            ledger_retention_days: default_ledger_retention(),
            violation_retention_days: default_violation_retention(),
            history_retention_days: default_history_retention(),
            pricing: PricingConfig::default(),
        }
    }
}

impl GovernorConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| GovernanceError::InvalidConfig(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns error if any limit or rate is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.daily_budget_limit_usd <= 0.0 {
            return Err(GovernanceError::InvalidConfig(
                "daily_budget_limit_usd must be > 0.0".to_string(),
            ));
        }
        if self.max_operation_cost_usd <= 0.0 {
            return Err(GovernanceError::InvalidConfig(
                "max_operation_cost_usd must be > 0.0".to_string(),
            ));
        }
        if self.pricing.price_per_tib_usd < 0.0 {
            return Err(GovernanceError::InvalidConfig(
                "pricing.price_per_tib_usd must be >= 0.0".to_string(),
            ));
        }
        if self.pricing.price_per_slot_hour_usd < 0.0 {
            return Err(GovernanceError::InvalidConfig(
                "pricing.price_per_slot_hour_usd must be >= 0.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Save the configuration to a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GovernanceError::Persistence(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }
}
