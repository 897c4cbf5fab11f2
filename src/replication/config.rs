//! Replication Configuration
//!
//! One TOML document configures a whole run: the pricing scenario, strategy
//! thresholds, the quote-size table, matcher tolerances and bootstrap
//! parameters. Every section has defaults; anything present is validated
//! before use and a bad value aborts the run instead of being replaced.

use crate::replication::bootstrap::BootstrapConfig;
use crate::replication::matching::MatcherConfig;
use crate::replication::pricing::Scenario;
use crate::replication::sizing::SizeTable;
use crate::replication::strategy::StrategyConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// ERRORS
// =============================================================================

/// Invalid configuration. Always fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnknownScenario {
        name: String,
    },
    /// A threshold that must be strictly positive is not.
    NonPositiveThreshold {
        field: &'static str,
        value: f64,
    },
    /// A tolerance that must be non-negative is not.
    NegativeTolerance {
        field: &'static str,
        value: f64,
    },
    /// Seconds-to-end window is empty or negative.
    InvalidWindow {
        min_seconds_to_end: i64,
        max_seconds_to_end: i64,
    },
    MalformedSizeTable {
        series: String,
        reason: String,
    },
    InvalidBootstrapParameter {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownScenario { name } => write!(
                f,
                "unknown scenario '{}' (expected one of: actual, mid, exec_proxy, all_maker, all_taker)",
                name
            ),
            Self::NonPositiveThreshold { field, value } => {
                write!(f, "{} must be positive, got {}", field, value)
            }
            Self::NegativeTolerance { field, value } => {
                write!(f, "{} must be non-negative and finite, got {}", field, value)
            }
            Self::InvalidWindow {
                min_seconds_to_end,
                max_seconds_to_end,
            } => write!(
                f,
                "invalid seconds-to-end window [{}, {}]",
                min_seconds_to_end, max_seconds_to_end
            ),
            Self::MalformedSizeTable { series, reason } => {
                write!(f, "malformed size table for {}: {}", series, reason)
            }
            Self::InvalidBootstrapParameter { field, reason } => {
                write!(f, "invalid bootstrap {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Positive and finite, or `NonPositiveThreshold`.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveThreshold { field, value })
    }
}

/// Non-negative and finite, or `NegativeTolerance`.
pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeTolerance { field, value })
    }
}

// =============================================================================
// TOP-LEVEL CONFIG
// =============================================================================

/// Full run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Execution-price scenario used for PnL aggregation.
    #[serde(default)]
    pub scenario: Scenario,

    /// Substitute the observed price when a scenario price is not positive.
    #[serde(default = "default_fallback_to_actual")]
    pub fallback_to_actual: bool,

    #[serde(default)]
    pub strategy: StrategyConfig,

    #[serde(default)]
    pub sizing: SizeTable,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

fn default_fallback_to_actual() -> bool {
    true
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            fallback_to_actual: true,
            strategy: StrategyConfig::default(),
            sizing: SizeTable::default(),
            matcher: MatcherConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl ReplicaConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            scenario = %config.scenario,
            series_schedules = config.sizing.series.len(),
            "loaded replication config"
        );
        Ok(config)
    }

    /// Parse a TOML document and validate.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML (e.g. to write out the effective config of a run).
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section. First violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.sizing.validate()?;
        self.matcher.validate()?;
        self.bootstrap.validate()?;
        Ok(())
    }
}
