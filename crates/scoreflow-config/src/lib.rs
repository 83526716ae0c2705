//! Configuration system for ScoreFlow.
//!
//! Load engine configuration from TOML (or YAML) files to control the
//! validation checks and their tolerances without code changes. The
//! tolerance constants are deliberately configuration, not code: they are
//! ad hoc thresholds, not load-bearing values.
//!
//! # Examples
//!
//! Load configuration from a TOML string:
//!
//! ```
//! use scoreflow_config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     gather_statistics = true
//!
//!     [validation]
//!     enabled = true
//!     score_absolute_tolerance = 0.0001
//! "#).unwrap();
//!
//! assert!(config.gather_statistics);
//! assert!(config.validation.enabled);
//! assert_eq!(config.validation.score_absolute_tolerance, 0.0001);
//! assert_eq!(config.validation.score_relative_tolerance, 0.1);
//! ```
//!
//! Use the default config when the file is missing:
//!
//! ```
//! use scoreflow_config::EngineConfig;
//!
//! let config = EngineConfig::load("engine.toml").unwrap_or_default();
//! // Proceeds with defaults if the file doesn't exist
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Whether per-unit timing and score statistics are gathered.
    #[serde(default)]
    pub gather_statistics: bool,

    /// Validation checks and tolerances.
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl EngineConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or contains invalid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for nonsensical values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.validation;
        for (name, value) in [
            ("score_absolute_tolerance", v.score_absolute_tolerance),
            ("score_relative_tolerance", v.score_relative_tolerance),
            (
                "derivative_absolute_tolerance",
                v.derivative_absolute_tolerance,
            ),
            (
                "derivative_relative_tolerance",
                v.derivative_relative_tolerance,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Validation checks run around evaluation.
///
/// All checks compare within absolute-plus-relative tolerances:
/// `|a - b| < absolute + relative * |a + b|`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Master switch. Defaults to on in debug builds, off in release.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Shadow-check every incremental evaluation against a full
    /// recomputation.
    #[serde(default = "default_true")]
    pub check_incremental: bool,

    /// Check committed attributes and derivatives for NaN/infinity after
    /// each evaluation.
    #[serde(default = "default_true")]
    pub check_finite: bool,

    /// Absolute tolerance for the incremental/full score comparison.
    #[serde(default = "default_score_abs")]
    pub score_absolute_tolerance: f64,

    /// Relative tolerance for the incremental/full score comparison.
    #[serde(default = "default_score_rel")]
    pub score_relative_tolerance: f64,

    /// Absolute tolerance for the incremental/full derivative comparison.
    #[serde(default = "default_deriv_tol")]
    pub derivative_absolute_tolerance: f64,

    /// Relative tolerance for the incremental/full derivative comparison.
    #[serde(default = "default_deriv_tol")]
    pub derivative_relative_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            check_incremental: true,
            check_finite: true,
            score_absolute_tolerance: default_score_abs(),
            score_relative_tolerance: default_score_rel(),
            derivative_absolute_tolerance: default_deriv_tol(),
            derivative_relative_tolerance: default_deriv_tol(),
        }
    }
}

fn default_enabled() -> bool {
    cfg!(debug_assertions)
}

fn default_true() -> bool {
    true
}

fn default_score_abs() -> f64 {
    0.001
}

fn default_score_rel() -> f64 {
    0.1
}

fn default_deriv_tol() -> f64 {
    0.01
}
