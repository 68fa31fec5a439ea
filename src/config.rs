//! Analysis settings
//!
//! Defaults can be overridden from a TOML file and then from command-line
//! flags. Every key is optional:
//!
//! ```toml
//! sample_budget = 5000
//! rate_budget = 5000
//! min_duration = 0.0
//! order = "duration"        # insertion | duration | appearance
//! filter = "render|decode"
//! ```

use crate::aggregate::LocationOrder;
use crate::reducer::DEFAULT_SAMPLE_BUDGET;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading an [`AnalysisConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for loading, reducing and listing a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Samples drawn per location and frame
    pub sample_budget: usize,
    /// Points of the activity-rate curve per window
    pub rate_budget: usize,
    /// Samples shorter than this many seconds are ignored by the reducer
    pub min_duration: f64,
    pub order: LocationOrder,
    /// Regular expression applied to location keys and labels
    pub filter: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_budget: DEFAULT_SAMPLE_BUDGET,
            rate_budget: DEFAULT_SAMPLE_BUDGET,
            min_duration: 0.0,
            order: LocationOrder::Duration,
            filter: None,
        }
    }
}

impl AnalysisConfig {
    /// Load settings from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_budget == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_budget",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.rate_budget == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_budget",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.min_duration.is_finite() || self.min_duration < 0.0 {
            return Err(ConfigError::Invalid {
                field: "min_duration",
                reason: format!("{} is not a non-negative number", self.min_duration),
            });
        }
        Ok(())
    }
}
