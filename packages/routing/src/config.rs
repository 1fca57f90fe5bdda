//! Routing service configuration.
//!
//! The default configuration is embedded from `services/osrm.toml` at
//! compile time. A TOML file with the same keys overrides it at runtime.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enrich::EnrichOptions;

const DEFAULT_TOML: &str = include_str!("../services/osrm.toml");

/// Errors loading a routing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML did not deserialize.
    #[error("Invalid routing config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid routing config: {message}")]
    Invalid {
        /// Which value and why.
        message: String,
    },
}

/// Connection and batching settings for an OSRM-compatible service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Service root, e.g. `"http://localhost:5000"`.
    pub base_url: String,
    /// Travel profile: `"foot"`, `"car"` or `"bicycle"`.
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Maximum origin/destination pairs per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum batches in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-batch timeout in seconds, retries included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient HTTP failures within a batch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_profile() -> String {
    "foot".to_string()
}

const fn default_batch_size() -> usize {
    100
}

const fn default_concurrency() -> usize {
    4
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    2
}

impl Default for RoutingConfig {
    /// The embedded `services/osrm.toml`.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (a compile-time constant).
    fn default() -> Self {
        Self::from_toml_str(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded routing config: {e}"))
    }
}

impl RoutingConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out of
    /// range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.base_url.trim().is_empty() {
            return invalid("base_url must not be empty");
        }
        if self.profile.trim().is_empty() {
            return invalid("profile must not be empty");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.timeout_secs == 0 {
            return invalid("timeout_secs must be at least 1");
        }
        Ok(())
    }

    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Enrichment options derived from this configuration.
    #[must_use]
    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions {
            profile: self.profile.clone(),
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            batch_timeout: self.batch_timeout(),
        }
    }
}
