//! Configuration management for connectors.

use crate::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Settings shared by every connector, independent of the external system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Fixed delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Attach source metadata (topic, filter) as record attributes
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl ConnectorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LOG_LEVEL`: Log level (default: info)
    /// - `RECONNECT_INTERVAL_MS`: Delay between reconnect attempts (default: 1000)
    /// - `INCLUDE_METADATA`: Attach source metadata to records (default: true)
    pub fn from_env() -> ConnectorResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to core configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        if let Ok(val) = env::var("RECONNECT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect_interval_ms = n;
            }
        }
        if let Ok(val) = env::var("INCLUDE_METADATA") {
            if let Ok(b) = val.parse() {
                self.include_metadata = b;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.log_level.is_empty() {
            return Err(ConnectorError::config("log_level cannot be empty"));
        }

        if self.reconnect_interval_ms == 0 {
            return Err(ConnectorError::config("reconnect_interval_ms must be > 0"));
        }

        Ok(())
    }

    /// Delay between reconnect attempts
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            include_metadata: true,
        }
    }
}
