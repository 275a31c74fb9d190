//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bot identity and operator.
    pub bot: BotConfig,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Relay behaviour tuning.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot API token.
    pub token: String,
    /// Chat id of the operator. Seeded as an admin directory entry and
    /// notified on startup/shutdown.
    pub operator_id: i64,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    pub path: String,
}

/// Relay behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Minimum seconds between broadcasts from a non-privileged user.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
    /// Long-poll timeout for fetching updates, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_cooldown_secs() -> i64 {
    60
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
