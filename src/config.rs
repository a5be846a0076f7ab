//! Configuration for the wallet ledger

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Longest a single row lock wait may block (milliseconds)
    pub lock_wait_timeout_ms: u64,

    /// Deadline applied to an operation when the caller supplies none (milliseconds)
    pub operation_timeout_ms: u64,

    /// History page size used when a request asks for 0
    pub default_page_size: u32,

    /// Upper bound on a history page
    pub max_page_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout_ms: 5_000,
            operation_timeout_ms: 30_000,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl LedgerConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: LedgerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = LedgerConfig::default();

        if let Some(value) = env_value("WALLET_LOCK_WAIT_TIMEOUT_MS", "lock_wait_timeout_ms")? {
            config.lock_wait_timeout_ms = value;
        }
        if let Some(value) = env_value("WALLET_OPERATION_TIMEOUT_MS", "operation_timeout_ms")? {
            config.operation_timeout_ms = value;
        }
        if let Some(value) = env_value("WALLET_DEFAULT_PAGE_SIZE", "default_page_size")? {
            config.default_page_size = value;
        }
        if let Some(value) = env_value("WALLET_MAX_PAGE_SIZE", "max_page_size")? {
            config.max_page_size = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_wait_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "lock_wait_timeout_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "operation_timeout_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_page_size",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid {
                field: "default_page_size",
                reason: format!("must be between 1 and max_page_size ({})", self.max_page_size),
            });
        }
        Ok(())
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

fn env_value<T: FromStr>(var: &str, field: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                field,
                reason: format!("{var}={raw}: {e}"),
            }),
        Err(_) => Ok(None),
    }
}
