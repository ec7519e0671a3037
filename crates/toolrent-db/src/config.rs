//! Lending configuration.
//!
//! Loaded from environment variables with fallback to documented defaults.
//! The defaults are the values the business runs with when nothing is set:
//!
//! | Variable                          | Default | Meaning                          |
//! |-----------------------------------|---------|----------------------------------|
//! | `TOOLRENT_DEFAULT_DAILY_RATE`     | 2500    | rate when settings has none      |
//! | `TOOLRENT_MAX_ACTIVE_LOANS`       | 5       | open loans per customer          |
//! | `TOOLRENT_DEFAULT_FINE_PER_DAY`   | 0       | late fine when a return omits it |

use serde::{Deserialize, Serialize};
use std::env;

use toolrent_core::{DEFAULT_DAILY_RATE, MAX_ACTIVE_LOANS};

/// Environment variable naming the SQLite file used by binaries.
pub const DB_PATH_VAR: &str = "TOOLRENT_DB_PATH";

/// Lending orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingConfig {
    /// Daily rental rate used when the settings store has no value.
    pub default_daily_rate: i64,

    /// Maximum number of open loans per customer.
    pub max_active_loans: i64,

    /// Late fine per day used when a return request does not carry one.
    pub default_fine_per_day: i64,
}

impl Default for LendingConfig {
    fn default() -> Self {
        LendingConfig {
            default_daily_rate: DEFAULT_DAILY_RATE,
            max_active_loans: MAX_ACTIVE_LOANS,
            default_fine_per_day: 0,
        }
    }
}

impl LendingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = LendingConfig::default();

        let config = LendingConfig {
            default_daily_rate: read_i64("TOOLRENT_DEFAULT_DAILY_RATE", defaults.default_daily_rate)?,
            max_active_loans: read_i64("TOOLRENT_MAX_ACTIVE_LOANS", defaults.max_active_loans)?,
            default_fine_per_day: read_i64(
                "TOOLRENT_DEFAULT_FINE_PER_DAY",
                defaults.default_fine_per_day,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_daily_rate < 0 {
            return Err(ConfigError::InvalidValue("TOOLRENT_DEFAULT_DAILY_RATE".to_string()));
        }
        if self.max_active_loans < 1 {
            return Err(ConfigError::InvalidValue("TOOLRENT_MAX_ACTIVE_LOANS".to_string()));
        }
        if self.default_fine_per_day < 0 {
            return Err(ConfigError::InvalidValue("TOOLRENT_DEFAULT_FINE_PER_DAY".to_string()));
        }
        Ok(())
    }
}

fn read_i64(var: &str, default: i64) -> Result<i64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
