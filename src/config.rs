//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::concurrency::RetryPolicy;
use crate::domain::ZeroAmountPolicy;

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// How long to wait for a pooled connection
    pub database_acquire_timeout: Duration,

    /// Attempts per operation when the store reports a transient conflict
    pub max_retries: u32,

    pub retry_base_delay: Duration,

    pub retry_max_delay: Duration,

    /// Treatment of zero operation amounts
    pub zero_amount: ZeroAmountPolicy,
}

/// Engine settings derived from `Config`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSettings {
    pub retry: RetryPolicy,
    pub zero_amount: ZeroAmountPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let acquire_timeout_secs: u64 = parse_or(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?;
        let max_retries = parse_or(&lookup, "LEDGER_MAX_RETRIES", 5)?;
        let retry_base_delay_ms: u64 = parse_or(&lookup, "LEDGER_RETRY_BASE_DELAY_MS", 10)?;
        let retry_max_delay_ms: u64 = parse_or(&lookup, "LEDGER_RETRY_MAX_DELAY_MS", 500)?;
        let zero_amount = parse_or(&lookup, "LEDGER_ZERO_AMOUNT", ZeroAmountPolicy::Reject)?;

        if database_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"));
        }
        if max_retries == 0 {
            return Err(ConfigError::InvalidValue("LEDGER_MAX_RETRIES"));
        }
        if retry_max_delay_ms < retry_base_delay_ms {
            return Err(ConfigError::InvalidValue("LEDGER_RETRY_MAX_DELAY_MS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            max_retries,
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(retry_max_delay_ms),
            zero_amount,
        })
    }

    /// Settings for the ledger engine
    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            retry: RetryPolicy::new(self.max_retries, self.retry_base_delay, self.retry_max_delay),
            zero_amount: self.zero_amount,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
