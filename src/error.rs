//! Error handling module
//!
//! Centralized error taxonomy for every ledger operation.
//!
//! Business errors are detected before commit and always leave balances
//! untouched. System errors come from the store, the runtime or the caller's
//! context; the transaction is rolled back and a caller-level retry may help.

use crate::config::ConfigError;
use crate::domain::{AccountId, Money};
use crate::store::{self, StoreError};

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Business errors
    #[error("Account already exists: {0}")]
    AlreadyExists(AccountId),

    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    #[error("Amount must be positive (got {0})")]
    NegativeAmount(Money),

    #[error("Insufficient funds in {account}: required {required}, available {available}")]
    NoMoney {
        account: AccountId,
        required: Money,
        available: Money,
    },

    #[error("Balance of {0} would overflow")]
    BalanceOverflow(AccountId),

    // System errors
    #[error("Transient store conflict: {0}")]
    Conflict(#[source] sqlx::Error),

    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    #[error("Database schema incomplete: missing {0}")]
    SchemaMissing(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LedgerError {
    /// Check if this is a business rule failure (caller's input or state)
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists(_)
                | Self::UnknownAccount(_)
                | Self::NegativeAmount(_)
                | Self::NoMoney { .. }
                | Self::BalanceOverflow(_)
        )
    }

    /// Check if this is a system, transport or cancellation failure
    pub fn is_system_error(&self) -> bool {
        !self.is_business_error()
    }

    /// Check if a caller-level retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_)
                | Self::RetriesExhausted { .. }
                | Self::DeadlineExceeded
                | Self::Database(_)
        )
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if store::is_transient(&err) {
            Self::Conflict(err)
        } else {
            Self::Database(err)
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(id) => Self::AlreadyExists(id),
            StoreError::NotFound(id) => Self::UnknownAccount(id),
            StoreError::Database(e) => Self::from(e),
        }
    }
}
