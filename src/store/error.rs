//! Account Store Errors

use crate::domain::AccountId;

/// SQLSTATE for serialization_failure
pub const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE for deadlock_detected
pub const DEADLOCK_DETECTED: &str = "40P01";

/// Errors that can occur in the account store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row with this id already exists
    #[error("Account already exists: {0}")]
    AlreadyExists(AccountId),

    /// No row with this id
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Check if a driver error reports a transient conflict
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_transient_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// Check if a SQLSTATE code denotes a conflict the store resolved by
/// aborting the transaction
pub fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code, SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
}
