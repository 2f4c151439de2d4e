//! Account identifier
//!
//! Opaque, non-empty account key. Ordering is byte-wise lexicographic and is
//! the total order used to acquire multi-account locks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique, immutable identifier of a ledger account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

/// Errors that can occur when creating an AccountId
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountIdError {
    #[error("Account id must not be empty")]
    Empty,

    #[error("Account id must not contain a NUL character")]
    ContainsNul,
}

impl AccountId {
    /// Create a new AccountId.
    ///
    /// # Errors
    /// - `AccountIdError::Empty` if the id is the empty string
    /// - `AccountIdError::ContainsNul` if the id holds a `'\0'`, which
    ///   PostgreSQL text cannot store
    pub fn new(id: impl Into<String>) -> Result<Self, AccountIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AccountIdError::Empty);
        }
        if id.contains('\0') {
            return Err(AccountIdError::ContainsNul);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountId::new(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::new(value)
    }
}

impl TryFrom<&str> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        AccountId::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}
