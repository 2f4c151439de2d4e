//! Transfer value object

use serde::{Deserialize, Serialize};

use super::{AccountId, Money};

/// A debit of `from` and a credit of `to` that commit together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Money,
}

impl Transfer {
    pub fn new(from: AccountId, to: AccountId, amount: Money) -> Self {
        Self { from, to, amount }
    }

    /// Both legs name the same account; only one row is locked.
    pub fn is_self_transfer(&self) -> bool {
        self.from == self.to
    }
}
