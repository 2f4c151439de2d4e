//! Account
//!
//! A locked snapshot of one ledger row. Balance rules live here so the
//! engine only decides when to read, write, commit or roll back.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

use super::{AccountId, Money};

/// Account state as read inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    balance: Money,
}

impl Account {
    pub fn new(id: AccountId, balance: Money) -> Self {
        Self { id, balance }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Check if the balance covers a debit of `amount`
    pub fn is_sufficient_for(&self, amount: Money) -> bool {
        self.balance >= amount
    }

    /// Compute the balance after crediting `amount`.
    pub fn credit(&self, amount: Money) -> LedgerResult<Money> {
        self.balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow(self.id.clone()))
    }

    /// Compute the balance after debiting `amount`.
    ///
    /// Fails with `NoMoney` rather than produce a negative balance.
    pub fn debit(&self, amount: Money) -> LedgerResult<Money> {
        if !self.is_sufficient_for(amount) {
            return Err(LedgerError::NoMoney {
                account: self.id.clone(),
                required: amount,
                available: self.balance,
            });
        }
        self.balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow(self.id.clone()))
    }
}
