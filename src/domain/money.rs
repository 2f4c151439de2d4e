//! Money type
//!
//! Domain primitive for integer amounts of minor currency units.
//! The same type carries stored balances and operation amounts; the
//! constraints differ by role and are enforced where each role is used.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use crate::error::{LedgerError, LedgerResult};

/// A signed count of minor currency units.
///
/// # Invariants
/// - As a stored balance: always `>= 0`
/// - As an operation amount: must be `> 0` to be applied
///
/// # Example
/// ```
/// use ledger::domain::Money;
///
/// let balance = Money::new(100);
/// assert_eq!(balance.checked_sub(Money::new(40)), Some(Money::new(60)));
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(units: i64) -> Self {
        Self(units)
    }

    /// Get the raw number of minor units.
    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Add, returning `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Subtract, returning `None` on overflow.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Money)
    }
}

impl From<i64> for Money {
    fn from(units: i64) -> Self {
        Self(units)
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

/// How a zero operation amount is treated.
///
/// Negative amounts are always rejected; only zero is configurable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroAmountPolicy {
    /// Zero is rejected with `LedgerError::NegativeAmount`.
    #[default]
    Reject,
    /// Zero succeeds without touching the store.
    NoOp,
}

impl ZeroAmountPolicy {
    /// Validate an operation amount before any transaction is opened.
    ///
    /// Returns `Ok(true)` when the operation must be applied and `Ok(false)`
    /// when it is a permitted no-op.
    pub fn admit(self, amount: Money) -> LedgerResult<bool> {
        if amount.is_positive() {
            return Ok(true);
        }
        match (self, amount.is_zero()) {
            (ZeroAmountPolicy::NoOp, true) => Ok(false),
            _ => Err(LedgerError::NegativeAmount(amount)),
        }
    }
}

impl FromStr for ZeroAmountPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ZeroAmountPolicy::Reject),
            "noop" | "no_op" | "no-op" => Ok(ZeroAmountPolicy::NoOp),
            other => Err(format!("unknown zero amount policy '{}'", other)),
        }
    }
}
