//! Canonical lock order
//!
//! Every multi-account operation locks rows in ascending `AccountId` order,
//! whatever its logical direction. With one total order there is no cycle of
//! waiters, so two opposite-direction transfers on the same pair cannot
//! deadlock.

use crate::domain::AccountId;

/// Accounts to lock, in acquisition order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOrder<'a> {
    /// One row: both sides name the same account
    Single(&'a AccountId),
    /// Two distinct rows, `first < second`
    Pair(&'a AccountId, &'a AccountId),
}

impl<'a> LockOrder<'a> {
    /// Order two accounts canonically.
    pub fn pair(a: &'a AccountId, b: &'a AccountId) -> Self {
        match a.cmp(b) {
            std::cmp::Ordering::Less => LockOrder::Pair(a, b),
            std::cmp::Ordering::Greater => LockOrder::Pair(b, a),
            std::cmp::Ordering::Equal => LockOrder::Single(a),
        }
    }
}
