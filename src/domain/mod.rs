//! Domain module
//!
//! Core ledger value types and balance rules.

pub mod account;
pub mod account_id;
pub mod context;
pub mod money;
pub mod transfer;

pub use account::Account;
pub use account_id::{AccountId, AccountIdError};
pub use context::OperationContext;
pub use money::{Money, ZeroAmountPolicy};
pub use transfer::Transfer;
