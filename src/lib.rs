//! Ledger Library
//!
//! Concurrency-safe account balances over PostgreSQL: deposits, withdrawals
//! and two-account transfers that never leave a negative or partially
//! applied balance visible.

pub mod concurrency;
pub mod config;
pub mod db;
pub mod domain;
pub mod ledger;
pub mod store;
pub mod telemetry;

mod error;

pub use config::{Config, ConfigError, LedgerSettings};
pub use domain::{
    Account, AccountId, AccountIdError, Money, OperationContext, Transfer, ZeroAmountPolicy,
};
pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
