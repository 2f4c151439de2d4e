//! Ledger module
//!
//! The engine orchestrating account store calls inside controller-governed
//! transactions.

mod engine;

pub use engine::Ledger;
