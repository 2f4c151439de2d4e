//! Concurrency Controller module
//!
//! Lock-ordering protocol and bounded retry of transient store conflicts.
//! Mutual exclusion itself is provided by PostgreSQL row locks.

mod controller;
mod lock_order;

pub use controller::{ConcurrencyController, RetryPolicy};
pub use lock_order::LockOrder;
