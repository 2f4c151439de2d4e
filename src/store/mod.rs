//! Account Store module
//!
//! Transactional accessor over the `accounts` relation in PostgreSQL.

mod error;
mod repository;

pub use error::{is_transient, is_transient_sqlstate, StoreError};
pub use repository::{AccountStore, StoreTransaction};
