//! Account Store Repository
//!
//! Minimal transactional primitives over `accounts(account_id, balance)`.
//! Atomicity, durability and row locking are delegated to PostgreSQL.

use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Account, AccountId, Money};

use super::StoreError;

/// An open store transaction.
///
/// Dropping it without calling `commit` rolls it back, so release is
/// guaranteed on every exit path, including a dropped future.
pub type StoreTransaction = Transaction<'static, Postgres>;

/// Account Store for reading and writing balances
#[derive(Debug, Clone)]
pub struct AccountStore {
    pool: PgPool,
}

impl AccountStore {
    /// Create a new AccountStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction at the server's default isolation (read committed).
    pub async fn begin(&self) -> Result<StoreTransaction, StoreError> {
        Ok(self.pool.begin().await?)
    }

    // =========================================================================
    // Writes (inside a transaction)
    // =========================================================================

    /// Insert a zero-balance row.
    ///
    /// A concurrent insert of the same id waits for the first one and then
    /// reports `AlreadyExists`, without aborting this transaction.
    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &AccountId,
    ) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, balance)
            VALUES ($1, 0)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::AlreadyExists(id.clone()));
        }

        Ok(())
    }

    /// Read the balance and take the row lock until the transaction ends.
    ///
    /// Blocks while another transaction holds the lock on the same row.
    pub async fn get_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &AccountId,
    ) -> Result<Account, StoreError> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT balance FROM accounts
            WHERE account_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        balance
            .map(|units| Account::new(id.clone(), Money::new(units)))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Overwrite the balance of a row locked by `get_for_update`.
    pub async fn set_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &AccountId,
        balance: Money,
    ) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2
            WHERE account_id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(balance.value())
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        Ok(())
    }

    // =========================================================================
    // Reads (no transaction, no lock)
    // =========================================================================

    /// Read the last committed balance without locking.
    pub async fn get(&self, id: &AccountId) -> Result<Money, StoreError> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT balance FROM accounts WHERE account_id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        balance
            .map(Money::new)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
