//! Ledger Engine
//!
//! Public operations of the ledger. Every mutation runs as one store
//! transaction governed by the concurrency controller and bounded by the
//! caller's `OperationContext`.

use std::time::Duration;

use sqlx::PgPool;

use crate::concurrency::{ConcurrencyController, LockOrder};
use crate::config::{Config, LedgerSettings};
use crate::db;
use crate::domain::{Account, AccountId, Money, OperationContext, Transfer, ZeroAmountPolicy};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{AccountStore, StoreTransaction};

/// Upper bound on waiting for released connections in `close`
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const CLOSE_DRAIN_POLL: Duration = Duration::from_millis(10);

/// Handle to the ledger.
///
/// Holds only the store handle and immutable settings, so it is cheap to
/// clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: AccountStore,
    controller: ConcurrencyController,
    zero_amount: ZeroAmountPolicy,
}

impl Ledger {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the store and verify the schema is provisioned.
    pub async fn connect(config: &Config) -> LedgerResult<Self> {
        let pool = db::connect(config).await?;

        if let Err(e) = db::verify_connection(&pool).await {
            pool.close().await;
            return Err(e.into());
        }

        match db::missing_table(&pool).await {
            Ok(None) => {}
            Ok(Some(table)) => {
                pool.close().await;
                return Err(LedgerError::SchemaMissing(table.to_string()));
            }
            Err(e) => {
                pool.close().await;
                return Err(e.into());
            }
        }

        tracing::info!(
            max_connections = config.database_max_connections,
            "Ledger connected"
        );

        Ok(Self::from_pool(pool, config.settings()))
    }

    /// Wrap an existing pool. The schema is assumed to exist.
    pub fn from_pool(pool: PgPool, settings: LedgerSettings) -> Self {
        Self {
            store: AccountStore::new(pool),
            controller: ConcurrencyController::new(settings.retry),
            zero_amount: settings.zero_amount,
        }
    }

    pub fn pool(&self) -> &PgPool {
        self.store.pool()
    }

    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            retry: *self.controller.policy(),
            zero_amount: self.zero_amount,
        }
    }

    /// Close every pooled connection and wait for them to be released.
    ///
    /// Safe to call more than once; later operations fail with a system error.
    pub async fn close(&self) {
        let pool = self.store.pool();
        let first = !pool.is_closed();
        pool.close().await;

        // A connection released just before close is handed back by a
        // background task, so the pool can still count it here.
        let drained = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, async {
            while pool.size() > 0 {
                tokio::time::sleep(CLOSE_DRAIN_POLL).await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(open = pool.size(), "Connections still open after close");
        } else if first {
            tracing::info!("Ledger closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.store.pool().is_closed()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Create an account with a zero balance.
    pub async fn create_account(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
    ) -> LedgerResult<()> {
        self.controller
            .run(ctx, "create_account", || self.try_create_account(ctx, id))
            .await?;

        tracing::debug!(account = %id, correlation_id = ?ctx.correlation_id, "Account created");
        Ok(())
    }

    /// Add `amount` to an account.
    pub async fn deposit(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
        amount: Money,
    ) -> LedgerResult<()> {
        if !self.zero_amount.admit(amount)? {
            return Ok(());
        }

        self.controller
            .run(ctx, "deposit", || self.try_deposit(ctx, id, amount))
            .await?;

        tracing::debug!(
            account = %id,
            amount = %amount,
            correlation_id = ?ctx.correlation_id,
            "Deposit applied"
        );
        Ok(())
    }

    /// Remove `amount` from an account; fails with `NoMoney` rather than
    /// drive the balance below zero.
    pub async fn withdraw(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
        amount: Money,
    ) -> LedgerResult<()> {
        if !self.zero_amount.admit(amount)? {
            return Ok(());
        }

        self.controller
            .run(ctx, "withdraw", || self.try_withdraw(ctx, id, amount))
            .await?;

        tracing::debug!(
            account = %id,
            amount = %amount,
            correlation_id = ?ctx.correlation_id,
            "Withdrawal applied"
        );
        Ok(())
    }

    /// Move `amount` from `from` to `to` atomically.
    pub async fn transfer(
        &self,
        ctx: &OperationContext,
        from: &AccountId,
        to: &AccountId,
        amount: Money,
    ) -> LedgerResult<()> {
        self.apply_transfer(ctx, &Transfer::new(from.clone(), to.clone(), amount))
            .await
    }

    /// Apply a `Transfer` value atomically.
    pub async fn apply_transfer(
        &self,
        ctx: &OperationContext,
        transfer: &Transfer,
    ) -> LedgerResult<()> {
        if !self.zero_amount.admit(transfer.amount)? {
            return Ok(());
        }

        self.controller
            .run(ctx, "transfer", || self.try_transfer(ctx, transfer))
            .await?;

        tracing::debug!(
            from = %transfer.from,
            to = %transfer.to,
            amount = %transfer.amount,
            correlation_id = ?ctx.correlation_id,
            "Transfer applied"
        );
        Ok(())
    }

    /// Read the last committed balance without taking any lock.
    pub async fn get_balance(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
    ) -> LedgerResult<Money> {
        self.controller
            .run(ctx, "get_balance", || ctx.run(self.read_balance(id)))
            .await
    }

    // =========================================================================
    // Single attempts (one transaction each)
    //
    // Each attempt stages its writes under `ctx.run`, so cancellation or
    // expiry drops the open transaction. The commit itself runs outside that
    // race: once COMMIT is sent the caller must learn the server's answer.
    // =========================================================================

    async fn try_create_account(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
    ) -> LedgerResult<()> {
        let tx = ctx.run(self.stage_create_account(id)).await?;
        commit(ctx, tx).await
    }

    async fn try_deposit(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
        amount: Money,
    ) -> LedgerResult<()> {
        let tx = ctx.run(self.stage_deposit(id, amount)).await?;
        commit(ctx, tx).await
    }

    async fn try_withdraw(
        &self,
        ctx: &OperationContext,
        id: &AccountId,
        amount: Money,
    ) -> LedgerResult<()> {
        let tx = ctx.run(self.stage_withdraw(id, amount)).await?;
        commit(ctx, tx).await
    }

    async fn try_transfer(&self, ctx: &OperationContext, transfer: &Transfer) -> LedgerResult<()> {
        let tx = ctx.run(self.stage_transfer(transfer)).await?;
        commit(ctx, tx).await
    }

    async fn read_balance(&self, id: &AccountId) -> LedgerResult<Money> {
        Ok(self.store.get(id).await?)
    }

    // =========================================================================
    // Staging (everything up to, but not including, the commit)
    // =========================================================================

    async fn stage_create_account(&self, id: &AccountId) -> LedgerResult<StoreTransaction> {
        let mut tx = self.store.begin().await?;
        self.store.create(&mut tx, id).await?;
        Ok(tx)
    }

    async fn stage_deposit(
        &self,
        id: &AccountId,
        amount: Money,
    ) -> LedgerResult<StoreTransaction> {
        let mut tx = self.store.begin().await?;
        let account = self.store.get_for_update(&mut tx, id).await?;

        let balance = match account.credit(amount) {
            Ok(balance) => balance,
            Err(e) => return rollback(tx, e).await,
        };

        self.store.set_balance(&mut tx, id, balance).await?;
        Ok(tx)
    }

    async fn stage_withdraw(
        &self,
        id: &AccountId,
        amount: Money,
    ) -> LedgerResult<StoreTransaction> {
        let mut tx = self.store.begin().await?;
        let account = self.store.get_for_update(&mut tx, id).await?;

        let balance = match account.debit(amount) {
            Ok(balance) => balance,
            Err(e) => return rollback(tx, e).await,
        };

        self.store.set_balance(&mut tx, id, balance).await?;
        Ok(tx)
    }

    async fn stage_transfer(&self, transfer: &Transfer) -> LedgerResult<StoreTransaction> {
        let mut tx = self.store.begin().await?;
        let (from, to) = self.lock_transfer_accounts(&mut tx, transfer).await?;

        let debited = match from.debit(transfer.amount) {
            Ok(balance) => balance,
            Err(e) => return rollback(tx, e).await,
        };

        if transfer.is_self_transfer() {
            // Funds are checked, but debit and credit of one row cancel out.
            return Ok(tx);
        }

        let credited = match to.credit(transfer.amount) {
            Ok(balance) => balance,
            Err(e) => return rollback(tx, e).await,
        };

        self.store.set_balance(&mut tx, from.id(), debited).await?;
        self.store.set_balance(&mut tx, to.id(), credited).await?;
        Ok(tx)
    }

    /// Lock both transfer rows in canonical order and return them as
    /// `(from, to)`.
    async fn lock_transfer_accounts(
        &self,
        tx: &mut StoreTransaction,
        transfer: &Transfer,
    ) -> LedgerResult<(Account, Account)> {
        match self.controller.lock_pair(&transfer.from, &transfer.to) {
            LockOrder::Single(id) => {
                let account = self.store.get_for_update(tx, id).await?;
                Ok((account.clone(), account))
            }
            LockOrder::Pair(first, second) => {
                let first = self.store.get_for_update(tx, first).await?;
                let second = self.store.get_for_update(tx, second).await?;
                if first.id() == &transfer.from {
                    Ok((first, second))
                } else {
                    Ok((second, first))
                }
            }
        }
    }
}

/// Commit a staged transaction unless the context already ended.
///
/// The commit is not raced against the context: dropping it mid-flight
/// could report an error for a write the server has made durable.
async fn commit(ctx: &OperationContext, tx: StoreTransaction) -> LedgerResult<()> {
    if let Err(e) = ctx.check() {
        return rollback(tx, e).await;
    }
    tx.commit().await?;
    Ok(())
}

/// Roll back explicitly, then report `err`.
async fn rollback<T>(tx: StoreTransaction, err: LedgerError) -> LedgerResult<T> {
    if let Err(e) = tx.rollback().await {
        // The server aborts the transaction with the connection anyway.
        tracing::warn!(error = %e, "Rollback failed");
    }
    Err(err)
}
