//! Integration tests for ledger operations against PostgreSQL

use std::time::Duration;

use ledger::{LedgerError, Money, OperationContext, Transfer};

mod common;

#[tokio::test]
async fn test_create_account_starts_at_zero() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");

    ledger.create_account(&ctx, &a0).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::ZERO);
}

#[tokio::test]
async fn test_create_account_twice_fails() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");

    ledger.create_account(&ctx, &a0).await.unwrap();
    ledger.deposit(&ctx, &a0, Money::new(30)).await.unwrap();

    let result = ledger.create_account(&ctx, &a0).await;
    assert!(matches!(result, Err(LedgerError::AlreadyExists(ref id)) if id == &a0));
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(30));
}

#[tokio::test]
async fn test_simple_commands() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");
    let a1 = common::unique_id("a1");

    ledger.create_account(&ctx, &a0).await.unwrap();

    ledger.deposit(&ctx, &a0, Money::new(100)).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(100));

    ledger.withdraw(&ctx, &a0, Money::new(50)).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(50));

    let result = ledger.withdraw(&ctx, &a0, Money::new(100)).await;
    assert!(matches!(result, Err(LedgerError::NoMoney { .. })));
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(50));

    ledger.create_account(&ctx, &a1).await.unwrap();

    ledger.transfer(&ctx, &a0, &a1, Money::new(40)).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(10));
    assert_eq!(common::balance(&ledger, &a1).await, Money::new(40));

    let result = ledger.transfer(&ctx, &a0, &a1, Money::new(50)).await;
    assert!(matches!(result, Err(LedgerError::NoMoney { .. })));
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(10));
    assert_eq!(common::balance(&ledger, &a1).await, Money::new(40));
}

#[tokio::test]
async fn test_withdraw_more_than_balance() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");

    ledger.create_account(&ctx, &a0).await.unwrap();
    ledger.deposit(&ctx, &a0, Money::new(100)).await.unwrap();

    match ledger.withdraw(&ctx, &a0, Money::new(150)).await {
        Err(LedgerError::NoMoney {
            account,
            required,
            available,
        }) => {
            assert_eq!(account, a0);
            assert_eq!(required, Money::new(150));
            assert_eq!(available, Money::new(100));
        }
        other => panic!("Expected NoMoney, got: {:?}", other),
    }
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(100));

    // Draining to exactly zero is allowed.
    ledger.withdraw(&ctx, &a0, Money::new(100)).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::ZERO);
}

#[tokio::test]
async fn test_erroneous_cases() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let b0 = common::unique_id("b0");
    let b999 = common::unique_id("b999");
    let c0 = common::unique_id("c0");

    ledger.create_account(&ctx, &b0).await.unwrap();
    ledger.deposit(&ctx, &b0, Money::new(100)).await.unwrap();

    let result = ledger.deposit(&ctx, &b0, Money::new(-100)).await;
    assert!(matches!(result, Err(LedgerError::NegativeAmount(_))));
    assert_eq!(common::balance(&ledger, &b0).await, Money::new(100));

    let result = ledger.withdraw(&ctx, &b0, Money::new(-50)).await;
    assert!(matches!(result, Err(LedgerError::NegativeAmount(_))));
    assert_eq!(common::balance(&ledger, &b0).await, Money::new(100));

    // Unknown account on either side leaves the known side untouched.
    let result = ledger.transfer(&ctx, &b0, &b999, Money::new(50)).await;
    assert!(matches!(result, Err(LedgerError::UnknownAccount(ref id)) if id == &b999));
    assert_eq!(common::balance(&ledger, &b0).await, Money::new(100));

    let result = ledger.transfer(&ctx, &b999, &b0, Money::new(50)).await;
    assert!(matches!(result, Err(LedgerError::UnknownAccount(ref id)) if id == &b999));
    assert_eq!(common::balance(&ledger, &b0).await, Money::new(100));

    ledger.create_account(&ctx, &b999).await.unwrap();
    ledger.deposit(&ctx, &b999, Money::new(200)).await.unwrap();
    assert_eq!(common::balance(&ledger, &b999).await, Money::new(200));

    let result = ledger.transfer(&ctx, &b0, &b999, Money::new(-50)).await;
    assert!(matches!(result, Err(LedgerError::NegativeAmount(_))));
    assert_eq!(common::balance(&ledger, &b0).await, Money::new(100));
    assert_eq!(common::balance(&ledger, &b999).await, Money::new(200));

    ledger.transfer(&ctx, &b0, &b999, Money::new(50)).await.unwrap();
    assert_eq!(common::balance(&ledger, &b0).await, Money::new(50));
    assert_eq!(common::balance(&ledger, &b999).await, Money::new(250));

    assert!(matches!(
        ledger.deposit(&ctx, &c0, Money::new(100)).await,
        Err(LedgerError::UnknownAccount(_))
    ));
    assert!(matches!(
        ledger.withdraw(&ctx, &c0, Money::new(100)).await,
        Err(LedgerError::UnknownAccount(_))
    ));
    assert!(matches!(
        ledger.get_balance(&ctx, &c0).await,
        Err(LedgerError::UnknownAccount(_))
    ));
}

#[tokio::test]
async fn test_transfer_between_two_unknown_accounts() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();

    let result = ledger
        .transfer(&ctx, &common::unique_id("x"), &common::unique_id("y"), Money::new(1))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, LedgerError::UnknownAccount(_)));
    assert!(err.is_business_error());
}

#[tokio::test]
async fn test_zero_amount_rejected_by_default() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");
    ledger.create_account(&ctx, &a0).await.unwrap();

    assert!(matches!(
        ledger.deposit(&ctx, &a0, Money::ZERO).await,
        Err(LedgerError::NegativeAmount(_))
    ));
    assert_eq!(common::balance(&ledger, &a0).await, Money::ZERO);
}

#[tokio::test]
async fn test_zero_amount_noop_policy() {
    let ledger = common::setup_test_ledger_with(common::noop_settings()).await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");
    let a1 = common::unique_id("a1");
    ledger.create_account(&ctx, &a0).await.unwrap();
    ledger.create_account(&ctx, &a1).await.unwrap();
    ledger.deposit(&ctx, &a0, Money::new(10)).await.unwrap();

    ledger.deposit(&ctx, &a0, Money::ZERO).await.unwrap();
    ledger.withdraw(&ctx, &a0, Money::ZERO).await.unwrap();
    ledger.transfer(&ctx, &a0, &a1, Money::ZERO).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(10));
    assert_eq!(common::balance(&ledger, &a1).await, Money::ZERO);

    // Negative amounts stay rejected.
    assert!(matches!(
        ledger.withdraw(&ctx, &a0, Money::new(-1)).await,
        Err(LedgerError::NegativeAmount(_))
    ));
}

#[tokio::test]
async fn test_self_transfer_changes_nothing() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");
    ledger.create_account(&ctx, &a0).await.unwrap();
    ledger.deposit(&ctx, &a0, Money::new(20)).await.unwrap();

    ledger.transfer(&ctx, &a0, &a0, Money::new(15)).await.unwrap();
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(20));

    assert!(matches!(
        ledger.transfer(&ctx, &a0, &a0, Money::new(25)).await,
        Err(LedgerError::NoMoney { .. })
    ));
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(20));
}

#[tokio::test]
async fn test_deposit_overflow_rolls_back() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let a0 = common::unique_id("a0");
    let a1 = common::unique_id("a1");
    ledger.create_account(&ctx, &a0).await.unwrap();
    ledger.create_account(&ctx, &a1).await.unwrap();
    ledger.deposit(&ctx, &a0, Money::new(i64::MAX)).await.unwrap();
    ledger.deposit(&ctx, &a1, Money::new(1)).await.unwrap();

    assert!(matches!(
        ledger.deposit(&ctx, &a0, Money::new(1)).await,
        Err(LedgerError::BalanceOverflow(_))
    ));
    assert!(matches!(
        ledger.transfer(&ctx, &a1, &a0, Money::new(1)).await,
        Err(LedgerError::BalanceOverflow(_))
    ));
    assert_eq!(common::balance(&ledger, &a0).await, Money::new(i64::MAX));
    assert_eq!(common::balance(&ledger, &a1).await, Money::new(1));
}

#[tokio::test]
async fn test_apply_transfer_value() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let accounts = common::create_funded_accounts(&ledger, 2, Money::new(100)).await;

    let transfer = Transfer::new(accounts[1].clone(), accounts[0].clone(), Money::new(60));
    ledger.apply_transfer(&ctx, &transfer).await.unwrap();

    assert_eq!(common::balance(&ledger, &accounts[0]).await, Money::new(160));
    assert_eq!(common::balance(&ledger, &accounts[1]).await, Money::new(40));
}

#[tokio::test]
async fn test_read_stability() {
    let ledger = common::setup_test_ledger().await;
    let accounts = common::create_funded_accounts(&ledger, 1, Money::new(77)).await;

    let first = common::balance(&ledger, &accounts[0]).await;
    let second = common::balance(&ledger, &accounts[0]).await;
    assert_eq!(first, second);
    assert_eq!(first, Money::new(77));
}

#[tokio::test]
async fn test_conservation_over_sequence() {
    let ledger = common::setup_test_ledger().await;
    let ctx = OperationContext::new();
    let accounts = common::create_funded_accounts(&ledger, 4, Money::new(50)).await;
    let initial = common::total_balance(&ledger, &accounts).await;

    let mut deposits = 0;
    let mut withdrawals = 0;
    for round in 0..20i64 {
        let from = &accounts[(round % 4) as usize];
        let to = &accounts[((round + 1) % 4) as usize];
        let amount = Money::new(round % 7 + 1);

        match ledger.transfer(&ctx, from, to, amount).await {
            Ok(()) | Err(LedgerError::NoMoney { .. }) => {}
            Err(e) => panic!("unexpected transfer error: {:?}", e),
        }
        if round % 3 == 0 {
            ledger.deposit(&ctx, to, amount).await.unwrap();
            deposits += amount.value();
        }
        if round % 5 == 0 && ledger.withdraw(&ctx, from, amount).await.is_ok() {
            withdrawals += amount.value();
        }
    }

    let total = common::total_balance(&ledger, &accounts).await;
    assert_eq!(total, initial + deposits - withdrawals);
    for id in &accounts {
        assert!(!common::balance(&ledger, id).await.is_negative());
    }
}

#[tokio::test]
async fn test_cancelled_context_does_not_mutate() {
    let ledger = common::setup_test_ledger().await;
    let accounts = common::create_funded_accounts(&ledger, 1, Money::new(10)).await;

    let ctx = OperationContext::new();
    ctx.cancel();
    let result = ledger.deposit(&ctx, &accounts[0], Money::new(5)).await;
    assert!(matches!(result, Err(LedgerError::Cancelled)));
    assert_eq!(common::balance(&ledger, &accounts[0]).await, Money::new(10));
}

#[tokio::test]
async fn test_deadline_while_waiting_for_lock_rolls_back() {
    let ledger = common::setup_test_ledger().await;
    let accounts = common::create_funded_accounts(&ledger, 2, Money::new(10)).await;

    // Hold the row lock of the destination from outside the ledger.
    let mut blocker = ledger.pool().begin().await.unwrap();
    sqlx::query("SELECT balance FROM accounts WHERE account_id = $1 FOR UPDATE")
        .bind(accounts[1].as_str())
        .execute(&mut *blocker)
        .await
        .unwrap();

    let ctx = OperationContext::new().with_timeout(Duration::from_millis(300));
    let result = ledger
        .transfer(&ctx, &accounts[0], &accounts[1], Money::new(5))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, LedgerError::DeadlineExceeded));
    assert!(err.is_system_error());

    blocker.rollback().await.unwrap();

    assert_eq!(common::balance(&ledger, &accounts[0]).await, Money::new(10));
    assert_eq!(common::balance(&ledger, &accounts[1]).await, Money::new(10));

    // The rows are usable again once the blocker is gone.
    ledger
        .transfer(&OperationContext::new(), &accounts[0], &accounts[1], Money::new(5))
        .await
        .unwrap();
    assert_eq!(common::balance(&ledger, &accounts[1]).await, Money::new(15));
}

#[tokio::test]
async fn test_deadline_during_commit_reports_the_committed_outcome() {
    let ledger = common::setup_test_ledger().await;
    common::install_slow_commit_trigger(ledger.pool()).await;
    let ctx = OperationContext::new();
    let id = common::unique_id(common::SLOW_COMMIT_PREFIX);
    ledger.create_account(&ctx, &id).await.unwrap();

    // COMMIT takes about a second, well past the deadline.
    let ctx = OperationContext::new().with_timeout(Duration::from_millis(300));
    let result = ledger.deposit(&ctx, &id, Money::new(100)).await;
    let balance = common::balance(&ledger, &id).await;

    match result {
        Ok(()) => assert_eq!(balance, Money::new(100)),
        Err(e) => panic!("deposit committed as {} but returned {:?}", balance, e),
    }
}

#[tokio::test]
async fn test_expired_context_does_not_mutate() {
    let ledger = common::setup_test_ledger().await;
    let accounts = common::create_funded_accounts(&ledger, 1, Money::new(10)).await;

    let ctx = OperationContext::new().with_timeout(Duration::from_millis(300));
    tokio::time::sleep(Duration::from_millis(400)).await;
    let result = ledger.deposit(&ctx, &accounts[0], Money::new(5)).await;

    assert!(matches!(result, Err(LedgerError::DeadlineExceeded)));
    assert_eq!(common::balance(&ledger, &accounts[0]).await, Money::new(10));
}

#[tokio::test]
async fn test_get_balance_does_not_wait_for_locks() {
    let ledger = common::setup_test_ledger().await;
    let accounts = common::create_funded_accounts(&ledger, 1, Money::new(10)).await;

    let mut blocker = ledger.pool().begin().await.unwrap();
    sqlx::query("UPDATE accounts SET balance = 999 WHERE account_id = $1")
        .bind(accounts[0].as_str())
        .execute(&mut *blocker)
        .await
        .unwrap();

    // The uncommitted write is invisible and the read does not block.
    let ctx = OperationContext::new().with_timeout(Duration::from_secs(2));
    let balance = ledger.get_balance(&ctx, &accounts[0]).await.unwrap();
    assert_eq!(balance, Money::new(10));

    blocker.rollback().await.unwrap();
}

#[tokio::test]
async fn test_close_releases_connections() {
    let ledger = common::setup_test_ledger().await;
    let accounts = common::create_funded_accounts(&ledger, 1, Money::new(1)).await;

    // Close right after a commit, while its connection is still on the way
    // back to the pool.
    ledger
        .deposit(&OperationContext::new(), &accounts[0], Money::new(1))
        .await
        .unwrap();
    assert!(ledger.pool().size() > 0);
    ledger.close().await;
    assert_eq!(ledger.pool().size(), 0);

    ledger.close().await;
    assert!(ledger.is_closed());
    assert_eq!(ledger.pool().size(), 0);

    let err = ledger
        .get_balance(&OperationContext::new(), &accounts[0])
        .await
        .unwrap_err();
    assert!(err.is_system_error());
}
