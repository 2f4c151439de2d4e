//! Concurrency stress tool
//!
//! Creates a cycle of accounts, then runs two unit-transfer workers and one
//! balance checker per account for a fixed time. Afterwards the total
//! balance must equal the initial total and no checker may have observed a
//! negative balance.
//!
//! Run with: cargo run --bin stress --release -- --accounts 10 --seconds 10

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ledger::{AccountId, Config, Ledger, LedgerError, Money, OperationContext};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Counters {
    transfers: AtomicU64,
    no_money: AtomicU64,
    reads: AtomicU64,
}

fn arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    ledger::telemetry::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let account_count: usize = arg(&args, "--accounts", 10).max(2);
    let initial_balance: i64 = arg(&args, "--balance", 5);
    let seconds: u64 = arg(&args, "--seconds", 10);

    let config = Config::from_env()?;
    let ledger = Ledger::connect(&config).await?;
    let ctx = OperationContext::new();

    // Unique prefix so repeated runs do not collide on account ids.
    let run_id = uuid::Uuid::new_v4().simple().to_string();
    let mut accounts = Vec::with_capacity(account_count);
    for i in 0..account_count {
        let id = AccountId::new(format!("stress-{}-{}", run_id, i))?;
        ledger.create_account(&ctx, &id).await?;
        ledger.deposit(&ctx, &id, Money::new(initial_balance)).await?;
        accounts.push(id);
    }

    tracing::info!(
        accounts = account_count,
        initial_balance,
        seconds,
        "Starting stress run"
    );

    let stop = CancellationToken::new();
    let counters = Arc::new(Counters::default());
    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();

    for i in 0..account_count {
        let account = accounts[i].clone();
        let next = accounts[(i + 1) % account_count].clone();
        let prev = accounts[(i + account_count - 1) % account_count].clone();

        for to in [next, prev] {
            let ledger = ledger.clone();
            let from = account.clone();
            let stop = stop.clone();
            let counters = counters.clone();
            workers.spawn(async move {
                let ctx = OperationContext::new();
                while !stop.is_cancelled() {
                    match ledger.transfer(&ctx, &from, &to, Money::new(1)).await {
                        Ok(()) => counters.transfers.fetch_add(1, Ordering::Relaxed),
                        Err(LedgerError::NoMoney { .. }) => {
                            counters.no_money.fetch_add(1, Ordering::Relaxed)
                        }
                        Err(e) => return Err(e.into()),
                    };
                }
                Ok(())
            });
        }

        let ledger = ledger.clone();
        let stop = stop.clone();
        let counters = counters.clone();
        workers.spawn(async move {
            let ctx = OperationContext::new();
            while !stop.is_cancelled() {
                let balance = ledger.get_balance(&ctx, &account).await?;
                if balance.is_negative() {
                    anyhow::bail!("{} balance is negative: {}", account, balance);
                }
                counters.reads.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });
    }

    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    stop.cancel();

    let mut failures = 0u64;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                tracing::error!(error = %e, "Worker failed");
            }
            Err(e) => {
                failures += 1;
                tracing::error!(error = %e, "Worker panicked");
            }
        }
    }
    let elapsed = start.elapsed();

    let mut total = 0i64;
    for id in &accounts {
        total += ledger.get_balance(&ctx, id).await?.value();
    }
    let expected = initial_balance * account_count as i64;

    ledger.close().await;

    let transfers = counters.transfers.load(Ordering::Relaxed);
    println!("\n=== Stress Test Results ===");
    println!("Accounts: {}", account_count);
    println!("Transfers committed: {}", transfers);
    println!("Transfers rejected (no money): {}", counters.no_money.load(Ordering::Relaxed));
    println!("Balance reads: {}", counters.reads.load(Ordering::Relaxed));
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} transfers/sec", transfers as f64 / elapsed.as_secs_f64());
    println!("Total balance: {} (expected {})", total, expected);

    if failures > 0 {
        anyhow::bail!("{} workers failed", failures);
    }
    if total != expected {
        anyhow::bail!("total balance drifted: {} != {}", total, expected);
    }

    Ok(())
}
