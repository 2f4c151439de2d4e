//! ledger - command-line front end
//!
//! Runs one ledger operation against the configured database and prints the
//! outcome.
//!
//! Usage:
//!   ledger [--timeout-ms N] create <id>
//!   ledger [--timeout-ms N] deposit <id> <amount>
//!   ledger [--timeout-ms N] withdraw <id> <amount>
//!   ledger [--timeout-ms N] transfer <from> <to> <amount>
//!   ledger [--timeout-ms N] balance <id>

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use ledger::{
    AccountId, Config, ConfigError, Ledger, LedgerError, LedgerResult, Money, OperationContext,
};

/// Exit code for a rejected request: bad arguments or a business error
const EXIT_REJECTED: u8 = 1;
/// Exit code for a system failure: configuration, store or context
const EXIT_FAILED: u8 = 2;

/// A parsed command line
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Create(AccountId),
    Deposit(AccountId, Money),
    Withdraw(AccountId, Money),
    Transfer(AccountId, AccountId, Money),
    Balance(AccountId),
}

fn parse_id(raw: Option<&String>) -> anyhow::Result<AccountId> {
    let raw = raw.ok_or_else(|| anyhow!("missing account id"))?;
    Ok(AccountId::new(raw.as_str())?)
}

fn parse_amount(raw: Option<&String>) -> anyhow::Result<Money> {
    let raw = raw.ok_or_else(|| anyhow!("missing amount"))?;
    raw.parse()
        .with_context(|| format!("invalid amount '{}'", raw))
}

/// Split `--timeout-ms` off the arguments and parse the command
fn parse_args(args: &[String]) -> anyhow::Result<(Option<Duration>, Command)> {
    let mut timeout = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--timeout-ms" {
            let raw = iter.next().ok_or_else(|| anyhow!("--timeout-ms needs a value"))?;
            let millis: u64 = raw
                .parse()
                .with_context(|| format!("invalid timeout '{}'", raw))?;
            timeout = Some(Duration::from_millis(millis));
        } else {
            rest.push(arg.clone());
        }
    }

    let command = match rest.first().map(String::as_str) {
        Some("create") => Command::Create(parse_id(rest.get(1))?),
        Some("deposit") => Command::Deposit(parse_id(rest.get(1))?, parse_amount(rest.get(2))?),
        Some("withdraw") => Command::Withdraw(parse_id(rest.get(1))?, parse_amount(rest.get(2))?),
        Some("transfer") => Command::Transfer(
            parse_id(rest.get(1))?,
            parse_id(rest.get(2))?,
            parse_amount(rest.get(3))?,
        ),
        Some("balance") => Command::Balance(parse_id(rest.get(1))?),
        Some(other) => bail!("unknown command '{}'", other),
        None => bail!("missing command (create, deposit, withdraw, transfer, balance)"),
    };

    Ok((timeout, command))
}

/// Map a failed operation or startup to its exit code
fn exit_code(err: &LedgerError) -> u8 {
    if err.is_business_error() {
        EXIT_REJECTED
    } else {
        EXIT_FAILED
    }
}

async fn connect(config: Result<Config, ConfigError>) -> LedgerResult<Ledger> {
    Ledger::connect(&config?).await
}

async fn execute(
    ledger: &Ledger,
    ctx: &OperationContext,
    command: Command,
) -> LedgerResult<String> {
    match command {
        Command::Create(id) => {
            ledger.create_account(ctx, &id).await?;
            Ok(format!("created {}", id))
        }
        Command::Deposit(id, amount) => {
            ledger.deposit(ctx, &id, amount).await?;
            Ok(format!("deposited {} to {}", amount, id))
        }
        Command::Withdraw(id, amount) => {
            ledger.withdraw(ctx, &id, amount).await?;
            Ok(format!("withdrew {} from {}", amount, id))
        }
        Command::Transfer(from, to, amount) => {
            ledger.transfer(ctx, &from, &to, amount).await?;
            Ok(format!("transferred {} from {} to {}", amount, from, to))
        }
        Command::Balance(id) => {
            let balance = ledger.get_balance(ctx, &id).await?;
            Ok(format!("{} {}", id, balance))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    ledger::telemetry::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (timeout, command) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("usage: {:#}", e);
            return ExitCode::from(EXIT_REJECTED);
        }
    };

    let ledger = match connect(Config::from_env()).await {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("failed: {}", e);
            return ExitCode::from(exit_code(&e));
        }
    };

    let mut ctx = OperationContext::new();
    if let Some(timeout) = timeout {
        ctx = ctx.with_timeout(timeout);
    }
    let correlation_id = ctx.ensure_correlation_id();
    tracing::debug!(%correlation_id, ?command, "Executing command");

    // Ctrl+C cancels the running operation; its transaction rolls back.
    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling operation...");
            token.cancel();
        }
    });

    let outcome = execute(&ledger, &ctx, command).await;
    ledger.close().await;

    match outcome {
        Ok(message) => {
            println!("{}", message);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = exit_code(&e);
            if code == EXIT_REJECTED {
                eprintln!("rejected: {}", e);
            } else {
                eprintln!("failed: {}", e);
            }
            ExitCode::from(code)
        }
    }
}
