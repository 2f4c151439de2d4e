//! Concurrency Controller
//!
//! Runs one transactional attempt at a time and retries it when the store
//! reports a transient conflict.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::domain::{AccountId, OperationContext};
use crate::error::{LedgerError, LedgerResult};

use super::LockOrder;

/// Bounded exponential backoff for transient conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound of any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Retry policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Upper bound of the delay after `attempt` failed attempts.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay after `attempt` failed attempts, jittered in `[ceiling/2, ceiling]`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        if nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(nanos / 2..=nanos))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(10), Duration::from_millis(500))
    }
}

/// Concurrency controller shared by every ledger operation
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyController {
    policy: RetryPolicy,
}

impl ConcurrencyController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Lock order for an operation touching two accounts. Single-account
    /// operations lock only their own row and need no ordering.
    pub fn lock_pair<'a>(&self, a: &'a AccountId, b: &'a AccountId) -> LockOrder<'a> {
        LockOrder::pair(a, b)
    }

    /// Run `attempt` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    ///
    /// Only `LedgerError::Conflict` is retried. Each attempt must open and
    /// finish its own transaction so a retry starts from a clean state.
    /// `ctx` is checked before every attempt and bounds the backoff sleeps.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        mut attempt: F,
    ) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            ctx.check()?;
            attempts += 1;
            match attempt().await {
                Err(LedgerError::Conflict(source)) => {
                    if attempts >= max_attempts {
                        tracing::warn!(
                            operation,
                            attempts,
                            error = %source,
                            "Transient conflict, retries exhausted"
                        );
                        return Err(LedgerError::RetriesExhausted { attempts, source });
                    }

                    let delay = self.policy.backoff(attempts);
                    tracing::warn!(
                        operation,
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "Transient conflict, retrying"
                    );
                    ctx.run(async {
                        tokio::time::sleep(delay).await;
                        Ok::<_, LedgerError>(())
                    })
                    .await?;
                }
                other => return other,
            }
        }
    }
}
