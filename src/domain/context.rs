//! Operation Context
//!
//! Carries the cancellation signal, optional deadline and correlation id
//! of one ledger call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Context for an operation, used for cancellation, timeouts and tracing.
///
/// Clones share the same cancellation token, so cancelling any clone
/// cancels every operation running under it.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    pub correlation_id: Option<Uuid>,

    /// Point in time after which the operation is abandoned
    pub deadline: Option<Instant>,

    cancellation: CancellationToken,
}

impl OperationContext {
    /// Create a new context with no deadline
    pub fn new() -> Self {
        Self {
            correlation_id: None,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with an absolute deadline. An earlier existing
    /// deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Create context with a deadline `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Check the context without waiting.
    pub fn check(&self) -> LedgerResult<()> {
        if self.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        if matches!(self.remaining(), Some(left) if left.is_zero()) {
            return Err(LedgerError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `operation` until it finishes, the context is cancelled, or the
    /// deadline passes.
    ///
    /// On cancellation or expiry the operation future is dropped, which drops
    /// any open store transaction and rolls it back.
    pub async fn run<T, F>(&self, operation: F) -> LedgerResult<T>
    where
        F: Future<Output = LedgerResult<T>>,
    {
        self.check()?;

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(LedgerError::Cancelled),
            _ = expiry => Err(LedgerError::DeadlineExceeded),
            result = operation => result,
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
