//! Retrying Operation Executor
//!
//! Every statement against the column store goes through
//! [`Executor::perform`]. It is the single place where admission, deadlines,
//! retry/backoff and consistency selection are decided; nothing above it
//! talks to a [`ColumnStore`](crate::column_store::ColumnStore) directly.
//!
//! ## Attempt Loop
//!
//! ```text
//! perform(kind, timeout, observer, body)
//!     │
//!     ├─► acquire admitted connection ──────────────┐
//!     ├─► consistency = policy(kind, repeated, conn) │  one attempt,
//!     ├─► body(conn, Attempt { .. })  within timeout │  statement counted
//!     │                                              ┘  against conn
//!     ├─ Ok            ──► observer.on_success, return
//!     ├─ terminal Err  ──► observer.on_failure, return Err
//!     └─ transient Err ──► budget left? sleep(backoff), repeat with
//!                          is_repeated = true
//!                          else RetriesExhausted
//! ```
//!
//! ## Retryable vs Non-Retryable Errors
//!
//! **Retryable**: `Unavailable`, `Timeout`, `Overloaded`, pool/I-O database
//! errors. **Non-retryable**: everything else, see
//! [`StorageError::is_transient`].
//!
//! ## Cancellation
//!
//! Dropping the future returned by `perform` cancels the operation at its
//! next await point: between attempts, during backoff, or while waiting for
//! admission. A statement already handed to the store completes or fails on
//! the store's side regardless.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use helixvault_observability::metrics::{
    CONSISTENCY_DOWNGRADES_TOTAL, STORAGE_OPERATIONS_TOTAL, STORAGE_OPERATION_LATENCY,
    STORAGE_RETRIES_TOTAL,
};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::{RetryConfig, StorageConfig};
use crate::connection::{Connection, ConnectionPool};
use crate::consistency::{Consistency, ConsistencyPolicy, OperationKind};
use crate::error::{Result, StorageError};

/// Retry budget and backoff curve.
///
/// ```text
/// backoff(n) = min(initial_backoff * multiplier^n, max_backoff)
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Repeat attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Scale each backoff by a random factor in [0.75, 1.25)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Backoff before repeat number `retry` (0-indexed), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        if !backoff_ms.is_finite() || backoff_ms >= self.max_backoff.as_millis() as f64 {
            return self.max_backoff;
        }
        Duration::from_millis(backoff_ms as u64)
    }

    fn delay(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        if !self.jitter {
            return base;
        }
        let factor = 0.75 + rand::random::<f64>() * 0.5;
        Duration::from_millis((base.as_millis() as f64 * factor) as u64).min(self.max_backoff)
    }
}

/// What the operation body is told about the attempt it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1 for the first attempt
    pub number: u32,
    pub is_repeated: bool,
    /// Level to issue the statement at
    pub consistency: Consistency,
}

/// Completion callbacks for a single `perform` call.
///
/// Borrowed for the duration of the call only. Exactly one of the two
/// methods is invoked, once.
pub trait OperationObserver: Send + Sync {
    fn on_success(&self, _kind: OperationKind, _attempts: u32) {}

    fn on_failure(&self, _kind: OperationKind, _error: &StorageError) {}
}

pub struct Executor {
    pool: Arc<ConnectionPool>,
    retry: RetryPolicy,
    consistency: ConsistencyPolicy,
    default_timeout: Duration,
}

impl Executor {
    pub fn new(pool: Arc<ConnectionPool>, config: &StorageConfig) -> Self {
        Self {
            pool,
            retry: RetryPolicy::from(&config.retry),
            consistency: ConsistencyPolicy,
            default_timeout: config.default_timeout(),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Per-attempt deadline used when callers have none of their own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `body` under the retry policy.
    ///
    /// `timeout` bounds each attempt, admission wait included. `body` is
    /// invoked once per attempt with an admitted connection and the
    /// [`Attempt`] it runs in; it must issue its statement at
    /// `attempt.consistency`.
    pub async fn perform<T, F, Fut>(
        &self,
        kind: OperationKind,
        timeout: Duration,
        observer: Option<&dyn OperationObserver>,
        mut body: F,
    ) -> Result<T>
    where
        F: FnMut(Arc<Connection>, Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut retry = 0u32;

        let outcome = loop {
            let attempt_number = retry + 1;
            match self
                .attempt(kind, timeout, attempt_number, &mut body)
                .await
            {
                Ok(value) => {
                    if retry > 0 {
                        debug!(
                            operation = kind.as_str(),
                            attempt = attempt_number,
                            "Operation succeeded after retry"
                        );
                    }
                    if let Some(observer) = observer {
                        observer.on_success(kind, attempt_number);
                    }
                    break Ok(value);
                }
                Err(error) if !error.is_transient() => {
                    warn!(
                        operation = kind.as_str(),
                        attempt = attempt_number,
                        error = %error,
                        "Non-retryable error, giving up"
                    );
                    break Err(error);
                }
                Err(error) if retry >= self.retry.max_retries => {
                    warn!(
                        operation = kind.as_str(),
                        attempt = attempt_number,
                        max_retries = self.retry.max_retries,
                        error = %error,
                        "Max retries exhausted, giving up"
                    );
                    break Err(StorageError::RetriesExhausted {
                        operation: kind.as_str(),
                        attempts: attempt_number,
                        source: Box::new(error),
                    });
                }
                Err(error) => {
                    let backoff = self.retry.delay(retry);
                    warn!(
                        operation = kind.as_str(),
                        attempt = attempt_number,
                        max_retries = self.retry.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Retryable error, backing off"
                    );
                    STORAGE_RETRIES_TOTAL
                        .with_label_values(&[kind.as_str()])
                        .inc();
                    sleep(backoff).await;
                    retry += 1;
                }
            }
        };

        STORAGE_OPERATION_LATENCY
            .with_label_values(&[kind.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let label = match &outcome {
            Ok(_) => "ok",
            Err(StorageError::RetriesExhausted { .. }) => "exhausted",
            Err(_) => "failed",
        };
        STORAGE_OPERATIONS_TOTAL
            .with_label_values(&[kind.as_str(), label])
            .inc();

        if let (Err(error), Some(observer)) = (&outcome, observer) {
            observer.on_failure(kind, error);
        }
        outcome
    }

    async fn attempt<T, F, Fut>(
        &self,
        kind: OperationKind,
        timeout: Duration,
        number: u32,
        body: &mut F,
    ) -> Result<T>
    where
        F: FnMut(Arc<Connection>, Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + timeout;
        let conn = self.pool.acquire(timeout).await?;

        let is_repeated = number > 1;
        let consistency =
            self.consistency
                .for_attempt(kind, is_repeated, conn.fallback_read_consistency());
        if consistency == Consistency::LocalOne {
            CONSISTENCY_DOWNGRADES_TOTAL
                .with_label_values(&[kind.as_str()])
                .inc();
        }
        let attempt = Attempt {
            number,
            is_repeated,
            consistency,
        };

        let _statement = conn.begin_statement();
        match tokio::time::timeout_at(deadline, body(conn.clone(), attempt)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(timeout)),
        }
    }
}
