//! Bounded retry for fallible asynchronous operations.
//!
//! [`RetryExecutor`] runs an operation up to a fixed number of attempts. An
//! attempt fails when the operation returns an error or when the caller's
//! `accept` predicate rejects its result. When every attempt has failed the
//! executor returns [`RetryOutcome::Exhausted`] rather than an error: the
//! caller substitutes an empty artefact and the containing job carries on.
//!
//! Two flavours are provided:
//!
//! - [`RetryExecutor::execute`]: plain retry, honouring the error's
//!   [`RetryPolicy`] (stop on `NonRetryable`, sleep on `Retryable { after }`).
//!   Provider-requested waits are capped at [`RetryExecutor::max_delay`].
//! - [`RetryExecutor::execute_rotating`]: every attempt leases a credential
//!   the operation has not tried yet and rotates the pool past it on failure.
//!   A `NonRetryable` error here only condemns the credential, so the next
//!   attempt proceeds with a fresh one.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use pipeline::{RetryPolicy, Retryable};

use crate::credentials::{CredentialLease, CredentialPool};

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure<E> {
    /// The operation returned an error.
    Error(E),
    /// The operation succeeded but its result was rejected by `accept`.
    Rejected,
}

impl<E: Display> Display for AttemptFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Error(e) => write!(f, "{e}"),
            AttemptFailure::Rejected => f.write_str("result rejected"),
        }
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    /// An attempt produced an accepted value.
    Succeeded {
        /// The accepted value.
        value: T,
        /// Number of attempts made, including the successful one.
        attempts: u32,
    },
    /// Every permitted attempt failed (or the credential pool ran dry).
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last failure observed, if any attempt ran.
        last_failure: Option<AttemptFailure<E>>,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Returns the accepted value, discarding failure details.
    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }

    /// Converts into a `Result` whose error is the last failure observed.
    pub fn into_result(self) -> Result<T, Option<AttemptFailure<E>>> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Exhausted { last_failure, .. } => Err(last_failure),
        }
    }
}

/// Default cap on a single Retry-After wait.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Runs operations under a bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    max_attempts: u32,
    max_delay: Duration,
}

impl RetryExecutor {
    /// Creates an executor allowing `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }

    /// Caps every Retry-After wait at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Maximum number of attempts per operation.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Longest wait between attempts, whatever the provider asks for.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    async fn back_off(&self, operation: &str, requested: Duration) {
        let delay = requested.min(self.max_delay);
        if delay < requested {
            tracing::debug!(
                operation,
                requested_ms = requested.as_millis() as u64,
                delay_ms = delay.as_millis() as u64,
                "retry-after capped"
            );
        }
        tokio::time::sleep(delay).await;
    }

    /// Runs `op` until it yields a value accepted by `accept` or the attempt
    /// budget is spent. `on_failure` is invoked after every failed attempt,
    /// before the next one starts.
    pub async fn execute<T, E, F, Fut, A, H>(
        &self,
        operation: &str,
        mut op: F,
        accept: A,
        mut on_failure: H,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        A: Fn(&T) -> bool,
        H: FnMut(u32, &AttemptFailure<E>),
    {
        let mut last_failure = None;
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            let failure = match op(attempts).await {
                Ok(value) if accept(&value) => return RetryOutcome::Succeeded { value, attempts },
                Ok(_) => AttemptFailure::Rejected,
                Err(e) => AttemptFailure::Error(e),
            };

            on_failure(attempts, &failure);
            tracing::warn!(
                operation,
                attempt = attempts,
                max_attempts = self.max_attempts,
                error = %failure,
                "attempt failed"
            );

            let policy = policy_of(&failure);
            last_failure = Some(failure);
            match policy {
                RetryPolicy::NonRetryable => break,
                RetryPolicy::Retryable { after: Some(delay) } if attempts < self.max_attempts => {
                    self.back_off(operation, delay).await;
                }
                RetryPolicy::Retryable { .. } => {}
            }
        }

        RetryOutcome::Exhausted {
            attempts,
            last_failure,
        }
    }

    /// Runs `op` with a fresh credential from `pool` on every attempt.
    ///
    /// No credential is used twice within one call; the pool cursor is
    /// rotated past each credential that fails. The call ends early, exhausted,
    /// once every credential in the pool has been tried.
    pub async fn execute_rotating<T, E, F, Fut, A>(
        &self,
        operation: &str,
        pool: &CredentialPool,
        mut op: F,
        accept: A,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(CredentialLease) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        A: Fn(&T) -> bool,
    {
        let mut tried = Vec::with_capacity(pool.len());
        let mut last_failure = None;
        let mut attempts = 0;

        while attempts < self.max_attempts {
            let Some(lease) = pool.lease(&tried) else {
                tracing::warn!(
                    operation,
                    provider = pool.provider(),
                    attempts,
                    "credential pool exhausted"
                );
                break;
            };
            attempts += 1;
            let slot = lease.slot();

            let failure = match op(lease).await {
                Ok(value) if accept(&value) => return RetryOutcome::Succeeded { value, attempts },
                Ok(_) => AttemptFailure::Rejected,
                Err(e) => AttemptFailure::Error(e),
            };

            tracing::warn!(
                operation,
                provider = pool.provider(),
                slot = %slot,
                attempt = attempts,
                max_attempts = self.max_attempts,
                error = %failure,
                "attempt failed; rotating credential"
            );
            tried.push(slot);
            pool.rotate(slot);

            if let RetryPolicy::Retryable { after: Some(delay) } = policy_of(&failure) {
                if attempts < self.max_attempts {
                    self.back_off(operation, delay).await;
                }
            }
            last_failure = Some(failure);
        }

        RetryOutcome::Exhausted {
            attempts,
            last_failure,
        }
    }
}

fn policy_of<E: Retryable>(failure: &AttemptFailure<E>) -> RetryPolicy {
    match failure {
        AttemptFailure::Error(e) => e.retry_policy(),
        AttemptFailure::Rejected => RetryPolicy::Retryable { after: None },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pipeline::{Credential, CredentialSlot, TransportError};

    use super::*;

    fn pool(n: usize) -> CredentialPool {
        let creds = (0..n)
            .map(|i| Credential::new(format!("key-{i}")).expect("non-empty"))
            .collect();
        CredentialPool::new("search", creds).expect("non-empty pool")
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut failures = Vec::new();
        let outcome = RetryExecutor::new(4)
            .execute(
                "flaky",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(TransportError::retryable("test", "timeout"))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| true,
                |attempt, _| failures.push(attempt),
            )
            .await;

        assert_eq!(outcome, RetryOutcome::Succeeded { value: 3, attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failures, vec![1, 2]);
    }

    #[tokio::test]
    async fn rejected_results_are_retried_then_exhausted() {
        let outcome: RetryOutcome<String, TransportError> = RetryExecutor::new(3)
            .execute(
                "empty",
                |_| async { Ok(String::new()) },
                |s: &String| !s.is_empty(),
                |_, _| {},
            )
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 3,
                last_failure: Some(AttemptFailure::Rejected)
            }
        );
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let outcome: RetryOutcome<(), TransportError> = RetryExecutor::new(3)
            .execute(
                "bad request",
                |_| async { Err(TransportError::fatal("test", "400")) },
                |_| true,
                |_, _| {},
            )
            .await;
        assert_eq!(outcome.attempts(), 1);
        assert!(outcome.into_value().is_none());
    }

    #[tokio::test]
    async fn retry_after_hint_is_capped_by_max_delay() {
        let executor = RetryExecutor::new(2).with_max_delay(Duration::from_millis(10));
        let started = std::time::Instant::now();
        let run = executor.execute(
            "rate limited",
            |attempt| async move {
                if attempt == 1 {
                    Err(TransportError::retryable("test", "429").retry_after(Duration::from_secs(3600)))
                } else {
                    Ok(attempt)
                }
            },
            |_| true,
            |_, _| {},
        );

        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("an hour-long Retry-After must be capped");
        assert_eq!(outcome, RetryOutcome::Succeeded { value: 2, attempts: 2 });
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn rotating_retry_after_hint_is_capped_by_max_delay() {
        let pool = pool(2);
        let executor = RetryExecutor::new(2).with_max_delay(Duration::from_millis(10));
        let run = executor
            .execute_rotating(
                "search",
                &pool,
                |lease| {
                    let slot = lease.slot();
                    async move {
                        if slot == CredentialSlot::new(0) {
                            Err(TransportError::retryable("search", "429")
                                .retry_after(Duration::from_secs(3600)))
                        } else {
                            Ok("results")
                        }
                    }
                },
                |_| true,
            );

        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("an hour-long Retry-After must be capped");
        assert_eq!(outcome.into_value(), Some("results"));
    }

    #[tokio::test]
    async fn rotation_never_reuses_a_credential_and_degrades_quietly() {
        let pool = pool(3);
        let mut seen: Vec<CredentialSlot> = Vec::new();

        let outcome: RetryOutcome<String, TransportError> = RetryExecutor::new(3)
            .execute_rotating(
                "search",
                &pool,
                |lease| {
                    seen.push(lease.slot());
                    async { Err(TransportError::retryable("search", "quota exceeded")) }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.attempts(), 3);
        assert!(outcome.into_value().is_none());
        assert_eq!(
            seen,
            vec![CredentialSlot::new(0), CredentialSlot::new(1), CredentialSlot::new(2)]
        );
        for pair in seen.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn rotation_stops_when_pool_is_smaller_than_budget() {
        let pool = pool(2);
        let outcome: RetryOutcome<(), TransportError> = RetryExecutor::new(5)
            .execute_rotating(
                "search",
                &pool,
                |_| async { Err(TransportError::fatal("search", "401 invalid key")) },
                |_| true,
            )
            .await;
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn rotation_resumes_from_the_rotated_cursor() {
        let pool = pool(3);
        let outcome: RetryOutcome<String, TransportError> = RetryExecutor::new(3)
            .execute_rotating(
                "search",
                &pool,
                |lease| {
                    let slot = lease.slot();
                    async move {
                        if slot == CredentialSlot::new(0) {
                            Err(TransportError::retryable("search", "429"))
                        } else {
                            Ok(format!("results via {}", slot))
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.into_value().as_deref(), Some("results via 1"));
        assert_eq!(pool.next().slot(), CredentialSlot::new(1));
    }
}
