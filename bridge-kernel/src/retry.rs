//! Linear-backoff retry around outbound calls.

use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use bridge_telemetry::{NodeStatus, StatusReporter};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Backoff added per attempt: attempt `i` waits `(i - 1) * step`.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(300);

/// Errors produced while building a retry policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    /// The policy would never run the operation.
    #[error("retry policy needs at least one attempt")]
    NoAttempts,
}

/// Number of attempts and the backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    backoff_step: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff step.
    #[must_use]
    pub const fn new(max_attempts: NonZeroU32) -> Self {
        Self {
            max_attempts,
            backoff_step: RETRY_BACKOFF_STEP,
        }
    }

    /// Creates a policy from a raw attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::NoAttempts`] when `attempts` is zero.
    pub fn from_attempts(attempts: u32) -> Result<Self, RetryError> {
        NonZeroU32::new(attempts)
            .map(Self::new)
            .ok_or(RetryError::NoAttempts)
    }

    /// Overrides the backoff step.
    #[must_use]
    pub const fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Returns the attempt limit.
    #[must_use]
    pub const fn max_attempts(self) -> NonZeroU32 {
        self.max_attempts
    }

    /// Returns the sleep preceding `attempt` (1-based).
    #[must_use]
    pub fn delay_before(self, attempt: u32) -> Duration {
        self.backoff_step * attempt.saturating_sub(1)
    }
}

/// Runs an operation until it succeeds or the policy is exhausted.
///
/// Every attempt after the first reports a `"{label}: retrying i of N"` status and
/// log line before sleeping. Invocations are independent; there is no state shared
/// between two calls to [`run`](Self::run).
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    reporter: Arc<dyn StatusReporter>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Creates an executor reporting retries to `reporter`.
    #[must_use]
    pub fn new(policy: RetryPolicy, reporter: Arc<dyn StatusReporter>) -> Self {
        Self { policy, reporter }
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `operation`, retrying failures.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts().get();
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                let text = format!("{label}: retrying {attempt} of {max_attempts}");
                self.reporter.report_status(NodeStatus::retrying(text.clone()));
                self.reporter.log(&text);
                sleep(self.policy.delay_before(attempt)).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    warn!(label, attempt, max_attempts, error = %err, "attempt failed");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(label, attempts = max_attempts, error = %err, "retries exhausted");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bridge_telemetry::{CollectingReporter, StatusShape};
    use tokio::time::Instant;

    use super::*;

    fn executor(attempts: u32) -> (RetryExecutor, Arc<CollectingReporter>) {
        let reporter = CollectingReporter::new();
        let policy = RetryPolicy::from_attempts(attempts).unwrap();
        (RetryExecutor::new(policy, reporter.clone()), reporter)
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert_eq!(RetryPolicy::from_attempts(0), Err(RetryError::NoAttempts));
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::from_attempts(5).unwrap();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(300));
        assert_eq!(policy.delay_before(4), Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let (executor, reporter) = executor(5);
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let result: Result<usize, String> = executor
            .run("PostData", || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call <= 2 {
                        Err(format!("failure {call}"))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1000));
        assert_eq!(
            reporter.status_texts(),
            vec!["PostData: retrying 2 of 5", "PostData: retrying 3 of 5"]
        );
        assert!(
            reporter
                .statuses()
                .iter()
                .all(|status| status.shape() == StatusShape::Ring)
        );
        assert_eq!(reporter.logs().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_after_exhaustion() {
        let (executor, _reporter) = executor(3);
        let calls = AtomicUsize::new(0);

        let result: Result<(), String> = executor
            .run("OnBoard", || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("failure {call}")) }
            })
            .await;

        assert_eq!(result, Err("failure 3".to_owned()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_never_reports_retries() {
        let (executor, reporter) = executor(1);
        let result: Result<(), &str> = executor.run("RenewToken", || async { Err("down") }).await;

        assert_eq!(result, Err("down"));
        assert!(reporter.statuses().is_empty());
    }
}
