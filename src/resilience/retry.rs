// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Wraps a fallible async operation with a bounded number of attempts, a
//! per-attempt timeout and capped exponential backoff between attempts.
//! Backoff sleeps are cancellable; an attempt that is already running is
//! left to finish and its result is thrown away.
//!
//! # Example
//!
//! ```
//! use event_sync::RetryConfig;
//! use std::time::Duration;
//!
//! // Snapshot fetches: 3 attempts, 1s → 2s backoff, 8s cap
//! let snapshot = RetryConfig::snapshot();
//! assert_eq!(snapshot.max_retries, 3);
//! assert_eq!(snapshot.backoff_delay(0), Duration::from_secs(1));
//! assert_eq!(snapshot.backoff_delay(5), Duration::from_secs(8));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{error::Elapsed, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for operation retry behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryConfig::snapshot()`] - Snapshot fetches (product-tuned defaults)
/// - [`RetryConfig::query()`] - Quick retry for cheap individual operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts, including the first one.
    pub max_retries: usize,
    /// Each attempt is abandoned after this long and counted as a failure.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::snapshot()
    }
}

impl RetryConfig {
    /// Snapshot fetch retry.
    /// 3 attempts, backoff 1s, 2s (capped at 8s), 10s per attempt.
    #[must_use]
    pub fn snapshot() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            factor: 2.0,
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Quick retry for individual queries (don't block forever).
    /// 3 attempts with fast backoff - if it fails, let caller handle it.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            attempt_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            attempt_timeout: None,
        }
    }

    /// Delay before retry number `retry` (0-based):
    /// `min(max_delay, initial_delay * factor^retry)`.
    #[must_use]
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exp);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }
}

/// Why [`retry`] gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the final attempt's error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: E },

    /// The token fired before the operation succeeded.
    #[error("retry cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// Number of failed attempts behind this error.
    #[must_use]
    pub fn attempts(&self) -> usize {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }
}

/// Run `operation` until it succeeds, attempts run out, or `cancel` fires.
///
/// An attempt that outlives `config.attempt_timeout` becomes `E::from(Elapsed)`
/// and feeds the backoff sequence like any other failure.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + From<Elapsed>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("Operation '{}' cancelled before attempt {}", operation_name, attempts + 1);
            return Err(RetryError::Cancelled);
        }

        let result = match config.attempt_timeout {
            Some(limit) => timeout(limit, operation()).await.unwrap_or_else(|e| Err(E::from(e))),
            None => operation().await,
        };

        match result {
            Ok(val) => {
                crate::metrics::record_attempt(operation_name, "success");
                if cancel.is_cancelled() {
                    debug!("Operation '{}' succeeded after cancellation, discarding", operation_name);
                    return Err(RetryError::Cancelled);
                }
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                crate::metrics::record_attempt(operation_name, "error");
                attempts += 1;

                if attempts >= max_attempts {
                    warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Giving up.",
                        operation_name, attempts, max_attempts, err
                    );
                    return Err(RetryError::Exhausted { attempts, last: err });
                }

                let delay = config.backoff_delay(attempts - 1);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempts, max_attempts, err, delay
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        debug!("Operation '{}' cancelled during backoff", operation_name);
                        return Err(RetryError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl From<Elapsed> for TestError {
        fn from(_: Elapsed) -> Self {
            TestError("timed out".to_string())
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, RetryError<TestError>> = retry(
            "test_op",
            &RetryConfig::test(),
            &CancellationToken::new(),
            || async { Ok(42) },
        ).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, RetryError<TestError>> = retry(
            "test_op",
            &RetryConfig::test(),
            &CancellationToken::new(),
            || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            },
        ).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, RetryError<TestError>> = retry(
            "test_op",
            &RetryConfig::test(),
            &CancellationToken::new(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fail".to_string()))
                }
            },
        ).await;

        match result {
            Err(RetryError::Exhausted { attempts: n, last }) => {
                assert_eq!(n, 3);
                assert!(last.0.contains("always fail"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let config = RetryConfig::snapshot();
        let start = tokio::time::Instant::now();

        let result: Result<(), RetryError<TestError>> = retry(
            "test_op",
            &config,
            &CancellationToken::new(),
            || async { Err(TestError("down".to_string())) },
        ).await;

        assert_eq!(result.unwrap_err().attempts(), 3);
        // 1s + 2s between three attempts, nothing after the last one
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            attempt_timeout: Some(Duration::from_secs(1)),
        };
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), RetryError<TestError>> = retry(
            "test_op",
            &config,
            &CancellationToken::new(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<()>().await;
                    Ok(())
                }
            },
        ).await;

        match result {
            Err(RetryError::Exhausted { attempts: n, last }) => {
                assert_eq!(n, 2);
                assert_eq!(last.0, "timed out");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let config = RetryConfig::snapshot();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                retry("test_op", &config, &cancel, || {
                    let a = attempts_clone.clone();
                    async move {
                        a.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(TestError("down".to_string()))
                    }
                })
                .await
            })
        };

        // First attempt fails immediately, then the task sleeps 1s
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = AtomicUsize::new(0);

        let result: Result<(), RetryError<TestError>> =
            retry("test_op", &RetryConfig::test(), &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retry_config_presets() {
        let snapshot = RetryConfig::snapshot();
        assert_eq!(snapshot.max_retries, 3);
        assert_eq!(snapshot.initial_delay, Duration::from_secs(1));
        assert_eq!(snapshot.max_delay, Duration::from_secs(8));

        let query = RetryConfig::query();
        assert_eq!(query.max_retries, 3);
        assert!(query.initial_delay < snapshot.initial_delay);

        assert_eq!(RetryConfig::default(), snapshot);
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let config = RetryConfig::snapshot();

        assert_eq!(config.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 10.0, // Aggressive factor
            max_retries: 5,
            attempt_timeout: None,
        };

        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        // Overflowing exponents still cap instead of panicking
        assert_eq!(config.backoff_delay(10_000), Duration::from_secs(5));
    }
}
