//! Retry policy for transient failures.
//!
//! One policy drives every retried operation in the system, so backoff
//! behavior is uniform whether the caller is pushing a chunk, finalizing a
//! session, or probing a flaky backend.

use std::future::Future;
use std::time::Duration;

/// Linear-backoff retry schedule.
///
/// An operation gets `max_attempts` tries in total. After the n-th failed
/// attempt the caller waits `base_delay * n`, capped at `max_delay`, before
/// trying again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `completed_attempts` failed attempts.
    pub fn delay_for(&self, completed_attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(completed_attempts)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Errors for which
    /// `is_retryable` returns false are returned immediately; retryable
    /// errors are returned once the final attempt has failed.
    pub async fn run<T, E, F, Fut, R>(&self, is_retryable: R, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeError {
        retryable: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error (retryable: {})", self.retryable)
        }
    }

    #[test]
    fn test_delay_grows_linearly_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5)); // Capped
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, FakeError> = RetryPolicy::default()
            .run(
                |e: &FakeError| e.retryable,
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(attempt) }
                },
            )
            .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success() {
        let start = tokio::time::Instant::now();
        let result: Result<u32, FakeError> = RetryPolicy::default()
            .run(
                |e: &FakeError| e.retryable,
                |attempt| async move {
                    if attempt < 3 {
                        Err(FakeError { retryable: true })
                    } else {
                        Ok(attempt)
                    }
                },
            )
            .await;
        assert_eq!(result.unwrap(), 3);
        // Two backoffs: 1s after the first failure, 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> = RetryPolicy::default()
            .run(
                |e: &FakeError| e.retryable,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(FakeError { retryable: true }) }
                },
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> = RetryPolicy::default()
            .run(
                |e: &FakeError| e.retryable,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(FakeError { retryable: false }) }
                },
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
