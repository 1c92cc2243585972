//! Bounded retry with backoff for remote writes

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `base * n` before the n-th retry
    Linear,
    /// `base * 2^(n-1)` before the n-th retry
    #[default]
    Exponential,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    pub backoff: Backoff,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff: Backoff::Exponential,
            jitter: false,
        }
    }
}

/// Errors that know whether another attempt could succeed
pub trait RetryableError: std::error::Error + Send + Sync {
    /// Check if this specific error instance should be retried
    fn is_retriable(&self) -> bool;
}

impl RetryableError for crate::SyncError {
    fn is_retriable(&self) -> bool {
        self.is_retryable()
    }
}

/// A successful result plus the number of retries it took
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

/// Runs operations under a [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation, retrying retriable errors until the attempt
    /// budget is spent. The last error is returned unchanged.
    pub async fn retry<F, T, E, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<Retried<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(Retried {
                        value,
                        retries: attempt - 1,
                    });
                }
                Err(error) if !error.is_retriable() => {
                    warn!(operation = operation_name, %error, "non-retriable failure");
                    return Err(error);
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        %error,
                        "giving up after exhausting attempts"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        %error,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms;
        let step = attempt.max(1);
        let millis = match self.config.backoff {
            Backoff::Linear => base.saturating_mul(u64::from(step)),
            Backoff::Exponential => base.saturating_mul(1u64 << (step - 1).min(32)),
        };
        let mut millis = millis.min(self.config.max_delay_ms);

        if self.config.jitter && millis > 0 {
            let extra = rand::rng().random_range(0..=millis / 4);
            millis = (millis + extra).min(self.config.max_delay_ms);
        }

        Duration::from_millis(millis)
    }
}

/// Retry `operation` up to `max_attempts` times with exponential backoff
/// starting at `base_delay`.
pub async fn with_retry<F, T, E, Fut>(
    operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let policy = RetryPolicy::new(RetryConfig {
        max_attempts,
        base_delay_ms: base_delay.as_millis() as u64,
        ..RetryConfig::default()
    });
    policy
        .retry("operation", operation)
        .await
        .map(|retried| retried.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Error, Debug, PartialEq, Clone)]
    enum TestError {
        #[error("Retriable error")]
        Retriable,
        #[error("Non-retriable error")]
        NonRetriable,
    }

    impl RetryableError for TestError {
        fn is_retriable(&self) -> bool {
            matches!(self, TestError::Retriable)
        }
    }

    struct TestOperation {
        attempts: AtomicU32,
        fail_attempts: u32,
        error_type: TestError,
    }

    impl TestOperation {
        fn new(fail_attempts: u32, error_type: TestError) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                fail_attempts,
                error_type,
            }
        }

        async fn execute(&self) -> Result<u32, TestError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

            if attempt < self.fail_attempts {
                Err(self.error_type.clone())
            } else {
                Ok(attempt + 1)
            }
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            backoff: Backoff::Linear,
            jitter: false,
        })
    }

    #[test_log::test(tokio::test)]
    async fn test_retry_success_eventually() {
        let operation = TestOperation::new(2, TestError::Retriable);

        let result = fast(3).retry("test", || operation.execute()).await.unwrap();

        assert_eq!(result.value, 3);
        assert_eq!(result.retries, 2);
        assert_eq!(operation.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retriable_error() {
        let operation = TestOperation::new(1, TestError::NonRetriable);

        let result = fast(5).retry("test", || operation.execute()).await;

        assert_eq!(result.unwrap_err(), TestError::NonRetriable);
        assert_eq!(operation.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_max_attempts_exceeded() {
        let operation = TestOperation::new(10, TestError::Retriable);

        let result = fast(3).retry("test", || operation.execute()).await;

        assert_eq!(result.unwrap_err(), TestError::Retriable);
        assert_eq!(operation.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_helper() {
        let operation = TestOperation::new(1, TestError::Retriable);

        let value = with_retry(|| operation.execute(), 3, Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(value, 2);
    }

    #[test]
    fn test_no_retry_policy_tries_once() {
        let operation = TestOperation::new(1, TestError::Retriable);

        let result = tokio_test::block_on(
            RetryPolicy::no_retry().retry("test", || operation.execute()),
        );

        assert!(result.is_err());
        assert_eq!(operation.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 200);
        assert_eq!(config.backoff, Backoff::Exponential);
        assert!(!config.jitter);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            ..Default::default()
        });

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1_000));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay_ms: 50,
            backoff: Backoff::Linear,
            ..Default::default()
        });

        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(3), Duration::from_millis(150));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter: true,
            ..Default::default()
        });

        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }
}
