//! Timeout and retry handling for directory calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DirectoryError, DirectoryResult};

/// Configuration for timeout and retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Deadline for a single attempt.
    pub operation_timeout: Duration,
    /// Maximum number of retry attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            max_retries: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Runs directory calls under a deadline, retrying transient failures with
/// exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with the given configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a new retry executor with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calculate delay for a given attempt (0-indexed).
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            // up to 25% jitter
            delay_ms * (1.0 + jitter_fraction() * 0.25)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Execute an operation with a per-attempt timeout and retries.
    ///
    /// An attempt that exceeds the deadline becomes
    /// [`DirectoryError::Timeout`] and is retried like any transient error.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> DirectoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.config.operation_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(DirectoryError::Timeout {
                    operation: operation_name.to_string(),
                    timeout_secs: self.config.operation_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.config.max_retries => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %e,
                        "Giving up after transient error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.calculate_delay(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pseudo-random value in `[0, 1)` for jitter. Not cryptographically secure.
fn jitter_fraction() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            operation_timeout: Duration::from_millis(50),
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let executor = RetryExecutor::with_defaults();
        let call_count = AtomicUsize::new(0);

        let result = executor
            .execute("disable", || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, DirectoryError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_error_once() {
        let executor = RetryExecutor::new(fast_config(1));
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();

        let result = executor
            .execute("add_to_group", move || {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Err(DirectoryError::unavailable("connection reset"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let executor = RetryExecutor::new(fast_config(1));
        let call_count = AtomicUsize::new(0);

        let result: DirectoryResult<()> = executor
            .execute("delete", || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err(DirectoryError::unavailable("down")) }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::Unavailable { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let executor = RetryExecutor::new(fast_config(3));
        let call_count = AtomicUsize::new(0);

        let result: DirectoryResult<()> = executor
            .execute("disable", || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err(DirectoryError::access_denied("krbtgt", "disable")) }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::AccessDenied { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_is_retried() {
        let executor = RetryExecutor::new(fast_config(1));
        let call_count = AtomicUsize::new(0);

        let result: DirectoryResult<()> = executor
            .execute("remove_from_group", || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        match result {
            Err(DirectoryError::Timeout { operation, .. }) => {
                assert_eq!(operation, "remove_from_group");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_calculate_delay_exponential_backoff() {
        let executor = RetryExecutor::new(RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: false,
            ..RetryConfig::default()
        });

        assert_eq!(executor.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(executor.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(executor.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_respects_max() {
        let executor = RetryExecutor::new(RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: false,
            ..RetryConfig::default()
        });

        assert_eq!(executor.calculate_delay(5), Duration::from_millis(500));
    }
}
