use std::future::Future;
use std::time::Duration;

use tracing::warn;

use dynpool_api::RegistryError;

use crate::config::RedisRegistryConfig;

/// Bounded retry for registry operations.
///
/// An operation runs at most `attempts + 1` times with `interval` between
/// tries. Only [`RegistryError::Unavailable`] is retried; a malformed payload
/// fails the same way every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub attempts: u32,
    /// Pause between tries.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_millis(1_000),
        }
    }
}

impl From<&RedisRegistryConfig> for RetryPolicy {
    fn from(config: &RedisRegistryConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            interval: config.retry_interval,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            attempts: 0,
            interval: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// # Arguments
    /// * `operation` - Name used in retry logs
    /// * `op` - Produces a fresh attempt each time it is called
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.attempts,
                        error = %err,
                        "registry operation failed, retrying"
                    );
                    if !self.interval.is_zero() {
                        tokio::time::sleep(self.interval).await;
                    }
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

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            interval: Duration::from_millis(1),
        };

        let result = policy
            .run("get", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RegistryError::Unavailable("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 2,
            interval: Duration::ZERO,
        };

        let result: Result<(), _> = policy
            .run("publish", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::Unavailable("down".into()))
            })
            .await;

        assert_eq!(result, Err(RegistryError::Unavailable("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_serialization_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run("get", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::Serialization("eof".into()))
            })
            .await;

        assert!(matches!(result, Err(RegistryError::Serialization(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
