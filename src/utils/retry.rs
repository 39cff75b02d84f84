use std::time::Duration;
use log::{warn, info, debug};

use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Re-runs `operation` while it fails with a transient error.
/// Non-transient errors are returned immediately.
pub async fn retry_with_exponential_backoff<T, F, Fut>(
    config: &RetryConfig,
    operation: F,
) -> AppResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = AppResult<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut delay = config.base_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts && e.is_transient() => {
                debug!("Attempt {} failed transiently, retrying in {:?}: {}", attempt, delay, e);
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(
                    Duration::from_millis((delay.as_millis() as f64 * config.backoff_multiplier) as u64),
                    config.max_delay,
                );
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    warn!("Operation failed after {} attempts: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_on_second_attempt() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::default();
        let attempt_count_clone = attempt_count.clone();

        let result = retry_with_exponential_backoff(&config, || {
            let count_clone = attempt_count_clone.clone();
            async move {
                let count = count_clone.fetch_add(1, Ordering::SeqCst);
                if count == 0 {
                    Err(AppError::server(503, "Service Unavailable (503)"))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_non_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::default();
        let attempt_count_clone = attempt_count.clone();

        let result: AppResult<&str> = retry_with_exponential_backoff(&config, || {
            let count_clone = attempt_count_clone.clone();
            async move {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Err(AppError::server(401, "Unauthorized"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let config = RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        };
        let attempt_count_clone = attempt_count.clone();

        let result: AppResult<()> = retry_with_exponential_backoff(&config, || {
            let count_clone = attempt_count_clone.clone();
            async move {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Err(AppError::server(502, "Bad Gateway (502)"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }
}
