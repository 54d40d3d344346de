use std::future::Future;
use tracing::warn;

pub const RETRY_INITIAL_DELAY_MS: u64 = 2_000;
pub const RETRY_BACKOFF_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: RETRY_INITIAL_DELAY_MS,
            backoff_factor: RETRY_BACKOFF_FACTOR,
            max_delay_ms: RETRY_MAX_DELAY_MS,
        }
    }
}

/// Implement this on error types so the retry helper knows whether to retry.
/// Return `Some(message)` when the error is retryable, `None` otherwise.
pub trait IsRetryable {
    fn is_retryable(&self) -> Option<String>;
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> u64 {
    let exp = config
        .backoff_factor
        .saturating_pow(attempt.saturating_sub(1));
    config
        .initial_delay_ms
        .saturating_mul(exp)
        .min(config.max_delay_ms)
}

/// Retry an async operation up to `config.max_attempts` times with
/// exponential backoff. Non-retryable errors return immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = e.is_retryable();
                match retryable {
                    Some(reason) if attempt < config.max_attempts => {
                        let delay = backoff_delay(config, attempt);
                        warn!(attempt, delay_ms = delay, reason = %reason, "retrying model call");
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    }
                    _ => return Err(e),
                }
            }
        }
    }
}
