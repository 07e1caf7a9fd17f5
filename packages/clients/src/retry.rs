use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;

/// Bounded retry schedule for upstream calls.
///
/// `tries` counts total attempts, so `tries: 1` disables retries. The delay
/// before attempt `n + 1` is `delay * backoff^(n - 1)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub tries: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub const fn new(tries: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            tries,
            delay,
            backoff,
        }
    }
}

/// Runs `call` until it succeeds, the error is not retryable, or the policy
/// is exhausted.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let tries = policy.tries.max(1);
    let mut delay = policy.delay;
    for attempt in 1..=tries {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < tries && err.is_retryable() => {
                tracing::warn!(
                    operation,
                    attempt,
                    tries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upstream call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.backoff);
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop always returns from its last attempt")
}
