//! Retry policy and executor for upstream model calls.
//!
//! Adapted from `siumai`'s generic `RetryPolicy`/`RetryExecutor` pair, but
//! narrowed to the fixed schedule spec §6 requires for `ModelClient::invoke`:
//! 3 attempts total, exponential backoff 2s/4s/8s, with jitter.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::GatewayError;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(base_millis as u64);
        self.add_jitter(delay)
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        let millis = (delay.as_millis() as f64 + jitter).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

/// Executes an async operation under a `RetryPolicy`, retrying only errors
/// that report themselves as retryable.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                    if attempt + 1 == self.policy.max_attempts {
                        break;
                    }
                    let delay = self.policy.calculate_delay(attempt);
                    tracing::warn!(attempt, ?delay, "upstream call failed, retrying");
                    sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::UpstreamUnavailable("retry executor failed without error".to_string())
        }))
    }
}
