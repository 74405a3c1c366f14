use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Failure types that a bounded-retry wrapper can reason about.
pub trait Retryable: Sized {
    /// Network or availability failures are transient; semantic answers are not.
    fn is_transient(&self) -> bool;
    /// The failure reported when a single attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Per-call timeout plus exponential backoff ceiling shared by every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self.base_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            max_retries: 3,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Run `call` under the policy's timeout, retrying transient failures with backoff.
///
/// A timed-out attempt counts as a transient failure. Once the retry ceiling is hit the
/// last failure is returned as-is.
pub async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retries = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.call_timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.backoff_delay(retries);
                warn!(
                    operation,
                    retry = retries,
                    error = %err,
                    "external call failed; retrying after {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
