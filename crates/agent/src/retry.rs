//! Retry policy for transient provider overload.
//!
//! Overloaded-class errors get up to a fixed number of retries with
//! linearly increasing backoff. All other errors propagate immediately.

use std::time::Duration;

use inklore_core::error::ProviderError;
use tracing::warn;

/// Overload retry policy: attempt n waits `n * backoff_base`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Run `op`, retrying on overloaded-class errors per the policy.
pub async fn with_overload_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> std::result::Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_overloaded() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff_base * attempt;
                warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Provider overloaded, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
