use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first. Zero is treated as one.
    pub attempts: u32,

    /// Wait before the second try; doubled for every further try.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const ONCE: RetryPolicy = RetryPolicy {
        attempts: 1,
        base_delay: Duration::ZERO,
    };

    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX))
    }
}

/// Runs `op` until it succeeds or the policy's attempts are used up, returning the last error.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        sleep(policy.delay_before(attempt)).await;

        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < attempts => {
                warn!(attempt = attempt + 1, attempts, "{what} failed, retrying: {e}");
            }
            Err(e) => return Err(e),
        }

        attempt += 1;
    }
}
