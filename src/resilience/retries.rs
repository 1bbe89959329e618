//! Retry policy.
//!
//! Only errors that report themselves retryable are repeated. Everything else
//! (not found, contract rejections) returns on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::ScannerConfig;
use crate::error::EscrowResult;
use crate::resilience::backoff::Backoff;

/// Attempt budget plus delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_millis(200)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Fixed-delay policy used by the scanner.
    pub fn from_scanner_config(config: &ScannerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Backoff::Fixed(Duration::from_millis(config.retry_backoff_ms)),
        )
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> EscrowResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EscrowResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
