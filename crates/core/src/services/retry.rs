//! Retry policy for store calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use votebot_common::config::StoreConfig;
use votebot_common::{AppError, AppResult};

/// Whether a store call reads or writes, which decides the error surfaced
/// once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAccess {
    /// Fetch or scan.
    Read,
    /// Any mutation.
    Write,
}

/// Fixed-delay retry for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Policy using the configured retry delay.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            delay: config.retry_delay(),
            ..Self::default()
        }
    }

    /// Check if a call that failed with `err` after `attempt` retries should
    /// run again.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, err: &AppError) -> bool {
        err.is_retryable() && attempt < self.max_retries
    }

    /// Wait out the fixed delay before a retry.
    pub async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }

    /// Run `call`, retrying on [`AppError::StoreUnavailable`].
    ///
    /// When retries run out the outage becomes [`AppError::StoreReadFailed`]
    /// or [`AppError::StoreWriteFailed`]. Every other error is returned as is.
    pub async fn run<T, F, Fut>(&self, op: &str, access: StoreAccess, mut call: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(attempt, &err) => {
                    warn!(op, attempt, error = %err, "Store call failed, retrying");
                    attempt += 1;
                    self.pause().await;
                }
                Err(AppError::StoreUnavailable(detail)) => {
                    let detail = format!("{op}: {detail}");
                    return Err(match access {
                        StoreAccess::Read => AppError::StoreReadFailed(detail),
                        StoreAccess::Write => AppError::StoreWriteFailed(detail),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
