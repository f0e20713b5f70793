//! Retry with exponential backoff for transient upstream failures.
//!
//! Retries:
//! - connection failures and per-attempt timeouts
//! - HTTP 5xx and 408
//!
//! Never retries fatal failures (other 4xx, malformed responses).

use std::future::Future;
use std::time::Duration;

use crate::error::UpstreamFailure;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// One try within a logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub index: u32,
    /// How long the policy slept before this attempt.
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Every attempt failed transiently; carries the last failure.
    Exhausted { attempts: u32, last: UpstreamFailure },
    /// A fatal failure stopped the sequence early.
    Fatal { attempts: u32, failure: UpstreamFailure },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn failure(&self) -> &UpstreamFailure {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { failure, .. } => failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before retry k is `base_delay * 2^k`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, base_delay: DEFAULT_BASE_DELAY }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Delay before the k-th retry (k starts at 1): 2s, 4s, 8s with the defaults.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The backoff delay is measured from the end of the failed attempt.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, UpstreamFailure>>,
    {
        let mut delay = Duration::ZERO;
        let mut index = 1;

        loop {
            match operation(RetryAttempt { index, delay }).await {
                Ok(value) => {
                    if index > 1 {
                        tracing::info!(attempt = index, "Upstream call succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(failure) if !failure.is_transient() => {
                    tracing::debug!(attempt = index, error = %failure, "Fatal failure, not retrying");
                    return Err(RetryError::Fatal { attempts: index, failure });
                }
                Err(failure) if index >= self.max_attempts() => {
                    tracing::error!(attempts = index, error = %failure, "All retry attempts exhausted");
                    return Err(RetryError::Exhausted { attempts: index, last: failure });
                }
                Err(failure) => {
                    delay = self.delay_for_retry(index);
                    tracing::warn!(
                        attempt = index,
                        max_attempts = self.max_attempts(),
                        ?delay,
                        error = %failure,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    index += 1;
                }
            }
        }
    }
}
