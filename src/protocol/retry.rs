//! HTTP retry logic with exponential backoff
//!
//! Only idempotent reads go through here. A transaction is submitted exactly
//! once; its confirmation is what gets polled.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum delay between retries
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Base delay for exponential backoff
const BASE_DELAY: Duration = Duration::from_millis(100);

/// Maximum number of retry attempts
const MAX_ATTEMPTS: usize = 10;

/// Retry policy for RPC reads
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom parameters
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Number of attempts before giving up
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if should_retry(&e) && attempt < self.max_attempts => {
                    warn!(
                        "Operation failed on attempt {}: {}. Retrying in {:?}...",
                        attempt, e, delay
                    );

                    // Jitter spreads out clients that failed together
                    let jitter = delay.as_millis() as f64 * 0.1 * (rand::random::<f64>() - 0.5);
                    let actual_delay = delay + Duration::from_millis(jitter.abs() as u64);

                    tokio::time::sleep(actual_delay).await;

                    delay = std::cmp::min(delay * 2, self.max_delay);
                    attempt += 1;
                }
                Err(e) => {
                    if attempt == self.max_attempts && self.max_attempts > 1 {
                        warn!("Operation failed after {} attempts: {}", attempt, e);
                    } else {
                        debug!("Non-retryable error: {}", e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Determine if an error should trigger a retry
pub fn should_retry(error: &Error) -> bool {
    let lower_msg = error.to_string().to_lowercase();

    match error {
        Error::Network(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status().is_some_and(|s| s.is_server_error())
                || transient_message(&lower_msg)
        }
        Error::Timeout(_) => true,
        Error::Io(_) => {
            lower_msg.contains("timeout")
                || lower_msg.contains("connection")
                || lower_msg.contains("broken pipe")
        }
        Error::Rpc { .. } => {
            lower_msg.contains("timeout")
                || lower_msg.contains("busy")
                || lower_msg.contains("unavailable")
        }
        Error::Other(_) => transient_message(&lower_msg),
        Error::OutOfRange { .. }
        | Error::MalformedInput(_)
        | Error::Config(_)
        | Error::Json(_)
        | Error::Abi(_)
        | Error::TransactionFailed(_) => false,
    }
}

fn transient_message(lower_msg: &str) -> bool {
    lower_msg.contains("timeout")
        || lower_msg.contains("connection")
        || lower_msg.contains("server error")
        || ["502", "503", "504"].iter().any(|code| lower_msg.contains(code))
}
