//! Retry with exponential backoff for outbound calls.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DeliveryError, FetchError};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        FetchError::is_retryable(self)
    }
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        DeliveryError::is_retryable(self)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt; doubles after every failure
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to each wait
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// Backoff without jitter or meaningful waits, for tests.
    #[cfg(test)]
    pub fn immediate(attempts: u32) -> Self {
        RetryConfig {
            attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: Duration::ZERO,
        }
    }
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let ms = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// configured attempts are used up. The last error is returned.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: &str, mut f: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.attempts.max(1);
    let mut delay = config.base_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= attempts {
                    warn!("[Retry] {} gave up after {} attempt(s): {}", operation, attempt, err);
                    return Err(err);
                }
                let wait = delay + jitter(config.jitter);
                debug!(
                    "[Retry] {} attempt {}/{} failed ({}), retrying in {:?}",
                    operation, attempt, attempts, err, wait
                );
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
