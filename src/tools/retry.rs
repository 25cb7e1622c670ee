//! Retry manager with randomized exponential backoff
//!
//! Wraps model calls:
//! - Max attempts: 5
//! - Wait before attempt n+1: uniform in [3s, clamp(2^n s, 3s, 10s)]
//! - Only transient errors are retried

use crate::errors::{AgentError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum number of attempts
pub const MAX_RETRIES: u32 = 5;

/// Lower bound of every wait
const MIN_DELAY_MS: u64 = 3000;

/// Upper bound of every wait
const MAX_DELAY_MS: u64 = 10000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Maximum attempts, including the first
    max_retries: u32,

    /// Minimum delay in milliseconds
    min_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Draw the wait uniformly below the exponential bound
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            min_delay_ms: MIN_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_retries: u32, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            min_delay_ms,
            max_delay_ms: max_delay_ms.max(min_delay_ms),
            enable_jitter: true,
        }
    }

    /// Execute operation with retry logic
    pub async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !self.is_retryable(&e) {
                        return Err(e);
                    }

                    attempt += 1;

                    if attempt >= self.max_retries {
                        return Err(AgentError::ModelApiError(format!(
                            "Max retries exceeded after {} attempts: {}",
                            attempt, e
                        )));
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after transient error");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Exponential bound for the given attempt, clamped to [min, max]
    fn upper_bound_ms(&self, attempt: u32) -> u64 {
        let exponential = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
        exponential.clamp(self.min_delay_ms, self.max_delay_ms)
    }

    /// Calculate delay for given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let upper = self.upper_bound_ms(attempt);

        let delay_ms = if self.enable_jitter && upper > self.min_delay_ms {
            let span = (upper - self.min_delay_ms) as f64;
            self.min_delay_ms + (rand::random::<f64>() * span) as u64
        } else {
            upper
        };

        Duration::from_millis(delay_ms)
    }

    /// Check if error is retryable
    fn is_retryable(&self, error: &AgentError) -> bool {
        match error {
            // Retryable errors (transient)
            AgentError::Timeout { .. } => true,
            AgentError::HttpError(_) => true,
            AgentError::ModelApiError(_) => true,
            AgentError::Generic(_) => true,

            // Non-retryable errors (permanent)
            AgentError::InvalidTransition { .. } => false,
            AgentError::SerializationError(_) => false,
            AgentError::ConfigError(_) => false,
            AgentError::Cancelled => false,

            _ => false,
        }
    }

    /// Get max retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
