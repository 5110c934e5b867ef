// src/api/retry.rs
//! Bounded retry with exponential backoff for upstream calls.

use crate::error::{MarketDataError, Result};
use log::{info, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upward jitter as a fraction of the computed delay, 0.0 - 1.0
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(30))
    }
}

/// Handed to the operation on every attempt
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// 1-based
    pub attempt: u32,
    pub last_error: Option<MarketDataError>,
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: MarketDataError },
    NonRetryable { attempts: u32, error: MarketDataError },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::NonRetryable { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
            RetryOutcome::NonRetryable { error, .. } => Err(error),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_percent: 0.1,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: f64) -> Self {
        self.jitter_percent = jitter_percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry_index` (0 for the first retry):
    /// `base * 2^retry_index`, jittered upward, then capped at `max_delay`.
    pub fn delay_for_attempt(&self, retry_index: u32) -> Duration {
        let exponential =
            self.base_delay.as_millis() as f64 * 2_f64.powi(retry_index.min(31) as i32);
        let jittered = if self.jitter_percent > 0.0 {
            exponential * (1.0 + rand::thread_rng().gen_range(0.0..self.jitter_percent))
        } else {
            exponential
        };
        Duration::from_millis(jittered.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// A server Retry-After hint wins over the computed delay.
    pub fn backoff_for(&self, retry_index: u32, error: &MarketDataError) -> Duration {
        error
            .retry_after()
            .unwrap_or_else(|| self.delay_for_attempt(retry_index))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` calls have been made. Only sleeps between attempts.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(RetryContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error: Option<MarketDataError> = None;
        let mut attempt = 1;

        loop {
            let context = RetryContext {
                attempt,
                last_error: last_error.clone(),
            };
            let error = match operation(context).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("✅ {} succeeded on attempt {}", operation_name, attempt);
                    }
                    return RetryOutcome::Success { value, attempts: attempt };
                }
                Err(e) => e,
            };

            if !error.should_retry() {
                warn!("❌ {} failed with non-retryable error: {}", operation_name, error);
                return RetryOutcome::NonRetryable { attempts: attempt, error };
            }
            if attempt >= self.max_attempts {
                warn!(
                    "❌ {} failed after {} attempts: {}",
                    operation_name, attempt, error
                );
                return RetryOutcome::Exhausted { attempts: attempt, last_error: error };
            }
            if let Some(hint) = error.retry_after() {
                if hint > self.max_delay {
                    warn!(
                        "❌ {} asked to wait {:?} (limit {:?}), giving up",
                        operation_name, hint, self.max_delay
                    );
                    return RetryOutcome::Exhausted { attempts: attempt, last_error: error };
                }
            }

            let delay = self.backoff_for(attempt - 1, &error);
            warn!(
                "⚠️ {} attempt {}/{} failed: {}. Retrying in {:?}",
                operation_name, attempt, self.max_attempts, error, delay
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
            attempt += 1;
        }
    }
}
