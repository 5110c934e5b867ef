//! Time sources and request timing
//!
//! Cache expiry is computed against a [`Clock`] so tests can move time forward
//! without sleeping. Rate limiting and retry backoff use `tokio::time` instead,
//! which tests control with `tokio::time::pause()`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, warn};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Wall-clock source used for cache expiration and quote timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += step;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A timer for measuring upstream call durations
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("⏱️ Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Finish with a warning if the operation took too long
    pub fn finish_with_threshold(self, threshold_ms: u64) -> Duration {
        let total_duration = self.start_time.elapsed();
        debug!(
            "🕐 {} completed in {}ms",
            self.operation_name,
            total_duration.as_millis()
        );
        if total_duration.as_millis() > threshold_ms as u128 {
            warn!(
                "⚠️ {} took {}ms (exceeds threshold of {}ms)",
                self.operation_name,
                total_duration.as_millis(),
                threshold_ms
            );
        }
        total_duration
    }
}
