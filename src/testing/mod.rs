//! Test doubles for the upstream HTTP layer.
//!
//! Used by unit tests and by the integration tests under `tests/`.

pub mod mock_http;

pub use mock_http::MockHttpTransport;

use crate::api::{RateLimitConfig, RateLimiter, RateLimiterManager, RetryPolicy};
use crate::providers::Provider;
use once_cell::sync::Lazy;
use std::time::Duration;

static TEST_LOGGER: Lazy<()> = Lazy::new(|| {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
});

/// Routes `log` output through the test harness; safe to call from every test
pub fn init_test_logging() {
    Lazy::force(&TEST_LOGGER);
}

/// Limiters that never make a test wait
pub fn unlimited_rate_limiters() -> RateLimiterManager {
    let mut manager = RateLimiterManager::new();
    for provider in Provider::ALL {
        manager.add_limiter(RateLimiter::new(
            provider,
            RateLimitConfig {
                max_requests: 10_000,
                window_secs: 60,
                min_interval_ms: 0,
                max_backoff_secs: 1,
            },
        ));
    }
    manager
}

/// Three attempts, 10ms then 20ms, no jitter
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100)).with_jitter(0.0)
}
