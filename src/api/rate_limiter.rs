// src/api/rate_limiter.rs
//! Per-provider rate limiting
//!
//! Sliding-window log: a call is granted only if fewer than `max_requests`
//! calls were granted in the trailing `window`. Calls over the limit wait
//! cooperatively; nothing is dropped. A 429 from upstream puts the provider
//! into a backoff period on top of the window.

use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::providers::Provider;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Rate limit configuration for one API provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Minimum spacing between consecutive calls, 0 to disable
    pub min_interval_ms: u64,
    /// Cap for the exponential backoff after repeated 429s
    pub max_backoff_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn min_interval(&self) -> Option<Duration> {
        (self.min_interval_ms > 0).then(|| Duration::from_millis(self.min_interval_ms))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 50,
            window_secs: 60,
            min_interval_ms: 0,
            max_backoff_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Granted,
    MustWait(Duration),
}

#[derive(Debug, Default)]
struct LimiterState {
    dispatched: VecDeque<Instant>,
    last_dispatch: Option<Instant>,
    backoff_until: Option<Instant>,
    consecutive_rate_limits: u32,
    total_granted: u64,
    total_waits: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    provider: Provider,
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(provider: Provider, config: RateLimitConfig) -> Self {
        info!(
            "🚦 Initializing rate limiter for {}: {} req / {}s, min interval {}ms",
            provider, config.max_requests, config.window_secs, config.min_interval_ms
        );
        Self {
            provider,
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Grants and records a call, or reports how long to wait. Never blocks.
    pub async fn try_acquire(&self) -> RateLimitDecision {
        let now = Instant::now();
        let window = self.config.window();
        let mut state = self.state.lock().await;

        while let Some(front) = state.dispatched.front() {
            if now.duration_since(*front) >= window {
                state.dispatched.pop_front();
            } else {
                break;
            }
        }

        if let Some(until) = state.backoff_until {
            if now < until {
                return RateLimitDecision::MustWait(until - now);
            }
            state.backoff_until = None;
        }

        if let (Some(min), Some(last)) = (self.config.min_interval(), state.last_dispatch) {
            let since = now.duration_since(last);
            if since < min {
                return RateLimitDecision::MustWait(min - since);
            }
        }

        if state.dispatched.len() >= self.config.max_requests as usize {
            let wait = state
                .dispatched
                .front()
                .map(|front| (*front + window).saturating_duration_since(now))
                .unwrap_or(window);
            return RateLimitDecision::MustWait(wait);
        }

        state.dispatched.push_back(now);
        state.last_dispatch = Some(now);
        state.total_granted += 1;
        RateLimitDecision::Granted
    }

    /// Waits until a call is granted. Returns the total time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_acquire().await {
                RateLimitDecision::Granted => {
                    if !waited.is_zero() {
                        self.state.lock().await.total_waits += 1;
                    }
                    return waited;
                }
                RateLimitDecision::MustWait(delay) => {
                    debug!("⏳ {} rate limit reached, waiting {:?}", self.provider, delay);
                    sleep(delay).await;
                    waited += delay;
                }
            }
        }
    }

    /// Upstream answered 429: back off, preferring the server's hint.
    pub async fn penalize(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock().await;
        state.consecutive_rate_limits += 1;
        let computed = Duration::from_secs(
            2_u64
                .saturating_pow(state.consecutive_rate_limits)
                .min(self.config.max_backoff_secs),
        );
        let backoff = retry_after.unwrap_or(computed);
        state.backoff_until = Some(Instant::now() + backoff);
        warn!(
            "🚫 {} API rate limit hit! Consecutive hits: {}, backing off for {:?}",
            self.provider, state.consecutive_rate_limits, backoff
        );
    }

    /// Reset consecutive rate limit counter on successful requests
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.consecutive_rate_limits > 0 {
            debug!("✅ {} API rate limit counter reset", self.provider);
            state.consecutive_rate_limits = 0;
        }
    }

    pub async fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let window = self.config.window();
        let state = self.state.lock().await;
        RateLimitStats {
            provider: self.provider.to_string(),
            window_requests: state
                .dispatched
                .iter()
                .filter(|t| now.duration_since(**t) < window)
                .count() as u32,
            limit: self.config.max_requests,
            window_secs: self.config.window_secs,
            total_granted: state.total_granted,
            total_waits: state.total_waits,
            backoff_remaining: state
                .backoff_until
                .filter(|until| *until > now)
                .map(|until| until - now),
            consecutive_rate_limits: state.consecutive_rate_limits,
        }
    }
}

/// Rate limiting statistics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub provider: String,
    pub window_requests: u32,
    pub limit: u32,
    pub window_secs: u64,
    pub total_granted: u64,
    pub total_waits: u64,
    pub backoff_remaining: Option<Duration>,
    pub consecutive_rate_limits: u32,
}

impl std::fmt::Display for RateLimitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} API: {}/{} per {}s, granted:{}, waits:{}, backoff:{:?}",
            self.provider,
            self.window_requests,
            self.limit,
            self.window_secs,
            self.total_granted,
            self.total_waits,
            self.backoff_remaining
        )
    }
}

/// Rate limiters for all API providers
#[derive(Debug, Default)]
pub struct RateLimiterManager {
    limiters: HashMap<Provider, Arc<RateLimiter>>,
}

impl RateLimiterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut manager = Self::new();
        for provider in Provider::ALL {
            manager.add_limiter(RateLimiter::new(provider, config.rate_limit_config(provider)));
        }
        manager
    }

    pub fn add_limiter(&mut self, limiter: RateLimiter) {
        self.limiters.insert(limiter.provider(), Arc::new(limiter));
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<RateLimiter>> {
        self.limiters.get(&provider).cloned().ok_or_else(|| {
            MarketDataError::Config(format!("no rate limiter configured for {}", provider))
        })
    }

    pub async fn try_acquire(&self, provider: Provider) -> Result<RateLimitDecision> {
        Ok(self.get(provider)?.try_acquire().await)
    }

    pub async fn acquire(&self, provider: Provider) -> Result<Duration> {
        Ok(self.get(provider)?.acquire().await)
    }

    pub async fn all_stats(&self) -> Vec<RateLimitStats> {
        let mut stats = Vec::new();
        for provider in Provider::ALL {
            if let Some(limiter) = self.limiters.get(&provider) {
                stats.push(limiter.stats().await);
            }
        }
        stats
    }
}
