//! Tiered cache: Redis when reachable, in-process map otherwise.
//!
//! A [`CacheStore`] that loses Redis (at startup or on any later call) flips
//! into degraded mode for the rest of its life and keeps serving from the local
//! backend. Callers never see cache-backend errors.

pub mod backend;
pub mod memory;
pub mod redis_backend;

pub use backend::{glob_match, CacheBackend, CacheEntry};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

use crate::error::{MarketDataError, Result};
use crate::utils::Clock;
use chrono::Duration as ChronoDuration;
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Data categories with their own freshness requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCategory {
    CurrentPrice,
    Historical,
    AiInsight,
    News,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtls {
    pub prices: Duration,
    pub historical: Duration,
    pub ai_insights: Duration,
    pub news: Duration,
    pub models: Duration,
}

impl CacheTtls {
    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        match category {
            DataCategory::CurrentPrice => self.prices,
            DataCategory::Historical => self.historical,
            DataCategory::AiInsight => self.ai_insights,
            DataCategory::News => self.news,
            DataCategory::Model => self.models,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            prices: Duration::from_secs(120),
            historical: Duration::from_secs(3600),
            ai_insights: Duration::from_secs(900),
            news: Duration::from_secs(1800),
            models: Duration::from_secs(86400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// `None` runs local-only without counting as degraded
    pub redis_url: Option<String>,
    pub connect_timeout: Duration,
    /// How long past expiry an entry stays available for stale-serve
    pub stale_retention: Duration,
    pub max_local_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            connect_timeout: Duration::from_secs(5),
            stale_retention: Duration::from_secs(86400),
            max_local_entries: 10_000,
        }
    }
}

/// Builds a cache key from an endpoint and its parameters, independent of parameter order.
pub fn cache_key(endpoint: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    sorted.sort();
    let mut key = endpoint.to_string();
    for (name, value) in sorted {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_requests: u64,
    /// Percentage, 0.0 - 100.0
    pub hit_rate: f64,
    pub degraded: bool,
    pub backend: String,
    pub local_entries: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cache[{}{}]: {} hits / {} misses ({:.2}%), {} errors, {} local entries",
            self.backend,
            if self.degraded { ", degraded" } else { "" },
            self.hits,
            self.misses,
            self.hit_rate,
            self.errors,
            self.local_entries
        )
    }
}

pub struct CacheStore {
    remote: Option<Arc<dyn CacheBackend>>,
    local: MemoryBackend,
    clock: Arc<dyn Clock>,
    stale_retention: Duration,
    degraded: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("degraded", &self.is_degraded())
            .field("local_entries", &self.local.len())
            .finish()
    }
}

impl CacheStore {
    fn build(
        remote: Option<Arc<dyn CacheBackend>>,
        degraded: bool,
        settings: &CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            local: MemoryBackend::new(settings.max_local_entries, clock.clone()),
            clock,
            stale_retention: settings.stale_retention,
            degraded: AtomicBool::new(degraded),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Connects to Redis if configured; an unreachable server yields a degraded store.
    pub async fn connect(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let Some(url) = settings.redis_url.as_deref() else {
            info!("Redis disabled, using in-memory cache");
            return Self::local_only(settings, clock);
        };
        match RedisBackend::connect(url, settings.connect_timeout).await {
            Ok(redis) => Self::build(Some(Arc::new(redis)), false, settings, clock),
            Err(e) => {
                warn!("Failed to connect to Redis: {}. Using in-memory cache as fallback.", e);
                Self::build(None, true, settings, clock)
            }
        }
    }

    pub fn local_only(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self::build(None, false, settings, clock)
    }

    /// Uses `remote` as the networked tier, degrading immediately if it does not answer a ping.
    pub async fn with_backend(
        remote: Arc<dyn CacheBackend>,
        settings: &CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        match remote.ping().await {
            Ok(()) => Self::build(Some(remote), false, settings, clock),
            Err(e) => {
                warn!("{} backend unreachable at startup: {}. Using in-memory cache.", remote.name(), e);
                Self::build(None, true, settings, clock)
            }
        }
    }

    fn active_remote(&self) -> Option<&Arc<dyn CacheBackend>> {
        if self.degraded.load(Ordering::Acquire) {
            None
        } else {
            self.remote.as_ref()
        }
    }

    fn degrade(&self, op: &str, err: &MarketDataError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!("Redis {} failed ({}). Switching to in-memory cache for this session.", op, err);
        }
    }

    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        if let Some(remote) = self.active_remote() {
            match remote.get(key).await {
                Ok(found) => return found,
                Err(e) => self.degrade("get", &e),
            }
        }
        // Local backend is infallible
        self.local.get(key).await.ok().flatten()
    }

    /// Fresh value for `key`, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = self.clock.now();
        match self.lookup(key).await {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache HIT for key: {}", key);
                Some(entry.value)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache MISS for key: {}", key);
                None
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Failed to deserialize cached value for key {}: {}", key, e);
                self.errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Entry for `key` even if logically expired, as long as it is still retained.
    /// Does not count toward hit/miss statistics.
    pub async fn get_stale(&self, key: &str) -> Option<CacheEntry> {
        self.lookup(key).await
    }

    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at: now,
            expires_at: now + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::zero()),
        };
        let retain_for = ttl + self.stale_retention;

        if let Some(remote) = self.active_remote() {
            match remote.set(&entry, retain_for).await {
                Ok(()) => return,
                Err(e) => self.degrade("set", &e),
            }
        }
        let _ = self.local.set(&entry, retain_for).await;
        debug!("Cached {} locally for {:?}", key, ttl);
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| MarketDataError::Cache(format!("serialize {}: {}", key, e)))?;
        self.set(key, json, ttl).await;
        Ok(())
    }

    /// Forces the next `get` for `key` to miss.
    pub async fn invalidate(&self, key: &str) {
        if let Some(remote) = self.active_remote() {
            if let Err(e) = remote.delete(key).await {
                self.degrade("delete", &e);
            }
        }
        let _ = self.local.delete(key).await;
        debug!("Invalidated cache key: {}", key);
    }

    /// Clears keys matching `pattern` (`*` glob), or everything.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        let mut removed = 0;
        if let Some(remote) = self.active_remote() {
            match remote.clear(pattern).await {
                Ok(n) => removed += n,
                Err(e) => self.degrade("clear", &e),
            }
        }
        removed += self.local.clear(pattern).await.unwrap_or(0);
        info!(
            "Cache cleared{} ({} entries)",
            pattern.map(|p| format!(" with pattern: {}", p)).unwrap_or_default(),
            removed
        );
        removed
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// True when Redis is configured, not degraded, and answers a ping
    pub async fn is_connected(&self) -> bool {
        match self.active_remote() {
            Some(remote) => remote.ping().await.is_ok(),
            None => false,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.active_remote().map(|r| r.name()).unwrap_or("memory")
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            hits as f64 / total_requests as f64 * 100.0
        };
        CacheStats {
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            total_requests,
            hit_rate,
            degraded: self.is_degraded(),
            backend: self.backend_name().to_string(),
            local_entries: self.local.len(),
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Stands in for a Redis server that has gone away
    struct UnreachableBackend;

    #[async_trait]
    impl CacheBackend for UnreachableBackend {
        fn name(&self) -> &'static str {
            "redis"
        }
        async fn ping(&self) -> Result<()> {
            Err(MarketDataError::Cache("connection refused".into()))
        }
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Err(MarketDataError::Cache("connection refused".into()))
        }
        async fn set(&self, _entry: &CacheEntry, _retain_for: Duration) -> Result<()> {
            Err(MarketDataError::Cache("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(MarketDataError::Cache("connection refused".into()))
        }
        async fn clear(&self, _pattern: Option<&str>) -> Result<usize> {
            Err(MarketDataError::Cache("connection refused".into()))
        }
    }

    /// Answers the startup ping, then fails every call
    struct FlakyBackend;

    #[async_trait]
    impl CacheBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "redis"
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Err(MarketDataError::Cache("broken pipe".into()))
        }
        async fn set(&self, _entry: &CacheEntry, _retain_for: Duration) -> Result<()> {
            Err(MarketDataError::Cache("broken pipe".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(MarketDataError::Cache("broken pipe".into()))
        }
        async fn clear(&self, _pattern: Option<&str>) -> Result<usize> {
            Err(MarketDataError::Cache("broken pipe".into()))
        }
    }

    fn store(clock: Arc<ManualClock>) -> CacheStore {
        CacheStore::local_only(&CacheSettings::default(), clock)
    }

    #[test]
    fn test_cache_key_ignores_param_order() {
        let a = cache_key("history", &[("coin", "bitcoin".into()), ("days", "30".into())]);
        let b = cache_key("history", &[("days", "30".into()), ("coin", "bitcoin".into())]);
        assert_eq!(a, b);
        assert_eq!(a, "history:coin=bitcoin:days=30");
    }

    #[tokio::test]
    async fn test_get_returns_value_until_ttl_elapses() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(clock.clone());
        cache.set("k", json!(42), Duration::from_secs(120)).await;

        for _ in 0..3 {
            assert_eq!(cache.get("k").await, Some(json!(42)));
            clock.advance(Duration::from_secs(39));
        }
        // 117s elapsed
        assert_eq!(cache.get("k").await, Some(json!(42)));
        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.get("k").await, None);
        clock.advance(Duration::from_secs(600));
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_resets_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(clock.clone());
        cache.set("k", json!("old"), Duration::from_secs(10)).await;
        clock.advance(Duration::from_secs(8));
        cache.set("k", json!("new"), Duration::from_secs(10)).await;
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k").await, Some(json!("new")));
    }

    #[tokio::test]
    async fn test_invalidate_forces_miss() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(clock);
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_available_as_stale() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(clock.clone());
        cache.set("k", json!({"price": 1.5}), Duration::from_secs(60)).await;
        clock.advance(Duration::from_secs(61));

        assert_eq!(cache.get("k").await, None);
        let stale = cache.get_stale("k").await.unwrap();
        assert!(stale.is_expired(clock.now()));
        assert_eq!(stale.value, json!({"price": 1.5}));
    }

    #[tokio::test]
    async fn test_stats_hit_rate() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(clock);
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.get("k").await;
        cache.get("k").await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.hit_rate, 75.0);
        assert!(!stats.degraded);

        cache.reset_stats();
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_local() {
        let clock = Arc::new(ManualClock::default());
        let cache =
            CacheStore::with_backend(Arc::new(UnreachableBackend), &CacheSettings::default(), clock)
                .await;

        cache.set("k", json!("v"), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(json!("v")));

        let stats = cache.stats();
        assert!(stats.degraded);
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.local_entries, 1);
        assert!(!cache.is_connected().await);
    }

    #[tokio::test]
    async fn test_backend_failure_mid_session_degrades() {
        let clock = Arc::new(ManualClock::default());
        let cache =
            CacheStore::with_backend(Arc::new(FlakyBackend), &CacheSettings::default(), clock).await;
        assert!(!cache.is_degraded());
        assert_eq!(cache.backend_name(), "redis");

        cache.set("k", json!("v"), Duration::from_secs(60)).await;
        assert!(cache.is_degraded());
        assert_eq!(cache.get("k").await, Some(json!("v")));
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_json_round_trip_through_store() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Point {
            x: f64,
        }
        let clock = Arc::new(ManualClock::default());
        let cache = store(clock);
        cache.set_json("p", &Point { x: 2.5 }, Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get_json::<Point>("p").await, Some(Point { x: 2.5 }));
        // Wrong shape counts as a miss, not a panic
        assert_eq!(cache.get_json::<Vec<u8>>("p").await, None);
    }
}
