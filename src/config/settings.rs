use crate::api::{RateLimitConfig, RetryPolicy};
use crate::cache::{CacheSettings, CacheTtls};
use crate::config::feeds::FeedRegistry;
use crate::error::{MarketDataError, Result};
use crate::providers::Provider;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TRACKED_COINS: &[&str] = &[
    "bitcoin",
    "ethereum",
    "solana",
    "cardano",
    "polkadot",
    "avalanche-2",
    "polygon",
    "chainlink",
    "uniswap",
    "cosmos",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub redis_password: Option<String>,
    pub redis_enabled: bool,
    pub redis_connect_timeout_secs: u64,
    pub cache_ttl_prices: u64,
    pub cache_ttl_historical: u64,
    pub cache_ttl_ai_insights: u64,
    pub cache_ttl_news: u64,
    pub cache_ttl_models: u64,
    pub cache_stale_retention_secs: u64,
    pub cache_max_local_entries: usize,
    pub coingecko_rate_limit: u32,
    pub pyth_rate_limit: u32,
    pub pyth_min_interval_ms: u64,
    pub coingecko_api_url: String,
    pub coingecko_api_key: Option<String>,
    pub pyth_api_url: String,
    pub http_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub api_provider: String,
    pub tracked_coins: Vec<String>,
    pub feed_registry_path: Option<String>,
    pub log_level: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            redis_port: env_or("REDIS_PORT", 6379),
            redis_db: env_or("REDIS_DB", 0),
            redis_password: env_opt("REDIS_PASSWORD"),
            redis_enabled: env_or("REDIS_ENABLED", true),
            redis_connect_timeout_secs: env_or("REDIS_CONNECT_TIMEOUT_SECS", 5),
            cache_ttl_prices: env_or("CACHE_TTL_PRICES", 120),
            cache_ttl_historical: env_or("CACHE_TTL_HISTORICAL", 3600),
            cache_ttl_ai_insights: env_or("CACHE_TTL_AI_INSIGHTS", 900),
            cache_ttl_news: env_or("CACHE_TTL_NEWS", 1800),
            cache_ttl_models: env_or("CACHE_TTL_MODELS", 86400),
            cache_stale_retention_secs: env_or("CACHE_STALE_RETENTION_SECS", 86400),
            cache_max_local_entries: env_or("CACHE_MAX_LOCAL_ENTRIES", 10_000),
            coingecko_rate_limit: env_or("COINGECKO_RATE_LIMIT", 50),
            pyth_rate_limit: env_or("PYTH_RATE_LIMIT", 600),
            pyth_min_interval_ms: env_or("PYTH_MIN_INTERVAL_MS", 100),
            coingecko_api_url: env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            coingecko_api_key: env_opt("COINGECKO_API_KEY"),
            pyth_api_url: env::var("PYTH_API_URL")
                .unwrap_or_else(|_| "https://hermes.pyth.network".to_string()),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 10),
            retry_attempts: env_or("RETRY_ATTEMPTS", 3),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 2000),
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", 30_000),
            api_provider: env::var("API_PROVIDER").unwrap_or_else(|_| "pyth".to_string()),
            tracked_coins: env_opt("TRACKED_COINS")
                .map(|s| parse_list(&s))
                .unwrap_or_else(|| DEFAULT_TRACKED_COINS.iter().map(|s| s.to_string()).collect()),
            feed_registry_path: env_opt("FEED_REGISTRY_PATH"),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        }
    }

    /// Defaults without touching the environment; Redis disabled.
    pub fn test_default() -> Self {
        Config {
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
            redis_enabled: false,
            redis_connect_timeout_secs: 1,
            cache_ttl_prices: 120,
            cache_ttl_historical: 3600,
            cache_ttl_ai_insights: 900,
            cache_ttl_news: 1800,
            cache_ttl_models: 86400,
            cache_stale_retention_secs: 86400,
            cache_max_local_entries: 1000,
            coingecko_rate_limit: 50,
            pyth_rate_limit: 600,
            pyth_min_interval_ms: 100,
            coingecko_api_url: "http://coingecko.test/api/v3".to_string(),
            coingecko_api_key: None,
            pyth_api_url: "http://hermes.test".to_string(),
            http_timeout_secs: 10,
            retry_attempts: 3,
            retry_base_delay_ms: 2000,
            retry_max_delay_ms: 30_000,
            api_provider: "pyth".to_string(),
            tracked_coins: DEFAULT_TRACKED_COINS.iter().map(|s| s.to_string()).collect(),
            feed_registry_path: None,
            log_level: "INFO".to_string(),
        }
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }

    pub fn primary_provider(&self) -> Result<Provider> {
        self.api_provider.parse()
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            prices: Duration::from_secs(self.cache_ttl_prices),
            historical: Duration::from_secs(self.cache_ttl_historical),
            ai_insights: Duration::from_secs(self.cache_ttl_ai_insights),
            news: Duration::from_secs(self.cache_ttl_news),
            models: Duration::from_secs(self.cache_ttl_models),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            redis_url: self.redis_enabled.then(|| self.redis_url()),
            connect_timeout: Duration::from_secs(self.redis_connect_timeout_secs),
            stale_retention: Duration::from_secs(self.cache_stale_retention_secs),
            max_local_entries: self.cache_max_local_entries,
        }
    }

    /// Published per-minute quotas, one window per provider.
    pub fn rate_limit_config(&self, provider: Provider) -> RateLimitConfig {
        match provider {
            Provider::CoinGecko => RateLimitConfig {
                max_requests: self.coingecko_rate_limit,
                window_secs: 60,
                min_interval_ms: 0,
                max_backoff_secs: 300,
            },
            Provider::Pyth => RateLimitConfig {
                max_requests: self.pyth_rate_limit,
                window_secs: 60,
                min_interval_ms: self.pyth_min_interval_ms,
                max_backoff_secs: 120,
            },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn validate(&self, registry: &FeedRegistry) -> Result<()> {
        let ttls = [
            ("CACHE_TTL_PRICES", self.cache_ttl_prices),
            ("CACHE_TTL_HISTORICAL", self.cache_ttl_historical),
            ("CACHE_TTL_AI_INSIGHTS", self.cache_ttl_ai_insights),
            ("CACHE_TTL_NEWS", self.cache_ttl_news),
            ("CACHE_TTL_MODELS", self.cache_ttl_models),
        ];
        for (name, value) in ttls {
            if value == 0 {
                return Err(MarketDataError::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.coingecko_rate_limit == 0 || self.pyth_rate_limit == 0 {
            return Err(MarketDataError::Config(
                "rate limits must be greater than 0".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(MarketDataError::Config("RETRY_ATTEMPTS must be at least 1".to_string()));
        }
        if self.cache_max_local_entries == 0 {
            return Err(MarketDataError::Config(
                "CACHE_MAX_LOCAL_ENTRIES must be greater than 0".to_string(),
            ));
        }
        self.primary_provider()?;
        for coin in &self.tracked_coins {
            if registry.record(coin).is_none() {
                return Err(MarketDataError::Config(format!(
                    "tracked coin '{}' is not in feed registry v{}",
                    coin,
                    registry.version()
                )));
            }
        }
        Ok(())
    }

    pub fn validate_and_log(&self, registry: &FeedRegistry) -> Result<()> {
        self.validate(registry)?;
        log::info!(
            "Application Configuration Loaded: provider={}, redis={}, ttl(prices={}s, historical={}s), limits(coingecko={}/min, pyth={}/min), tracked={:?}",
            self.api_provider,
            if self.redis_enabled { format!("{}:{}", self.redis_host, self.redis_port) } else { "disabled".to_string() },
            self.cache_ttl_prices,
            self.cache_ttl_historical,
            self.coingecko_rate_limit,
            self.pyth_rate_limit,
            self.tracked_coins
        );
        Ok(())
    }
}
