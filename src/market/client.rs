// src/market/client.rs
//! Market data client
//!
//! Every read follows the same path: cache → rate limiter → retry → provider
//! → write-through. Prices fall back to the secondary provider before giving
//! up, and any fetch that still fails is answered with the last cached value
//! (marked stale) when one exists.

use super::{Freshness, PriceBatch, Served};
use crate::api::{HttpTransport, RateLimitStats, RateLimiterManager, ReqwestTransport, RetryPolicy};
use crate::cache::{cache_key, CacheStats, CacheStore, CacheTtls};
use crate::config::{CoinRecord, Config, FeedRegistry};
use crate::error::{ErrorCategory, MarketDataError, Result};
use crate::providers::{
    CoinDetails, CoinGeckoClient, PriceHistory, PriceProvider, PriceQuote, Provider, PythClient, QuoteSource,
    TrendingCoin,
};
use crate::utils::{Clock, SystemClock};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_HISTORY_DAYS: u32 = 365;

pub fn price_key(coin_id: &str) -> String {
    cache_key("prices", &[("coin", coin_id.to_string())])
}

pub fn history_key(coin_id: &str, days: u32) -> String {
    cache_key("history", &[("coin", coin_id.to_string()), ("days", days.to_string())])
}

pub fn details_key(coin_id: &str) -> String {
    cache_key("details", &[("coin", coin_id.to_string())])
}

pub fn trending_key() -> String {
    cache_key("trending", &[])
}

/// A coin still waiting for a quote
struct PendingQuote {
    requested: String,
    record: CoinRecord,
    key: String,
}

pub struct MarketDataClient {
    cache: Arc<CacheStore>,
    limiters: Arc<RateLimiterManager>,
    retry: RetryPolicy,
    ttls: CacheTtls,
    registry: Arc<FeedRegistry>,
    primary: Provider,
    pyth: PythClient,
    coingecko: CoinGeckoClient,
    clock: Arc<dyn Clock>,
}

impl MarketDataClient {
    /// Production wiring: Redis (or its in-memory fallback), reqwest, system clock.
    pub async fn from_config(config: &Config, registry: Arc<FeedRegistry>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = CacheStore::connect(&config.cache_settings(), clock.clone()).await;
        let http = Arc::new(ReqwestTransport::new(config.http_timeout())?);
        Self::assemble(
            config,
            registry,
            http,
            Arc::new(cache),
            RateLimiterManager::from_config(config),
            clock,
        )
    }

    /// Wires the client from explicitly constructed parts.
    pub fn assemble(
        config: &Config,
        registry: Arc<FeedRegistry>,
        http: Arc<dyn HttpTransport>,
        cache: Arc<CacheStore>,
        limiters: RateLimiterManager,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let primary = config.primary_provider()?;
        let pyth = PythClient::new(http.clone(), &config.pyth_api_url, registry.clone());
        let coingecko = CoinGeckoClient::new(
            http,
            &config.coingecko_api_url,
            config.coingecko_api_key.clone(),
            registry.clone(),
            clock.clone(),
        );
        info!(
            "📡 Market data client ready: primary={}, fallback={}, cache={}",
            primary,
            primary.other(),
            cache.backend_name()
        );

        Ok(Self {
            cache,
            limiters: Arc::new(limiters),
            retry: config.retry_policy(),
            ttls: config.cache_ttls(),
            registry,
            primary,
            pyth,
            coingecko,
            clock,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    pub fn primary_provider(&self) -> Provider {
        self.primary
    }

    fn price_provider(&self, provider: Provider) -> &dyn PriceProvider {
        match provider {
            Provider::Pyth => &self.pyth,
            Provider::CoinGecko => &self.coingecko,
        }
    }

    /// One rate-limited, retried upstream call. Every attempt waits for the
    /// provider's limiter; a 429 also pushes the limiter into backoff.
    async fn call_upstream<T, F, Fut>(&self, provider: Provider, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limiter = self.limiters.get(provider)?;
        self.retry
            .execute(label, |_ctx| {
                let limiter = limiter.clone();
                let call = op();
                async move {
                    limiter.acquire().await;
                    let result = call.await;
                    match &result {
                        Ok(_) => limiter.record_success().await,
                        Err(e) if e.is_rate_limited() => limiter.penalize(e.retry_after()).await,
                        Err(_) => {}
                    }
                    result
                }
            })
            .await
            .into_result()
    }

    async fn write_through<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            warn!("Could not cache {}: {}", key, e);
        }
    }

    /// Last known value for `key` after a failed fetch, or `Unavailable`.
    async fn serve_stale<T: DeserializeOwned>(&self, key: &str, cause: MarketDataError) -> Result<Served<T>> {
        if let Some(entry) = self.cache.get_stale(key).await {
            match serde_json::from_value::<T>(entry.value.clone()) {
                // Written by a concurrent caller since our miss
                Ok(value) if !entry.is_expired(self.clock.now()) => return Ok(Served::cached(value)),
                Ok(value) => {
                    warn!(
                        "⚠️ Serving stale data for {} (expired {}): {}",
                        key, entry.expires_at, cause
                    );
                    return Ok(Served {
                        value,
                        freshness: Freshness::Stale {
                            stored_at: entry.stored_at,
                            expired_at: entry.expires_at,
                        },
                    });
                }
                Err(e) => warn!("Discarding unreadable stale entry {}: {}", key, e),
            }
        }
        error!("❌ No data available for {}: {}", key, cause);
        Err(MarketDataError::Unavailable {
            key: key.to_string(),
            reason: cause.to_string(),
        })
    }

    async fn cached_fetch<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        force_refresh: bool,
        provider: Provider,
        op: F,
    ) -> Result<Served<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !force_refresh {
            if let Some(value) = self.cache.get_json::<T>(key).await {
                return Ok(Served::cached(value));
            }
        }
        match self.call_upstream(provider, key, op).await {
            Ok(value) => {
                self.write_through(key, &value, ttl).await;
                Ok(Served::live(value))
            }
            Err(e) if e.categorize() == ErrorCategory::Configuration => Err(e),
            Err(e) => self.serve_stale(key, e).await,
        }
    }

    /// Current USD prices for `coins`. Each coin is answered independently:
    /// cached, live from the primary or fallback provider, stale, or failed.
    pub async fn get_current_prices<S: AsRef<str>>(&self, coins: &[S]) -> PriceBatch {
        self.prices(coins, false).await
    }

    /// Like [`get_current_prices`](Self::get_current_prices) but skips cached
    /// values. The previous entries stay available for stale-serve until replaced.
    pub async fn refresh_prices<S: AsRef<str>>(&self, coins: &[S]) -> PriceBatch {
        info!("🔄 Forcing price refresh for {} coins", coins.len());
        self.prices(coins, true).await
    }

    async fn prices<S: AsRef<str>>(&self, coins: &[S], force_refresh: bool) -> PriceBatch {
        let mut batch = PriceBatch::default();
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        // Spelling requested by the caller for each coin id, first one wins
        let mut spelling_for: HashMap<String, String> = HashMap::new();
        let mut duplicates: Vec<(String, String)> = Vec::new();

        for coin in coins {
            let requested = coin.as_ref().trim().to_string();
            if !seen.insert(requested.clone()) {
                continue;
            }
            let Some(record) = self.registry.record(&requested) else {
                error!(
                    "❌ Unknown coin id '{}' (feed registry v{})",
                    requested,
                    self.registry.version()
                );
                batch.failures.insert(
                    requested.clone(),
                    MarketDataError::UnmappedIdentifier {
                        coin_id: requested,
                        provider: self.primary.to_string(),
                    },
                );
                continue;
            };
            if let Some(first) = spelling_for.get(&record.id) {
                duplicates.push((requested, first.clone()));
                continue;
            }
            spelling_for.insert(record.id.clone(), requested.clone());
            let key = price_key(&record.id);
            if !force_refresh {
                if let Some(quote) = self.cache.get_json::<PriceQuote>(&key).await {
                    batch.quotes.insert(requested, Served::cached(quote));
                    continue;
                }
            }
            pending.push(PendingQuote {
                requested,
                record: record.clone(),
                key,
            });
        }

        let mut last_errors: HashMap<String, MarketDataError> = HashMap::new();
        let stages = [
            (self.primary, QuoteSource::Primary),
            (self.primary.other(), QuoteSource::Fallback),
        ];
        for (provider, source) in stages {
            if pending.is_empty() {
                break;
            }
            let (eligible, mut remaining): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|p| p.record.provider_id(provider).is_some());
            if eligible.is_empty() {
                pending = remaining;
                continue;
            }

            let records: Vec<CoinRecord> = eligible.iter().map(|p| p.record.clone()).collect();
            let client = self.price_provider(provider);
            let label = format!("{} prices", provider);
            match self.call_upstream(provider, &label, || client.fetch_prices(&records)).await {
                Ok(quotes) => {
                    let mut by_id: HashMap<String, PriceQuote> =
                        quotes.into_iter().map(|q| (q.coin_id.clone(), q)).collect();
                    for p in eligible {
                        match by_id.remove(&p.record.id) {
                            Some(mut quote) => {
                                quote.source = source;
                                self.write_through(&p.key, &quote, self.ttls.prices).await;
                                batch.quotes.insert(p.requested, Served::live(quote));
                            }
                            None => {
                                last_errors.insert(
                                    p.requested.clone(),
                                    MarketDataError::MalformedResponse(format!(
                                        "{} returned no usable quote for {}",
                                        provider, p.record.id
                                    )),
                                );
                                remaining.push(p);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "⚠️ {} price fetch failed for {} coins: {}",
                        provider,
                        eligible.len(),
                        e
                    );
                    for p in &eligible {
                        last_errors.insert(p.requested.clone(), e.clone());
                    }
                    remaining.extend(eligible);
                }
            }
            pending = remaining;
        }

        for p in pending {
            let cause = match last_errors.remove(&p.requested) {
                Some(e) => e,
                None => {
                    // No provider has an identifier for it
                    batch.failures.insert(
                        p.requested,
                        MarketDataError::UnmappedIdentifier {
                            coin_id: p.record.id,
                            provider: self.primary.to_string(),
                        },
                    );
                    continue;
                }
            };
            match self.serve_stale::<PriceQuote>(&p.key, cause).await {
                Ok(served) => {
                    batch.quotes.insert(p.requested, served);
                }
                Err(e) => {
                    batch.failures.insert(p.requested, e);
                }
            }
        }

        // Aliases and case variants share the outcome of their coin
        for (requested, first) in duplicates {
            if let Some(served) = batch.quotes.get(&first).cloned() {
                batch.quotes.insert(requested, served);
            } else if let Some(e) = batch.failures.get(&first).cloned() {
                batch.failures.insert(requested, e);
            }
        }

        debug!(
            "Price batch: {} quotes ({} stale), {} failures",
            batch.quotes.len(),
            batch.stale_count(),
            batch.failures.len()
        );
        batch
    }

    /// `days` of history for one coin. History is only offered by CoinGecko.
    pub async fn get_history(&self, coin: &str, days: u32) -> Result<Served<PriceHistory>> {
        self.history(coin, days, false).await
    }

    pub async fn refresh_history(&self, coin: &str, days: u32) -> Result<Served<PriceHistory>> {
        info!("🔄 Forcing history refresh for {} ({} days)", coin, days);
        self.history(coin, days, true).await
    }

    async fn history(&self, coin: &str, days: u32, force_refresh: bool) -> Result<Served<PriceHistory>> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(MarketDataError::Config(format!(
                "history days must be between 1 and {}, got {}",
                MAX_HISTORY_DAYS, days
            )));
        }
        let record = self
            .registry
            .record(coin)
            .ok_or_else(|| MarketDataError::UnmappedIdentifier {
                coin_id: coin.to_string(),
                provider: Provider::CoinGecko.to_string(),
            })?;
        self.registry.resolve(&record.id, Provider::CoinGecko)?;

        let key = history_key(&record.id, days);
        self.cached_fetch(&key, self.ttls.historical, force_refresh, Provider::CoinGecko, || {
            self.coingecko.fetch_history(record, days)
        })
        .await
    }

    /// Description, links and market figures for one coin, from CoinGecko.
    /// Cached with the historical TTL.
    pub async fn get_coin_details(&self, coin: &str) -> Result<Served<CoinDetails>> {
        let record = self
            .registry
            .record(coin)
            .ok_or_else(|| MarketDataError::UnmappedIdentifier {
                coin_id: coin.to_string(),
                provider: Provider::CoinGecko.to_string(),
            })?;
        self.registry.resolve(&record.id, Provider::CoinGecko)?;

        let key = details_key(&record.id);
        self.cached_fetch(&key, self.ttls.historical, false, Provider::CoinGecko, || {
            self.coingecko.fetch_coin_details(record)
        })
        .await
    }

    /// Trending coins from CoinGecko search, cached like news.
    pub async fn get_trending(&self) -> Result<Served<Vec<TrendingCoin>>> {
        self.cached_fetch(&trending_key(), self.ttls.news, false, Provider::CoinGecko, || {
            self.coingecko.fetch_trending()
        })
        .await
    }

    /// Single rate-limited health request to a provider, without retries.
    pub async fn health_check(&self, provider: Provider) -> Result<()> {
        self.limiters.acquire(provider).await?;
        self.price_provider(provider).health_check().await
    }

    /// Probes every provider concurrently.
    pub async fn health_report(&self) -> Vec<(Provider, Result<()>)> {
        let checks = Provider::ALL.map(|p| async move { (p, self.health_check(p).await) });
        join_all(checks).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn rate_limit_stats(&self) -> Vec<RateLimitStats> {
        self.limiters.all_stats().await
    }

    pub async fn clear_cache(&self, pattern: Option<&str>) -> usize {
        self.cache.clear(pattern).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::testing::{fast_retry_policy, unlimited_rate_limiters, MockHttpTransport};
    use crate::utils::ManualClock;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const ETH_FEED: &str = "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace";

    struct Harness {
        client: MarketDataClient,
        http: Arc<MockHttpTransport>,
        clock: Arc<ManualClock>,
    }

    fn harness(primary: &str) -> Harness {
        let mut config = Config::test_default();
        config.api_provider = primary.to_string();
        let clock = Arc::new(ManualClock::default());
        let http = Arc::new(MockHttpTransport::new());
        let cache = CacheStore::local_only(&CacheSettings::default(), clock.clone());
        let client = MarketDataClient::assemble(
            &config,
            Arc::new(FeedRegistry::builtin().unwrap()),
            http.clone(),
            Arc::new(cache),
            unlimited_rate_limiters(),
            clock.clone(),
        )
        .unwrap()
        .with_retry_policy(fast_retry_policy());
        Harness { client, http, clock }
    }

    fn eth_feed(price: &str) -> Value {
        json!({
            "id": ETH_FEED,
            "price": {"price": price, "conf": "100000", "expo": -8, "publish_time": 1_700_000_000},
            "ema_price": {"price": price, "conf": "100000", "expo": -8, "publish_time": 1_700_000_000}
        })
    }

    fn server_error() -> MarketDataError {
        MarketDataError::HttpStatus {
            status: 503,
            endpoint: "/api/latest_price_feeds".into(),
            body: "upstream down".into(),
            retry_after: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_secondary_provider() {
        let h = harness("pyth");
        h.http.always("latest_price_feeds", Err(server_error()));
        h.http.on(
            "coins/markets",
            Ok(json!([{"id": "ethereum", "symbol": "eth", "name": "Ethereum", "current_price": 2250.0}])),
        );

        let batch = h.client.get_current_prices(&["ethereum"]).await;
        let served = batch.get("ethereum").unwrap();
        assert_eq!(served.freshness, Freshness::Live);
        assert_eq!(served.value.source, QuoteSource::Fallback);
        assert_eq!(served.value.provider, Provider::CoinGecko);
        assert_eq!(h.http.count_matching("latest_price_feeds"), 3);
        assert_eq!(h.http.count_matching("coins/markets"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alias_and_case_variant_share_one_quote() {
        let h = harness("pyth");
        h.http.always("coins/markets", Err(server_error()));
        h.http.on(
            "latest_price_feeds",
            Ok(json!([
                eth_feed("225000000000"),
                {
                    "id": "ffd11c5a1cfd42f80afb2df4d9f264c15f956d68153335374ec10722edd70472",
                    "price": {"price": "45000000", "conf": "10000", "expo": -8, "publish_time": 1_700_000_000}
                }
            ])),
        );

        let batch = h
            .client
            .get_current_prices(&["ethereum", "Ethereum", "polygon", "matic-network"])
            .await;

        assert!(batch.is_complete());
        assert_eq!(batch.quotes.len(), 4);
        assert_eq!(batch.get("Ethereum"), batch.get("ethereum"));
        assert_eq!(batch.get("matic-network"), batch.get("polygon"));
        let pol = batch.get("matic-network").unwrap();
        assert_eq!(pol.value.coin_id, "polygon");
        assert_eq!(pol.value.source, QuoteSource::Primary);
        assert_approx_eq!(pol.value.price_usd, 0.45);
        assert_eq!(h.http.request_count(), 1);
        assert_eq!(h.http.count_matching("coins/markets"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_upstream_is_retried() {
        let h = harness("pyth");
        let timeout = || MarketDataError::Timeout("operation timed out after 10s".into());
        h.http.push_err(timeout());
        h.http.push_err(timeout());
        h.http.push_ok(json!([eth_feed("225000000000")]));

        let batch = h.client.get_current_prices(&["ethereum"]).await;
        let eth = batch.get("ethereum").unwrap();
        assert_eq!(eth.freshness, Freshness::Live);
        assert_eq!(eth.value.source, QuoteSource::Primary);
        assert_eq!(h.http.count_matching("latest_price_feeds"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_coin_is_reported_without_upstream_calls() {
        let h = harness("pyth");
        let batch = h.client.get_current_prices(&["dogecoin"]).await;
        assert!(batch.quotes.is_empty());
        assert!(matches!(
            batch.failures.get("dogecoin"),
            Some(MarketDataError::UnmappedIdentifier { .. })
        ));
        assert_eq!(h.http.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_served_only_when_previous_value_exists() {
        let h = harness("pyth");
        h.http.on("latest_price_feeds", Ok(json!([eth_feed("225000000000")])));
        let first = h.client.get_current_prices(&["ethereum"]).await;
        assert_eq!(first.get("ethereum").unwrap().freshness, Freshness::Live);

        h.clock.advance(Duration::from_secs(121));
        h.http.always("latest_price_feeds", Err(server_error()));
        h.http.always("coins/markets", Err(server_error()));

        let batch = h.client.get_current_prices(&["ethereum", "solana"]).await;
        let eth = batch.get("ethereum").unwrap();
        assert!(eth.is_stale());
        assert_approx_eq!(eth.value.price_usd, 2250.0);
        assert!(matches!(
            batch.failures.get("solana"),
            Some(MarketDataError::Unavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_bypasses_cache_and_keeps_stale_copy() {
        let h = harness("pyth");
        h.http.on("latest_price_feeds", Ok(json!([eth_feed("225000000000")])));
        h.http.on("latest_price_feeds", Ok(json!([eth_feed("230000000000")])));
        h.client.get_current_prices(&["ethereum"]).await;

        let refreshed = h.client.refresh_prices(&["ethereum"]).await;
        assert_approx_eq!(refreshed.get("ethereum").unwrap().value.price_usd, 2300.0);
        assert_eq!(h.http.count_matching("latest_price_feeds"), 2);

        h.http.always("latest_price_feeds", Err(server_error()));
        h.http.always("coins/markets", Err(server_error()));
        let failed = h.client.refresh_prices(&["ethereum"]).await;
        // Still within TTL, so the surviving copy is not stale yet
        assert_eq!(failed.get("ethereum").unwrap().freshness, Freshness::Cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_cached_and_validated() {
        let h = harness("coingecko");
        h.http.on(
            "market_chart",
            Ok(json!({"prices": [[1_704_067_200_000_i64, 42000.0]]})),
        );

        let first = h.client.get_history("bitcoin", 30).await.unwrap();
        assert_eq!(first.freshness, Freshness::Live);
        let second = h.client.get_history("bitcoin", 30).await.unwrap();
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(second.value, first.value);
        assert_eq!(h.http.request_count(), 1);

        assert!(matches!(
            h.client.get_history("bitcoin", 0).await,
            Err(MarketDataError::Config(_))
        ));
        assert!(matches!(
            h.client.get_history("dogecoin", 7).await,
            Err(MarketDataError::UnmappedIdentifier { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_history_is_not_retried() {
        let h = harness("pyth");
        h.http.always("market_chart", Ok(json!({"unexpected": true})));
        let err = h.client.get_history("ethereum", 7).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable { .. }));
        assert_eq!(h.http.count_matching("market_chart"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coin_details_cached_and_stale_served() {
        let h = harness("pyth");
        h.http.on(
            "coins/ethereum",
            Ok(json!({"id": "ethereum", "symbol": "eth", "name": "Ethereum",
                      "market_data": {"current_price": {"usd": 2250.0}}})),
        );

        let first = h.client.get_coin_details("Ethereum").await.unwrap();
        assert_eq!(first.freshness, Freshness::Live);
        assert_eq!(first.value.symbol, "ETH");
        assert_eq!(h.client.get_coin_details("ethereum").await.unwrap().freshness, Freshness::Cached);

        h.clock.advance(Duration::from_secs(3601));
        h.http.always("coins/ethereum", Err(server_error()));
        let stale = h.client.get_coin_details("ethereum").await.unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.value, first.value);
        assert_eq!(h.http.count_matching("coins/ethereum"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trending_uses_news_ttl() {
        let h = harness("pyth");
        h.http.on("search/trending", Ok(json!({"coins": [{"item": {"id": "pepe", "name": "Pepe", "symbol": "PEPE"}}]})));

        assert_eq!(h.client.get_trending().await.unwrap().value.len(), 1);
        h.clock.advance(Duration::from_secs(1799));
        assert_eq!(h.client.get_trending().await.unwrap().freshness, Freshness::Cached);
        assert_eq!(h.http.request_count(), 1);
    }
}
