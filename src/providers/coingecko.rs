// src/providers/coingecko.rs
//! CoinGecko REST client: markets, market charts, coin details, trending search and ping.

use super::types::from_unix_millis;
use super::{
    CoinDetails, PricePoint, PriceHistory, PriceProvider, PriceQuote, Provider, QuoteSource,
    TrendingCoin,
};
use crate::api::{HttpRequest, HttpTransport};
use crate::config::{CoinRecord, FeedRegistry};
use crate::error::{MarketDataError, Result};
use crate::utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

pub struct CoinGeckoClient {
    http: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: Option<String>,
    registry: Arc<FeedRegistry>,
    clock: Arc<dyn Clock>,
}

fn f64_field(obj: &Value, name: &str) -> Option<f64> {
    obj.get(name).and_then(Value::as_f64)
}

fn str_field(obj: &Value, name: &str) -> Option<String> {
    obj.get(name).and_then(Value::as_str).map(str::to_string)
}

/// `[[timestamp_ms, value], ..]` series from market_chart
fn series(body: &Value, name: &str) -> Vec<(i64, f64)> {
    body.get(name)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let pair = row.as_array()?;
                    Some((pair.first()?.as_f64()? as i64, pair.get(1)?.as_f64()?))
                })
                .collect()
        })
        .unwrap_or_default()
}

impl CoinGeckoClient {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        base_url: &str,
        api_key: Option<String>,
        registry: Arc<FeedRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            registry,
            clock,
        }
    }

    fn request(&self, path: &str) -> HttpRequest {
        let request = HttpRequest::get(format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key.as_str()),
            None => request,
        }
    }

    fn normalize_market(&self, item: &Value) -> Option<PriceQuote> {
        let cg_id = item.get("id")?.as_str()?;
        let coin = match self.registry.coin_for_upstream(Provider::CoinGecko, cg_id) {
            Ok(coin) => coin,
            Err(e) => {
                warn!("Skipping CoinGecko item: {}", e);
                return None;
            }
        };
        let Some(price) = f64_field(item, "current_price") else {
            warn!("CoinGecko market entry for {} has no current_price", cg_id);
            return None;
        };
        let as_of = item
            .get("last_updated")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| self.clock.now());

        Some(PriceQuote {
            coin_id: coin.id.clone(),
            symbol: coin.symbol.clone(),
            name: coin.name.clone(),
            price_usd: price,
            as_of,
            provider: Provider::CoinGecko,
            source: QuoteSource::Primary,
            confidence: None,
            ema_price: None,
            change_24h_pct: f64_field(item, "price_change_percentage_24h"),
            market_cap: f64_field(item, "market_cap"),
            volume_24h: f64_field(item, "total_volume"),
            high_24h: f64_field(item, "high_24h"),
            low_24h: f64_field(item, "low_24h"),
        })
    }

    pub fn normalize_markets(&self, body: &Value) -> Result<Vec<PriceQuote>> {
        let items = body.as_array().ok_or_else(|| {
            MarketDataError::MalformedResponse("coins/markets did not return an array".to_string())
        })?;
        Ok(items.iter().filter_map(|i| self.normalize_market(i)).collect())
    }

    pub fn normalize_history(&self, coin_id: &str, days: u32, body: &Value) -> Result<PriceHistory> {
        let prices = series(body, "prices");
        if prices.is_empty() && body.get("prices").and_then(Value::as_array).is_none() {
            return Err(MarketDataError::MalformedResponse(format!(
                "market_chart for {} has no prices series",
                coin_id
            )));
        }
        // Series can differ in length; join on the millisecond timestamp
        let market_caps: HashMap<i64, f64> = series(body, "market_caps").into_iter().collect();
        let volumes: HashMap<i64, f64> = series(body, "total_volumes").into_iter().collect();

        let points = prices
            .iter()
            .filter_map(|(ts, price)| {
                Some(PricePoint {
                    timestamp: from_unix_millis(*ts)?,
                    price_usd: *price,
                    market_cap: market_caps.get(ts).copied(),
                    volume: volumes.get(ts).copied(),
                })
            })
            .collect();

        Ok(PriceHistory {
            coin_id: coin_id.to_string(),
            days,
            provider: Provider::CoinGecko,
            fetched_at: self.clock.now(),
            points,
        })
    }

    /// `days` of daily (or finer, for a single day) prices for one coin.
    pub async fn fetch_history(&self, coin: &CoinRecord, days: u32) -> Result<PriceHistory> {
        let cg_id = self.registry.resolve(&coin.id, Provider::CoinGecko)?;
        let mut request = self
            .request(&format!("coins/{}/market_chart", cg_id))
            .query("vs_currency", "usd")
            .query("days", days.to_string());
        if days > 1 {
            request = request.query("interval", "daily");
        }
        debug!("📈 Requesting {} day history for {}", days, coin.id);

        let body = self.http.get_json(&request).await?;
        let history = self.normalize_history(&coin.id, days, &body)?;
        info!("Fetched {} history points for {}", history.points.len(), coin.id);
        Ok(history)
    }

    /// Description, links and USD market figures from `coins/{id}`.
    pub async fn fetch_coin_details(&self, coin: &CoinRecord) -> Result<CoinDetails> {
        let cg_id = self.registry.resolve(&coin.id, Provider::CoinGecko)?;
        let request = self
            .request(&format!("coins/{}", cg_id))
            .query("localization", "false")
            .query("tickers", "false")
            .query("market_data", "true")
            .query("community_data", "false")
            .query("developer_data", "false")
            .query("sparkline", "false");

        let body = self.http.get_json(&request).await?;
        self.normalize_details(coin, &body)
    }

    pub fn normalize_details(&self, coin: &CoinRecord, body: &Value) -> Result<CoinDetails> {
        if body.get("id").and_then(Value::as_str).is_none() {
            return Err(MarketDataError::MalformedResponse(format!(
                "coins/{} has no id field",
                coin.id
            )));
        }
        let usd = |field: &str| {
            body.get("market_data")
                .and_then(|m| m.get(field))
                .and_then(|v| v.get("usd"))
                .and_then(Value::as_f64)
        };
        let links = body.get("links");
        let homepage = links
            .and_then(|l| l.get("homepage"))
            .and_then(Value::as_array)
            .and_then(|pages| pages.iter().filter_map(Value::as_str).find(|u| !u.is_empty()))
            .map(str::to_string);
        let non_empty = |name: &str| links.and_then(|l| str_field(l, name)).filter(|s| !s.is_empty());

        Ok(CoinDetails {
            coin_id: coin.id.clone(),
            symbol: str_field(body, "symbol")
                .map(|s| s.to_uppercase())
                .unwrap_or_else(|| coin.symbol.clone()),
            name: str_field(body, "name").unwrap_or_else(|| coin.name.clone()),
            description: body
                .get("description")
                .and_then(|d| str_field(d, "en"))
                .unwrap_or_default(),
            categories: body
                .get("categories")
                .and_then(Value::as_array)
                .map(|c| c.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            homepage,
            twitter_screen_name: non_empty("twitter_screen_name"),
            subreddit_url: non_empty("subreddit_url"),
            price_usd: usd("current_price"),
            market_cap: usd("market_cap"),
            volume_24h: usd("total_volume"),
            change_24h_pct: body
                .get("market_data")
                .and_then(|m| f64_field(m, "price_change_percentage_24h")),
            last_updated: body
                .get("last_updated")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            provider: Provider::CoinGecko,
        })
    }

    pub async fn fetch_trending(&self) -> Result<Vec<TrendingCoin>> {
        let body = self.http.get_json(&self.request("search/trending")).await?;
        let coins = body.get("coins").and_then(Value::as_array).ok_or_else(|| {
            MarketDataError::MalformedResponse("search/trending has no coins array".to_string())
        })?;

        Ok(coins
            .iter()
            .filter_map(|entry| {
                let item = entry.get("item")?;
                Some(TrendingCoin {
                    id: str_field(item, "id")?,
                    name: str_field(item, "name").unwrap_or_default(),
                    symbol: str_field(item, "symbol").unwrap_or_default(),
                    market_cap_rank: item
                        .get("market_cap_rank")
                        .and_then(Value::as_u64)
                        .map(|r| r as u32),
                    thumb: str_field(item, "thumb"),
                    score: item.get("score").and_then(Value::as_u64).map(|s| s as u32),
                })
            })
            .collect())
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoClient {
    fn provider(&self) -> Provider {
        Provider::CoinGecko
    }

    async fn fetch_prices(&self, coins: &[CoinRecord]) -> Result<Vec<PriceQuote>> {
        let ids = coins
            .iter()
            .map(|c| self.registry.resolve(&c.id, Provider::CoinGecko))
            .collect::<Result<Vec<_>>>()?;
        let request = self
            .request("coins/markets")
            .query("vs_currency", "usd")
            .query("ids", ids.join(","))
            .query("order", "market_cap_desc")
            .query("per_page", ids.len().max(1).to_string())
            .query("page", "1")
            .query("price_change_percentage", "24h");

        let body = self.http.get_json(&request).await?;
        let quotes = self.normalize_markets(&body)?;
        info!("Fetched prices for {} coins from CoinGecko", quotes.len());
        Ok(quotes)
    }

    async fn health_check(&self) -> Result<()> {
        self.http.get_json(&self.request("ping")).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHttpTransport;
    use crate::utils::ManualClock;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client(http: Arc<MockHttpTransport>, api_key: Option<&str>) -> CoinGeckoClient {
        CoinGeckoClient::new(
            http,
            "http://coingecko.test/api/v3/",
            api_key.map(str::to_string),
            Arc::new(FeedRegistry::builtin().unwrap()),
            Arc::new(ManualClock::default()),
        )
    }

    fn record(id: &str) -> CoinRecord {
        FeedRegistry::builtin().unwrap().record(id).unwrap().clone()
    }

    #[tokio::test]
    async fn test_markets_request_and_normalization() {
        let http = Arc::new(MockHttpTransport::new());
        http.push_ok(json!([
            {
                "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
                "current_price": 43250.5, "market_cap": 846_000_000_000.0_f64,
                "total_volume": 21_000_000_000.0_f64, "high_24h": 44000.0, "low_24h": 42000.0,
                "price_change_percentage_24h": -1.25,
                "last_updated": "2024-01-09T12:00:00.000Z"
            },
            {"id": "polygon-ecosystem-token", "symbol": "pol", "name": "POL", "current_price": 0.82},
            {"id": "ethereum", "symbol": "eth", "name": "Ethereum", "current_price": null}
        ]));
        let gecko = client(http.clone(), Some("demo-key"));

        let quotes = gecko
            .fetch_prices(&[record("bitcoin"), record("polygon"), record("ethereum")])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].coin_id, "bitcoin");
        assert_approx_eq!(quotes[0].price_usd, 43250.5);
        assert_approx_eq!(quotes[0].change_24h_pct.unwrap(), -1.25);
        assert_eq!(quotes[0].as_of.to_rfc3339(), "2024-01-09T12:00:00+00:00");
        // Renamed upstream id maps back to the stable internal id
        assert_eq!(quotes[1].coin_id, "polygon");

        let req = &http.requests()[0];
        assert_eq!(req.url, "http://coingecko.test/api/v3/coins/markets");
        assert!(req
            .query
            .contains(&("ids".to_string(), "bitcoin,polygon-ecosystem-token,ethereum".to_string())));
        assert_eq!(req.headers, vec![(API_KEY_HEADER.to_string(), "demo-key".to_string())]);
    }

    #[tokio::test]
    async fn test_history_uses_daily_interval_for_multi_day() {
        let http = Arc::new(MockHttpTransport::new());
        http.push_ok(json!({
            "prices": [[1_704_067_200_000_i64, 42000.0], [1_704_153_600_000_i64, 43000.0]],
            "market_caps": [[1_704_067_200_000_i64, 8.2e11], [1_704_153_600_000_i64, 8.4e11]],
            "total_volumes": [[1_704_067_200_000_i64, 2.0e10]]
        }));
        http.push_ok(json!({"prices": []}));
        let gecko = client(http.clone(), None);

        let history = gecko.fetch_history(&record("bitcoin"), 7).await.unwrap();
        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[0].volume, Some(2.0e10));
        assert_eq!(history.points[1].volume, None);
        assert_eq!(history.points[1].timestamp.timestamp(), 1_704_153_600);

        let day = gecko.fetch_history(&record("bitcoin"), 1).await.unwrap();
        assert!(day.points.is_empty());

        let requests = http.requests();
        assert_eq!(requests[0].url, "http://coingecko.test/api/v3/coins/bitcoin/market_chart");
        assert!(requests[0].query.contains(&("interval".to_string(), "daily".to_string())));
        assert!(!requests[1].query.iter().any(|(k, _)| k == "interval"));
        assert!(requests[0].headers.is_empty());
    }

    #[test]
    fn test_history_series_joined_by_timestamp() {
        let gecko = client(Arc::new(MockHttpTransport::new()), None);
        // Volume for the first day is missing, so positions no longer line up
        let body = json!({
            "prices": [[1_704_067_200_000_i64, 42000.0], [1_704_153_600_000_i64, 43000.0]],
            "market_caps": [[1_704_153_600_000_i64, 8.4e11]],
            "total_volumes": [[1_704_153_600_000_i64, 2.5e10], [1_704_240_000_000_i64, 9.9e10]]
        });
        let history = gecko.normalize_history("bitcoin", 2, &body).unwrap();
        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[0].market_cap, None);
        assert_eq!(history.points[0].volume, None);
        assert_eq!(history.points[1].market_cap, Some(8.4e11));
        assert_eq!(history.points[1].volume, Some(2.5e10));
    }

    #[tokio::test]
    async fn test_coin_details_normalized() {
        let http = Arc::new(MockHttpTransport::new());
        http.push_ok(json!({
            "id": "polygon-ecosystem-token",
            "symbol": "pol",
            "name": "POL (ex-MATIC)",
            "categories": ["Layer 2 (L2)", "Ethereum Ecosystem"],
            "description": {"en": "Polygon is a network of blockchains."},
            "links": {
                "homepage": ["", "https://polygon.technology/"],
                "twitter_screen_name": "0xPolygon",
                "subreddit_url": ""
            },
            "market_data": {
                "current_price": {"usd": 0.45, "eur": 0.41},
                "market_cap": {"usd": 4.5e9},
                "total_volume": {"usd": 2.1e8},
                "price_change_percentage_24h": -1.25
            },
            "last_updated": "2024-01-09T12:00:00.000Z"
        }));
        let gecko = client(http.clone(), None);

        let details = gecko.fetch_coin_details(&record("polygon")).await.unwrap();
        assert_eq!(details.coin_id, "polygon");
        assert_eq!(details.symbol, "POL");
        assert_eq!(details.categories.len(), 2);
        assert_eq!(details.homepage.as_deref(), Some("https://polygon.technology/"));
        assert_eq!(details.twitter_screen_name.as_deref(), Some("0xPolygon"));
        assert_eq!(details.subreddit_url, None);
        assert_eq!(details.price_usd, Some(0.45));
        assert_eq!(details.change_24h_pct, Some(-1.25));
        assert_eq!(details.last_updated.unwrap().timestamp(), 1_704_801_600);

        let req = &http.requests()[0];
        assert_eq!(req.url, "http://coingecko.test/api/v3/coins/polygon-ecosystem-token");
        assert!(req.query.contains(&("tickers".to_string(), "false".to_string())));
    }

    #[test]
    fn test_history_without_prices_is_malformed() {
        let gecko = client(Arc::new(MockHttpTransport::new()), None);
        let err = gecko.normalize_history("bitcoin", 7, &json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, MarketDataError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_trending() {
        let http = Arc::new(MockHttpTransport::new());
        http.push_ok(json!({"coins": [
            {"item": {"id": "pepe", "name": "Pepe", "symbol": "PEPE", "market_cap_rank": 40, "score": 0}},
            {"item": {"name": "no id"}}
        ]}));
        let trending = client(http, None).fetch_trending().await.unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].id, "pepe");
        assert_eq!(trending[0].market_cap_rank, Some(40));
    }
}
