// src/providers/pyth.rs
//! Pyth Network Hermes client
//!
//! Prices come back as fixed-point integers with a shared exponent:
//! `{"id":"e62d..","price":{"price":"6512345000000","conf":"1520000","expo":-8,"publish_time":1700000000},"ema_price":{..}}`.
//! Hermes drops the `0x` prefix from ids, so ids are normalized before lookup.

use super::types::from_unix_secs;
use super::{PriceProvider, PriceQuote, Provider, QuoteSource};
use crate::api::{HttpRequest, HttpTransport};
use crate::config::{CoinRecord, FeedRegistry};
use crate::error::{MarketDataError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;

const LATEST_PRICE_FEEDS: &str = "/api/latest_price_feeds";

pub struct PythClient {
    http: Arc<dyn HttpTransport>,
    base_url: String,
    registry: Arc<FeedRegistry>,
}

/// Hermes sends fixed-point values as strings; older responses used numbers.
fn int_field(obj: &Value, name: &str) -> Option<i64> {
    match obj.get(name)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn scale(raw: i64, expo: i32) -> f64 {
    if expo < 0 {
        raw as f64 / 10_f64.powi(-expo)
    } else {
        raw as f64 * 10_f64.powi(expo)
    }
}

/// Decoded `price` or `ema_price` object
#[derive(Debug, Clone, Copy, PartialEq)]
struct FixedPoint {
    price: f64,
    conf: Option<f64>,
    publish_time: Option<i64>,
}

fn parse_fixed_point(obj: &Value, default_expo: Option<i32>) -> Option<(FixedPoint, i32)> {
    let expo = int_field(obj, "expo")
        .map(|e| e as i32)
        .or(default_expo)?;
    let raw = int_field(obj, "price")?;
    Some((
        FixedPoint {
            price: scale(raw, expo),
            conf: int_field(obj, "conf").map(|c| scale(c, expo)),
            publish_time: int_field(obj, "publish_time"),
        },
        expo,
    ))
}

impl PythClient {
    pub fn new(http: Arc<dyn HttpTransport>, base_url: &str, registry: Arc<FeedRegistry>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            registry,
        }
    }

    /// Converts one feed object; `None` if it is unknown or malformed.
    fn normalize_feed(&self, feed: &Value) -> Option<PriceQuote> {
        let feed_id = feed.get("id")?.as_str()?;
        let coin = match self.registry.coin_for_upstream(Provider::Pyth, feed_id) {
            Ok(coin) => coin,
            Err(e) => {
                warn!("Skipping Pyth item: {}", e);
                return None;
            }
        };

        let Some((price, expo)) = feed.get("price").and_then(|p| parse_fixed_point(p, None)) else {
            warn!("Malformed Pyth price object for feed {} ({})", feed_id, coin.id);
            return None;
        };
        let Some(as_of) = price.publish_time.and_then(from_unix_secs) else {
            warn!("Pyth feed {} ({}) has no usable publish_time", feed_id, coin.id);
            return None;
        };

        let ema = feed
            .get("ema_price")
            .and_then(|e| parse_fixed_point(e, Some(expo)))
            .map(|(fp, _)| fp.price);
        // Pyth has no 24h change; approximate it against the EMA
        let change_24h_pct = ema
            .filter(|e| *e > 0.0)
            .map(|e| (price.price - e) / e * 100.0);

        Some(PriceQuote {
            coin_id: coin.id.clone(),
            symbol: coin.symbol.clone(),
            name: coin.name.clone(),
            price_usd: price.price,
            as_of,
            provider: Provider::Pyth,
            source: QuoteSource::Primary,
            confidence: price.conf,
            ema_price: ema,
            change_24h_pct,
            market_cap: None,
            volume_24h: None,
            high_24h: None,
            low_24h: None,
        })
    }

    pub fn normalize_response(&self, body: &Value) -> Result<Vec<PriceQuote>> {
        let feeds = match body {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("parsed") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(MarketDataError::MalformedResponse(
                        "Pyth response has no 'parsed' array".to_string(),
                    ))
                }
            },
            _ => {
                return Err(MarketDataError::MalformedResponse(
                    "Pyth response is neither an array nor an object".to_string(),
                ))
            }
        };
        Ok(feeds.iter().filter_map(|f| self.normalize_feed(f)).collect())
    }
}

#[async_trait]
impl PriceProvider for PythClient {
    fn provider(&self) -> Provider {
        Provider::Pyth
    }

    async fn fetch_prices(&self, coins: &[CoinRecord]) -> Result<Vec<PriceQuote>> {
        let mut request = HttpRequest::get(format!("{}{}", self.base_url, LATEST_PRICE_FEEDS));
        for coin in coins {
            let feed_id = self.registry.resolve(&coin.id, Provider::Pyth)?;
            request = request.query("ids[]", feed_id);
        }
        debug!("🔮 Requesting {} Pyth price feeds", coins.len());

        let body = self.http.get_json(&request).await?;
        let quotes = self.normalize_response(&body)?;
        info!("Fetched prices for {} coins from Pyth Network", quotes.len());
        Ok(quotes)
    }

    async fn health_check(&self) -> Result<()> {
        let first = self
            .registry
            .coins()
            .iter()
            .find(|c| c.pyth_feed_id.is_some())
            .cloned()
            .ok_or_else(|| MarketDataError::Config("no Pyth feeds in registry".to_string()))?;
        self.fetch_prices(&[first]).await.map(|_| ())
    }
}
