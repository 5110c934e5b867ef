//! Normalized market data shared by all providers.

use super::Provider;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Whether a quote came from the configured primary provider or its fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    /// Time the upstream observed the price
    pub as_of: DateTime<Utc>,
    pub provider: Provider,
    pub source: QuoteSource,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub ema_price: Option<f64>,
    #[serde(default)]
    pub change_24h_pct: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub high_24h: Option<f64>,
    #[serde(default)]
    pub low_24h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price_usd: f64,
    pub market_cap: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub coin_id: String,
    pub days: u32,
    pub provider: Provider,
    pub fetched_at: DateTime<Utc>,
    pub points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Percent change from the first to the last point
    pub fn change_pct(&self) -> Option<f64> {
        let first = self.points.first()?.price_usd;
        let last = self.points.last()?.price_usd;
        (first > 0.0).then(|| (last - first) / first * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub thumb: Option<String>,
    pub score: Option<u32>,
}

/// Descriptive metadata and headline market figures for one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetails {
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub twitter_screen_name: Option<String>,
    #[serde(default)]
    pub subreddit_url: Option<String>,
    #[serde(default)]
    pub price_usd: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub change_24h_pct: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    pub provider: Provider,
}

pub(crate) fn from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

pub(crate) fn from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn point(price: f64) -> PricePoint {
        PricePoint {
            timestamp: Utc::now(),
            price_usd: price,
            market_cap: None,
            volume: None,
        }
    }

    #[test]
    fn test_history_change_pct() {
        let history = PriceHistory {
            coin_id: "bitcoin".into(),
            days: 7,
            provider: Provider::CoinGecko,
            fetched_at: Utc::now(),
            points: vec![point(40_000.0), point(41_000.0), point(44_000.0)],
        };
        assert_approx_eq!(history.change_pct().unwrap(), 10.0);
        assert_eq!(history.latest().unwrap().price_usd, 44_000.0);
    }

    #[test]
    fn test_quote_serializes_provider_and_source_lowercase() {
        let quote = PriceQuote {
            coin_id: "bitcoin".into(),
            symbol: "BTC".into(),
            name: "Bitcoin".into(),
            price_usd: 1.0,
            as_of: from_unix_secs(1_700_000_000).unwrap(),
            provider: Provider::Pyth,
            source: QuoteSource::Fallback,
            confidence: None,
            ema_price: None,
            change_24h_pct: None,
            market_cap: None,
            volume_24h: None,
            high_24h: None,
            low_24h: None,
        };
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["provider"], "pyth");
        assert_eq!(json["source"], "fallback");
        let back: PriceQuote = serde_json::from_value(json).unwrap();
        assert_eq!(back, quote);
    }
}
