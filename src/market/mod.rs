//! Cached, rate-limited access to market data with stale-serve.

pub mod client;

pub use client::MarketDataClient;

use crate::error::MarketDataError;
use crate::providers::PriceQuote;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// How current a served value is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Freshness {
    /// Fetched from upstream during this call
    Live,
    /// Served from cache within its TTL
    Cached,
    /// Upstream failed; this is an expired cached value
    Stale {
        stored_at: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    },
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served<T> {
    pub value: T,
    pub freshness: Freshness,
}

impl<T> Served<T> {
    pub fn live(value: T) -> Self {
        Self { value, freshness: Freshness::Live }
    }

    pub fn cached(value: T) -> Self {
        Self { value, freshness: Freshness::Cached }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness.is_stale()
    }
}

/// Result of a multi-coin price request: every requested coin lands in
/// exactly one of the two maps.
#[derive(Debug, Default, Serialize)]
pub struct PriceBatch {
    pub quotes: BTreeMap<String, Served<PriceQuote>>,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: BTreeMap<String, MarketDataError>,
}

impl PriceBatch {
    pub fn get(&self, coin_id: &str) -> Option<&Served<PriceQuote>> {
        self.quotes.get(coin_id)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn stale_count(&self) -> usize {
        self.quotes.values().filter(|q| q.is_stale()).count()
    }
}

fn serialize_failures<S: Serializer>(
    failures: &BTreeMap<String, MarketDataError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(failures.len()))?;
    for (coin, err) in failures {
        map.serialize_entry(
            coin,
            &serde_json::json!({
                "category": format!("{:?}", err.categorize()),
                "message": err.to_string(),
            }),
        )?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_serialization() {
        let json = serde_json::to_value(Served::cached(1)).unwrap();
        assert_eq!(json["freshness"]["status"], "cached");
        assert!(!Served::live(1).is_stale());
    }

    #[test]
    fn test_batch_failures_serialize_as_messages() {
        let mut batch = PriceBatch::default();
        batch.failures.insert(
            "dogecoin".into(),
            MarketDataError::UnmappedIdentifier {
                coin_id: "dogecoin".into(),
                provider: "pyth".into(),
            },
        );
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["failures"]["dogecoin"]["category"], "Configuration");
        assert!(!batch.is_complete());
    }
}
