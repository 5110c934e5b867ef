//! Upstream market data providers: Pyth Hermes and CoinGecko.
//!
//! A provider makes exactly one HTTP call per method and normalizes the
//! payload. Rate limiting, retries and caching are composed around it by
//! [`crate::market::MarketDataClient`].

pub mod coingecko;
pub mod pyth;
pub mod types;

pub use coingecko::CoinGeckoClient;
pub use pyth::PythClient;
pub use types::{CoinDetails, PricePoint, PriceHistory, PriceQuote, QuoteSource, TrendingCoin};

use crate::config::CoinRecord;
use crate::error::{MarketDataError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Pyth,
    CoinGecko,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Pyth, Provider::CoinGecko];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Pyth => "pyth",
            Provider::CoinGecko => "coingecko",
        }
    }

    /// The provider used when this one fails
    pub fn other(&self) -> Provider {
        match self {
            Provider::Pyth => Provider::CoinGecko,
            Provider::CoinGecko => Provider::Pyth,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pyth" => Ok(Provider::Pyth),
            "coingecko" => Ok(Provider::CoinGecko),
            other => Err(MarketDataError::Config(format!(
                "unknown API provider '{}', expected 'pyth' or 'coingecko'",
                other
            ))),
        }
    }
}

/// The price-quote surface every provider offers.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetches quotes for `coins` in a single upstream call. Coins the
    /// upstream did not return (or returned malformed) are absent from the result.
    async fn fetch_prices(&self, coins: &[CoinRecord]) -> Result<Vec<PriceQuote>>;

    async fn health_check(&self) -> Result<()>;
}
