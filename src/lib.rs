pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod market; // Cached, rate-limited market data with stale-serve
pub mod providers;
pub mod testing; // Scripted HTTP transport and test wiring
pub mod utils;

pub use cache::{CacheStats, CacheStore};
pub use config::{load_config, Config, FeedRegistry};
pub use error::{MarketDataError, Result};
pub use market::{Freshness, MarketDataClient, PriceBatch, Served};
pub use providers::{CoinDetails, PriceHistory, PriceQuote, Provider, QuoteSource};
