pub mod feeds;
pub mod settings;

pub use feeds::{normalize_feed_id, CoinRecord, FeedRegistry};
pub use settings::Config;

use crate::error::Result;
use std::sync::Arc;

/// Loads `.env`, the environment and the feed registry, and validates them together.
pub fn load_config() -> Result<(Arc<Config>, Arc<FeedRegistry>)> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();
    let registry = FeedRegistry::load(config.feed_registry_path.as_deref())?;
    config.validate_and_log(&registry)?;

    Ok((Arc::new(config), Arc::new(registry)))
}
