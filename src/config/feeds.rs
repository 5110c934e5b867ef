//! Versioned coin → provider identifier registry.
//!
//! Every provider names the same instrument differently (Pyth uses hex feed
//! ids, CoinGecko uses slugs that occasionally change on rebrands). The
//! registry is plain data so a rename is an edit to `feeds.json` or to the file
//! pointed at by `FEED_REGISTRY_PATH`, never a code change.

use crate::error::{MarketDataError, Result};
use crate::providers::Provider;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

const BUILTIN_REGISTRY: &str = include_str!("feeds.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoinRecord {
    /// Stable internal id used by callers and cache keys
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub pyth_feed_id: Option<String>,
    #[serde(default)]
    pub coingecko_id: Option<String>,
    /// Former ids that still resolve to this record
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CoinRecord {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Pyth => self.pyth_feed_id.as_deref(),
            Provider::CoinGecko => self.coingecko_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    updated: Option<String>,
    coins: Vec<CoinRecord>,
}

#[derive(Debug, Clone)]
pub struct FeedRegistry {
    version: u32,
    updated: Option<String>,
    coins: Vec<CoinRecord>,
    by_id: HashMap<String, usize>,
    by_pyth: HashMap<String, usize>,
    by_coingecko: HashMap<String, usize>,
}

/// Lowercases and strips an optional `0x` prefix so `0xABC..` and `abc..` match.
pub fn normalize_feed_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

impl FeedRegistry {
    pub fn new(version: u32, coins: Vec<CoinRecord>) -> Result<Self> {
        Self::build(version, None, coins)
    }

    fn build(version: u32, updated: Option<String>, coins: Vec<CoinRecord>) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut by_pyth = HashMap::new();
        let mut by_coingecko = HashMap::new();

        for (idx, coin) in coins.iter().enumerate() {
            for name in std::iter::once(&coin.id).chain(coin.aliases.iter()) {
                let key = name.trim().to_ascii_lowercase();
                if by_id.insert(key.clone(), idx).is_some() {
                    return Err(MarketDataError::Config(format!(
                        "feed registry v{}: duplicate coin id or alias '{}'",
                        version, key
                    )));
                }
            }
            if let Some(feed) = &coin.pyth_feed_id {
                let normalized = normalize_feed_id(feed);
                if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(MarketDataError::Config(format!(
                        "feed registry v{}: '{}' has a non-hex Pyth feed id '{}'",
                        version, coin.id, feed
                    )));
                }
                if let Some(other) = by_pyth.insert(normalized, idx) {
                    return Err(MarketDataError::Config(format!(
                        "feed registry v{}: '{}' and '{}' share Pyth feed id '{}'",
                        version, coins[other].id, coin.id, feed
                    )));
                }
            }
            if let Some(cg) = &coin.coingecko_id {
                if let Some(other) = by_coingecko.insert(cg.trim().to_ascii_lowercase(), idx) {
                    return Err(MarketDataError::Config(format!(
                        "feed registry v{}: '{}' and '{}' share CoinGecko id '{}'",
                        version, coins[other].id, coin.id, cg
                    )));
                }
            }
        }

        Ok(Self {
            version,
            updated,
            coins,
            by_id,
            by_pyth,
            by_coingecko,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(json)
            .map_err(|e| MarketDataError::Config(format!("invalid feed registry: {}", e)))?;
        Self::build(file.version, file.updated, file.coins)
    }

    /// The registry compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_REGISTRY)
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            MarketDataError::Config(format!("cannot read feed registry '{}': {}", path, e))
        })?;
        Self::from_json(&json)
    }

    /// Loads from `path` when given, otherwise the built-in registry.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let registry = match path {
            Some(p) => Self::from_path(p)?,
            None => Self::builtin()?,
        };
        info!(
            "📒 Feed registry v{} loaded ({} coins, updated {})",
            registry.version,
            registry.coins.len(),
            registry.updated.as_deref().unwrap_or("unknown")
        );
        Ok(registry)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn coins(&self) -> &[CoinRecord] {
        &self.coins
    }

    /// Looks up a coin by internal id or alias, case-insensitively
    pub fn record(&self, coin_id: &str) -> Option<&CoinRecord> {
        self.by_id
            .get(&coin_id.trim().to_ascii_lowercase())
            .map(|&idx| &self.coins[idx])
    }

    /// Maps an internal coin id to the provider's identifier.
    pub fn resolve(&self, coin_id: &str, provider: Provider) -> Result<&str> {
        let unmapped = || MarketDataError::UnmappedIdentifier {
            coin_id: coin_id.to_string(),
            provider: provider.to_string(),
        };
        self.record(coin_id)
            .ok_or_else(unmapped)?
            .provider_id(provider)
            .ok_or_else(unmapped)
    }

    /// Reverse lookup from an identifier as returned by the provider.
    pub fn coin_for_upstream(&self, provider: Provider, raw: &str) -> Result<&CoinRecord> {
        let idx = match provider {
            Provider::Pyth => self.by_pyth.get(&normalize_feed_id(raw)),
            Provider::CoinGecko => self.by_coingecko.get(&raw.trim().to_ascii_lowercase()),
        };
        idx.map(|&i| &self.coins[i])
            .ok_or_else(|| MarketDataError::UnknownUpstreamId(format!("{} {}", provider, raw)))
    }
}
