use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One cached value with its logical expiry.
///
/// Backends keep the entry around for a retention period past `expires_at` so
/// an expired value can still be served as stale when upstream is down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    /// Returns the entry whether or not it is logically expired
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Stores `entry`, keeping it physically for `retain_for` from now
    async fn set(&self, entry: &CacheEntry, retain_for: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes keys matching a `*` glob, or everything when `pattern` is `None`
    async fn clear(&self, pattern: Option<&str>) -> Result<usize>;
}

/// Matches `key` against a glob where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !key.starts_with(first) || key.len() < first.len() + last.len() {
        return false;
    }
    let mut rest = &key[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        if middle.is_empty() {
            continue;
        }
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
