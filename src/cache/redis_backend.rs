// src/cache/redis_backend.rs
//! Redis-based cache backend.

use super::backend::{CacheBackend, CacheEntry};
use crate::error::{MarketDataError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::fmt;
use std::time::Duration;

/// A shared Redis cache client.
/// Uses a `ConnectionManager` for automatic reconnection and resilience.
#[derive(Clone)]
pub struct RedisBackend {
    conn_manager: ConnectionManager,
    redis_url: String,
}

// ConnectionManager is not Debug; also keeps the password out of logs
impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("redis_url", &redact(&self.redis_url))
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

fn redact(url: &str) -> String {
    match (url.find("://:"), url.find('@')) {
        (Some(start), Some(at)) if start + 4 <= at => {
            format!("{}***{}", &url[..start + 4], &url[at..])
        }
        _ => url.to_string(),
    }
}

impl RedisBackend {
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        info!("Initializing Redis connection manager for URL: {}", redact(redis_url));
        let client = redis::Client::open(redis_url)?;
        let conn_manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                error!("Timed out connecting to Redis after {:?}", connect_timeout);
                MarketDataError::Cache(format!("connect timeout after {:?}", connect_timeout))
            })?
            .map_err(|e| {
                error!("Failed to create Redis ConnectionManager: {}", e);
                MarketDataError::Cache(format!("Failed to create Redis ConnectionManager: {}", e))
            })?;

        let backend = Self {
            conn_manager,
            redis_url: redis_url.to_string(),
        };
        backend.ping().await?;
        info!("Redis ConnectionManager initialized successfully");
        Ok(backend)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(MarketDataError::from)
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn_manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value_str)) => match serde_json::from_str::<CacheEntry>(&value_str) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    // Unreadable payload (older format, foreign writer): treat as absent
                    warn!("Failed to deserialize cached entry for key {}: {}", key, e);
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                error!("Redis GET error for key {}: {}", key, e);
                Err(e.into())
            }
        }
    }

    async fn set(&self, entry: &CacheEntry, retain_for: Duration) -> Result<()> {
        let value_str = serde_json::to_string(entry)
            .map_err(|e| MarketDataError::Cache(format!("serialize {}: {}", entry.key, e)))?;
        let ttl_secs = retain_for.as_secs().max(1);
        let mut conn = self.conn_manager.clone();

        match conn.set_ex::<_, _, ()>(&entry.key, value_str, ttl_secs).await {
            Ok(_) => {
                debug!("Cache SETEX success for key: {} with retention: {}s", entry.key, ttl_secs);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to SETEX key '{}' in Redis: {}", entry.key, e);
                Err(e.into())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        match conn.del::<_, i32>(key).await {
            Ok(count) => Ok(count > 0),
            Err(e) => {
                error!("Redis DEL error for key {}: {}", key, e);
                Err(e.into())
            }
        }
    }

    async fn clear(&self, pattern: Option<&str>) -> Result<usize> {
        let mut conn = self.conn_manager.clone();
        match pattern {
            Some(p) => {
                let keys: Vec<String> = conn.keys(p).await?;
                if keys.is_empty() {
                    return Ok(0);
                }
                let removed: usize = conn.del(&keys).await?;
                Ok(removed)
            }
            None => {
                let count: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
                redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await?;
                Ok(count)
            }
        }
    }
}
