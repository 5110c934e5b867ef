//! In-process cache backend, used when Redis is unreachable or disabled.

use super::backend::{glob_match, CacheBackend, CacheEntry};
use crate::error::Result;
use crate::utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    retain_until: DateTime<Utc>,
}

pub struct MemoryBackend {
    entries: DashMap<String, Slot>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trims the map back to `max_entries` after an insert: anything past
    /// retention first, then the soonest to expire. `keep` is never evicted.
    /// Concurrent writers may briefly overshoot; each one trims after its own
    /// insert, so the bound holds again once they return.
    fn evict_over_capacity(&self, now: DateTime<Utc>, keep: &str) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|key, slot| key == keep || slot.retain_until > now);
        if self.entries.len() < before {
            debug!("🗑️ Dropped {} retained-out entries", before - self.entries.len());
        }
        while self.entries.len() > self.max_entries {
            let victim = self
                .entries
                .iter()
                .filter(|item| item.key() != keep)
                .min_by_key(|item| item.value().entry.expires_at)
                .map(|item| item.key().clone());
            let Some(key) = victim else { break };
            self.entries.remove(&key);
            debug!("🗑️ Evicted local cache entry: {}", key);
        }
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::days(365))
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = self.clock.now();
        let found = self.entries.get(key).map(|slot| slot.clone());
        match found {
            Some(slot) if slot.retain_until <= now => {
                self.entries.remove_if(key, |_, s| s.retain_until <= now);
                Ok(None)
            }
            Some(slot) => Ok(Some(slot.entry)),
            None => Ok(None),
        }
    }

    async fn set(&self, entry: &CacheEntry, retain_for: Duration) -> Result<()> {
        let now = self.clock.now();
        // Whole-slot replacement keeps {value, expires_at} consistent for readers
        self.entries.insert(
            entry.key.clone(),
            Slot {
                entry: entry.clone(),
                retain_until: now + to_chrono(retain_for),
            },
        );
        self.evict_over_capacity(now, &entry.key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear(&self, pattern: Option<&str>) -> Result<usize> {
        let before = self.entries.len();
        match pattern {
            Some(p) => self.entries.retain(|key, _| !glob_match(p, key)),
            None => self.entries.clear(),
        }
        Ok(before.saturating_sub(self.entries.len()))
    }
}
