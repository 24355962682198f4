//! In-process cache on `DashMap`

use super::{CacheEntryInfo, CacheResult, ResultCache};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    stored_at: DateTime<Utc>,
    /// Monotonic insertion time; expiry is measured against this
    inserted: Instant,
    ttl: Duration,
}

impl Entry {
    fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.inserted.elapsed())
    }

    fn is_expired(&self) -> bool {
        self.inserted.elapsed() >= self.ttl
    }
}

/// Cache living as long as the process. Entries expire lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let hit = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.payload.clone())),
            Some(_) => true,
            None => false,
        };
        if hit {
            // The read guard is released before removing.
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    fn put(&self, key: &str, payload: String, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                payload,
                stored_at: Utc::now(),
                inserted: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    fn invalidate(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn list_entries(&self, prefix: Option<&str>) -> CacheResult<Vec<CacheEntryInfo>> {
        let mut entries: Vec<CacheEntryInfo> = self
            .entries
            .iter()
            .filter(|item| prefix.map_or(true, |p| item.key().starts_with(p)))
            .map(|item| {
                let entry = item.value();
                CacheEntryInfo {
                    key: item.key().clone(),
                    stored_at: entry.stored_at,
                    ttl_secs: entry.ttl.as_secs(),
                    expires_in_secs: entry.remaining().as_secs(),
                    expired: entry.is_expired(),
                    size_bytes: entry.payload.len(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
