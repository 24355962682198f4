//! Result cache for assembled per-jurisdiction event lists
//!
//! Keys are `events:<CODE>`. Payloads are JSON so the SQLite backend can
//! hold them across processes; expiry is checked on read.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::model::Event;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Default lifetime of a cached event list.
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("cache storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// One cache entry as seen by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub expires_in_secs: u64,
    pub expired: bool,
    pub size_bytes: usize,
}

/// Backend-agnostic cache operations.
pub trait ResultCache: Send + Sync {
    /// Payload for `key` if present and unexpired.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    fn put(&self, key: &str, payload: String, ttl: Duration) -> CacheResult<()>;

    /// Remove `key`; returns whether it was present.
    fn invalidate(&self, key: &str) -> CacheResult<bool>;

    /// Entries whose key starts with `prefix` (all when `None`), sorted by key.
    fn list_entries(&self, prefix: Option<&str>) -> CacheResult<Vec<CacheEntryInfo>>;
}

/// `events:<CODE>` for a jurisdiction.
pub fn events_key(jurisdiction: &str) -> String {
    format!("events:{}", jurisdiction.trim().to_uppercase())
}

/// Cached events for a jurisdiction. An undecodable payload counts as a
/// miss and is dropped.
pub fn get_events(cache: &dyn ResultCache, jurisdiction: &str) -> CacheResult<Option<Vec<Event>>> {
    let key = events_key(jurisdiction);
    let Some(payload) = cache.get(&key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&payload) {
        Ok(events) => Ok(Some(events)),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
            cache.invalidate(&key)?;
            Ok(None)
        }
    }
}

pub fn put_events(
    cache: &dyn ResultCache,
    jurisdiction: &str,
    events: &[Event],
    ttl: Duration,
) -> CacheResult<()> {
    let payload = serde_json::to_string(events)?;
    cache.put(&events_key(jurisdiction), payload, ttl)
}
