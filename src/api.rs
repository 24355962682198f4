//! Consumer-facing read API.
//!
//! `CapitolApi` is the single entry point for the UI and the CLI. Reads go
//! cache first, then the store, then (when a harvester is attached and the
//! store has nothing) a one-jurisdiction harvest. Internal failures degrade
//! to whatever data exists; they are logged, never returned.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, CacheEntryInfo, CacheResult, ResultCache};
use crate::harvest::Harvester;
use crate::model::{today, Event};
use crate::storage::{EventStore, StorageError, StorageResult};

/// Single entry point for consumer-facing operations.
#[derive(Clone)]
pub struct CapitolApi {
    store: Arc<dyn EventStore>,
    cache: Arc<dyn ResultCache>,
    harvester: Option<Harvester>,
    cache_ttl: Duration,
}

impl CapitolApi {
    pub fn new(store: Arc<dyn EventStore>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            store,
            cache,
            harvester: None,
            cache_ttl: cache::DEFAULT_TTL,
        }
    }

    /// Allow reads to trigger a harvest when nothing is stored yet.
    pub fn with_harvester(mut self, harvester: Harvester) -> Self {
        self.cache_ttl = harvester.settings().cache_ttl;
        self.harvester = Some(harvester);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    // --- Read ---

    /// Upcoming events (today onwards) for a jurisdiction, bills nested.
    ///
    /// Empty only when nothing for the jurisdiction has ever been harvested.
    pub async fn upcoming_events(&self, jurisdiction: &str) -> Vec<Event> {
        let code = jurisdiction.trim().to_uppercase();
        let from = today();

        match cache::get_events(self.cache.as_ref(), &code) {
            Ok(Some(events)) => {
                let upcoming: Vec<Event> = events.into_iter().filter(|e| e.date >= from).collect();
                if !upcoming.is_empty() {
                    tracing::debug!(jurisdiction = %code, events = upcoming.len(), "cache hit");
                    return upcoming;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(jurisdiction = %code, error = %e, "cache read failed"),
        }

        let stored = self.load_and_cache(&code).await;
        if !stored.is_empty() {
            return stored;
        }

        let Some(harvester) = &self.harvester else {
            return stored;
        };
        let mut keys = harvester.registry().keys_for_jurisdiction(&code);
        if keys.is_empty() {
            keys.push(code.clone());
        }
        tracing::info!(jurisdiction = %code, keys = ?keys, "nothing stored, harvesting on demand");
        let report = harvester.run_cycle(Some(&keys)).await;
        for key in &keys {
            if let Some(status) = report.status(key) {
                tracing::info!(jurisdiction = %code, key = %key, status = status.label(), "on-demand harvest done");
            }
        }
        self.load_and_cache(&code).await
    }

    // --- Cache administration ---

    /// Cache entries, optionally filtered by key prefix.
    pub fn cache_entries(&self, prefix: Option<&str>) -> CacheResult<Vec<CacheEntryInfo>> {
        self.cache.list_entries(prefix)
    }

    /// Drop a jurisdiction's cache entry so the next read rebuilds it.
    /// Returns whether an entry existed.
    pub fn refresh(&self, jurisdiction: &str) -> CacheResult<bool> {
        let removed = self.cache.invalidate(&cache::events_key(jurisdiction))?;
        tracing::info!(jurisdiction = %jurisdiction.trim().to_uppercase(), removed, "cache entry invalidated");
        Ok(removed)
    }

    /// Store-backed read that refills the cache; errors degrade to empty.
    async fn load_and_cache(&self, code: &str) -> Vec<Event> {
        let events = match self.read_store(code).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(jurisdiction = %code, error = %e, "store read failed");
                return Vec::new();
            }
        };
        if !events.is_empty() {
            if let Err(e) = cache::put_events(self.cache.as_ref(), code, &events, self.cache_ttl) {
                tracing::warn!(jurisdiction = %code, error = %e, "cache fill failed");
            }
        }
        events
    }

    async fn read_store(&self, code: &str) -> StorageResult<Vec<Event>> {
        let store = Arc::clone(&self.store);
        let code = code.to_string();
        let from = today();
        tokio::task::spawn_blocking(move || store.upcoming_events(&code, from))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}
