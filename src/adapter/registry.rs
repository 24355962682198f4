//! Adapter registry: jurisdiction key to adapter
//!
//! Keys are case-insensitive and stored uppercased. Registering a key twice
//! replaces the earlier adapter and hands it back.

use super::fetch::Fetcher;
use super::sources;
use super::traits::SourceAdapter;
use crate::config::SourceSpec;
use crate::model::CalendarSource;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Calendars behind one registered key.
#[derive(Debug, Clone)]
pub struct RegisteredSource {
    pub key: String,
    pub jurisdiction: String,
    pub calendars: Vec<CalendarSource>,
}

/// Lookup table the orchestrator and CLI resolve keys through.
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
    initialized: bool,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Register under `key`, returning the adapter it replaced, if any.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Option<Arc<dyn SourceAdapter>> {
        let key = key.into().to_uppercase();
        let previous = self.adapters.insert(key.clone(), adapter);
        if previous.is_some() {
            tracing::info!(key = %key, "replaced registered adapter");
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&key.to_uppercase()).cloned()
    }

    /// Registered keys, sorted.
    pub fn list(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Keys whose adapter serves `jurisdiction`, sorted.
    pub fn keys_for_jurisdiction(&self, jurisdiction: &str) -> Vec<String> {
        let code = jurisdiction.trim();
        self.adapters
            .iter()
            .filter(|(_, adapter)| adapter.jurisdiction().eq_ignore_ascii_case(code))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Every registered key with the calendars feeding it.
    pub fn calendar_sources(&self) -> Vec<RegisteredSource> {
        self.adapters
            .iter()
            .map(|(key, adapter)| RegisteredSource {
                key: key.clone(),
                jurisdiction: adapter.jurisdiction().to_string(),
                calendars: adapter.calendar_sources(),
            })
            .collect()
    }

    /// Build and register an adapter for each configured source.
    ///
    /// Runs once; later calls are no-ops returning 0. Returns how many
    /// adapters this call added; a repeated key replaces, not adds.
    pub fn initialize(&mut self, specs: &[SourceSpec], fetcher: Arc<dyn Fetcher>) -> usize {
        if self.initialized {
            return 0;
        }
        let before = self.adapters.len();
        for spec in specs {
            let adapter = sources::build(spec, fetcher.clone());
            self.register(spec.key.clone(), adapter);
        }
        self.initialized = true;
        tracing::info!(adapters = self.adapters.len(), "adapter registry initialized");
        self.adapters.len() - before
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
