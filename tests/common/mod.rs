//! Common test utilities for harvest scenarios
//!
//! Scripted adapters stand in for real sources so cycles can be replayed
//! deterministically against a temporary store and an in-memory cache.

#![allow(dead_code)]

use async_trait::async_trait;
use capitol::adapter::{AdapterError, AdapterRegistry, ScrapeOutput, SourceAdapter};
use capitol::cache::MemoryCache;
use capitol::harvest::{HarvestSettings, Harvester, RetryPolicy};
use capitol::model::{Bill, Event, Level};
use capitol::storage::{OpenStore, SqliteStore};
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// === Scripted adapter ===

struct Step {
    delay: Duration,
    result: Result<ScrapeOutput, AdapterError>,
}

/// Adapter that replays a script of results, one per `scrape()` call.
/// The last step repeats once the script runs out.
pub struct ScriptedAdapter {
    key: String,
    jurisdiction: String,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Result<ScrapeOutput, AdapterError>>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            jurisdiction: key.to_string(),
            steps: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve a jurisdiction other than the registry key.
    pub fn serving(mut self, jurisdiction: &str) -> Self {
        self.jurisdiction = jurisdiction.to_string();
        self
    }

    fn push(self, delay: Duration, result: Result<ScrapeOutput, AdapterError>) -> Self {
        self.steps.lock().unwrap().push_back(Step { delay, result });
        self
    }

    pub fn then_events(self, events: Vec<Event>) -> Self {
        let mut output = ScrapeOutput::new();
        for event in events {
            output.push_event(event);
        }
        self.push(Duration::ZERO, Ok(output))
    }

    pub fn then_output(self, output: ScrapeOutput) -> Self {
        self.push(Duration::ZERO, Ok(output))
    }

    pub fn then_empty(self) -> Self {
        self.push(Duration::ZERO, Ok(ScrapeOutput::new()))
    }

    pub fn then_fail(self, error: AdapterError) -> Self {
        self.push(Duration::ZERO, Err(error))
    }

    /// Sleep for `delay`, then return `events`.
    pub fn then_slow(self, delay: Duration, events: Vec<Event>) -> Self {
        let mut output = ScrapeOutput::new();
        for event in events {
            output.push_event(event);
        }
        self.push(delay, Ok(output))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    fn level(&self) -> Level {
        Level::State
    }

    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        let Some(step) = step else {
            let last = self.last.lock().unwrap().clone();
            return last
                .unwrap_or_else(|| Err(AdapterError::SourceUnreachable("script exhausted".into())));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        *self.last.lock().unwrap() = Some(step.result.clone());
        step.result
    }
}

// === Fixtures ===

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn days_ahead(days: u64) -> NaiveDate {
    today().checked_add_days(Days::new(days)).unwrap()
}

/// An upcoming meeting `days` out, scraped at `scraped_at`.
pub fn meeting(
    jurisdiction: &str,
    name: &str,
    days: u64,
    location: &str,
    scraped_at: DateTime<Utc>,
) -> Event {
    Event::new(
        jurisdiction,
        name,
        days_ahead(days),
        Level::State,
        "https://leg.example/calendar",
        scraped_at,
    )
    .with_location(location)
}

pub fn bill(jurisdiction: &str, number: &str, title: &str) -> Bill {
    Bill::new(jurisdiction, number, title, "https://leg.example/bills")
}

/// Short timeouts and near-instant backoff.
pub fn fast_settings() -> HarvestSettings {
    HarvestSettings {
        pool_width: 4,
        adapter_timeout: Duration::from_secs(2),
        batch_deadline: Duration::from_secs(10),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(5),
        },
        cache_ttl: Duration::from_secs(600),
    }
}

/// Temporary store, in-memory cache, and a harvester over `adapters`.
pub struct Fixture {
    pub store: Arc<SqliteStore>,
    pub cache: Arc<MemoryCache>,
    pub harvester: Harvester,
}

impl Fixture {
    pub fn new(adapters: Vec<Arc<ScriptedAdapter>>) -> Self {
        Self::with_settings(adapters, fast_settings())
    }

    pub fn with_settings(adapters: Vec<Arc<ScriptedAdapter>>, settings: HarvestSettings) -> Self {
        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            let key = adapter.key().to_string();
            registry.register(key, adapter);
        }
        let store = Arc::new(SqliteStore::open_temporary().unwrap());
        let cache = Arc::new(MemoryCache::new());
        let harvester = Harvester::new(Arc::new(registry), store.clone(), cache.clone(), settings);
        Self {
            store,
            cache,
            harvester,
        }
    }
}
