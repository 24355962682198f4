//! Harvester: bounded worker pool over the adapter registry

use super::report::{HarvestReport, JurisdictionReport, JurisdictionStatus};
use super::HarvestSettings;
use crate::adapter::{AdapterError, AdapterRegistry, MalformedRecord, SourceAdapter};
use crate::cache::{events_key, put_events, CacheError, ResultCache};
use crate::model::{today, Event};
use crate::storage::{BatchSummary, EventStore, StorageError, StorageResult};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type WorkQueue = Arc<Mutex<VecDeque<(String, Arc<dyn SourceAdapter>)>>>;

/// Runs harvest cycles. Cheap to clone; clones share the registry, store,
/// and cache.
#[derive(Clone)]
pub struct Harvester {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn EventStore>,
    cache: Arc<dyn ResultCache>,
    settings: HarvestSettings,
}

impl Harvester {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn EventStore>,
        cache: Arc<dyn ResultCache>,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            registry,
            store,
            cache,
            settings,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Harvest every registered jurisdiction, or only `only` when given.
    ///
    /// Never fails as a whole: each jurisdiction gets its own status in the
    /// report, including unknown keys and those cut off by the deadline.
    pub async fn run_cycle(&self, only: Option<&[String]>) -> HarvestReport {
        let mut report = HarvestReport::new();
        let keys: Vec<String> = match only {
            Some(keys) => keys
                .iter()
                .map(|k| k.trim().to_uppercase())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            None => self.registry.list(),
        };

        let mut queue = VecDeque::new();
        let mut pending = BTreeMap::new();
        for key in keys {
            match self.registry.get(&key) {
                Some(adapter) => {
                    pending.insert(key.clone(), adapter.jurisdiction().to_string());
                    queue.push_back((key, adapter));
                }
                None => {
                    warn!(jurisdiction = %key, "no adapter registered");
                    report.record(JurisdictionReport::failed(&key, &key, "no adapter registered"));
                }
            }
        }

        let total = queue.len();
        if total == 0 {
            report.finish();
            return report;
        }

        let width = self.settings.pool_width.max(1).min(total);
        info!(
            cycle_id = %report.cycle_id,
            jurisdictions = total,
            pool_width = width,
            "harvest cycle starting"
        );

        let queue: WorkQueue = Arc::new(Mutex::new(queue));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        for _ in 0..width {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let harvester = self.clone();
            workers.spawn(async move {
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((key, adapter)) = next else {
                        break;
                    };
                    let result = harvester.harvest_jurisdiction(&key, adapter).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.settings.batch_deadline;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(result)) => {
                    pending.remove(&result.key);
                    report.record(result);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        cycle_id = %report.cycle_id,
                        unfinished = pending.len(),
                        "batch deadline reached"
                    );
                    break;
                }
            }
        }
        workers.abort_all();

        // Results that landed between the deadline and the abort still count.
        while let Ok(result) = rx.try_recv() {
            pending.remove(&result.key);
            report.record(result);
        }
        for (key, jurisdiction) in pending {
            report.record(JurisdictionReport::failed(
                &key,
                &jurisdiction,
                "batch deadline exceeded",
            ));
        }

        report.finish();
        info!(
            cycle_id = %report.cycle_id,
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            "harvest cycle finished"
        );
        report
    }

    async fn harvest_jurisdiction(
        &self,
        key: &str,
        adapter: Arc<dyn SourceAdapter>,
    ) -> JurisdictionReport {
        let started = std::time::Instant::now();
        let jurisdiction = adapter.jurisdiction().to_string();
        let timeout = self.settings.adapter_timeout;
        // Malformed records from the latest attempt, kept even when it fails
        let skipped: Arc<Mutex<Vec<MalformedRecord>>> = Arc::default();

        let (result, attempts) = self
            .settings
            .retry
            .run(key, |attempt| {
                let adapter = Arc::clone(&adapter);
                let skipped = Arc::clone(&skipped);
                async move {
                    debug!(jurisdiction = %key, attempt, "scraping");
                    skipped.lock().unwrap_or_else(PoisonError::into_inner).clear();
                    let output = match tokio::time::timeout(timeout, adapter.scrape()).await {
                        Ok(result) => result?,
                        Err(_) => return Err(AdapterError::Timeout(timeout)),
                    };
                    *skipped.lock().unwrap_or_else(PoisonError::into_inner) = output.malformed.clone();
                    if output.events.is_empty() && !output.malformed.is_empty() {
                        return Err(AdapterError::SourceFormatChanged(format!(
                            "no valid events, {} malformed records",
                            output.malformed.len()
                        )));
                    }
                    Ok(output)
                }
            })
            .await;

        let mut malformed = {
            let mut last = skipped.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *last)
        };
        let status = match result {
            Err(e) => {
                warn!(
                    jurisdiction = %jurisdiction,
                    attempts,
                    error = %e,
                    "harvest failed, keeping previous data"
                );
                JurisdictionStatus::Failed {
                    error: e.to_string(),
                }
            }
            Ok(output) => {
                for record in &output.malformed {
                    debug!(jurisdiction = %jurisdiction, record = %record, "skipped malformed record");
                }
                malformed = output.malformed;

                if output.events.is_empty() {
                    let reason = "source listed no meetings".to_string();
                    info!(jurisdiction = %jurisdiction, reason = %reason, "harvest empty");
                    self.refresh_cache(&jurisdiction).await;
                    JurisdictionStatus::Empty { reason }
                } else {
                    let scraped = output.events.len();
                    match self.persist(&jurisdiction, output.events).await {
                        Ok(summary) => {
                            for rejection in &summary.rejected {
                                warn!(
                                    jurisdiction = %jurisdiction,
                                    fingerprint = %rejection.fingerprint,
                                    reason = %rejection.reason,
                                    "event rejected by store"
                                );
                            }
                            info!(
                                jurisdiction = %jurisdiction,
                                events = scraped,
                                inserted = summary.inserted,
                                updated = summary.updated,
                                "harvest persisted"
                            );
                            self.refresh_cache(&jurisdiction).await;
                            JurisdictionStatus::Succeeded {
                                events: scraped,
                                inserted: summary.inserted,
                                updated: summary.updated,
                                rejected: summary.rejected.len(),
                            }
                        }
                        Err(e) => {
                            error!(jurisdiction = %jurisdiction, error = %e, "persisting harvest failed");
                            JurisdictionStatus::Failed {
                                error: format!("persistence failed: {e}"),
                            }
                        }
                    }
                }
            }
        };

        JurisdictionReport {
            key: key.to_string(),
            jurisdiction,
            status,
            attempts,
            malformed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn persist(&self, jurisdiction: &str, events: Vec<Event>) -> StorageResult<BatchSummary> {
        let store = Arc::clone(&self.store);
        let jurisdiction = jurisdiction.to_string();
        tokio::task::spawn_blocking(move || store.upsert_events(&jurisdiction, &events))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Rebuild the jurisdiction's cache entry from the store. Errors are
    /// logged; the store stays authoritative either way.
    async fn refresh_cache(&self, jurisdiction: &str) {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let ttl = self.settings.cache_ttl;
        let code = jurisdiction.to_string();

        let outcome = tokio::task::spawn_blocking(move || -> Result<usize, CacheError> {
            let events = store.upcoming_events(&code, today())?;
            if events.is_empty() {
                cache.invalidate(&events_key(&code))?;
            } else {
                put_events(cache.as_ref(), &code, &events, ttl)?;
            }
            Ok(events.len())
        })
        .await;

        match outcome {
            Ok(Ok(cached)) => debug!(jurisdiction, cached, "cache rebuilt"),
            Ok(Err(e)) => warn!(jurisdiction, error = %e, "cache rebuild failed"),
            Err(e) => warn!(jurisdiction, error = %e, "cache rebuild task failed"),
        }
    }
}
