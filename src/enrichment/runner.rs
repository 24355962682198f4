//! Enrichment runner: gate, summarize, record

use super::gate::needs_enrichment;
use super::summarizer::{EnrichmentError, Summarizer, SummaryRequest};
use crate::model::Bill;
use crate::storage::{EventStore, StorageError, StorageResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    /// Bills looked at
    pub considered: usize,
    /// Bills whose stored summary is still current
    pub fresh: usize,
    pub summarized: usize,
    pub failed: usize,
}

/// Summarizes stale bills, separately from any harvest.
pub struct EnrichmentRunner {
    store: Arc<dyn EventStore>,
    summarizer: Arc<dyn Summarizer>,
    concurrency: usize,
    timeout: Duration,
}

impl EnrichmentRunner {
    pub fn new(store: Arc<dyn EventStore>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            store,
            summarizer,
            concurrency: 2,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize up to `limit` bills that fail the gate.
    ///
    /// Only loading the bill list can fail the run; per-bill failures are
    /// recorded on the bill and counted.
    pub async fn run(&self, limit: Option<usize>) -> StorageResult<EnrichmentReport> {
        let store = Arc::clone(&self.store);
        let bills = tokio::task::spawn_blocking(move || store.list_bills(None))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        let mut report = EnrichmentReport {
            considered: bills.len(),
            ..Default::default()
        };
        let mut stale: Vec<Bill> = bills.into_iter().filter(needs_enrichment).collect();
        report.fresh = report.considered - stale.len();
        if let Some(limit) = limit {
            stale.truncate(limit);
        }
        info!(
            considered = report.considered,
            fresh = report.fresh,
            queued = stale.len(),
            "enrichment starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for bill in stale {
            let Some(bill_id) = bill.id else {
                continue;
            };
            let semaphore = Arc::clone(&semaphore);
            let summarizer = Arc::clone(&self.summarizer);
            let store = Arc::clone(&self.store);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(enrich_one(bill_id, bill, summarizer, store, timeout).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(true)) => report.summarized += 1,
                Ok(Some(false)) | Ok(None) => report.failed += 1,
                Err(e) => {
                    warn!(error = %e, "enrichment task failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            summarized = report.summarized,
            failed = report.failed,
            "enrichment finished"
        );
        Ok(report)
    }
}

/// Returns whether a summary was stored.
async fn enrich_one(
    bill_id: i64,
    bill: Bill,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn EventStore>,
    timeout: Duration,
) -> bool {
    // Hash what is sent, not what might be stored by the time we answer.
    let content_hash = bill.current_content_hash();
    let request = SummaryRequest::from_bill(&bill);

    let outcome = match tokio::time::timeout(timeout, summarizer.summarize(&request)).await {
        Ok(result) => result,
        Err(_) => Err(EnrichmentError::Timeout(timeout)),
    };

    let number = bill.bill_number.clone();
    let written = tokio::task::spawn_blocking(move || match &outcome {
        Ok(summary) => store
            .record_summary(bill_id, summary, &content_hash, Utc::now())
            .map(|_| true),
        Err(e) => store
            .record_enrichment_failure(bill_id, &e.to_string())
            .map(|_| false),
    })
    .await;

    match written {
        Ok(Ok(true)) => {
            debug!(bill = %number, "summary stored");
            true
        }
        Ok(Ok(false)) => {
            warn!(bill = %number, "summarization failed, previous summary kept");
            false
        }
        Ok(Err(e)) => {
            warn!(bill = %number, error = %e, "recording enrichment result failed");
            false
        }
        Err(e) => {
            warn!(bill = %number, error = %e, "enrichment write task failed");
            false
        }
    }
}
