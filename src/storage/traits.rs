//! Storage trait definitions

use crate::model::{Bill, Event};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// A record violated a constraint other than its upsert key.
    #[error("Persistence conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Conflict(message.clone().unwrap_or_else(|| failure.to_string()))
            }
            _ => StorageError::Database(err),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Whether an upsert created or refreshed a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// A record rejected from a batch; the rest of the batch still commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRejection {
    pub fingerprint: String,
    pub reason: String,
}

/// What one jurisdiction's batch write did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub updated: usize,
    pub bills: usize,
    pub links: usize,
    pub rejected: Vec<RecordRejection>,
}

/// Result of re-deriving every stored fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefingerprintSummary {
    pub examined: usize,
    pub updated: usize,
    /// Rows folded into another row that now shares their fingerprint
    pub merged: usize,
}

/// Trait for event storage backends
///
/// Every write is an upsert keyed on a stable identity: events on their
/// fingerprint, bills on `(jurisdiction_code, bill_number)`, links on the
/// pair of ids. Replaying the same input leaves the store unchanged apart
/// from `last_updated_at`.
///
/// Implementations must be thread-safe (Send + Sync); writes for different
/// jurisdictions may arrive concurrently.
pub trait EventStore: Send + Sync {
    // === Single-record writes ===

    /// Insert or refresh an event by fingerprint. Does not touch its bills.
    fn upsert_event(&self, event: &Event) -> StorageResult<UpsertOutcome>;

    /// Insert or refresh a bill by `(jurisdiction_code, bill_number)`.
    ///
    /// A placeholder title never overwrites a real one, and enrichment
    /// fields are never touched.
    fn upsert_bill(&self, bill: &Bill) -> StorageResult<i64>;

    /// Associate a bill with an event; a no-op if already linked.
    fn link_event_bill(&self, event_id: i64, bill_id: i64) -> StorageResult<()>;

    // === Batch writes ===

    /// Persist one jurisdiction's harvest: events, their bills, and links,
    /// in a single transaction. A record failing a constraint is rejected
    /// alone; any other failure rolls back the whole batch.
    fn upsert_events(&self, jurisdiction: &str, events: &[Event]) -> StorageResult<BatchSummary>;

    /// Upsert several bills, returning their ids in input order.
    fn upsert_bills(&self, bills: &[Bill]) -> StorageResult<Vec<i64>>;

    /// Link several `(event_id, bill_id)` pairs.
    fn link_event_bills(&self, links: &[(i64, i64)]) -> StorageResult<()>;

    // === Reads ===

    /// Events for a jurisdiction dated on or after `from`, with their bills,
    /// ordered by date then time.
    fn upcoming_events(&self, jurisdiction: &str, from: NaiveDate) -> StorageResult<Vec<Event>>;

    fn event_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Option<Event>>;

    /// Number of stored events, optionally for one jurisdiction.
    fn event_count(&self, jurisdiction: Option<&str>) -> StorageResult<usize>;

    /// Bills, optionally for one jurisdiction, most recently updated first.
    fn list_bills(&self, jurisdiction: Option<&str>) -> StorageResult<Vec<Bill>>;

    fn bill_by_number(&self, jurisdiction: &str, bill_number: &str) -> StorageResult<Option<Bill>>;

    // === Enrichment ===

    /// Store a summary together with the content hash it was generated from.
    fn record_summary(
        &self,
        bill_id: i64,
        summary: &str,
        content_hash: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Record a failed enrichment; any previous summary is kept.
    fn record_enrichment_failure(&self, bill_id: i64, error: &str) -> StorageResult<()>;

    // === Maintenance ===

    /// Delete events dated before `cutoff`; returns how many were removed.
    fn purge_events_before(&self, cutoff: NaiveDate) -> StorageResult<usize>;

    /// Recompute every fingerprint with the current algorithm, merging rows
    /// that collide.
    fn refingerprint_all(&self) -> StorageResult<RefingerprintSummary>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: EventStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create a throwaway store that is deleted on drop (useful for testing)
    fn open_temporary() -> StorageResult<Self>;
}
