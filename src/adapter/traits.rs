//! SourceAdapter trait: the contract every source implements
//!
//! An adapter turns one jurisdiction's native calendar format into
//! canonical events. How it gets there (HTML scanning, embedded JSON, a
//! third-party API, PDF text) is its own business.

use super::output::{AdapterError, ScrapeOutput};
use crate::model::{CalendarSource, Level};
use async_trait::async_trait;

/// The contract adapters implement.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry key (usually the jurisdiction code, e.g. `NV` or `WA-SEATTLE`)
    fn key(&self) -> &str;

    /// Jurisdiction code stamped on every produced event
    fn jurisdiction(&self) -> &str;

    fn level(&self) -> Level;

    /// Calendars feeding this jurisdiction, for observability.
    fn calendar_sources(&self) -> Vec<CalendarSource> {
        Vec::new()
    }

    /// Fetch and normalize.
    ///
    /// Malformed records are dropped and reported in the output; an
    /// unreachable or unrecognizable source is an `Err`, never an empty `Ok`.
    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError>;
}
