//! Scrape results and adapter errors
//!
//! Partial success is the normal case: valid events are returned even when
//! some records are dropped. Dropped records are carried alongside so the
//! orchestrator can count and report them.

use super::fetch::FetchError;
use crate::model::Event;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// A single source record that could not be normalized and was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedRecord {
    /// Where the record came from (calendar name, URL, or record id)
    pub origin: String,
    /// Why it was dropped
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.origin, self.reason)
    }
}

/// The result of one successful `scrape()`.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutput {
    pub events: Vec<Event>,
    pub malformed: Vec<MalformedRecord>,
}

impl ScrapeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Record a dropped unit and log it.
    pub fn skip(&mut self, record: MalformedRecord) {
        tracing::warn!(origin = %record.origin, reason = %record.reason, "dropping malformed record");
        self.malformed.push(record);
    }

    /// Fold another partial result into this one.
    pub fn merge(&mut self, other: ScrapeOutput) {
        self.events.extend(other.events);
        self.malformed.extend(other.malformed);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Whole-source failures. A failed scrape must never be mistaken for an
/// empty one: callers keep previously harvested data on error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("source unreachable: {0}")]
    SourceUnreachable(String),
    #[error("source format changed: {0}")]
    SourceFormatChanged(String),
    #[error("adapter misconfigured: {0}")]
    Misconfigured(String),
    #[error("adapter timed out after {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AdapterError::Misconfigured(_))
    }
}

impl From<FetchError> for AdapterError {
    fn from(err: FetchError) -> Self {
        AdapterError::SourceUnreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_records_malformed_unit() {
        let mut output = ScrapeOutput::new();
        output.skip(MalformedRecord::new("row 3", "unparsable date 'TBD'"));
        assert!(output.is_empty());
        assert_eq!(output.malformed.len(), 1);
        assert_eq!(output.malformed[0].to_string(), "row 3: unparsable date 'TBD'");
    }

    #[test]
    fn misconfiguration_is_not_retryable() {
        assert!(!AdapterError::Misconfigured("no api key".into()).is_retryable());
        assert!(AdapterError::SourceUnreachable("dns".into()).is_retryable());
        assert!(AdapterError::SourceFormatChanged("no table".into()).is_retryable());
        assert!(AdapterError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn fetch_errors_surface_as_unreachable() {
        let err: AdapterError = FetchError::Status {
            url: "https://example.org".into(),
            status: 503,
        }
        .into();
        assert!(matches!(err, AdapterError::SourceUnreachable(_)));
    }
}
