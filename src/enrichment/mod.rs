//! Bill enrichment
//!
//! Summaries are generated outside the harvest path. The content-hash gate
//! decides which bills need one; a failed call leaves the previous summary
//! in place and is retried on a later run because the gate still says so.

mod gate;
mod runner;
mod summarizer;

pub use gate::needs_enrichment;
pub use runner::{EnrichmentReport, EnrichmentRunner};
pub use summarizer::{EnrichmentError, HttpSummarizer, MockSummarizer, Summarizer, SummaryRequest};
