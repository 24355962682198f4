//! Harvest cycles
//!
//! A cycle runs registered adapters through a fixed-width worker pool,
//! retries failures with backoff, persists successes per jurisdiction and
//! rebuilds their cache entries. Failures leave stored and cached data as
//! they were.

mod orchestrator;
mod report;
mod retry;

pub use orchestrator::Harvester;
pub use report::{HarvestReport, JurisdictionReport, JurisdictionStatus};
pub use retry::RetryPolicy;

use std::time::Duration;

/// Tunables for a harvest cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSettings {
    /// Number of jurisdictions scraped at once
    pub pool_width: usize,
    /// Limit on a single `scrape()` call
    pub adapter_timeout: Duration,
    /// Limit on the whole cycle
    pub batch_deadline: Duration,
    pub retry: RetryPolicy,
    /// Lifetime of rebuilt cache entries
    pub cache_ttl: Duration,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            pool_width: 4,
            adapter_timeout: Duration::from_secs(180),
            batch_deadline: Duration::from_secs(30 * 60),
            retry: RetryPolicy::default(),
            cache_ttl: crate::cache::DEFAULT_TTL,
        }
    }
}
