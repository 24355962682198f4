//! Capitol: government meeting and bill harvesting
//!
//! Scrapes public meeting calendars from state legislatures and city
//! councils, normalizes them into one event model, and keeps them current
//! across harvest cycles.
//!
//! # Core Concepts
//!
//! - **Adapters**: one per source, turning its native calendar format into events
//! - **Fingerprints**: deterministic identities that deduplicate events across cycles
//! - **Harvest cycles**: bounded-concurrency runs that never overwrite good data with a failure
//! - **Enrichment**: bill summaries regenerated only when bill content changes
//!
//! # Example
//!
//! ```
//! use capitol::event_fingerprint;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2026, 11, 3).unwrap();
//! let a = event_fingerprint("NV", "Senate  Finance", date, None);
//! let b = event_fingerprint("nv", "senate finance", date, None);
//! assert_eq!(a, b);
//! ```

pub mod adapter;
pub mod api;
pub mod cache;
pub mod config;
pub mod enrichment;
pub mod harvest;
pub mod model;
pub mod storage;

pub use adapter::{AdapterError, AdapterRegistry, ScrapeOutput, SourceAdapter};
pub use api::CapitolApi;
pub use cache::{MemoryCache, ResultCache, SqliteCache};
pub use config::CapitolConfig;
pub use harvest::{HarvestReport, HarvestSettings, Harvester, JurisdictionStatus, RetryPolicy};
pub use model::{event_fingerprint, Bill, Event, Level};
pub use storage::{EventStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
