//! Per-cycle harvest report

use crate::adapter::MalformedRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// How one jurisdiction fared in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JurisdictionStatus {
    /// Events were scraped and persisted
    Succeeded {
        events: usize,
        inserted: usize,
        updated: usize,
        rejected: usize,
    },
    /// The source answered but listed nothing usable; stored data kept
    Empty { reason: String },
    /// Nothing was written for this jurisdiction this cycle
    Failed { error: String },
}

impl JurisdictionStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, JurisdictionStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JurisdictionStatus::Succeeded { .. } => "succeeded",
            JurisdictionStatus::Empty { .. } => "empty",
            JurisdictionStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JurisdictionReport {
    /// Registry key
    pub key: String,
    pub jurisdiction: String,
    #[serde(flatten)]
    pub status: JurisdictionStatus,
    pub attempts: u32,
    pub malformed: Vec<MalformedRecord>,
    pub elapsed_ms: u64,
}

impl JurisdictionReport {
    /// A failure with no scrape behind it (unknown key, deadline).
    pub fn failed(key: &str, jurisdiction: &str, error: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            jurisdiction: jurisdiction.to_string(),
            status: JurisdictionStatus::Failed {
                error: error.into(),
            },
            attempts: 0,
            malformed: Vec::new(),
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub jurisdictions: BTreeMap<String, JurisdictionReport>,
}

impl Default for HarvestReport {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestReport {
    pub fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            jurisdictions: BTreeMap::new(),
        }
    }

    /// Record a jurisdiction's outcome. The first report for a key wins.
    pub fn record(&mut self, report: JurisdictionReport) {
        self.jurisdictions
            .entry(report.key.clone())
            .or_insert(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn get(&self, key: &str) -> Option<&JurisdictionReport> {
        self.jurisdictions.get(&key.trim().to_uppercase())
    }

    pub fn status(&self, key: &str) -> Option<&JurisdictionStatus> {
        self.get(key).map(|r| &r.status)
    }

    pub fn is_failed(&self, key: &str) -> bool {
        self.status(key).is_some_and(JurisdictionStatus::is_failed)
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.keys_where(|s| matches!(s, JurisdictionStatus::Succeeded { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.keys_where(JurisdictionStatus::is_failed)
    }

    fn keys_where(&self, pred: impl Fn(&JurisdictionStatus) -> bool) -> Vec<&str> {
        self.jurisdictions
            .values()
            .filter(|r| pred(&r.status))
            .map(|r| r.key.as_str())
            .collect()
    }
}
