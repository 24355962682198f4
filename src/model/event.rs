//! Scheduled public meetings

use super::bill::Bill;
use super::fingerprint::event_fingerprint;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Government level a jurisdiction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    State,
    Local,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::State => "state",
            Level::Local => "local",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(Level::State),
            "local" => Ok(Level::Local),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// A scheduled public meeting or hearing.
///
/// `fingerprint` is derived from jurisdiction, name, date, and committee.
/// The builder methods that touch those fields recompute it; if fields are
/// assigned directly, call [`Event::refresh_fingerprint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Store row id; `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub jurisdiction_code: String,
    pub name: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub location: String,
    pub committee: Option<String>,
    pub level: Level,
    pub source_url: String,
    pub docket_url: Option<String>,
    pub external_id: Option<String>,
    pub fingerprint: String,
    pub scraped_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Bills on this meeting's agenda.
    #[serde(default)]
    pub bills: Vec<Bill>,
}

impl Event {
    pub fn new(
        jurisdiction_code: impl Into<String>,
        name: impl Into<String>,
        date: NaiveDate,
        level: Level,
        source_url: impl Into<String>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let mut event = Self {
            id: None,
            jurisdiction_code: jurisdiction_code.into(),
            name: name.into(),
            date,
            time: None,
            location: String::new(),
            committee: None,
            level,
            source_url: source_url.into(),
            docket_url: None,
            external_id: None,
            fingerprint: String::new(),
            scraped_at,
            last_updated_at: scraped_at,
            bills: Vec::new(),
        };
        event.refresh_fingerprint();
        event
    }

    pub fn with_time(mut self, time: Option<NaiveTime>) -> Self {
        self.time = time;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the committee; empty strings are treated as no committee.
    pub fn with_committee(mut self, committee: Option<String>) -> Self {
        self.committee = committee.filter(|c| !c.trim().is_empty());
        self.refresh_fingerprint();
        self
    }

    pub fn with_docket_url(mut self, url: Option<String>) -> Self {
        self.docket_url = url;
        self
    }

    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    /// Attach a bill, ignoring duplicates of an already-attached bill number.
    pub fn with_bill(mut self, bill: Bill) -> Self {
        self.add_bill(bill);
        self
    }

    pub fn add_bill(&mut self, bill: Bill) {
        if !self.bills.iter().any(|b| b.bill_number == bill.bill_number) {
            self.bills.push(bill);
        }
    }

    /// Recompute the fingerprint from the identity fields.
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = event_fingerprint(
            &self.jurisdiction_code,
            &self.name,
            self.date,
            self.committee.as_deref(),
        );
    }
}

/// Association row: this bill is on this meeting's agenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventBill {
    pub event_id: i64,
    pub bill_id: i64,
}

/// One calendar feeding a jurisdiction, listed for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CalendarSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl CalendarSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: description.into(),
        }
    }
}
