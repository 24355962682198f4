//! North Carolina General Assembly
//!
//! The legislative calendar page renders client-side from a JSON array
//! embedded in `<script id="calendar-data" type="application/json">`.
//! Records are decoded one at a time so a single bad entry is dropped
//! without losing the rest.

use crate::adapter::fetch::{FetchRequest, Fetcher};
use crate::adapter::output::{AdapterError, MalformedRecord, ScrapeOutput};
use crate::adapter::text::{absolutize, clean_text, non_empty, parse_date, parse_time};
use crate::adapter::traits::SourceAdapter;
use crate::model::{Bill, CalendarSource, Event, Level};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_URL: &str = "https://www.ncleg.gov/LegislativeCalendar";

static CALENDAR_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\bid\s*=\s*["']calendar-data["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarRecord {
    #[serde(default)]
    event_id: Option<serde_json::Value>,
    title: String,
    #[serde(default)]
    chamber: Option<String>,
    #[serde(default)]
    committee: Option<String>,
    date: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    room: Option<String>,
    #[serde(default)]
    agenda_url: Option<String>,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    bills: Vec<CalendarBill>,
}

#[derive(Debug, Deserialize)]
struct CalendarBill {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct NorthCarolinaAdapter {
    key: String,
    jurisdiction: String,
    url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl NorthCarolinaAdapter {
    pub fn new(
        key: impl Into<String>,
        jurisdiction: impl Into<String>,
        url: Option<String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            key: key.into(),
            jurisdiction: jurisdiction.into(),
            url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            fetcher,
        }
    }
}

#[async_trait]
impl SourceAdapter for NorthCarolinaAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    fn level(&self) -> Level {
        Level::State
    }

    fn calendar_sources(&self) -> Vec<CalendarSource> {
        vec![CalendarSource::new(
            "Legislative Calendar",
            &self.url,
            "House, Senate and joint committee meetings",
        )]
    }

    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError> {
        let html = self.fetcher.get(&FetchRequest::new(&self.url)).await?;
        parse_calendar(&self.jurisdiction, &self.url, &html, Utc::now())
    }
}

fn parse_calendar(
    jurisdiction: &str,
    page_url: &str,
    html: &str,
    scraped_at: DateTime<Utc>,
) -> Result<ScrapeOutput, AdapterError> {
    let payload = CALENDAR_DATA
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
        .ok_or_else(|| AdapterError::SourceFormatChanged("calendar-data script not found".to_string()))?;

    let records: Vec<serde_json::Value> = serde_json::from_str(&payload).map_err(|e| {
        AdapterError::SourceFormatChanged(format!("calendar-data is not a JSON array: {}", e))
    })?;

    let mut output = ScrapeOutput::new();
    for (index, value) in records.into_iter().enumerate() {
        let origin = format!("calendar record {}", index + 1);
        let record: CalendarRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                output.skip(MalformedRecord::new(origin, e.to_string()));
                continue;
            }
        };
        if record.canceled {
            tracing::debug!(title = %record.title, "skipping canceled meeting");
            continue;
        }
        match to_event(jurisdiction, page_url, record, scraped_at) {
            Ok(event) => output.push_event(event),
            Err(reason) => output.skip(MalformedRecord::new(origin, reason)),
        }
    }
    Ok(output)
}

fn to_event(
    jurisdiction: &str,
    page_url: &str,
    record: CalendarRecord,
    scraped_at: DateTime<Utc>,
) -> Result<Event, String> {
    let date = parse_date(&record.date).ok_or_else(|| format!("unparsable date '{}'", record.date))?;
    let title = clean_text(&record.title);
    if title.is_empty() {
        return Err("empty meeting title".to_string());
    }
    // Titles sometimes omit the chamber ("Finance"); prefix it so House and
    // Senate committees of the same name stay distinct.
    let name = match record.chamber.as_deref().map(str::trim) {
        Some(chamber) if !chamber.is_empty() && !title.to_lowercase().starts_with(&chamber.to_lowercase()) => {
            format!("{} {}", chamber, title)
        }
        _ => title,
    };

    let external_id = record.event_id.map(|id| match id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });

    let mut event = Event::new(jurisdiction, name, date, Level::State, page_url, scraped_at)
        .with_time(record.time.as_deref().and_then(parse_time))
        .with_location(record.room.map(|r| clean_text(&r)).unwrap_or_default())
        .with_committee(record.committee.map(|c| clean_text(&c)).and_then(non_empty))
        .with_docket_url(record.agenda_url.as_deref().and_then(|href| absolutize(page_url, href)))
        .with_external_id(external_id);

    for bill in record.bills {
        if bill.id.trim().is_empty() {
            continue;
        }
        let url = bill
            .url
            .as_deref()
            .and_then(|href| absolutize(page_url, href))
            .unwrap_or_else(|| page_url.to_string());
        event.add_bill(
            Bill::new(jurisdiction, &bill.id, bill.title.unwrap_or_default(), url).with_status(bill.status),
        );
    }
    Ok(event)
}
