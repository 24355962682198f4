//! OpenStates v3 events API
//!
//! Covers legislatures without a scrapeable calendar of their own. Agenda
//! items carry related entities; those typed `bill` become bills. Results
//! are paginated and capped at `max_pages` per cycle.

use crate::adapter::fetch::{FetchRequest, Fetcher};
use crate::adapter::output::{AdapterError, MalformedRecord, ScrapeOutput};
use crate::adapter::text::{clean_text, non_empty, parse_date};
use crate::adapter::traits::SourceAdapter;
use crate::model::{today, Bill, CalendarSource, Event, Level};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const API_BASE: &str = "https://v3.openstates.org";

#[derive(Debug, Deserialize)]
struct EventPage {
    results: Vec<serde_json::Value>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    max_page: u32,
}

#[derive(Debug, Deserialize)]
struct OsEvent {
    id: String,
    name: String,
    start_date: String,
    #[serde(default)]
    all_day: bool,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    location: Option<OsLocation>,
    #[serde(default)]
    participants: Vec<OsParticipant>,
    #[serde(default)]
    agenda: Vec<OsAgendaItem>,
    #[serde(default)]
    sources: Vec<OsLink>,
    #[serde(default)]
    documents: Vec<OsDocument>,
}

#[derive(Debug, Deserialize)]
struct OsLocation {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsParticipant {
    name: String,
    #[serde(default)]
    entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsAgendaItem {
    #[serde(default)]
    related_entities: Vec<OsRelatedEntity>,
}

#[derive(Debug, Deserialize)]
struct OsRelatedEntity {
    name: String,
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    bill: Option<OsBillRef>,
}

#[derive(Debug, Deserialize)]
struct OsBillRef {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    openstates_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OsDocument {
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    links: Vec<OsLink>,
}

pub struct OpenStatesAdapter {
    key: String,
    jurisdiction: String,
    ocd_id: String,
    api_key: Option<String>,
    api_key_env: String,
    max_pages: u32,
    api_base: String,
    /// Fixed start date instead of today
    start_date: Option<NaiveDate>,
    fetcher: Arc<dyn Fetcher>,
}

impl OpenStatesAdapter {
    /// `api_key` is resolved by the caller (usually from `api_key_env`).
    pub fn new(
        key: impl Into<String>,
        jurisdiction: impl Into<String>,
        ocd_id: impl Into<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
        max_pages: u32,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            key: key.into(),
            jurisdiction: jurisdiction.into(),
            ocd_id: ocd_id.into(),
            api_key: api_key.and_then(non_empty),
            api_key_env: api_key_env.into(),
            max_pages: max_pages.max(1),
            api_base: API_BASE.to_string(),
            start_date: None,
            fetcher,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Events starting on or after `from`, one page of them.
    pub fn page_url(&self, from: NaiveDate, page: u32) -> String {
        let jurisdiction: String = url::form_urlencoded::byte_serialize(self.ocd_id.as_bytes()).collect();
        format!(
            "{}/events?jurisdiction={}&after={}&include=agenda&include=participants&include=sources&include=documents&per_page=20&page={}",
            self.api_base,
            jurisdiction,
            from.format("%Y-%m-%d"),
            page
        )
    }

    fn from_date(&self) -> NaiveDate {
        self.start_date.unwrap_or_else(today)
    }

    async fn fetch_page(&self, api_key: &str, from: NaiveDate, page: u32) -> Result<EventPage, AdapterError> {
        let request = FetchRequest::new(self.page_url(from, page)).header("X-API-KEY", api_key);
        let body = self.fetcher.get(&request).await?;
        serde_json::from_str(&body).map_err(|e| {
            AdapterError::SourceFormatChanged(format!("unexpected events response on page {}: {}", page, e))
        })
    }
}

#[async_trait]
impl SourceAdapter for OpenStatesAdapter {
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
        vec![CalendarSource::new("OpenStates events", self.page_url(self.from_date(), 1), self.ocd_id.clone())]
    }

    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AdapterError::Misconfigured(format!("no OpenStates API key (set {})", self.api_key_env))
        })?;
        let scraped_at = Utc::now();
        let from = self.from_date();
        let fallback_url = self.page_url(from, 1);
        let mut output = ScrapeOutput::new();

        let mut page = 1;
        loop {
            let body = match self.fetch_page(api_key, from, page).await {
                Ok(body) => body,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    // Later pages failing keeps what was already collected.
                    output.skip(MalformedRecord::new(format!("page {}", page), e.to_string()));
                    break;
                }
            };

            for (index, value) in body.results.into_iter().enumerate() {
                let origin = format!("page {} record {}", page, index + 1);
                let record: OsEvent = match serde_json::from_value(value) {
                    Ok(record) => record,
                    Err(e) => {
                        output.skip(MalformedRecord::new(origin, e.to_string()));
                        continue;
                    }
                };
                if record.status.as_deref() == Some("cancelled") {
                    tracing::debug!(id = %record.id, "skipping cancelled event");
                    continue;
                }
                match to_event(&self.jurisdiction, &fallback_url, record, scraped_at) {
                    Ok(event) if event.date < from => {
                        tracing::debug!(date = %event.date, "skipping past event");
                    }
                    Ok(event) => output.push_event(event),
                    Err(reason) => output.skip(MalformedRecord::new(origin, reason)),
                }
            }

            // Stop on our own counter; some servers ignore `page`.
            let last = body.pagination.max_page.min(self.max_pages);
            if page >= last {
                break;
            }
            page += 1;
        }
        Ok(output)
    }
}

fn to_event(
    jurisdiction: &str,
    fallback_url: &str,
    record: OsEvent,
    scraped_at: DateTime<Utc>,
) -> Result<Event, String> {
    let date = parse_date(&record.start_date)
        .ok_or_else(|| format!("unparsable start_date '{}'", record.start_date))?;
    let time = if record.all_day {
        None
    } else {
        local_time(&record.start_date)
    };
    let name = clean_text(&record.name);
    if name.is_empty() {
        return Err("empty event name".to_string());
    }

    let committee = record
        .participants
        .iter()
        .find(|p| p.entity_type.as_deref() == Some("organization"))
        .map(|p| clean_text(&p.name));
    let source_url = record
        .sources
        .first()
        .map(|s| s.url.clone())
        .unwrap_or_else(|| fallback_url.to_string());
    let docket_url = record
        .documents
        .iter()
        .find(|d| d.note.as_deref().map(|n| n.to_lowercase().contains("agenda")).unwrap_or(false))
        .or_else(|| record.documents.first())
        .and_then(|d| d.links.first())
        .map(|l| l.url.clone());

    let mut event = Event::new(jurisdiction, name, date, Level::State, source_url.clone(), scraped_at)
        .with_time(time)
        .with_location(record.location.and_then(|l| l.name).map(|n| clean_text(&n)).unwrap_or_default())
        .with_committee(committee)
        .with_docket_url(docket_url)
        .with_external_id(Some(record.id));

    for entity in record.agenda.into_iter().flat_map(|item| item.related_entities) {
        if entity.entity_type.as_deref() != Some("bill") {
            continue;
        }
        let (number, title, url) = match entity.bill {
            Some(bill) => (
                bill.identifier.unwrap_or_else(|| entity.name.clone()),
                bill.title.unwrap_or_default(),
                bill.openstates_url.unwrap_or_else(|| source_url.clone()),
            ),
            None => (entity.name.clone(), String::new(), source_url.clone()),
        };
        if number.trim().is_empty() {
            continue;
        }
        event.add_bill(Bill::new(jurisdiction, &number, title, url));
    }
    Ok(event)
}

/// Wall-clock time from `2026-10-20T09:00:00-05:00`; the offset is the
/// jurisdiction's own, so the local part is what people read.
fn local_time(start: &str) -> Option<NaiveTime> {
    let (_, rest) = start.split_once('T')?;
    let clock = rest.get(..5)?;
    NaiveTime::parse_from_str(clock, "%H:%M").ok()
}
