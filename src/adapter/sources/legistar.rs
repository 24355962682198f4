//! Legistar web API (city and county legislative bodies)
//!
//! Events come from `/{client}/events` filtered to upcoming dates; agenda
//! items with a matter file become bills. Agenda items are a second request
//! per event, and losing one of those keeps the meeting without its bills.

use crate::adapter::fetch::{FetchRequest, Fetcher};
use crate::adapter::output::{AdapterError, MalformedRecord, ScrapeOutput};
use crate::adapter::text::{clean_text, non_empty, parse_date, parse_time};
use crate::adapter::traits::SourceAdapter;
use crate::model::{today, Bill, CalendarSource, Event, Level};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const API_BASE: &str = "https://webapi.legistar.com/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegistarEvent {
    event_id: i64,
    event_body_name: String,
    event_date: String,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(default)]
    event_location: Option<String>,
    #[serde(default)]
    event_agenda_file: Option<String>,
    #[serde(default, rename = "EventInSiteURL")]
    event_in_site_url: Option<String>,
    #[serde(default)]
    event_agenda_status_name: Option<String>,
}

impl LegistarEvent {
    fn is_canceled(&self) -> bool {
        self.event_agenda_status_name
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("canceled") || s.eq_ignore_ascii_case("cancelled"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegistarEventItem {
    #[serde(default)]
    event_item_matter_file: Option<String>,
    #[serde(default)]
    event_item_matter_id: Option<i64>,
    #[serde(default)]
    event_item_matter_name: Option<String>,
    #[serde(default)]
    event_item_title: Option<String>,
    #[serde(default)]
    event_item_matter_status: Option<String>,
}

pub struct LegistarAdapter {
    key: String,
    jurisdiction: String,
    client: String,
    api_base: String,
    /// Fixed start date instead of today
    start_date: Option<NaiveDate>,
    fetcher: Arc<dyn Fetcher>,
}

impl LegistarAdapter {
    pub fn new(
        key: impl Into<String>,
        jurisdiction: impl Into<String>,
        client: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            key: key.into(),
            jurisdiction: jurisdiction.into(),
            client: client.into(),
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

    pub fn events_url(&self, from: NaiveDate) -> String {
        format!(
            "{}/{}/events?$filter=EventDate+ge+datetime%27{}%27&$orderby=EventDate",
            self.api_base,
            self.client,
            from.format("%Y-%m-%d")
        )
    }

    pub fn items_url(&self, event_id: i64) -> String {
        format!(
            "{}/{}/events/{}/eventitems?AgendaNote=1&MinutesNote=0&Attachments=0",
            self.api_base, self.client, event_id
        )
    }

    fn matter_url(&self, matter_id: i64) -> String {
        format!("https://{}.legistar.com/LegislationDetail.aspx?ID={}", self.client, matter_id)
    }

    fn calendar_url(&self) -> String {
        format!("https://{}.legistar.com/Calendar.aspx", self.client)
    }

    async fn agenda_bills(&self, event: &LegistarEvent, fallback_url: &str) -> Result<Vec<Bill>, AdapterError> {
        let body = self.fetcher.get(&FetchRequest::new(self.items_url(event.event_id))).await?;
        let items: Vec<LegistarEventItem> = serde_json::from_str(&body).map_err(|e| {
            AdapterError::SourceFormatChanged(format!("event items are not a JSON array: {}", e))
        })?;

        let bills = items
            .into_iter()
            .filter_map(|item| {
                let number = item.event_item_matter_file.and_then(non_empty)?;
                let title = item
                    .event_item_matter_name
                    .or(item.event_item_title)
                    .map(|t| clean_text(&t))
                    .unwrap_or_default();
                let url = item
                    .event_item_matter_id
                    .map(|id| self.matter_url(id))
                    .unwrap_or_else(|| fallback_url.to_string());
                Some(Bill::new(&self.jurisdiction, &number, title, url).with_status(item.event_item_matter_status))
            })
            .collect();
        Ok(bills)
    }
}

#[async_trait]
impl SourceAdapter for LegistarAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    fn level(&self) -> Level {
        Level::Local
    }

    fn calendar_sources(&self) -> Vec<CalendarSource> {
        vec![CalendarSource::new(
            format!("Legistar ({})", self.client),
            self.calendar_url(),
            "Council and committee meetings",
        )]
    }

    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError> {
        let scraped_at = Utc::now();
        let from = self.start_date.unwrap_or_else(today);
        let events_url = self.events_url(from);
        let body = self.fetcher.get(&FetchRequest::new(&events_url)).await?;
        let records: Vec<serde_json::Value> = serde_json::from_str(&body).map_err(|e| {
            AdapterError::SourceFormatChanged(format!("events response is not a JSON array: {}", e))
        })?;

        let mut output = ScrapeOutput::new();
        for (index, value) in records.into_iter().enumerate() {
            let record: LegistarEvent = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    output.skip(MalformedRecord::new(format!("event record {}", index + 1), e.to_string()));
                    continue;
                }
            };
            if record.is_canceled() {
                tracing::debug!(event_id = record.event_id, "skipping canceled meeting");
                continue;
            }
            let origin = format!("event {}", record.event_id);
            let mut event = match self.to_event(&record, scraped_at) {
                Ok(event) => event,
                Err(reason) => {
                    output.skip(MalformedRecord::new(origin, reason));
                    continue;
                }
            };
            let fallback_url = event.source_url.clone();
            match self.agenda_bills(&record, &fallback_url).await {
                Ok(bills) => {
                    for bill in bills {
                        event.add_bill(bill);
                    }
                }
                Err(e) => {
                    tracing::warn!(event_id = record.event_id, error = %e, "agenda items unavailable");
                    output
                        .malformed
                        .push(MalformedRecord::new(origin, format!("agenda items unavailable: {}", e)));
                }
            }
            output.push_event(event);
        }
        Ok(output)
    }
}

impl LegistarAdapter {
    fn to_event(&self, record: &LegistarEvent, scraped_at: DateTime<Utc>) -> Result<Event, String> {
        let date = parse_date(&record.event_date)
            .ok_or_else(|| format!("unparsable date '{}'", record.event_date))?;
        let body = clean_text(&record.event_body_name);
        if body.is_empty() {
            return Err("empty body name".to_string());
        }
        let committee = if body.to_lowercase().contains("committee") {
            Some(body.clone())
        } else {
            None
        };
        let source_url = record
            .event_in_site_url
            .clone()
            .and_then(non_empty)
            .unwrap_or_else(|| self.calendar_url());

        Ok(Event::new(&self.jurisdiction, body, date, Level::Local, source_url, scraped_at)
            .with_time(record.event_time.as_deref().and_then(parse_time))
            .with_location(record.event_location.as_deref().map(clean_text).unwrap_or_default())
            .with_committee(committee)
            .with_docket_url(record.event_agenda_file.clone().and_then(non_empty))
            .with_external_id(Some(record.event_id.to_string())))
    }
}
