//! Agenda PDFs linked from an index page
//!
//! Many county boards and city councils publish nothing but a page of
//! links like "Board of Supervisors Agenda - October 20, 2026" pointing at
//! PDFs. The link text gives the meeting name and date; the PDF text gives
//! time, location and the bills on the agenda. Only upcoming agendas are
//! downloaded.

use crate::adapter::fetch::{FetchRequest, Fetcher};
use crate::adapter::output::{AdapterError, MalformedRecord, ScrapeOutput};
use crate::adapter::text::{absolutize, clean_text, extract_bill_numbers, links, non_empty, parse_date, parse_time};
use crate::adapter::traits::SourceAdapter;
use crate::model::{today, Bill, CalendarSource, Event, Level};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static DATE_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b((?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+)?\b((?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}|\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2})",
    )
    .expect("valid regex")
});
static TIME_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:time|meeting time)\s*:\s*(.+)$").expect("valid regex"));
static LOCATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:location|place)\s*:\s*(.+)$").expect("valid regex"));
static TRAILING_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\s\-:,|]*(?:agenda)?[\s\-:,|]*$").expect("valid regex"));

/// One agenda link from the index page.
#[derive(Debug, Clone, PartialEq)]
struct AgendaLink {
    name: String,
    date: NaiveDate,
    url: String,
}

pub struct PdfAgendaAdapter {
    key: String,
    jurisdiction: String,
    level: Level,
    index_url: String,
    /// Fixed cutoff instead of today
    start_date: Option<NaiveDate>,
    fetcher: Arc<dyn Fetcher>,
}

impl PdfAgendaAdapter {
    pub fn new(
        key: impl Into<String>,
        jurisdiction: impl Into<String>,
        level: Level,
        index_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            key: key.into(),
            jurisdiction: jurisdiction.into(),
            level,
            index_url: index_url.into(),
            start_date: None,
            fetcher,
        }
    }

    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }
}

#[async_trait]
impl SourceAdapter for PdfAgendaAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    fn level(&self) -> Level {
        self.level
    }

    fn calendar_sources(&self) -> Vec<CalendarSource> {
        vec![CalendarSource::new("Agenda index", &self.index_url, "Published agenda PDFs")]
    }

    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError> {
        let scraped_at = Utc::now();
        let from = self.start_date.unwrap_or_else(today);
        let html = self.fetcher.get(&FetchRequest::new(&self.index_url)).await?;

        let mut output = ScrapeOutput::new();
        let agendas = parse_index(&self.index_url, &html, &mut output)?;

        for agenda in agendas.into_iter().filter(|a| a.date >= from) {
            let fetched = self.fetcher.get_pdf_text(&agenda.url).await;
            match fetched {
                Ok(text) => output.push_event(self.to_event(agenda, &text, scraped_at)),
                Err(e) => output.skip(MalformedRecord::new(agenda.url, e.to_string())),
            }
        }
        Ok(output)
    }
}

impl PdfAgendaAdapter {
    fn to_event(&self, agenda: AgendaLink, text: &str, scraped_at: DateTime<Utc>) -> Event {
        let time = TIME_LINE.captures(text).and_then(|c| parse_time(&c[1]));
        let location = LOCATION_LINE
            .captures(text)
            .map(|c| clean_text(&c[1]))
            .unwrap_or_default();
        let committee = if agenda.name.to_lowercase().contains("committee") {
            Some(agenda.name.clone())
        } else {
            None
        };

        let mut event = Event::new(
            &self.jurisdiction,
            agenda.name,
            agenda.date,
            self.level,
            &self.index_url,
            scraped_at,
        )
        .with_time(time)
        .with_location(location)
        .with_committee(committee)
        .with_docket_url(Some(agenda.url.clone()));

        for number in extract_bill_numbers(text) {
            event.add_bill(Bill::new(&self.jurisdiction, &number, "", agenda.url.clone()));
        }
        event
    }
}

/// Collect dated PDF links. An index with no PDF links at all is not the
/// page we know.
fn parse_index(
    index_url: &str,
    html: &str,
    output: &mut ScrapeOutput,
) -> Result<Vec<AgendaLink>, AdapterError> {
    let pdf_links: Vec<(String, String)> = links(html)
        .into_iter()
        .filter(|(href, _)| href.to_lowercase().split(['?', '#']).next().unwrap_or("").ends_with(".pdf"))
        .collect();
    if pdf_links.is_empty() {
        return Err(AdapterError::SourceFormatChanged(format!(
            "no agenda PDF links on {}",
            index_url
        )));
    }

    let mut agendas = Vec::new();
    for (href, text) in pdf_links {
        let Some(url) = absolutize(index_url, &href) else {
            output.skip(MalformedRecord::new(href, "unresolvable link"));
            continue;
        };
        match split_link_text(&text) {
            Some((name, date)) => agendas.push(AgendaLink { name, date, url }),
            None => output.skip(MalformedRecord::new(url, format!("no meeting date in '{}'", text))),
        }
    }
    Ok(agendas)
}

/// "Board of Supervisors Agenda - October 20, 2026" ->
/// ("Board of Supervisors", 2026-10-20)
fn split_link_text(text: &str) -> Option<(String, NaiveDate)> {
    let caps = DATE_IN_TEXT.captures(text)?;
    let date = parse_date(&caps[2])?;
    let whole = caps.get(0)?;
    let remainder = format!("{} {}", &text[..whole.start()], &text[whole.end()..]);
    let name = TRAILING_NOISE.replace(remainder.trim(), "").trim().to_string();
    let name = name.trim_start_matches(['-', ':', '|', ',']).trim().to_string();
    Some((non_empty(name)?, date))
}
