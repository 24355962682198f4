//! Nevada Legislature
//!
//! Meetings are listed on one HTML calendar per chamber. Each meeting is a
//! `<tr class="meeting">` row with classed cells for date, time, committee,
//! location and agenda. Interim committees share a third calendar.
//!
//! Source quirks handled here:
//! - floor sessions and some hearings start "upon adjournment" of another
//!   meeting, which leaves the time unknown
//! - canceled meetings stay on the calendar with a `canceled` row class
//! - one chamber calendar being down does not sink the others

use crate::adapter::fetch::{FetchRequest, Fetcher};
use crate::adapter::output::{AdapterError, MalformedRecord, ScrapeOutput};
use crate::adapter::text::{
    absolutize, cells, clean_text, extract_bill_numbers, has_class, links, non_empty, parse_date,
    parse_time,
};
use crate::adapter::traits::SourceAdapter;
use crate::model::{Bill, CalendarSource, Event, Level};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static CALENDAR_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<table\b[^>]*class\s*=\s*["'][^"']*\bcalendar\b"#).expect("valid regex")
});
static ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b([^>]*)>(.*?)</tr>").expect("valid regex"));
static MEETING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)data-meeting-id\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
static CHAMBER_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:senate|assembly|joint|interim)\s+(?:standing\s+)?committee\s+on\s+")
        .expect("valid regex")
});

const BASE: &str = "https://www.leg.state.nv.us/App/Calendar/A";

/// The three calendars published during and between sessions.
pub fn default_calendars() -> Vec<CalendarSource> {
    vec![
        CalendarSource::new("Senate", format!("{}/?chamber=Senate", BASE), "Senate standing committees and floor sessions"),
        CalendarSource::new("Assembly", format!("{}/?chamber=Assembly", BASE), "Assembly standing committees and floor sessions"),
        CalendarSource::new("Interim", format!("{}/?chamber=Interim", BASE), "Interim and joint committees"),
    ]
}

pub struct NevadaAdapter {
    key: String,
    jurisdiction: String,
    calendars: Vec<CalendarSource>,
    fetcher: Arc<dyn Fetcher>,
}

impl NevadaAdapter {
    pub fn new(
        key: impl Into<String>,
        jurisdiction: impl Into<String>,
        calendars: Vec<CalendarSource>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let calendars = if calendars.is_empty() {
            default_calendars()
        } else {
            calendars
        };
        Self {
            key: key.into(),
            jurisdiction: jurisdiction.into(),
            calendars,
            fetcher,
        }
    }
}

#[async_trait]
impl SourceAdapter for NevadaAdapter {
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
        self.calendars.clone()
    }

    async fn scrape(&self) -> Result<ScrapeOutput, AdapterError> {
        let scraped_at = Utc::now();
        let mut output = ScrapeOutput::new();
        let mut unreachable = Vec::new();
        let mut unrecognized = Vec::new();

        for calendar in &self.calendars {
            let html = match self.fetcher.get(&FetchRequest::new(&calendar.url)).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(calendar = %calendar.name, error = %e, "calendar unreachable");
                    output.skip(MalformedRecord::new(&calendar.name, format!("calendar unreachable: {}", e)));
                    unreachable.push(format!("{}: {}", calendar.name, e));
                    continue;
                }
            };
            match parse_calendar(&self.jurisdiction, calendar, &html, scraped_at) {
                Ok(page) => {
                    tracing::debug!(calendar = %calendar.name, events = page.events.len(), "parsed calendar");
                    output.merge(page);
                }
                Err(e) => {
                    output.skip(MalformedRecord::new(&calendar.name, e.to_string()));
                    unrecognized.push(calendar.name.clone());
                }
            }
        }

        let total = self.calendars.len();
        if unreachable.len() == total {
            return Err(AdapterError::SourceUnreachable(unreachable.join("; ")));
        }
        if unreachable.len() + unrecognized.len() == total {
            return Err(AdapterError::SourceFormatChanged(format!(
                "no meeting table on calendars: {}",
                unrecognized.join(", ")
            )));
        }
        Ok(output)
    }
}

/// Parse one chamber calendar page.
fn parse_calendar(
    jurisdiction: &str,
    calendar: &CalendarSource,
    html: &str,
    scraped_at: DateTime<Utc>,
) -> Result<ScrapeOutput, AdapterError> {
    if !CALENDAR_TABLE.is_match(html) {
        return Err(AdapterError::SourceFormatChanged(format!(
            "{} calendar has no meeting table",
            calendar.name
        )));
    }

    let mut output = ScrapeOutput::new();
    for (index, caps) in ROW.captures_iter(html).enumerate() {
        let attributes = &caps[1];
        if !has_class(attributes, "meeting") {
            continue;
        }
        if has_class(attributes, "canceled") || has_class(attributes, "cancelled") {
            tracing::debug!(calendar = %calendar.name, row = index, "skipping canceled meeting");
            continue;
        }
        let origin = format!("{} row {}", calendar.name, index + 1);
        let external_id = MEETING_ID.captures(attributes).map(|c| c[1].to_string());
        match parse_row(jurisdiction, calendar, &caps[2], scraped_at) {
            Ok(event) => output.push_event(event.with_external_id(external_id)),
            Err(reason) => output.skip(MalformedRecord::new(origin, reason)),
        }
    }
    Ok(output)
}

fn parse_row(
    jurisdiction: &str,
    calendar: &CalendarSource,
    row: &str,
    scraped_at: DateTime<Utc>,
) -> Result<Event, String> {
    let mut date_cell = None;
    let mut time_cell = None;
    let mut committee_cell = None;
    let mut location_cell = None;
    let mut agenda_cell = None;
    for (attributes, inner) in cells(row) {
        if has_class(&attributes, "date") {
            date_cell = Some(inner);
        } else if has_class(&attributes, "time") {
            time_cell = Some(inner);
        } else if has_class(&attributes, "committee") {
            committee_cell = Some(inner);
        } else if has_class(&attributes, "location") {
            location_cell = Some(inner);
        } else if has_class(&attributes, "agenda") {
            agenda_cell = Some(inner);
        }
    }

    let date_text = clean_text(&date_cell.ok_or("missing date cell")?);
    let date = parse_date(&date_text).ok_or_else(|| format!("unparsable date '{}'", date_text))?;
    let name = committee_cell
        .map(|c| clean_text(&c))
        .and_then(non_empty)
        .ok_or("missing committee name")?;
    if name.to_lowercase().contains("canceled") || name.to_lowercase().contains("cancelled") {
        return Err("meeting marked canceled".to_string());
    }

    // "Upon adjournment" and similar leave the start time unknown.
    let time = time_cell.and_then(|t| parse_time(&clean_text(&t)));
    let location = location_cell.map(|l| clean_text(&l)).unwrap_or_default();
    let committee = committee_name(&name);

    let mut docket_url = None;
    let mut bills = Vec::new();
    if let Some(agenda) = agenda_cell {
        docket_url = links(&agenda)
            .into_iter()
            .find(|(href, _)| href.to_lowercase().ends_with(".pdf"))
            .and_then(|(href, _)| absolutize(&calendar.url, &href));
        let bill_url = docket_url.clone().unwrap_or_else(|| calendar.url.clone());
        bills = extract_bill_numbers(&clean_text(&agenda))
            .into_iter()
            .map(|number| Bill::new(jurisdiction, &number, "", bill_url.clone()))
            .collect();
    }

    let mut event = Event::new(jurisdiction, name, date, Level::State, &calendar.url, scraped_at)
        .with_time(time)
        .with_location(location)
        .with_committee(committee)
        .with_docket_url(docket_url);
    for bill in bills {
        event.add_bill(bill);
    }
    Ok(event)
}

/// "Senate Committee on Finance" -> "Finance"; floor sessions have none.
fn committee_name(name: &str) -> Option<String> {
    if !name.to_lowercase().contains("committee") {
        return None;
    }
    let stripped = CHAMBER_PREFIX.replace(name, "");
    non_empty(stripped.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fetch::{FetchError, StaticFetcher};
    use chrono::{NaiveDate, NaiveTime};

    const SENATE: &str = "https://leg.example/cal?chamber=Senate";
    const ASSEMBLY: &str = "https://leg.example/cal?chamber=Assembly";

    const SENATE_PAGE: &str = r#"
<html><body>
<table class="calendar table">
  <tr><th>Date</th><th>Time</th><th>Meeting</th><th>Location</th><th>Agenda</th></tr>
  <tr class="meeting" data-meeting-id="18211">
    <td class="date">Tuesday, October 20, 2026</td>
    <td class="time">9:00 AM</td>
    <td class="committee">Senate Committee on Finance</td>
    <td class="location">Room 2134 <br/>Legislative Building</td>
    <td class="agenda"><a href="/App/NELIS/REL/Meeting/18211/Agenda.pdf">Agenda</a> SB 12, A.B. 45</td>
  </tr>
  <tr class="meeting">
    <td class="date">Tuesday, October 20, 2026</td>
    <td class="time">Upon adjournment of the Senate</td>
    <td class="committee">Senate Committee on Revenue and Economic Development</td>
    <td class="location">Room 2135</td>
    <td class="agenda"></td>
  </tr>
  <tr class="meeting">
    <td class="date">TBD</td>
    <td class="time">1:30 PM</td>
    <td class="committee">Senate Committee on Judiciary</td>
    <td class="location">Room 2149</td>
  </tr>
  <tr class="meeting canceled">
    <td class="date">October 21, 2026</td>
    <td class="committee">Senate Committee on Education</td>
  </tr>
  <tr class="meeting">
    <td class="date">October 22, 2026</td>
    <td class="time">11:00 AM</td>
    <td class="committee">Senate Floor Session</td>
    <td class="location">Senate Chamber</td>
  </tr>
</table>
</body></html>"#;

    fn calendars() -> Vec<CalendarSource> {
        vec![
            CalendarSource::new("Senate", SENATE, ""),
            CalendarSource::new("Assembly", ASSEMBLY, ""),
        ]
    }

    fn empty_assembly_page() -> &'static str {
        r#"<table class="calendar"><tr><th>Date</th></tr></table>"#
    }

    #[test]
    fn parses_meeting_rows_and_skips_bad_ones() {
        let calendar = CalendarSource::new("Senate", SENATE, "");
        let output = parse_calendar("NV", &calendar, SENATE_PAGE, Utc::now()).unwrap();

        assert_eq!(output.events.len(), 3);
        assert_eq!(output.malformed.len(), 1);
        assert!(output.malformed[0].reason.contains("TBD"));

        let finance = &output.events[0];
        assert_eq!(finance.name, "Senate Committee on Finance");
        assert_eq!(finance.committee.as_deref(), Some("Finance"));
        assert_eq!(finance.date, NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        assert_eq!(finance.time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(finance.location, "Room 2134 Legislative Building");
        assert_eq!(finance.external_id.as_deref(), Some("18211"));
        assert_eq!(
            finance.docket_url.as_deref(),
            Some("https://leg.example/App/NELIS/REL/Meeting/18211/Agenda.pdf")
        );
        let numbers: Vec<_> = finance.bills.iter().map(|b| b.bill_number.as_str()).collect();
        assert_eq!(numbers, vec!["SB 12", "AB 45"]);
        assert!(finance.bills.iter().all(|b| b.jurisdiction_code == "NV"));
    }

    #[test]
    fn upon_adjournment_leaves_time_unknown() {
        let calendar = CalendarSource::new("Senate", SENATE, "");
        let output = parse_calendar("NV", &calendar, SENATE_PAGE, Utc::now()).unwrap();
        let revenue = &output.events[1];
        assert_eq!(revenue.time, None);
        assert!(revenue.bills.is_empty());
        assert_eq!(revenue.docket_url, None);
    }

    #[test]
    fn floor_sessions_have_no_committee() {
        let calendar = CalendarSource::new("Senate", SENATE, "");
        let output = parse_calendar("NV", &calendar, SENATE_PAGE, Utc::now()).unwrap();
        let floor = &output.events[2];
        assert_eq!(floor.name, "Senate Floor Session");
        assert_eq!(floor.committee, None);
    }

    #[test]
    fn page_without_calendar_table_is_a_format_change() {
        let calendar = CalendarSource::new("Senate", SENATE, "");
        let err = parse_calendar("NV", &calendar, "<html><p>Site redesigned</p></html>", Utc::now())
            .unwrap_err();
        assert!(matches!(err, AdapterError::SourceFormatChanged(_)));
    }

    #[tokio::test]
    async fn one_unreachable_calendar_does_not_fail_the_scrape() {
        let fetcher = StaticFetcher::new().with_page(SENATE, SENATE_PAGE).with_failure(
            ASSEMBLY,
            FetchError::Status { url: ASSEMBLY.into(), status: 503 },
        );
        let adapter = NevadaAdapter::new("NV", "NV", calendars(), Arc::new(fetcher));

        let output = adapter.scrape().await.unwrap();
        assert_eq!(output.events.len(), 3);
        assert!(output.malformed.iter().any(|m| m.origin == "Assembly"));
    }

    #[tokio::test]
    async fn all_calendars_unreachable_is_an_error() {
        let adapter = NevadaAdapter::new("NV", "NV", calendars(), Arc::new(StaticFetcher::new()));
        let err = adapter.scrape().await.unwrap_err();
        assert!(matches!(err, AdapterError::SourceUnreachable(_)));
    }

    #[tokio::test]
    async fn unrecognized_pages_everywhere_is_a_format_change() {
        let fetcher = StaticFetcher::new()
            .with_page(SENATE, "<div>maintenance</div>")
            .with_failure(ASSEMBLY, FetchError::Timeout { url: ASSEMBLY.into() });
        let adapter = NevadaAdapter::new("NV", "NV", calendars(), Arc::new(fetcher));
        let err = adapter.scrape().await.unwrap_err();
        assert!(matches!(err, AdapterError::SourceFormatChanged(_)));
    }

    #[tokio::test]
    async fn empty_calendars_are_a_legitimate_empty_result() {
        let fetcher = StaticFetcher::new()
            .with_page(SENATE, empty_assembly_page())
            .with_page(ASSEMBLY, empty_assembly_page());
        let adapter = NevadaAdapter::new("NV", "NV", calendars(), Arc::new(fetcher));
        let output = adapter.scrape().await.unwrap();
        assert!(output.is_empty());
        assert!(output.malformed.is_empty());
    }

    #[test]
    fn default_calendars_cover_both_chambers_and_interim() {
        let adapter = NevadaAdapter::new("NV", "NV", Vec::new(), Arc::new(StaticFetcher::new()));
        let names: Vec<_> = adapter.calendar_sources().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Senate", "Assembly", "Interim"]);
    }
}
