//! Shared low-level text helpers for adapters
//!
//! Only format-agnostic pieces live here: markup stripping, entity
//! decoding, date/time recognition, bill identifier extraction, and URL
//! resolution. Anything that knows a particular site's layout belongs in
//! that site's adapter.

use crate::model::normalize_bill_number;
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SCRIPT_OR_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").expect("valid regex"));
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));
static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).expect("valid regex")
});
static CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[dh]\b([^>]*)>(.*?)</t[dh]>").expect("valid regex"));
static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));
static WEEKDAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)[a-z]*\.?,?\s+").expect("valid regex")
});
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:[T ].*)?$").expect("valid regex"));
static US_NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").expect("valid regex"));
static FOUR_DIGIT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("valid regex"));
static CLOCK_12H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("valid regex"));
static CLOCK_24H: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid regex"));
static BILL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b((?:[AHS]\.?\s?(?:J\.?\s?R|C\.?\s?R|B|R)\.?)|[HS])\s?(\d{1,5})\b").expect("valid regex")
});

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%B %d %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y"];

/// Strip tags and decode entities, collapsing whitespace.
pub fn clean_text(fragment: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(fragment, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the HTML entities calendar pages actually use.
pub fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-");

    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = if let Some(hex) = raw.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            raw.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    // Last, so "&amp;lt;" decodes to "&lt;" and not "<".
    numeric.replace("&amp;", "&")
}

/// Parse a calendar date.
///
/// Accepts ISO dates (optionally followed by a time), US numeric dates with
/// a four-digit year, and month-name dates with optional weekday prefix and
/// ordinal suffix. Anything without an unambiguous four-digit year is
/// rejected.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_DATE.captures(&text) {
        return NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok();
    }

    if let Some(caps) = US_NUMERIC_DATE.captures(&text) {
        let month = caps[1].parse().ok()?;
        let day = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if !FOUR_DIGIT_YEAR.is_match(&text) {
        return None;
    }

    let stripped = WEEKDAY_PREFIX.replace(&text, "");
    let stripped = ORDINAL.replace_all(&stripped, "$1");
    let stripped = stripped.replace('.', "").replace("Sept ", "Sep ");

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&stripped, fmt).ok())
}

/// Parse a local clock time out of free text.
///
/// Returns `None` for non-clock descriptions such as "Upon adjournment";
/// a meeting's time is optional, so this never invalidates a record.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let lowered = text.to_lowercase().replace('.', "");
    let lowered = lowered.trim();

    if lowered.starts_with("noon") || lowered == "12 noon" {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }
    if lowered.starts_with("midnight") {
        return NaiveTime::from_hms_opt(0, 0, 0);
    }

    if let Some(caps) = CLOCK_12H.captures(lowered) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (&caps[3], hour) {
            ("am", 12) => 0,
            ("am", h) => h,
            ("pm", 12) => 12,
            (_, h) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let caps = CLOCK_24H.captures(lowered)?;
    let hour = caps[1].parse().ok()?;
    let minute = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Find bill identifiers in agenda text, canonicalized and deduplicated in
/// order of first appearance.
pub fn extract_bill_numbers(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in BILL_ID.captures_iter(text) {
        let number = normalize_bill_number(&format!("{} {}", &caps[1], &caps[2]));
        if !found.contains(&number) {
            found.push(number);
        }
    }
    found
}

/// Resolve a possibly relative link against the page it appeared on.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = decode_entities(href.trim());
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    Url::parse(base).ok()?.join(&href).ok().map(String::from)
}

/// Every `<a href>` in a fragment as `(href, visible text)`.
pub fn links(fragment: &str) -> Vec<(String, String)> {
    LINK.captures_iter(fragment)
        .map(|caps| (caps[1].to_string(), clean_text(&caps[2])))
        .collect()
}

/// Table cells of a row as `(attributes, inner html)`.
pub fn cells(row: &str) -> Vec<(String, String)> {
    CELL.captures_iter(row)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Whether an attribute string carries the given CSS class.
pub fn has_class(attributes: &str, class: &str) -> bool {
    static CLASS_ATTR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)class\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
    CLASS_ATTR
        .captures(attributes)
        .map(|caps| caps[1].split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// Treat blank strings as absent.
pub fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
