//! Legislation referenced by meeting agendas

use super::fingerprint::{bill_content_hash, normalize_bill_number};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A bill, unique per `(jurisdiction_code, bill_number)`.
///
/// `summary` and `content_hash` are enrichment outputs: the hash is taken
/// over the content the summary was generated from, so a mismatch with
/// [`Bill::current_content_hash`] marks the summary stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub jurisdiction_code: String,
    pub bill_number: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub content_hash: Option<String>,
    pub last_summarized_at: Option<DateTime<Utc>>,
    /// Last enrichment failure, cleared by a successful summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_error: Option<String>,
}

impl Bill {
    /// Create a bill; the number is canonicalized and an empty title falls
    /// back to the number.
    pub fn new(
        jurisdiction_code: impl Into<String>,
        bill_number: &str,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let bill_number = normalize_bill_number(bill_number);
        let title = title.into();
        let title = if title.trim().is_empty() {
            bill_number.clone()
        } else {
            title.trim().to_string()
        };
        Self {
            id: None,
            jurisdiction_code: jurisdiction_code.into(),
            bill_number,
            title,
            description: None,
            url: url.into(),
            status: None,
            summary: None,
            content_hash: None,
            last_summarized_at: None,
            enrichment_error: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = status.filter(|s| !s.trim().is_empty());
        self
    }

    /// Hash of the current title and description.
    pub fn current_content_hash(&self) -> String {
        bill_content_hash(&self.title, self.description.as_deref())
    }

    /// True when the adapter only knew the identifier, not a real title.
    pub fn has_placeholder_title(&self) -> bool {
        self.title == self.bill_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_canonicalizes_number_and_title() {
        let bill = Bill::new("NV", "a.b.007", "", "https://example.org/ab7");
        assert_eq!(bill.bill_number, "AB 7");
        assert_eq!(bill.title, "AB 7");
        assert!(bill.has_placeholder_title());
    }

    #[test]
    fn blank_description_and_status_are_none() {
        let bill = Bill::new("NV", "SB 1", "Budget", "u")
            .with_description(Some(" ".to_string()))
            .with_status(Some(String::new()));
        assert!(bill.description.is_none());
        assert!(bill.status.is_none());
    }

    #[test]
    fn content_hash_changes_with_description() {
        let a = Bill::new("NV", "SB 1", "Budget", "u");
        let b = a.clone().with_description(Some("Appropriates funds".to_string()));
        assert_ne!(a.current_content_hash(), b.current_content_hash());
    }
}
