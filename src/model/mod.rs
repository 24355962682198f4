//! Canonical domain model
//!
//! Every adapter converges on these types; storage, cache, and enrichment
//! only ever see canonical entities.

mod bill;
mod event;
pub mod fingerprint;

pub use bill::Bill;
pub use event::{CalendarSource, Event, EventBill, Level};
pub use fingerprint::{bill_content_hash, event_fingerprint, normalize_bill_number};

use chrono::NaiveDate;

/// Local calendar date; "upcoming" means on or after this.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
