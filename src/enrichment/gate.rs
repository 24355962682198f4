//! Content-hash gate in front of summarization

use crate::model::Bill;

/// Whether `bill` needs a (new) summary.
///
/// False only when a non-blank summary exists and was generated from the
/// bill's current title and description.
pub fn needs_enrichment(bill: &Bill) -> bool {
    let has_summary = bill
        .summary
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    match (&bill.content_hash, has_summary) {
        (Some(stored), true) => *stored != bill.current_content_hash(),
        _ => true,
    }
}
