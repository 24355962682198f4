//! Concrete source adapters
//!
//! One module per source family. `build` turns a configured
//! [`SourceSpec`] into a ready adapter.

pub mod legistar;
pub mod nevada;
pub mod north_carolina;
pub mod openstates;
pub mod pdf_agenda;

pub use legistar::LegistarAdapter;
pub use nevada::NevadaAdapter;
pub use north_carolina::NorthCarolinaAdapter;
pub use openstates::OpenStatesAdapter;
pub use pdf_agenda::PdfAgendaAdapter;

use super::fetch::Fetcher;
use super::traits::SourceAdapter;
use crate::config::{SourceKind, SourceSpec};
use std::sync::Arc;

/// Construct the adapter for a configured source.
///
/// Missing credentials do not fail construction; the adapter reports
/// `Misconfigured` when it runs.
pub fn build(spec: &SourceSpec, fetcher: Arc<dyn Fetcher>) -> Arc<dyn SourceAdapter> {
    let key = spec.key.to_uppercase();
    let jurisdiction = spec.jurisdiction();
    match &spec.kind {
        SourceKind::Nevada { calendars } => {
            Arc::new(NevadaAdapter::new(key, jurisdiction, calendars.clone(), fetcher))
        }
        SourceKind::NorthCarolina { url } => {
            Arc::new(NorthCarolinaAdapter::new(key, jurisdiction, url.clone(), fetcher))
        }
        SourceKind::Legistar { client } => {
            Arc::new(LegistarAdapter::new(key, jurisdiction, client.clone(), fetcher))
        }
        SourceKind::OpenStates {
            ocd_id,
            api_key_env,
            max_pages,
        } => Arc::new(OpenStatesAdapter::new(
            key,
            jurisdiction,
            ocd_id.clone(),
            std::env::var(api_key_env).ok(),
            api_key_env.clone(),
            *max_pages,
            fetcher,
        )),
        SourceKind::PdfAgenda { index_url, level } => Arc::new(PdfAgendaAdapter::new(
            key,
            jurisdiction,
            *level,
            index_url.clone(),
            fetcher,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fetch::StaticFetcher;
    use crate::config::default_sources;
    use crate::model::Level;

    #[test]
    fn builds_every_default_source() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(StaticFetcher::new());
        for spec in default_sources() {
            let adapter = build(&spec, fetcher.clone());
            assert_eq!(adapter.key(), spec.key);
            assert_eq!(adapter.jurisdiction(), spec.jurisdiction());
            assert!(!adapter.calendar_sources().is_empty());
        }
    }

    #[test]
    fn explicit_jurisdiction_overrides_key() {
        let spec = SourceSpec {
            key: "carson".to_string(),
            jurisdiction: Some("nv-carson-city".to_string()),
            kind: SourceKind::PdfAgenda {
                index_url: "https://city.example/agendas".to_string(),
                level: Level::Local,
            },
        };
        let adapter = build(&spec, Arc::new(StaticFetcher::new()));
        assert_eq!(adapter.key(), "CARSON");
        assert_eq!(adapter.jurisdiction(), "NV-CARSON-CITY");
        assert_eq!(adapter.level(), Level::Local);
    }
}
