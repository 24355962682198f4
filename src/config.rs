//! Runtime configuration
//!
//! A single YAML file; every field has a default so an empty or missing
//! file yields a working setup with the built-in source list.

use crate::adapter::FetchSettings;
use crate::harvest::{HarvestSettings, RetryPolicy};
use crate::model::{CalendarSource, Level};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitolConfig {
    /// SQLite database; defaults to the platform data directory
    pub database: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub harvest: HarvestConfig,
    pub cache: CacheConfig,
    pub enrichment: EnrichmentConfig,
    /// Events older than this many days are purged
    pub retention_days: u32,
    /// Configured sources; the built-in list is used when empty
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_interval_ms: u64,
    pub pdftotext: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            user_agent: defaults.user_agent,
            request_timeout_secs: defaults.request_timeout.as_secs(),
            request_interval_ms: defaults.request_interval.as_millis() as u64,
            pdftotext: defaults.pdftotext,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub pool_width: usize,
    pub adapter_timeout_secs: u64,
    pub batch_deadline_secs: u64,
    pub retry: RetryConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            pool_width: 4,
            adapter_timeout_secs: 180,
            batch_deadline_secs: 1800,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Sqlite,
            ttl_secs: 6 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            concurrency: 2,
        }
    }
}

/// One configured source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Registry key
    pub key: String,
    /// Jurisdiction code; defaults to the key
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl SourceSpec {
    pub fn jurisdiction(&self) -> String {
        self.jurisdiction
            .clone()
            .unwrap_or_else(|| self.key.clone())
            .to_uppercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Nevada Legislature chamber calendars
    Nevada {
        #[serde(default)]
        calendars: Vec<CalendarSource>,
    },
    /// North Carolina General Assembly calendar page with embedded JSON
    NorthCarolina {
        #[serde(default)]
        url: Option<String>,
    },
    /// Legistar web API (city and county councils)
    Legistar { client: String },
    /// OpenStates v3 events API
    OpenStates {
        ocd_id: String,
        #[serde(default = "default_openstates_key_env")]
        api_key_env: String,
        #[serde(default = "default_openstates_pages")]
        max_pages: u32,
    },
    /// Index page linking agenda PDFs
    PdfAgenda { index_url: String, level: Level },
}

fn default_openstates_key_env() -> String {
    "OPENSTATES_API_KEY".to_string()
}

fn default_openstates_pages() -> u32 {
    5
}

/// Sources used when the config file lists none.
pub fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec {
            key: "NV".to_string(),
            jurisdiction: None,
            kind: SourceKind::Nevada { calendars: Vec::new() },
        },
        SourceSpec {
            key: "NC".to_string(),
            jurisdiction: None,
            kind: SourceKind::NorthCarolina { url: None },
        },
        SourceSpec {
            key: "TX".to_string(),
            jurisdiction: None,
            kind: SourceKind::OpenStates {
                ocd_id: "ocd-jurisdiction/country:us/state:tx/government".to_string(),
                api_key_env: default_openstates_key_env(),
                max_pages: default_openstates_pages(),
            },
        },
        SourceSpec {
            key: "WA-SEATTLE".to_string(),
            jurisdiction: None,
            kind: SourceKind::Legistar {
                client: "seattle".to_string(),
            },
        },
        SourceSpec {
            key: "NV-CARSON-CITY".to_string(),
            jurisdiction: None,
            kind: SourceKind::PdfAgenda {
                index_url: "https://www.carson.org/government/meeting-agendas".to_string(),
                level: Level::Local,
            },
        },
    ]
}

impl CapitolConfig {
    /// Load from an explicit path, or from the default location if a file
    /// exists there, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        if config.sources.is_empty() {
            config.sources = default_sources();
        }
        if config.retention_days == 0 {
            config.retention_days = 30;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| data_dir().join("capitol.db"))
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            user_agent: self.fetch.user_agent.clone(),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            request_interval: Duration::from_millis(self.fetch.request_interval_ms),
            pdftotext: self.fetch.pdftotext.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.harvest.retry;
        RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
            multiplier: retry.multiplier,
            max_backoff: Duration::from_millis(retry.max_backoff_ms),
        }
    }

    pub fn harvest_settings(&self) -> HarvestSettings {
        HarvestSettings {
            pool_width: self.harvest.pool_width.max(1),
            adapter_timeout: Duration::from_secs(self.harvest.adapter_timeout_secs),
            batch_deadline: Duration::from_secs(self.harvest.batch_deadline_secs),
            retry: self.retry_policy(),
            cache_ttl: self.cache_ttl(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

/// `~/.config/capitol/capitol.yaml` (platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("capitol").join("capitol.yaml"))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"))
        .join("capitol")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = CapitolConfig::from_yaml("").unwrap();
        assert_eq!(config.harvest.pool_width, 4);
        assert_eq!(config.cache.ttl_secs, 21_600);
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r#"
harvest:
  pool_width: 8
  retry:
    max_attempts: 5
cache:
  backend: memory
"#;
        let config = CapitolConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.harvest.pool_width, 8);
        assert_eq!(config.harvest.retry.max_attempts, 5);
        assert_eq!(config.harvest.retry.initial_backoff_ms, 2_000);
        assert_eq!(config.harvest.adapter_timeout_secs, 180);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn sources_deserialize_by_kind() {
        let yaml = r#"
sources:
  - key: NV
    kind: nevada
    calendars:
      - name: Senate
        url: https://leg.example/senate
  - key: WA-SEATTLE
    kind: legistar
    client: seattle
  - key: TX
    kind: open_states
    ocd_id: ocd-jurisdiction/country:us/state:tx/government
  - key: carson
    jurisdiction: nv-carson-city
    kind: pdf_agenda
    index_url: https://city.example/agendas
    level: local
"#;
        let config = CapitolConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sources.len(), 4);
        match &config.sources[0].kind {
            SourceKind::Nevada { calendars } => assert_eq!(calendars[0].name, "Senate"),
            other => panic!("unexpected kind {:?}", other),
        }
        match &config.sources[2].kind {
            SourceKind::OpenStates { api_key_env, max_pages, .. } => {
                assert_eq!(api_key_env, "OPENSTATES_API_KEY");
                assert_eq!(*max_pages, 5);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(config.sources[3].jurisdiction(), "NV-CARSON-CITY");
        assert_eq!(config.sources[1].jurisdiction(), "WA-SEATTLE");
    }

    #[test]
    fn unknown_source_kind_is_an_error() {
        let yaml = "sources:\n  - key: XX\n    kind: carrier_pigeon\n";
        assert!(CapitolConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn load_from_missing_file_reports_path() {
        let err = CapitolConfig::load(Some(Path::new("/nonexistent/capitol.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/capitol.yaml"));
    }

    #[test]
    fn load_fills_sources_and_retention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capitol.yaml");
        std::fs::write(&path, "retention_days: 0\n").unwrap();
        let config = CapitolConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sources.len(), default_sources().len());
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn settings_conversions_clamp_zero_values() {
        let mut config = CapitolConfig::default();
        config.harvest.pool_width = 0;
        config.harvest.retry.max_attempts = 0;
        let settings = config.harvest_settings();
        assert_eq!(settings.pool_width, 1);
        assert_eq!(settings.retry.max_attempts, 1);
        assert_eq!(settings.cache_ttl, Duration::from_secs(21_600));
    }
}
