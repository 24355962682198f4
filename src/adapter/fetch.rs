//! Network boundary for adapters
//!
//! Adapters never talk to `reqwest` directly; they go through a `Fetcher`
//! so tests can script responses. `HttpFetcher` identifies itself with a
//! descriptive User-Agent and spaces requests to the same host.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("PDF text extraction failed for {url}: {message}")]
    Pdf { url: String, message: String },
}

impl FetchError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    fn pdf(url: &str, message: impl Into<String>) -> Self {
        FetchError::Pdf {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// A GET request with optional extra headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl From<&str> for FetchRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// How adapters reach the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a text body (HTML or JSON).
    async fn get(&self, request: &FetchRequest) -> Result<String, FetchError>;

    /// Download a PDF and return its extracted text.
    async fn get_pdf_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Minimum spacing between requests to the same host
    pub request_interval: Duration,
    /// `pdftotext` executable used for PDF agendas
    pub pdftotext: PathBuf,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "capitol/{} (public meeting calendar harvester)",
                env!("CARGO_PKG_VERSION")
            ),
            request_timeout: Duration::from_secs(30),
            request_interval: Duration::from_millis(500),
            pdftotext: PathBuf::from("pdftotext"),
        }
    }
}

/// Production fetcher on `reqwest`.
pub struct HttpFetcher {
    http: Client,
    interval: Duration,
    pdftotext: PathBuf,
    /// Next free request slot per host
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            interval: settings.request_interval,
            pdftotext: settings.pdftotext.clone(),
            next_slot: Mutex::new(HashMap::new()),
        })
    }

    /// Wait for this host's next request slot.
    ///
    /// The slot is reserved under the lock; the sleep happens after the
    /// lock is released.
    async fn pace(&self, url: &str) {
        if self.interval.is_zero() {
            return;
        }
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let slot = {
            let mut slots = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = slots.get(&host).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(host, slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, request: &FetchRequest) -> Result<String, FetchError> {
        self.pace(&request.url).await;
        tracing::debug!(url = %request.url, "fetching");

        let mut builder = self.http.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.url, e))
    }

    async fn get_pdf_text(&self, url: &str) -> Result<String, FetchError> {
        self.pace(url).await;
        tracing::debug!(url = %url, "fetching PDF");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        if !bytes.starts_with(b"%PDF") {
            return Err(FetchError::pdf(url, "response is not a PDF document"));
        }

        let file = tempfile::NamedTempFile::new().map_err(|e| FetchError::pdf(url, e.to_string()))?;
        tokio::fs::write(file.path(), &bytes)
            .await
            .map_err(|e| FetchError::pdf(url, e.to_string()))?;

        let output = tokio::process::Command::new(&self.pdftotext)
            .arg("-layout")
            .arg(file.path())
            .arg("-")
            .output()
            .await
            .map_err(|e| FetchError::pdf(url, format!("cannot run {}: {}", self.pdftotext.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::pdf(url, stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Scripted fetcher for tests and offline fixtures.
///
/// Unknown URLs answer HTTP 404.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Result<String, FetchError>>,
    pdfs: HashMap<String, Result<String, FetchError>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Ok(body.into()));
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.pages.insert(url.into(), Err(error));
        self
    }

    pub fn with_pdf(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pdfs.insert(url.into(), Ok(text.into()));
        self
    }

    pub fn with_pdf_failure(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.pdfs.insert(url.into(), Err(error));
        self
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, url: &str) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
    }

    fn lookup(
        map: &HashMap<String, Result<String, FetchError>>,
        url: &str,
    ) -> Result<String, FetchError> {
        map.get(url).cloned().unwrap_or_else(|| {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, request: &FetchRequest) -> Result<String, FetchError> {
        self.record(&request.url);
        Self::lookup(&self.pages, &request.url)
    }

    async fn get_pdf_text(&self, url: &str) -> Result<String, FetchError> {
        self.record(url);
        Self::lookup(&self.pdfs, url)
    }
}
