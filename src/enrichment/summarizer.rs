//! Summarizer client for the external text-summarization service
//!
//! Two implementations:
//! - `HttpSummarizer`: OpenAI-compatible chat completions over HTTP (production)
//! - `MockSummarizer`: preconfigured responses (testing)

use crate::config::EnrichmentConfig;
use crate::model::Bill;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the summarizer sees of a bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub jurisdiction: String,
    pub bill_number: String,
    pub title: String,
    pub description: Option<String>,
}

impl SummaryRequest {
    pub fn from_bill(bill: &Bill) -> Self {
        Self {
            jurisdiction: bill.jurisdiction_code.clone(),
            bill_number: bill.bill_number.clone(),
            title: bill.title.clone(),
            description: bill.description.clone(),
        }
    }

    fn prompt(&self) -> String {
        let mut prompt = format!(
            "Summarize {} {} for a member of the public in two or three plain sentences.\n\nTitle: {}",
            self.jurisdiction, self.bill_number, self.title
        );
        if let Some(description) = &self.description {
            prompt.push_str("\nDescription: ");
            prompt.push_str(description);
        }
        prompt
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("summarizer not available: {0}")]
    Unavailable(String),
    #[error("summarizer returned HTTP {status}")]
    Http { status: u16 },
    #[error("invalid summarizer response: {0}")]
    InvalidResponse(String),
    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, EnrichmentError>;
}

// === HTTP ===

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct HttpSummarizer {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpSummarizer {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EnrichmentError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("capitol/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EnrichmentError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    /// Build from config, reading the key from the configured variable.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, EnrichmentError> {
        let Some(api_key) = &self.api_key else {
            return Err(EnrichmentError::Unavailable("no API key configured".to_string()));
        };

        let prompt = request.prompt();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You write short, neutral summaries of legislation.",
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichmentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Http {
                status: status.as_u16(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| EnrichmentError::InvalidResponse("no summary in response".to_string()))
    }
}

// === Mock ===

/// Mock summarizer for testing. Returns preconfigured responses.
pub struct MockSummarizer {
    default: Option<String>,
    overrides: HashMap<String, Option<String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockSummarizer {
    /// Answers every request with `summary`.
    pub fn returning(summary: impl Into<String>) -> Self {
        Self {
            default: Some(summary.into()),
            overrides: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every request.
    pub fn failing() -> Self {
        Self {
            default: None,
            overrides: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer for one bill number.
    pub fn with_summary(mut self, bill_number: impl Into<String>, summary: impl Into<String>) -> Self {
        self.overrides.insert(bill_number.into(), Some(summary.into()));
        self
    }

    /// Fail for one bill number.
    pub fn with_failure(mut self, bill_number: impl Into<String>) -> Self {
        self.overrides.insert(bill_number.into(), None);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let answer = match self.overrides.get(&request.bill_number) {
            Some(answer) => answer.clone(),
            None => self.default.clone(),
        };
        answer.ok_or_else(|| {
            EnrichmentError::Unavailable(format!("mock failure for {}", request.bill_number))
        })
    }
}
