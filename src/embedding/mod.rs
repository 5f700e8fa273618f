//! Embedding provider transports.
//!
//! Implements [`EmbeddingProvider`] for:
//! - **[`DisabledProvider`]** — fails permanently; used when embeddings are not configured.
//! - **[`GeminiProvider`]** — Google `embedContent` (`text-embedding-004`).
//! - **[`OpenAIProvider`]** — OpenAI `POST /v1/embeddings`.
//! - **[`OllamaProvider`]** — a local Ollama instance's `/api/embed`.
//!
//! Every transport makes exactly one call per `embed` and classifies failures:
//!
//! | Signal | Class |
//! |--------|-------|
//! | HTTP status in `embedding.transient_statuses` | `Transient` |
//! | Other HTTP 4xx | `Permanent` |
//! | Timeout or connection failure | `Transient` |
//! | Anything else (unlisted 5xx, unreadable body) | `Unknown` |
//!
//! Retrying is the job of [`EmbeddingClient`], which only looks at the class.

mod client;

pub use client::{EmbeddingClient, RetryPolicy};

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use clausemate_core::embedding::EmbeddingProvider;
use clausemate_core::error::{FailureClass, ProviderError};

use crate::config::EmbeddingConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Map an HTTP status to a failure class using the transient allow-list.
pub fn classify_status(status: u16, transient_statuses: &[u16]) -> FailureClass {
    if transient_statuses.contains(&status) {
        FailureClass::Transient
    } else if (400..500).contains(&status) {
        FailureClass::Permanent
    } else {
        FailureClass::Unknown
    }
}

/// Map a reqwest transport error to a failure class.
pub fn classify_transport_error(label: &str, err: &reqwest::Error) -> ProviderError {
    let class = if err.is_timeout() || err.is_connect() {
        FailureClass::Transient
    } else {
        FailureClass::Unknown
    };
    ProviderError::new(class, format!("{} request failed: {}", label, err))
}

/// Send a JSON request and return the decoded body of a 2xx response.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    transient_statuses: &[u16],
    label: &str,
) -> Result<serde_json::Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport_error(label, &e))?;

    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|e| {
            ProviderError::unknown(format!("{} returned an unreadable body: {}", label, e))
        });
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(ProviderError::new(
        classify_status(status.as_u16(), transient_statuses),
        format!("{} API error {}: {}", label, status, body_text),
    ))
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn float_array(value: Option<&serde_json::Value>, what: &str) -> Result<Vec<f32>, ProviderError> {
    let values = value
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::unknown(format!("Invalid {} response: missing vector", what)))?;
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                ProviderError::unknown(format!("Invalid {} response: non-numeric component", what))
            })
        })
        .collect()
}

fn required_model(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", provider))?;
    Ok((model, dims))
}

// ============ Disabled Provider ============

/// Provider used when `embedding.provider = "disabled"`. Every call fails
/// permanently.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::permanent("Embedding provider is disabled"))
    }
}

// ============ Gemini Provider ============

/// Google Generative Language `embedContent` transport.
///
/// Requires `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) in the environment.
/// Texts are embedded with task type `RETRIEVAL_DOCUMENT`, for both corpus
/// records and queries, so both sides land in the same space.
pub struct GeminiProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    transient_statuses: Vec<u16>,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = gemini_api_key()?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let (model, dims) = required_model(config, "Gemini")?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims,
            api_key,
            base_url: config.url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            transient_statuses: config.transient_statuses.clone(),
        })
    }
}

/// Read the Gemini API key from `GOOGLE_API_KEY`, falling back to
/// `GEMINI_API_KEY`.
pub fn gemini_api_key() -> Result<String> {
    match std::env::var("GOOGLE_API_KEY").or_else(|_| std::env::var("GEMINI_API_KEY")) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("GOOGLE_API_KEY (or GEMINI_API_KEY) environment variable not set"),
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": "RETRIEVAL_DOCUMENT",
        });
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let json = send_json(request, &self.transient_statuses, "Gemini").await?;
        parse_gemini_response(&json)
    }
}

/// Extract `embedding.values` from an `embedContent` response.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<f32>, ProviderError> {
    float_array(json.get("embedding").and_then(|e| e.get("values")), "Gemini")
}

// ============ OpenAI Provider ============

/// OpenAI embeddings transport. Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    transient_statuses: Vec<u16>,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model(config, "OpenAI")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims,
            api_key,
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            transient_statuses: config.transient_statuses.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = send_json(request, &self.transient_statuses, "OpenAI").await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, ProviderError> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first());
    float_array(first.and_then(|item| item.get("embedding")), "OpenAI")
}

// ============ Ollama Provider ============

/// Local Ollama transport (`POST /api/embed`). Needs an embedding model
/// pulled on the Ollama host (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    transient_statuses: Vec<u16>,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model(config, "Ollama")?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            transient_statuses: config.transient_statuses.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body);
        let json = send_json(request, &self.transient_statuses, "Ollama").await?;
        parse_ollama_response(&json)
    }
}

/// Extract `embeddings[0]` from an Ollama `/api/embed` response.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>, ProviderError> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first());
    float_array(first, "Ollama")
}

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
