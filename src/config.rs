//! TOML configuration parsing and validation.
//!
//! The configuration file (default `./config/clausemate.toml`) holds the
//! database path, embedding and generation provider settings, ingestion and
//! retrieval tuning, the server bind address, and case-source settings.
//! API keys are never read from this file; they come from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama, or a Gemini/OpenAI-compatible proxy).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// HTTP statuses treated as transient (retryable) failures.
    #[serde(default = "default_transient_statuses")]
    pub transient_statuses: Vec<u16>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_embedding_timeout_secs(),
            transient_statuses: default_transient_statuses(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_transient_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_payload_chars")]
    pub max_payload_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_payload_chars: default_max_payload_chars(),
        }
    }
}

fn default_batch_size() -> usize {
    30
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_max_payload_chars() -> usize {
    9000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_fallback_query")]
    pub fallback_query: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_query_chars: default_max_query_chars(),
            fallback_query: default_fallback_query(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_max_query_chars() -> usize {
    2000
}
fn default_fallback_query() -> String {
    "general contract review".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub law_api: Option<LawApiConfig>,
}

/// Settings for the national law-information open API (law.go.kr DRF).
#[derive(Debug, Deserialize, Clone)]
pub struct LawApiConfig {
    /// The `OC` user id registered with the API.
    pub user_id: String,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Precedents per listing page.
    #[serde(default = "default_display")]
    pub display: u32,
    /// First listing page of each keyword sweep (1-based).
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    /// Listing pages walked per keyword. The walk ends early at the first
    /// page with no items; raise this for a historical backfill.
    #[serde(default = "default_pages")]
    pub pages: u32,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_keyword_delay_ms")]
    pub keyword_delay_ms: u64,
    /// Pause after a failed listing page before trying the next one.
    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,
    #[serde(default = "default_law_api_base_url")]
    pub base_url: String,
}

fn default_keywords() -> Vec<String> {
    [
        "손해배상",
        "채무불이행",
        "계약해제",
        "부당이득",
        "하도급",
        "약관규제",
        "경업금지",
        "용역계약",
        "비밀유지",
        "개인정보",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_display() -> u32 {
    5
}
fn default_start_page() -> u32 {
    1
}
fn default_pages() -> u32 {
    1
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_keyword_delay_ms() -> u64 {
    2000
}
fn default_error_delay_ms() -> u64 {
    5000
}
fn default_law_api_base_url() -> String {
    "https://www.law.go.kr/DRF".to_string()
}

impl Config {
    /// Configuration used by commands that only need defaults plus a
    /// database path (tests, `init` without a file).
    pub fn minimal(db_path: PathBuf) -> Self {
        Self {
            db: DbConfig { path: db_path },
            embedding: EmbeddingConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
            sources: SourcesConfig::default(),
        }
    }

    /// Vector dimensionality of the index. Zero when embeddings are disabled.
    pub fn index_dims(&self) -> usize {
        self.embedding.dims.unwrap_or(0)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    if config.embedding.max_attempts == 0 {
        bail!("embedding.max_attempts must be >= 1");
    }

    if config.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be >= 1");
    }

    if config.ingest.max_payload_chars == 0 {
        bail!("ingest.max_payload_chars must be >= 1");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.max_query_chars == 0 {
        bail!("retrieval.max_query_chars must be >= 1");
    }

    if config.retrieval.fallback_query.trim().is_empty() {
        bail!("retrieval.fallback_query must not be empty");
    }

    if let Some(law) = &config.sources.law_api {
        if law.display == 0 {
            bail!("sources.law_api.display must be >= 1");
        }
        if law.start_page == 0 || law.pages == 0 {
            bail!("sources.law_api.start_page and pages must be >= 1");
        }
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    Ok(())
}
