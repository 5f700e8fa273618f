//! Core data models used throughout ClauseMate.
//!
//! These types represent the case records, index entries, and retrieved
//! precedents that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Deserializer, Serialize};

/// A legal case record as delivered by a case source.
///
/// Matches the `real_cases.json` shape: `{id, title, text, meta}`. The `id`
/// is externally assigned and is the record's identity; numeric ids are
/// normalised to strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(rename = "text")]
    pub body: String,
    #[serde(rename = "meta", default)]
    pub meta: CaseMeta,
}

impl CaseRecord {
    /// Text handed to the embedding provider: the title in brackets followed
    /// by the body, so the title stays part of the embedded signal.
    pub fn embedding_text(&self) -> String {
        format!("[{}] {}", self.title, self.body)
    }
}

/// Case metadata. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMeta {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for CaseMeta {
    fn default() -> Self {
        Self {
            source: default_source(),
            date: None,
            extra: serde_json::Map::new(),
        }
    }
}

fn default_source() -> String {
    "Unknown".to_string()
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "case id must be a string or number, got {}",
            other
        ))),
    }
}

/// Payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPayload {
    /// Stored text, possibly capped at the ingestor's maximum payload length.
    pub text: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A single vector index entry. Exactly one exists per id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: EntryPayload,
}

/// An index entry paired with its cosine similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Read-only projection of an entry payload handed to prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPrecedent {
    pub text: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl From<EntryPayload> for RetrievedPrecedent {
    fn from(payload: EntryPayload) -> Self {
        Self {
            text: payload.text,
            source: payload.source,
            date: payload.date,
        }
    }
}

/// Counters reported by one ingestion run.
///
/// `total == added + skipped + failed` after every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl IngestReport {
    pub fn is_consistent(&self) -> bool {
        self.total == self.added + self.skipped + self.failed
    }
}

/// Returns the longest prefix of `text` holding at most `max_chars` characters.
///
/// Counts Unicode scalar values, so Korean text is never split mid-character.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
