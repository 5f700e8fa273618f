//! Recovery of structured objects from free-text model output.
//!
//! Models often wrap the requested JSON in Markdown fences or add prose
//! around it. [`extract_json_object`] strips the known fences, then takes the
//! span from the first `{` to the last `}` and parses it. Anything that does
//! not parse is a [`MalformedResponseError`]; nothing is retried here.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MalformedResponseError;

const WRAPPER_MARKERS: [&str; 3] = ["```json", "```JSON", "```"];

/// A JSON object recovered from model output.
#[derive(Debug, Clone)]
pub struct RecoveredJson {
    /// The exact object span that was parsed.
    pub raw: String,
    pub value: serde_json::Value,
}

/// Extract the single JSON object embedded in `text`.
pub fn extract_json_object(text: &str) -> Result<RecoveredJson, MalformedResponseError> {
    let mut cleaned = text.to_string();
    for marker in WRAPPER_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned = cleaned.trim();

    let start = cleaned
        .find('{')
        .ok_or_else(|| MalformedResponseError::new("no '{' in response"))?;
    let end = cleaned
        .rfind('}')
        .ok_or_else(|| MalformedResponseError::new("no '}' in response"))?;
    if end < start {
        return Err(MalformedResponseError::new("'}' appears before '{'"));
    }

    let raw = &cleaned[start..=end];
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| MalformedResponseError::new(format!("invalid JSON: {}", e)))?;

    Ok(RecoveredJson {
        raw: raw.to_string(),
        value,
    })
}

/// Severity of a review finding. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "위험", alias = "risk", alias = "RISK")]
    Risk,
    #[serde(rename = "주의", alias = "caution", alias = "CAUTION")]
    Caution,
}

/// One risky clause found in a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub severity: Severity,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub fix: String,
}

/// The structured result of a contract review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    #[serde(default = "default_title")]
    pub title: String,
    /// Safety score in `0..=100`.
    #[serde(default, deserialize_with = "deserialize_score")]
    pub score: u8,
    #[serde(default)]
    pub score_comment: String,
    #[serde(default)]
    pub analysis: Vec<Finding>,
}

fn default_title() -> String {
    "무제 계약서".to_string()
}

/// Accepts integers, floats, and numeric strings; clamps to `0..=100`.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let score = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Null => Some(0.0),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("score must be numeric, got {}", value)))?;
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

/// A parsed review plus the raw JSON span for storage.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub report: ReviewReport,
    pub raw_json: String,
}

/// Recover and decode a review object from model output.
pub fn parse_review_response(text: &str) -> Result<ReviewOutcome, MalformedResponseError> {
    let recovered = extract_json_object(text)?;
    let report: ReviewReport = serde_json::from_value(recovered.value)
        .map_err(|e| MalformedResponseError::new(format!("unexpected review shape: {}", e)))?;
    Ok(ReviewOutcome {
        report,
        raw_json: recovered.raw,
    })
}
