//! Generation boundary.
//!
//! A [`Generator`] turns an ordered list of [`PromptPart`]s into model text.
//! Non-text parts are passed through opaquely and in order; callers put the
//! instruction text last. Calls are never retried: a failed generation is
//! surfaced to the caller as a [`GenerationError`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::embedding::gemini_api_key;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// One unit of multimodal model input.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation is disabled (set [generation] provider in config)")]
    Disabled,
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("generation returned no text: {0}")]
    NoText(String),
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, parts: &[PromptPart]) -> Result<String, GenerationError>;
}

/// Used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _parts: &[PromptPart]) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

/// Gemini `generateContent` transport. Images travel as base64 inline data.
pub struct GeminiGenerator {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        Self::with_api_key(config, gemini_api_key()?)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key,
            base_url: config.url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }
}

/// Build the `generateContent` request body.
fn gemini_request_body(parts: &[PromptPart]) -> serde_json::Value {
    let parts: Vec<serde_json::Value> = parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => serde_json::json!({ "text": text }),
            PromptPart::Image { mime_type, data } => serde_json::json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
        })
        .collect();

    serde_json::json!({
        "contents": [{ "role": "user", "parts": parts }]
    })
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            GenerationError::NoText(reason.to_string())
        })?;

    let text: String = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("empty candidate");
        return Err(GenerationError::NoText(reason.to_string()));
    }
    Ok(text)
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, parts: &[PromptPart]) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request_body(parts))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        parse_gemini_text(&json)
    }
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_keeps_part_order() {
        let body = gemini_request_body(&[
            PromptPart::Image {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
            PromptPart::Text("instructions".to_string()),
        ]);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "instructions");
    }

    #[test]
    fn test_parse_joins_candidate_text() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"title\":" }, { "text": "\"x\"}" }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(parse_gemini_text(&json).unwrap(), "{\"title\":\"x\"}");
    }

    #[test]
    fn test_parse_reports_block_reason() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        match parse_gemini_text(&json) {
            Err(GenerationError::NoText(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disabled_generator() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        assert!(matches!(
            generator.generate(&[PromptPart::Text("q".into())]).await,
            Err(GenerationError::Disabled)
        ));
    }
}
