//! Contract review pipeline.
//!
//! retrieval → review prompt → generation → output recovery. Typed text and
//! extracted document texts form both the retrieval query and the contract
//! section of the prompt. Images are only ever handed to the generator; they
//! never contribute to the retrieval text.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use thiserror::Error;
use tracing::info;

use clausemate_core::error::MalformedResponseError;
use clausemate_core::prompt::{assemble_prompt, PromptMode};
use clausemate_core::response::{parse_review_response, ReviewOutcome, Severity};

use crate::config::Config;
use crate::generation::{GenerationError, Generator, PromptPart};
use crate::search::PrecedentRetriever;
use crate::services::Services;

/// Already-extracted text of an uploaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentText {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewInput {
    pub text: Option<String>,
    pub documents: Vec<DocumentText>,
    pub images: Vec<ImageInput>,
}

impl ReviewInput {
    /// Typed text followed by every non-empty document under a name header.
    pub fn contract_text(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sections.push(text.to_string());
        }
        for doc in &self.documents {
            let text = doc.text.trim();
            if !text.is_empty() {
                sections.push(format!("[문서: {}]\n{}", doc.name, text));
            }
        }
        sections.join("\n\n")
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("분석할 내용이 없습니다.")]
    EmptyInput,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),
}

pub struct ReviewPipeline {
    retriever: Arc<PrecedentRetriever>,
    generator: Arc<dyn Generator>,
}

impl ReviewPipeline {
    pub fn new(retriever: Arc<PrecedentRetriever>, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub async fn review(&self, input: &ReviewInput) -> Result<ReviewOutcome, ReviewError> {
        let contract_text = input.contract_text();
        if contract_text.is_empty() && input.images.is_empty() {
            return Err(ReviewError::EmptyInput);
        }

        let precedents = self
            .retriever
            .retrieve(&contract_text, self.retriever.default_top_k())
            .await;
        let prompt = assemble_prompt(
            &precedents,
            PromptMode::Review {
                contract_text: &contract_text,
            },
        );

        let mut parts: Vec<PromptPart> = input
            .images
            .iter()
            .map(|img| PromptPart::Image {
                mime_type: img.mime_type.clone(),
                data: img.data.clone(),
            })
            .collect();
        parts.push(PromptPart::Text(prompt));

        let text = self.generator.generate(&parts).await?;
        let outcome = parse_review_response(&text)?;

        info!(
            title = %outcome.report.title,
            score = outcome.report.score,
            findings = outcome.report.analysis.len(),
            precedents = precedents.len(),
            "review complete"
        );
        Ok(outcome)
    }
}

/// MIME type for a contract image path, by extension.
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// CLI entry point for `clausemate review`.
pub async fn run_review(
    config: &Config,
    text: Option<String>,
    docs: &[std::path::PathBuf],
    images: &[std::path::PathBuf],
) -> anyhow::Result<()> {
    let mut input = ReviewInput {
        text,
        ..ReviewInput::default()
    };
    for path in docs {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        input.documents.push(DocumentText { name, text });
    }
    for path in images {
        let Some(mime_type) = image_mime_type(path) else {
            bail!(
                "Unsupported image type: {} (use jpg, png, webp, or heic)",
                path.display()
            );
        };
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        input.images.push(ImageInput {
            mime_type: mime_type.to_string(),
            data,
        });
    }

    let services = Services::from_config(config).await?;
    let result = services.review.review(&input).await;
    services.close().await;
    let outcome = result?;

    let report = &outcome.report;
    println!("{}", report.title);
    println!("  score: {}/100", report.score);
    if !report.score_comment.is_empty() {
        println!("  {}", report.score_comment);
    }
    println!();
    for (i, finding) in report.analysis.iter().enumerate() {
        let tag = match finding.severity {
            Severity::Risk => "위험",
            Severity::Caution => "주의",
        };
        if finding.location.is_empty() {
            println!("{}. [{}]", i + 1, tag);
        } else {
            println!("{}. [{}] {}", i + 1, tag, finding.location);
        }
        println!("   원문: {}", finding.original);
        println!("   이유: {}", finding.reason);
        println!("   수정: {}", finding.fix);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::testing::{client_for, RecordingProvider};
    use async_trait::async_trait;
    use clausemate_core::models::{EntryPayload, IndexEntry};
    use clausemate_core::prompt::{NO_PRECEDENTS_OPEN, PRECEDENTS_OPEN};
    use clausemate_core::store::memory::InMemoryIndex;
    use clausemate_core::store::VectorIndex;
    use std::sync::Mutex;

    const DIMS: usize = 8;

    struct ScriptedGenerator {
        reply: String,
        seen: Mutex<Vec<Vec<PromptPart>>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, parts: &[PromptPart]) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(parts.to_vec());
            Ok(self.reply.clone())
        }
    }

    const REPLY: &str = "```json\n{\"title\": \"용역 계약\", \"score\": 62, \"score_comment\": \"위약금 과다\", \
        \"analysis\": [{\"type\": \"위험\", \"location\": \"제7조\", \"original\": \"위약금 300%\", \
        \"reason\": \"과다\", \"fix\": \"30%로 조정\"}]}\n```\n이상입니다.";

    async fn pipeline(
        provider: Arc<RecordingProvider>,
        generator: Arc<ScriptedGenerator>,
        seed: bool,
    ) -> ReviewPipeline {
        let index = Arc::new(InMemoryIndex::new(DIMS));
        if seed {
            index
                .upsert(&[IndexEntry {
                    id: "1".into(),
                    vector: vec![1.0; DIMS],
                    payload: EntryPayload {
                        text: "위약금이 부당히 과다한 경우 감액할 수 있다".into(),
                        source: "대법원 판례 2020다1 (손해배상)".into(),
                        date: None,
                    },
                }])
                .await
                .unwrap();
        }
        let retriever = Arc::new(PrecedentRetriever::new(
            client_for(provider),
            index,
            &RetrievalConfig::default(),
        ));
        ReviewPipeline::new(retriever, generator)
    }

    #[tokio::test]
    async fn test_review_parses_wrapped_reply() {
        let provider = RecordingProvider::new(DIMS);
        let generator = ScriptedGenerator::new(REPLY);
        let pipeline = pipeline(provider.clone(), generator.clone(), true).await;

        let input = ReviewInput {
            text: Some("제7조 위약금은 계약금의 300%로 한다.".into()),
            documents: vec![DocumentText {
                name: "부속합의서.txt".into(),
                text: "제9조 비밀유지".into(),
            }],
            images: vec![ImageInput {
                mime_type: "image/png".into(),
                data: vec![0x89, 0x50],
            }],
        };
        let outcome = pipeline.review(&input).await.unwrap();
        assert_eq!(outcome.report.title, "용역 계약");
        assert_eq!(outcome.report.score, 62);
        assert_eq!(outcome.report.analysis[0].severity, Severity::Risk);
        assert!(outcome.raw_json.starts_with('{') && outcome.raw_json.ends_with('}'));

        // retrieval text is typed text plus documents, never image bytes
        let embedded = provider.calls();
        assert_eq!(embedded.len(), 1);
        assert!(embedded[0].contains("300%"));
        assert!(embedded[0].contains("[문서: 부속합의서.txt]"));

        let seen = generator.seen.lock().unwrap();
        let parts = &seen[0];
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], PromptPart::Image { .. }));
        match &parts[1] {
            PromptPart::Text(prompt) => {
                assert!(prompt.contains(PRECEDENTS_OPEN));
                assert!(prompt.contains("제9조 비밀유지"));
            }
            other => panic!("instruction text must be last, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_image_only_review_uses_fallback_query() {
        let provider = RecordingProvider::new(DIMS);
        let generator = ScriptedGenerator::new(REPLY);
        let pipeline = pipeline(provider.clone(), generator.clone(), false).await;

        let input = ReviewInput {
            images: vec![ImageInput {
                mime_type: "image/jpeg".into(),
                data: vec![1],
            }],
            ..ReviewInput::default()
        };
        pipeline.review(&input).await.unwrap();
        assert_eq!(provider.calls(), vec!["general contract review".to_string()]);

        let seen = generator.seen.lock().unwrap();
        match seen[0].last() {
            Some(PromptPart::Text(prompt)) => assert!(prompt.contains(NO_PRECEDENTS_OPEN)),
            other => panic!("unexpected last part {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let provider = RecordingProvider::new(DIMS);
        let generator = ScriptedGenerator::new(REPLY);
        let pipeline = pipeline(provider.clone(), generator.clone(), false).await;

        let input = ReviewInput {
            text: Some("   ".into()),
            documents: vec![DocumentText {
                name: "빈문서".into(),
                text: "\n".into(),
            }],
            images: vec![],
        };
        let err = pipeline.review(&input).await.unwrap_err();
        assert!(matches!(err, ReviewError::EmptyInput));
        assert_eq!(err.to_string(), "분석할 내용이 없습니다.");
        assert!(provider.calls().is_empty());
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let provider = RecordingProvider::new(DIMS);
        let generator = ScriptedGenerator::new("죄송합니다. 분석할 수 없습니다.");
        let pipeline = pipeline(provider, generator, false).await;

        let input = ReviewInput {
            text: Some("계약서".into()),
            ..ReviewInput::default()
        };
        assert!(matches!(
            pipeline.review(&input).await.unwrap_err(),
            ReviewError::Malformed(_)
        ));
    }

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type(Path::new("a/contract.JPG")), Some("image/jpeg"));
        assert_eq!(image_mime_type(Path::new("scan.webp")), Some("image/webp"));
        assert_eq!(image_mime_type(Path::new("contract.pdf")), None);
        assert_eq!(image_mime_type(Path::new("noext")), None);
    }
}
