//! Precedent-grounded chat.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use clausemate_core::error::MalformedResponseError;
use clausemate_core::prompt::{assemble_prompt, PromptMode};

use crate::config::Config;
use crate::generation::{GenerationError, Generator, PromptPart};
use crate::search::PrecedentRetriever;
use crate::services::Services;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("질문을 입력해 주세요.")]
    EmptyQuestion,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),
}

pub struct ChatPipeline {
    retriever: Arc<PrecedentRetriever>,
    generator: Arc<dyn Generator>,
}

impl ChatPipeline {
    pub fn new(retriever: Arc<PrecedentRetriever>, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Answer `question`, optionally about the passage the user is viewing.
    pub async fn answer(&self, question: &str, viewing: Option<&str>) -> Result<String, ChatError> {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let precedents = self
            .retriever
            .retrieve(question, self.retriever.default_top_k())
            .await;
        let prompt = assemble_prompt(&precedents, PromptMode::Chat { question, viewing });

        let reply = self.generator.generate(&[PromptPart::Text(prompt)]).await?;
        let answer = reply.trim();
        if answer.is_empty() {
            return Err(MalformedResponseError::new("empty answer").into());
        }

        info!(precedents = precedents.len(), chars = answer.chars().count(), "chat answered");
        Ok(answer.to_string())
    }
}

/// CLI entry point for `clausemate chat`.
pub async fn run_chat(config: &Config, question: &str, context: Option<&str>) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    let result = services.chat.answer(question, context).await;
    services.close().await;
    println!("{}", result?);
    Ok(())
}
