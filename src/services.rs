//! Process-wide components, built once from [`Config`].

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::chat::ChatPipeline;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::generation::{create_generator, Generator};
use crate::review::ReviewPipeline;
use crate::search::PrecedentRetriever;
use crate::sqlite_index::SqliteIndex;

/// Shared handles for the online paths (search, review, chat).
pub struct Services {
    pub index: Arc<SqliteIndex>,
    pub retriever: Arc<PrecedentRetriever>,
    pub review: Arc<ReviewPipeline>,
    pub chat: Arc<ChatPipeline>,
}

impl Services {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(EmbeddingClient::from_config(&config.embedding)?);
        let index = Arc::new(SqliteIndex::open(config).await?);
        let generator = create_generator(&config.generation)?;
        info!(
            embedding = client.model_name(),
            dims = client.dims(),
            generation = generator.model_name(),
            "services ready"
        );
        Ok(Self::assemble(client, index, generator, config))
    }

    /// Wire already-built components together.
    pub fn assemble(
        client: Arc<EmbeddingClient>,
        index: Arc<SqliteIndex>,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Self {
        let retriever = Arc::new(PrecedentRetriever::new(
            client,
            index.clone(),
            &config.retrieval,
        ));
        Self {
            review: Arc::new(ReviewPipeline::new(retriever.clone(), generator.clone())),
            chat: Arc::new(ChatPipeline::new(retriever.clone(), generator)),
            index,
            retriever,
        }
    }

    pub async fn close(&self) {
        self.index.close().await;
    }
}
