//! Precedent retrieval.
//!
//! [`PrecedentRetriever`] is the read path: bound the query text, embed it,
//! ask the index for the nearest entries and project their payloads. It
//! never fails. Embedding or index trouble degrades to "no precedents" and
//! the caller proceeds with general principles.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use clausemate_core::models::{char_prefix, RetrievedPrecedent};
use clausemate_core::store::VectorIndex;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::EmbeddingClient;
use crate::sqlite_index::SqliteIndex;

pub struct PrecedentRetriever {
    client: Arc<EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    max_query_chars: usize,
    fallback_query: String,
    default_top_k: usize,
}

impl PrecedentRetriever {
    pub fn new(
        client: Arc<EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            client,
            index,
            max_query_chars: config.max_query_chars,
            fallback_query: config.fallback_query.clone(),
            default_top_k: config.top_k,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// The text actually embedded for `query`: its first `max_query_chars`
    /// characters, or the fallback query when it is blank.
    pub fn effective_query<'a>(&'a self, query: &'a str) -> &'a str {
        if query.trim().is_empty() {
            &self.fallback_query
        } else {
            char_prefix(query, self.max_query_chars)
        }
    }

    /// Return up to `top_k` precedents, best match first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<RetrievedPrecedent> {
        let text = self.effective_query(query);

        let vector = match self.client.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, continuing without precedents");
                return Vec::new();
            }
        };

        match self.index.query(&vector, top_k).await {
            Ok(hits) => {
                debug!(hits = hits.len(), top_k, "retrieved precedents");
                hits.into_iter()
                    .map(|hit| RetrievedPrecedent::from(hit.entry.payload))
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "index query failed, continuing without precedents");
                Vec::new()
            }
        }
    }
}

/// CLI entry point for `clausemate search`.
pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let client = Arc::new(EmbeddingClient::from_config(&config.embedding)?);
    let index = Arc::new(SqliteIndex::open(config).await?);
    let retriever = PrecedentRetriever::new(client, index.clone(), &config.retrieval);

    let results = retriever
        .retrieve(query, top_k.unwrap_or(config.retrieval.top_k))
        .await;
    index.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, precedent) in results.iter().enumerate() {
        let date = precedent.date.as_deref().unwrap_or("-");
        println!("{}. {} ({})", i + 1, precedent.source, date);
        println!("    {}", char_prefix(&precedent.text, 240).replace('\n', " "));
        println!();
    }

    Ok(())
}
