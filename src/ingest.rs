//! Deduplicating corpus ingestion.
//!
//! Coordinates the write path: case source → id dedup → embedding →
//! batched upsert into the vector index. Runs are idempotent: records whose
//! id is already indexed are skipped without an embedding call, so re-running
//! over an unchanged source adds nothing.
//!
//! Failures are per record. An embedding failure counts that record as
//! failed; an upsert failure counts every entry of that batch as failed. The
//! run itself never aborts, and `total == added + skipped + failed` holds for
//! the returned [`IngestReport`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use clausemate_core::models::{char_prefix, CaseRecord, EntryPayload, IndexEntry, IngestReport};
use clausemate_core::store::VectorIndex;

use crate::config::{Config, IngestConfig};
use crate::embedding::EmbeddingClient;
use crate::sources::CaseSource;
use crate::sqlite_index::SqliteIndex;

/// Batch-writes new case records into a [`VectorIndex`].
pub struct CorpusIngestor {
    client: Arc<EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    batch_delay: Duration,
    max_payload_chars: usize,
}

impl CorpusIngestor {
    pub fn new(
        client: Arc<EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            client,
            index,
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_payload_chars: config.max_payload_chars,
        }
    }

    /// Load every record from `source` and ingest it.
    pub async fn ingest_source(&self, source: &dyn CaseSource) -> Result<IngestReport> {
        let records = source.load().await?;
        info!(source = source.name(), records = records.len(), "loaded case records");
        Ok(self.ingest(records).await)
    }

    /// Ingest `records`, skipping ids already present in the index.
    ///
    /// Full batches are flushed as soon as they fill and followed by the
    /// configured pause; the final partial batch is flushed without one.
    /// Dropping the future between batches loses nothing already flushed.
    pub async fn ingest(&self, records: Vec<CaseRecord>) -> IngestReport {
        let mut report = IngestReport {
            total: records.len(),
            ..IngestReport::default()
        };

        let mut seen = match self.index.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list indexed ids, treating index as empty");
                Default::default()
            }
        };

        let mut batch: Vec<IndexEntry> = Vec::with_capacity(self.batch_size);
        let mut batches = 0usize;
        let mut cooling_down = false;

        for record in records {
            if record.id.trim().is_empty() {
                warn!(title = %record.title, "case record without id");
                report.failed += 1;
                continue;
            }
            // Ids enter `seen` once they are queued for the index, so a repeat
            // of a record that failed earlier in the run is tried again.
            if seen.contains(&record.id) {
                report.skipped += 1;
                continue;
            }

            if cooling_down {
                tokio::time::sleep(self.batch_delay).await;
                cooling_down = false;
            }

            let text = record.embedding_text();
            let vector = match self.client.embed(&text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "embedding failed, skipping record");
                    report.failed += 1;
                    continue;
                }
            };

            seen.insert(record.id.clone());
            batch.push(IndexEntry {
                id: record.id,
                vector,
                payload: EntryPayload {
                    text: char_prefix(&text, self.max_payload_chars).to_string(),
                    source: record.meta.source,
                    date: record.meta.date,
                },
            });

            if batch.len() >= self.batch_size {
                batches += 1;
                self.flush(&mut batch, batches, &mut seen, &mut report).await;
                cooling_down = true;
            }
        }

        if !batch.is_empty() {
            batches += 1;
            self.flush(&mut batch, batches, &mut seen, &mut report).await;
        }

        info!(
            total = report.total,
            added = report.added,
            skipped = report.skipped,
            failed = report.failed,
            "ingestion finished"
        );
        report
    }

    async fn flush(
        &self,
        batch: &mut Vec<IndexEntry>,
        number: usize,
        seen: &mut HashSet<String>,
        report: &mut IngestReport,
    ) {
        let size = batch.len();
        match self.index.upsert(batch.as_slice()).await {
            Ok(_) => {
                report.added += size;
                info!(batch = number, entries = size, added = report.added, "flushed batch");
            }
            Err(e) => {
                report.failed += size;
                for entry in batch.iter() {
                    seen.remove(&entry.id);
                }
                warn!(batch = number, entries = size, error = %e, "batch upsert failed");
            }
        }
        batch.clear();
    }
}

/// CLI entry point shared by `ingest` and `study`.
pub async fn run_ingest(config: &Config, source: &dyn CaseSource) -> Result<IngestReport> {
    let client = Arc::new(EmbeddingClient::from_config(&config.embedding)?);
    let index = Arc::new(SqliteIndex::open(config).await?);
    let ingestor = CorpusIngestor::new(client, index.clone(), &config.ingest);

    let report = ingestor.ingest_source(source).await?;
    let stored = index.count().await.ok();
    index.close().await;

    println!("ingest {}", source.name());
    println!("  total:   {}", report.total);
    println!("  added:   {}", report.added);
    println!("  skipped: {}", report.skipped);
    println!("  failed:  {}", report.failed);
    if let Some(n) = stored {
        println!("  index entries: {}", n);
    }
    println!("ok");
    Ok(report)
}
