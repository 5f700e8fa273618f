//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Every entry is one row of `index_entries`; vectors are stored as
//! little-endian f32 BLOBs and searched by brute-force cosine similarity.
//! Each upsert batch is written in a single transaction.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use clausemate_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use clausemate_core::error::IndexError;
use clausemate_core::models::{EntryPayload, IndexEntry, ScoredEntry};
use clausemate_core::store::{check_entry_dims, check_query_dims, rank_candidates, VectorIndex};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool, config.index_dims()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        check_entry_dims(entries, self.dims)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(IndexError::unavailable)?;

        let mut seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM index_entries")
            .fetch_one(&mut *tx)
            .await
            .map_err(IndexError::unavailable)?;

        for entry in entries {
            seq += 1;
            sqlx::query(
                r#"
                INSERT INTO index_entries (id, embedding, dims, text, source, date, seq, ingested_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    text = excluded.text,
                    source = excluded.source,
                    date = excluded.date,
                    seq = excluded.seq,
                    ingested_at = excluded.ingested_at
                "#,
            )
            .bind(&entry.id)
            .bind(vec_to_blob(&entry.vector))
            .bind(entry.vector.len() as i64)
            .bind(&entry.payload.text)
            .bind(&entry.payload.source)
            .bind(&entry.payload.date)
            .bind(seq)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::unavailable)?;
        }

        tx.commit().await.map_err(IndexError::unavailable)?;
        Ok(entries.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>, IndexError> {
        check_query_dims(vector, self.dims)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // Rows written under another embedding model are invisible here.
        let rows = sqlx::query(
            "SELECT id, embedding, text, source, date, seq FROM index_entries WHERE dims = ?",
        )
        .bind(self.dims as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(IndexError::unavailable)?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let seq: i64 = row.get("seq");
                (
                    ScoredEntry {
                        score: cosine_similarity(vector, &stored),
                        entry: IndexEntry {
                            id: row.get("id"),
                            vector: stored,
                            payload: EntryPayload {
                                text: row.get("text"),
                                source: row.get("source"),
                                date: row.get("date"),
                            },
                        },
                    },
                    seq as u64,
                )
            })
            .collect();

        Ok(rank_candidates(scored, top_k))
    }

    async fn list_ids(&self) -> Result<HashSet<String>, IndexError> {
        // Ids stored at another dimension are re-embedded and replaced on ingest.
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM index_entries WHERE dims = ?")
            .bind(self.dims as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(IndexError::unavailable)?;
        Ok(ids.into_iter().collect())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(IndexError::unavailable)?;
        Ok(n as usize)
    }
}
