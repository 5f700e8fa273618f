//! Vector index abstraction for ClauseMate.
//!
//! The [`VectorIndex`] trait is everything the ingestion and retrieval
//! pipeline needs from a nearest-neighbor store, enabling pluggable backends
//! (SQLite in the app crate, [`memory::InMemoryIndex`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::models::{IndexEntry, ScoredEntry};

/// Abstract nearest-neighbor store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace entries by id (last write wins) |
/// | [`query`](VectorIndex::query) | Top-k entries by cosine similarity |
/// | [`list_ids`](VectorIndex::list_ids) | Ids stored at this index's dimension, without payloads or vectors |
/// | [`count`](VectorIndex::count) | Number of stored entries |
///
/// # Ordering
///
/// `query` results are sorted by descending similarity. Equal scores are
/// ordered by insertion recency, most recent first; a replacing upsert
/// counts as a new insertion.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Vector dimensionality this index accepts.
    fn dims(&self) -> usize;

    /// Insert or replace entries. Returns the number written.
    ///
    /// Entries whose vector length differs from [`dims`](VectorIndex::dims)
    /// are rejected with [`IndexError::DimensionMismatch`] before any write.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError>;

    /// Return at most `top_k` entries, best match first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>, IndexError>;

    /// Enumerate ids stored at [`dims`](VectorIndex::dims). Rows of any other
    /// dimension are neither listed nor returned by `query`.
    async fn list_ids(&self) -> Result<HashSet<String>, IndexError>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize, IndexError>;
}

/// Reject any entry whose vector length differs from `dims`.
pub fn check_entry_dims(entries: &[IndexEntry], dims: usize) -> Result<(), IndexError> {
    match entries.iter().find(|e| e.vector.len() != dims) {
        Some(bad) => Err(IndexError::DimensionMismatch {
            id: bad.id.clone(),
            expected: dims,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Reject a query vector whose length differs from `dims`.
pub fn check_query_dims(vector: &[f32], dims: usize) -> Result<(), IndexError> {
    if vector.len() != dims {
        return Err(IndexError::DimensionMismatch {
            id: "<query>".to_string(),
            expected: dims,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Sort by score descending, then by insertion sequence descending, and
/// keep the first `top_k`.
pub fn rank_candidates(mut scored: Vec<(ScoredEntry, u64)>, top_k: usize) -> Vec<ScoredEntry> {
    scored.sort_by(|(a, seq_a), (b, seq_b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| seq_b.cmp(seq_a))
    });
    scored.truncate(top_k);
    scored.into_iter().map(|(entry, _)| entry).collect()
}
