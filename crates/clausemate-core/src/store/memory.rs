//! In-memory [`VectorIndex`] implementation for tests and tooling.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Query is brute-force cosine
//! similarity over every stored vector.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::{IndexEntry, ScoredEntry};

use super::{check_entry_dims, check_query_dims, rank_candidates, VectorIndex};

struct StoredEntry {
    entry: IndexEntry,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, StoredEntry>,
    next_seq: u64,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    dims: usize,
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            inner: RwLock::new(Inner::default()),
        }
    }
}

fn poisoned<T>(_: T) -> IndexError {
    IndexError::Unavailable("in-memory index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        check_entry_dims(entries, self.dims)?;
        let mut inner = self.inner.write().map_err(poisoned)?;
        for entry in entries {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(
                entry.id.clone(),
                StoredEntry {
                    entry: entry.clone(),
                    seq,
                },
            );
        }
        Ok(entries.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>, IndexError> {
        check_query_dims(vector, self.dims)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().map_err(poisoned)?;
        let scored = inner
            .entries
            .values()
            .map(|stored| {
                (
                    ScoredEntry {
                        score: cosine_similarity(vector, &stored.entry.vector),
                        entry: stored.entry.clone(),
                    },
                    stored.seq,
                )
            })
            .collect();
        Ok(rank_candidates(scored, top_k))
    }

    async fn list_ids(&self) -> Result<HashSet<String>, IndexError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.entries.keys().cloned().collect())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.entries.len())
    }
}
