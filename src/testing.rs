//! Fakes shared by unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clausemate_core::embedding::EmbeddingProvider;
use clausemate_core::error::{IndexError, ProviderError};
use clausemate_core::models::{IndexEntry, ScoredEntry};
use clausemate_core::store::VectorIndex;

use crate::embedding::{EmbeddingClient, RetryPolicy};

/// Deterministic provider that records every text it is asked to embed.
///
/// The vector is a character histogram folded into `dims` buckets, so equal
/// texts embed equally and similar texts land close together.
pub struct RecordingProvider {
    dims: usize,
    calls: Mutex<Vec<String>>,
    fail_containing: Mutex<HashSet<String>>,
}

impl RecordingProvider {
    pub fn new(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            dims,
            calls: Mutex::new(Vec::new()),
            fail_containing: Mutex::new(HashSet::new()),
        })
    }

    /// Fail permanently on any text containing `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.fail_containing.lock().unwrap().insert(needle.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn histogram(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for c in text.chars() {
        v[(c as usize) % dims] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for RecordingProvider {
    fn model_name(&self) -> &str {
        "recording"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.lock().unwrap().push(text.to_string());
        let failing = self
            .fail_containing
            .lock()
            .unwrap()
            .iter()
            .any(|needle| text.contains(needle.as_str()));
        if failing {
            return Err(ProviderError::permanent("400 Bad Request"));
        }
        Ok(histogram(text, self.dims))
    }
}

pub fn client_for(provider: Arc<RecordingProvider>) -> Arc<EmbeddingClient> {
    Arc::new(EmbeddingClient::new(provider, RetryPolicy::default()))
}

/// Index whose backing store is always unreachable.
pub struct DownIndex {
    pub dims: usize,
}

#[async_trait]
impl VectorIndex for DownIndex {
    fn dims(&self) -> usize {
        self.dims
    }
    async fn upsert(&self, _entries: &[IndexEntry]) -> Result<usize, IndexError> {
        Err(IndexError::unavailable("connection refused"))
    }
    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<ScoredEntry>, IndexError> {
        Err(IndexError::unavailable("connection refused"))
    }
    async fn list_ids(&self) -> Result<HashSet<String>, IndexError> {
        Err(IndexError::unavailable("connection refused"))
    }
    async fn count(&self) -> Result<usize, IndexError> {
        Err(IndexError::unavailable("connection refused"))
    }
}
