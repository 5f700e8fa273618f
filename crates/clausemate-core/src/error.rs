//! Error taxonomy for the precedent pipeline.
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`EmbeddingError`] | embedding client | retriever: no precedents; ingestor: count as failed |
//! | [`IndexError`] | vector index | retriever: no precedents; ingestor: count as failed |
//! | [`MalformedResponseError`] | output recovery | surfaced to the caller, never retried |
//!
//! Transports report failures as [`ProviderError`] carrying a
//! [`FailureClass`]; the retry loop only ever looks at the class.

use thiserror::Error;

/// How a single provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Server-side or network trouble that may succeed on retry.
    Transient,
    /// Auth, malformed input, exhausted quota. Retrying cannot help.
    Permanent,
    /// The transport could not tell. Treated like `Permanent`.
    Unknown,
}

/// A failed call to an embedding provider, as classified by its transport.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub class: FailureClass,
    pub message: String,
}

impl ProviderError {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Permanent, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Unknown, message)
    }

    pub fn is_transient(&self) -> bool {
        self.class == FailureClass::Transient
    }
}

/// Terminal embedding failure: the text could not be embedded.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,
    #[error("embedding failed: {0}")]
    Permanent(ProviderError),
    #[error("embedding failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ProviderError },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Vector index failure.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
    #[error("vector dimension mismatch for '{id}': index holds {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
}

impl IndexError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        IndexError::Unavailable(err.to_string())
    }
}

/// The generation collaborator returned text that does not hold the
/// expected object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed model response: {reason}")]
pub struct MalformedResponseError {
    pub reason: String,
}

impl MalformedResponseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
