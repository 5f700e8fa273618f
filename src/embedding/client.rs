//! Retrying embedding client.
//!
//! Wraps one [`EmbeddingProvider`] call with bounded exponential backoff:
//! transient failures are retried up to `max_attempts` total calls, waiting
//! `base_delay`, then twice that, and so on between attempts. Permanent and
//! unclassified failures return immediately. Every returned vector is
//! checked against the provider's dimension.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use clausemate_core::embedding::EmbeddingProvider;
use clausemate_core::error::EmbeddingError;

use crate::config::EmbeddingConfig;

use super::create_provider;

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total provider calls allowed per `embed`, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled before each later one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }

    /// Waits inserted between attempts, in order. Base 2s, 5 attempts →
    /// `[2s, 4s, 8s, 16s]`.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| self.base_delay.saturating_mul(1u32 << i.min(31)))
            .collect()
    }
}

/// Embedding client shared by the ingestor and the retriever.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Build the configured provider and wrap it with the configured policy.
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            create_provider(config)?,
            RetryPolicy::from_config(config),
        ))
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Embed `text`. The caller is responsible for truncating long input.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let delays = self.policy.delays();
        let mut attempt: u32 = 1;
        loop {
            match self.provider.embed(text).await {
                Ok(vector) => {
                    let expected = self.provider.dims();
                    if vector.len() != expected {
                        return Err(EmbeddingError::DimensionMismatch {
                            expected,
                            actual: vector.len(),
                        });
                    }
                    return Ok(vector);
                }
                Err(err) if err.is_transient() => {
                    let Some(delay) = delays.get(attempt as usize - 1).copied() else {
                        return Err(EmbeddingError::RetriesExhausted {
                            attempts: attempt,
                            last: err,
                        });
                    };
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(EmbeddingError::Permanent(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clausemate_core::error::{FailureClass, ProviderError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted results; counts calls.
    struct ScriptedProvider {
        dims: usize,
        script: Mutex<VecDeque<Result<Vec<f32>, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(dims: usize, script: Vec<Result<Vec<f32>, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                dims,
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::transient("503 Service Unavailable")))
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> EmbeddingClient {
        EmbeddingClient::new(provider, RetryPolicy::default())
    }

    #[test]
    fn test_delay_schedule_doubles() {
        let secs: Vec<u64> = RetryPolicy::default()
            .delays()
            .iter()
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![2, 4, 8, 16]);

        let single = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_secs(2),
        };
        assert!(single.delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts_with_doubling_waits() {
        let provider = ScriptedProvider::new(2, vec![]);
        let client = client(provider.clone());

        let started = tokio::time::Instant::now();
        let err = client.embed("판례").await.unwrap_err();
        let waited = started.elapsed();

        assert_eq!(provider.calls(), 5);
        assert!(matches!(err, EmbeddingError::RetriesExhausted { attempts: 5, .. }));
        assert!(waited >= Duration::from_secs(30));
        assert!(waited < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let provider = ScriptedProvider::new(
            2,
            vec![
                Err(ProviderError::transient("500 Internal")),
                Err(ProviderError::transient("timeout")),
                Ok(vec![0.1, 0.2]),
            ],
        );
        let client = client(provider.clone());

        let started = tokio::time::Instant::now();
        assert_eq!(client.embed("text").await.unwrap(), vec![0.1, 0.2]);
        assert_eq!(provider.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let provider = ScriptedProvider::new(
            2,
            vec![Err(ProviderError::permanent("401 Unauthorized"))],
        );
        let client = client(provider.clone());

        let started = tokio::time::Instant::now();
        let err = client.embed("text").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Permanent(ref e) if e.class == FailureClass::Permanent));
        assert_eq!(provider.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_failure_is_not_retried() {
        let provider = ScriptedProvider::new(2, vec![Err(ProviderError::unknown("garbled"))]);
        let client = client(provider.clone());
        assert!(matches!(
            client.embed("text").await.unwrap_err(),
            EmbeddingError::Permanent(_)
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let provider = ScriptedProvider::new(3, vec![Ok(vec![1.0, 2.0])]);
        let err = client(provider).embed("text").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_text_never_calls_provider() {
        let provider = ScriptedProvider::new(2, vec![Ok(vec![1.0, 2.0])]);
        let client = client(provider.clone());
        assert!(matches!(
            client.embed("   ").await.unwrap_err(),
            EmbeddingError::EmptyInput
        ));
        assert_eq!(provider.calls(), 0);
    }
}
