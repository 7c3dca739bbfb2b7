use std::sync::Arc;

use database::common::{RetryConfig, retry_if};
use tracing::{debug, instrument};

use super::EmbeddingProvider;
use crate::error::{VectorError, VectorResult};

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Batches texts through an [`EmbeddingProvider`] and checks what comes back.
///
/// Each batch is retried with backoff while the provider reports a
/// retryable failure. Output must have one finite, non-empty vector per
/// input and a single dimension across the call (or the pinned one).
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    provider_name: String,
    batch_size: usize,
    retry: RetryConfig,
    expected_dimension: Option<usize>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider_name)
            .field("batch_size", &self.batch_size)
            .field("expected_dimension", &self.expected_dimension)
            .finish()
    }
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider_name: provider.name(),
            expected_dimension: provider.dimension(),
            provider,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Pin the output dimension; `None` accepts whatever the first batch returns.
    pub fn with_expected_dimension(mut self, dimension: Option<usize>) -> Self {
        self.expected_dimension = dimension;
        self
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn expected_dimension(&self) -> Option<usize> {
        self.expected_dimension
    }

    /// Embed `texts`, returning vectors in input order.
    #[instrument(skip_all, fields(provider = %self.provider_name, texts = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(VectorError::EmptyInput);
        }

        let mut dimension = self.expected_dimension;
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let output = retry_if(
                || self.provider.embed_batch(batch),
                self.retry.clone(),
                VectorError::is_retryable,
            )
            .await?;

            validate_batch(batch.len(), &output, &mut dimension)?;
            debug!(batch = batch.len(), dimension, "Embedded batch");
            vectors.extend(output);
        }

        Ok(vectors)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> VectorResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| VectorError::embedding("provider returned no vector"))
    }
}

fn validate_batch(
    expected_count: usize,
    vectors: &[Vec<f32>],
    dimension: &mut Option<usize>,
) -> VectorResult<()> {
    if vectors.len() != expected_count {
        return Err(VectorError::embedding(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }

    for (index, vector) in vectors.iter().enumerate() {
        if vector.is_empty() {
            return Err(VectorError::embedding(format!("vector {index} is empty")));
        }
        match *dimension {
            Some(expected) if vector.len() != expected => {
                return Err(VectorError::embedding(format!(
                    "vector {index} has dimension {}, expected {expected}",
                    vector.len()
                )));
            }
            Some(_) => {}
            None => *dimension = Some(vector.len()),
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(VectorError::embedding(format!(
                "vector {index} contains NaN or infinite values"
            )));
        }
    }

    Ok(())
}
