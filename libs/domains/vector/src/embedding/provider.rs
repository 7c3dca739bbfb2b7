use async_trait::async_trait;

use crate::error::VectorResult;

/// The external embedding runtime.
///
/// Implementations make one round trip per call and report failures as
/// `VectorError::EmbeddingBackend`, flagging the transient ones as
/// retryable. Batching, retries and output validation live in
/// [`Embedder`](super::Embedder).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name for logs, e.g. `openai:text-embedding-3-small`.
    fn name(&self) -> String;

    /// Output dimension, when the provider knows it up front.
    fn dimension(&self) -> Option<usize>;

    /// Embed `texts`, returning one vector per text in the same order.
    async fn embed_batch(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>>;
}
