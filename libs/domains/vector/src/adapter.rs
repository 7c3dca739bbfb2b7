use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::BackendKind;
use crate::error::{VectorError, VectorResult};
use crate::models::{EmbeddedChunk, SearchResult};

/// Uniform capability set over one storage engine.
///
/// Implementations own their connection state, translate every native
/// client error into [`VectorError`], and synchronize internally so one
/// instance can be shared by all ingestion workers and concurrent searches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStoreAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Validate configuration and open the connection. Calling it again
    /// reuses the live connection.
    async fn connect(&self) -> VectorResult<()>;

    /// Insert or overwrite chunks keyed by chunk id; returns how many were written.
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> VectorResult<usize>;

    /// At most `top_k` results, best first, ties broken by chunk id.
    async fn search(&self, vector: &[f32], top_k: usize) -> VectorResult<Vec<SearchResult>>;

    /// Remove all data in the configured collection; no-op when it is absent.
    async fn delete_collection(&self) -> VectorResult<()>;

    /// Vector dimension of the collection, once known.
    async fn dimension(&self) -> Option<usize>;

    /// Release the connection. A later call to any method reconnects.
    async fn close(&self) -> VectorResult<()>;
}

/// Reject `top_k == 0` before any backend round trip.
pub fn check_top_k(top_k: usize) -> VectorResult<()> {
    if top_k == 0 {
        Err(VectorError::InvalidArgument(
            "top_k must be greater than 0".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Every chunk in `chunks` must have `expected` dimensions.
pub fn check_dimension(chunks: &[EmbeddedChunk], expected: usize) -> VectorResult<()> {
    match chunks.iter().find(|c| c.dimension() != expected) {
        Some(chunk) => Err(VectorError::DimensionMismatch {
            expected,
            actual: chunk.dimension(),
        }),
        None => Ok(()),
    }
}

/// Dimension shared by all of `chunks`, or `None` when the slice is empty.
pub fn batch_dimension(chunks: &[EmbeddedChunk]) -> VectorResult<Option<usize>> {
    let Some(first) = chunks.first() else {
        return Ok(None);
    };
    check_dimension(chunks, first.dimension())?;
    Ok(Some(first.dimension()))
}

/// Lazily created, shareable connection handle.
///
/// The first caller connects while holding the write lock; everybody else
/// clones the `Arc` under a read lock.
pub struct HandleSlot<H> {
    inner: RwLock<Option<Arc<H>>>,
}

impl<H> HandleSlot<H> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub async fn get_or_connect<F, Fut>(&self, connect: F) -> VectorResult<Arc<H>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = VectorResult<H>>,
    {
        if let Some(handle) = self.inner.read().await.as_ref() {
            return Ok(handle.clone());
        }

        let mut slot = self.inner.write().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let handle = Arc::new(connect().await?);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    pub async fn current(&self) -> Option<Arc<H>> {
        self.inner.read().await.clone()
    }

    pub async fn take(&self) -> Option<Arc<H>> {
        self.inner.write().await.take()
    }
}

impl<H> Default for HandleSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}
