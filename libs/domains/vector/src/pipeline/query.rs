use std::sync::Arc;

use tracing::{debug, instrument};

use crate::adapter::{VectorStoreAdapter, check_top_k};
use crate::embedding::Embedder;
use crate::error::{VectorError, VectorResult};
use crate::models::{SearchResult, rank_results};

/// Embed a query and look up its nearest chunks.
#[derive(Clone)]
pub struct QueryPipeline {
    adapter: Arc<dyn VectorStoreAdapter>,
    embedder: Embedder,
}

impl QueryPipeline {
    pub fn new(adapter: Arc<dyn VectorStoreAdapter>, embedder: Embedder) -> Self {
        Self { adapter, embedder }
    }

    /// At most `top_k` results, best first.
    ///
    /// Blank queries and `top_k == 0` are rejected before any round trip.
    /// Embedding and backend failures come back as [`VectorError::Query`].
    #[instrument(skip_all, fields(backend = %self.adapter.kind(), top_k = top_k))]
    pub async fn search(&self, query: &str, top_k: usize) -> VectorResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(VectorError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }
        check_top_k(top_k)?;

        let vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| VectorError::query(format!("embedding the query failed: {e}")))?;

        let results = self
            .adapter
            .search(&vector, top_k)
            .await
            .map_err(VectorError::into_query_error)?;

        let results = rank_results(results, top_k);
        debug!(results = results.len(), "Search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockVectorStoreAdapter;
    use crate::config::BackendKind;
    use crate::embedding::MockEmbeddingProvider;
    use crate::models::Metadata;
    use database::common::RetryConfig;

    fn hit(id: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: id.to_string(),
            document_id: "doc".to_string(),
            text: format!("text of {id}"),
            score,
            source_path: String::new(),
            metadata: Metadata::new(),
        }
    }

    fn embedder(fail: bool) -> Embedder {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider.expect_dimension().return_const(Some(2usize));
        provider.expect_embed_batch().returning(move |texts| {
            if fail {
                Err(VectorError::embedding("model offline"))
            } else {
                Ok(texts.iter().map(|_| vec![0.6, 0.8]).collect())
            }
        });
        Embedder::new(Arc::new(provider)).with_retry(RetryConfig::none())
    }

    fn adapter() -> MockVectorStoreAdapter {
        let mut adapter = MockVectorStoreAdapter::new();
        adapter.expect_kind().return_const(BackendKind::Local);
        adapter
    }

    #[tokio::test]
    async fn test_search_ranks_and_truncates() {
        let mut adapter = adapter();
        adapter
            .expect_search()
            .withf(|vector, top_k| vector.to_vec() == vec![0.6f32, 0.8] && *top_k == 2)
            .returning(|_, _| Ok(vec![hit("b:0", 0.4), hit("a:0", 0.9), hit("c:0", 0.4)]));

        let results = QueryPipeline::new(Arc::new(adapter), embedder(false))
            .search("what is a cat", 2)
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a:0", "b:0"]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_the_backend() {
        let mut adapter = adapter();
        adapter.expect_search().never();
        let pipeline = QueryPipeline::new(Arc::new(adapter), embedder(false));

        assert!(matches!(
            pipeline.search("   ", 3).await,
            Err(VectorError::InvalidArgument(_))
        ));
        assert!(matches!(
            pipeline.search("cats", 0).await,
            Err(VectorError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_becomes_query_error() {
        let mut adapter = adapter();
        adapter.expect_search().never();

        let err = QueryPipeline::new(Arc::new(adapter), embedder(true))
            .search("cats", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Query(ref m) if m.contains("model offline")));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_query_error() {
        let mut adapter = adapter();
        adapter
            .expect_search()
            .returning(|_, _| Err(VectorError::ingestion(0, "connection reset")));

        let err = QueryPipeline::new(Arc::new(adapter), embedder(false))
            .search("cats", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Query(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_fatal_backend_errors_keep_their_kind() {
        let mut adapter = adapter();
        adapter.expect_search().returning(|_, _| {
            Err(VectorError::unreachable("qdrant", "url", "connection refused"))
        });

        let err = QueryPipeline::new(Arc::new(adapter), embedder(false))
            .search("cats", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::Configuration { ref backend, .. } if backend == "qdrant"));
    }
}
