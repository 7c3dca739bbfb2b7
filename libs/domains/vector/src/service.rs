use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument};

use crate::adapter::VectorStoreAdapter;
use crate::backends::connect_adapter;
use crate::chunker::Chunker;
use crate::config::{BackendKind, PipelineConfig, VectorStoreConfig};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::VectorResult;
use crate::models::{Document, IngestSummary, SearchResult};
use crate::pipeline::{IngestPipeline, QueryPipeline};

/// Vector store facade.
///
/// Combines one connected backend with an embedding provider. Callers only
/// see documents, summaries and search results; which engine sits behind it
/// is decided by the [`BackendConfig`](crate::BackendConfig) variant.
pub struct VectorStore {
    adapter: Arc<dyn VectorStoreAdapter>,
    ingest: IngestPipeline,
    query: QueryPipeline,
}

impl VectorStore {
    /// Validate `config`, connect its backend and wire the pipelines.
    pub async fn connect(
        config: VectorStoreConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> VectorResult<Self> {
        config.validate()?;
        let adapter = connect_adapter(&config.backend).await?;
        Self::from_adapter(adapter, provider, &config.pipeline)
    }

    /// Wrap an already built adapter. It connects lazily on first use.
    pub fn from_adapter(
        adapter: Arc<dyn VectorStoreAdapter>,
        provider: Arc<dyn EmbeddingProvider>,
        pipeline: &PipelineConfig,
    ) -> VectorResult<Self> {
        pipeline.validate()?;
        let chunker = Chunker::new(pipeline.chunker_config())?;
        let embedder = Embedder::new(provider)
            .with_batch_size(pipeline.embed_batch_size)
            .with_retry(pipeline.retry.clone());

        Ok(Self {
            ingest: IngestPipeline::new(adapter.clone(), embedder.clone(), chunker)
                .with_workers(pipeline.workers)
                .with_write_batch_size(pipeline.write_batch_size),
            query: QueryPipeline::new(adapter.clone(), embedder),
            adapter,
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.adapter.kind()
    }

    /// Vector dimension of the collection, once known.
    pub async fn dimension(&self) -> Option<usize> {
        self.adapter.dimension().await
    }

    pub async fn ingest(&self, documents: Vec<Document>) -> IngestSummary {
        self.ingest.run(documents).await
    }

    /// Ingest `(filename, text)` pairs as uploaded. Files sharing a file
    /// name map to the same document id and overwrite each other.
    pub async fn ingest_uploads<I, N, T>(&self, uploads: I) -> IngestSummary
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let documents = uploads
            .into_iter()
            .map(|(name, text)| Document::from_upload(name, text))
            .collect();
        self.ingest.run(documents).await
    }

    pub async fn ingest_with_cancel(
        &self,
        documents: Vec<Document>,
        cancel: watch::Receiver<bool>,
    ) -> IngestSummary {
        self.ingest.run_with_cancel(documents, cancel).await
    }

    pub async fn search(&self, query: &str, top_k: usize) -> VectorResult<Vec<SearchResult>> {
        self.query.search(query, top_k).await
    }

    /// Drop everything in the collection so the corpus can be re-indexed.
    #[instrument(skip(self), fields(backend = %self.backend()))]
    pub async fn reset(&self) -> VectorResult<()> {
        self.adapter.delete_collection().await?;
        info!("Collection reset");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = %self.backend()))]
    pub async fn close(&self) -> VectorResult<()> {
        self.adapter.close().await
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("backend", &self.backend())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockVectorStoreAdapter;
    use crate::embedding::HashingProvider;
    use crate::error::VectorError;

    fn mock_adapter() -> MockVectorStoreAdapter {
        let mut adapter = MockVectorStoreAdapter::new();
        adapter.expect_kind().return_const(BackendKind::Pinecone);
        adapter.expect_dimension().returning(|| None);
        adapter
    }

    fn store(adapter: MockVectorStoreAdapter) -> VectorStore {
        VectorStore::from_adapter(
            Arc::new(adapter),
            Arc::new(HashingProvider::new(16).unwrap()),
            &PipelineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reset_and_close_reach_the_adapter() {
        let mut adapter = mock_adapter();
        adapter.expect_delete_collection().times(1).returning(|| Ok(()));
        adapter.expect_close().times(1).returning(|| Ok(()));

        let store = store(adapter);
        assert_eq!(store.backend(), BackendKind::Pinecone);
        store.reset().await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_ingest_uploads_uses_file_names_as_ids() {
        let mut adapter = mock_adapter();
        adapter
            .expect_upsert()
            .withf(|chunks| chunks.len() == 1 && chunks[0].chunk.document_id == "cats.txt")
            .times(1)
            .returning(|chunks| Ok(chunks.len()));

        let summary = store(adapter)
            .ingest_uploads([("animals/cats.txt", "Cats purr.")])
            .await;
        assert_eq!(summary.documents_processed, 1);
        assert_eq!(summary.chunks_written, 1);
    }

    #[tokio::test]
    async fn test_search_validates_before_embedding() {
        let mut adapter = mock_adapter();
        adapter.expect_search().never();

        let err = store(adapter).search("cats", 0).await.unwrap_err();
        assert!(matches!(err, VectorError::InvalidArgument(_)));
    }

    #[test]
    fn test_invalid_pipeline_is_rejected() {
        let pipeline = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        let err = VectorStore::from_adapter(
            Arc::new(mock_adapter()),
            Arc::new(HashingProvider::default()),
            &pipeline,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_connect_reports_missing_collection_name() {
        use crate::backends::lance::LanceConfig;
        use crate::config::BackendConfig;

        let config = VectorStoreConfig::new(BackendConfig::Local(LanceConfig::new("./unused", "")));
        let err = VectorStore::connect(config, Arc::new(HashingProvider::default()))
            .await
            .unwrap_err();
        match err {
            VectorError::Configuration { backend, fields, .. } => {
                assert_eq!(backend, "local");
                assert_eq!(fields, vec!["table_name".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
