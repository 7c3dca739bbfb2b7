//! One facade per backend, connected on first use and cached.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, VectorStoreConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{VectorError, VectorResult};
use crate::models::{Document, IngestSummary, SearchResult};
use crate::service::VectorStore;

/// Routes requests to the backend they name, keeping one live
/// [`VectorStore`] per backend.
///
/// Configurations are registered up front with [`with_config`], or read from
/// the environment the first time an unregistered backend is asked for when
/// the registry was built with [`from_env`].
///
/// [`with_config`]: VectorStoreRegistry::with_config
/// [`from_env`]: VectorStoreRegistry::from_env
pub struct VectorStoreRegistry {
    provider: Arc<dyn EmbeddingProvider>,
    default_backend: BackendKind,
    configs: HashMap<BackendKind, VectorStoreConfig>,
    load_from_env: bool,
    stores: Mutex<HashMap<BackendKind, Arc<VectorStore>>>,
}

impl VectorStoreRegistry {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, default_backend: BackendKind) -> Self {
        Self {
            provider,
            default_backend,
            configs: HashMap::new(),
            load_from_env: false,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Default backend from `VECTOR_SEARCH_APP_BACKEND`. Its settings are
    /// read and checked here; other backends are read from their own
    /// variables on first use.
    pub fn from_env(provider: Arc<dyn EmbeddingProvider>) -> VectorResult<Self> {
        let config = VectorStoreConfig::from_env()?;
        let mut registry = Self::new(provider, config.backend.kind()).with_config(config);
        registry.load_from_env = true;
        Ok(registry)
    }

    pub fn with_config(mut self, config: VectorStoreConfig) -> Self {
        self.configs.insert(config.backend.kind(), config);
        self
    }

    pub fn default_backend(&self) -> BackendKind {
        self.default_backend
    }

    fn config_for(&self, kind: BackendKind) -> VectorResult<VectorStoreConfig> {
        if let Some(config) = self.configs.get(&kind) {
            return Ok(config.clone());
        }
        if self.load_from_env {
            return VectorStoreConfig::from_env_for(kind);
        }
        Err(VectorError::configuration(
            kind.to_string(),
            vec!["backend".to_string()],
        ))
    }

    /// Connected store for `backend` (or the default one).
    pub async fn store(&self, backend: Option<BackendKind>) -> VectorResult<Arc<VectorStore>> {
        let kind = backend.unwrap_or(self.default_backend);

        // Held across connect so concurrent first requests share one connection.
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&kind) {
            return Ok(store.clone());
        }

        debug!(backend = %kind, "Connecting vector store");
        let store = Arc::new(VectorStore::connect(self.config_for(kind)?, self.provider.clone()).await?);
        stores.insert(kind, store.clone());
        Ok(store)
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        backend: Option<BackendKind>,
    ) -> VectorResult<Vec<SearchResult>> {
        self.store(backend)
            .await
            .map_err(VectorError::into_query_error)?
            .search(query, top_k)
            .await
    }

    pub async fn ingest(
        &self,
        documents: Vec<Document>,
        backend: Option<BackendKind>,
    ) -> VectorResult<IngestSummary> {
        Ok(self.store(backend).await?.ingest(documents).await)
    }

    pub async fn reset(&self, backend: Option<BackendKind>) -> VectorResult<()> {
        self.store(backend).await?.reset().await
    }

    /// Backends with a live connection.
    pub async fn connected(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<_> = self.stores.lock().await.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Close and forget every cached store. Errors are logged and the first
    /// one is returned after all stores were visited.
    pub async fn close_all(&self) -> VectorResult<()> {
        let stores: Vec<_> = self.stores.lock().await.drain().collect();
        let mut first_error = None;
        for (kind, store) in stores {
            match store.close().await {
                Ok(()) => info!(backend = %kind, "Vector store closed"),
                Err(e) => {
                    warn!(backend = %kind, error = %e, "Failed to close vector store");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
