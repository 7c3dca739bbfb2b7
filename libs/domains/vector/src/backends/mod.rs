//! One adapter per storage engine, selected from [`BackendConfig`].

pub mod lance;
pub mod mongodb;
pub(crate) mod payload;
pub mod pinecone;
pub mod qdrant;

use std::sync::Arc;

use tracing::info;

use crate::adapter::VectorStoreAdapter;
use crate::config::BackendConfig;
use crate::error::VectorResult;

pub use self::lance::LanceAdapter;
pub use self::mongodb::MongoVectorAdapter;
pub use self::pinecone::PineconeAdapter;
pub use self::qdrant::QdrantAdapter;

/// Adapter for `config`, not yet connected.
pub fn build_adapter(config: &BackendConfig) -> Arc<dyn VectorStoreAdapter> {
    match config {
        BackendConfig::Local(c) => Arc::new(LanceAdapter::new(c.clone())),
        BackendConfig::Pinecone(c) => Arc::new(PineconeAdapter::new(c.clone())),
        BackendConfig::MongoDb(c) => Arc::new(MongoVectorAdapter::new(c.clone())),
        BackendConfig::Qdrant(c) => Arc::new(QdrantAdapter::new(c.clone())),
    }
}

/// Build the adapter for `config` and open its connection.
pub async fn connect_adapter(config: &BackendConfig) -> VectorResult<Arc<dyn VectorStoreAdapter>> {
    let adapter = build_adapter(config);
    adapter.connect().await?;
    info!(
        backend = %config.kind(),
        collection = %config.collection_name(),
        "Vector store backend connected"
    );
    Ok(adapter)
}
