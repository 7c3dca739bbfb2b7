//! Vector Domain Library
//!
//! Backend-agnostic document vector store: documents are chunked, embedded
//! and written to one of four interchangeable engines, then searched by
//! embedding a query text.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ VectorStoreRegistry  │  ← one cached store per backend
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐     ┌───────────────────┐
//! │     VectorStore      │────►│     Embedder      │
//! │ ingest / search /    │     │ (EmbeddingProvider│
//! │ reset / close        │     │  Hashing, OpenAI) │
//! └──────────┬───────────┘     └───────────────────┘
//!            │
//! ┌──────────▼───────────┐
//! │  VectorStoreAdapter  │
//! │      (trait)         │
//! └──────────┬───────────┘
//!            │
//!   ┌────────┼─────────┬──────────┐
//!   ▼        ▼         ▼          ▼
//! LanceDB Pinecone  MongoDB    Qdrant
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use domain_vector::{
//!     BackendConfig, Document, HashingProvider, LanceConfig, VectorStore, VectorStoreConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VectorStoreConfig::new(BackendConfig::Local(LanceConfig::new(
//!     "./data/vectors",
//!     "documents",
//! )));
//! let store = VectorStore::connect(config, Arc::new(HashingProvider::default())).await?;
//!
//! let summary = store
//!     .ingest(vec![Document::from_upload("cats.txt", "Cats purr when they are content.")])
//!     .await;
//! assert_eq!(summary.documents_processed, 1);
//!
//! for hit in store.search("why do cats purr", 3).await? {
//!     println!("{:.3} {}", hit.score, hit.text);
//! }
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backends;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod service;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use adapter::VectorStoreAdapter;
pub use backends::lance::LanceConfig;
pub use backends::mongodb::MongoVectorConfig;
pub use backends::pinecone::PineconeConfig;
pub use backends::qdrant::QdrantConfig;
pub use backends::{LanceAdapter, MongoVectorAdapter, PineconeAdapter, QdrantAdapter};
pub use chunker::{Chunker, ChunkerConfig};
pub use config::{BackendConfig, BackendKind, PipelineConfig, VectorStoreConfig};
pub use embedding::{
    Embedder, EmbeddingConfig, EmbeddingProvider, HashingProvider, OpenAIConfig, OpenAIProvider,
};
pub use error::{VectorError, VectorResult};
pub use models::{
    Chunk, Document, DocumentFailure, EmbeddedChunk, IngestStage, IngestSummary, Metadata,
    SearchResult,
};
pub use pipeline::{IngestPipeline, QueryPipeline};
pub use registry::VectorStoreRegistry;
pub use service::VectorStore;
