//! Ingestion and query pipelines over one adapter and one embedder.

mod ingest;
mod query;

pub use ingest::IngestPipeline;
pub use query::QueryPipeline;
