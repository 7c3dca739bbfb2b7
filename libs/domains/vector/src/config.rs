//! Backend selection and pipeline tunables.
//!
//! Everything is plain data: build it in code, or load it from
//! `VECTOR_SEARCH_APP_*` variables. Only the selected backend's variables
//! are read, and every missing one is reported at once.

use core_config::EnvReader;
use database::common::RetryConfig;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::backends::lance::LanceConfig;
use crate::backends::mongodb::MongoVectorConfig;
use crate::backends::pinecone::PineconeConfig;
use crate::backends::qdrant::QdrantConfig;
use crate::chunker::{ChunkerConfig, DEFAULT_CHUNK_SIZE};
use crate::embedding::DEFAULT_EMBED_BATCH_SIZE;
use crate::error::{VectorError, VectorResult};

pub const ENV_PREFIX: &str = "VECTOR_SEARCH_APP_";

/// The four interchangeable storage engines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    /// Embedded LanceDB directory.
    #[strum(to_string = "local", serialize = "lancedb")]
    Local,
    /// Managed Pinecone index.
    Pinecone,
    /// MongoDB collection with an embedding field.
    #[strum(to_string = "mongodb", serialize = "mongo")]
    MongoDb,
    /// Qdrant server.
    Qdrant,
}

impl BackendKind {
    /// Prefix of this backend's variables, e.g. `VECTOR_SEARCH_APP_QDRANT_`.
    pub fn env_prefix(self) -> String {
        format!("{ENV_PREFIX}{}_", self.as_ref().to_uppercase())
    }
}

/// Connection parameters for exactly one backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Local(LanceConfig),
    Pinecone(PineconeConfig),
    MongoDb(MongoVectorConfig),
    Qdrant(QdrantConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Local(_) => BackendKind::Local,
            BackendConfig::Pinecone(_) => BackendKind::Pinecone,
            BackendConfig::MongoDb(_) => BackendKind::MongoDb,
            BackendConfig::Qdrant(_) => BackendKind::Qdrant,
        }
    }

    /// Table, index or collection the data lives in.
    pub fn collection_name(&self) -> &str {
        match self {
            BackendConfig::Local(c) => &c.table_name,
            BackendConfig::Pinecone(c) => &c.index_name,
            BackendConfig::MongoDb(c) => &c.collection_name,
            BackendConfig::Qdrant(c) => &c.collection_name,
        }
    }

    pub fn validate(&self) -> VectorResult<()> {
        match self {
            BackendConfig::Local(c) => c.validate(),
            BackendConfig::Pinecone(c) => c.validate(),
            BackendConfig::MongoDb(c) => c.validate(),
            BackendConfig::Qdrant(c) => c.validate(),
        }
    }

    /// Read `kind`'s variables and validate them.
    pub fn from_env(kind: BackendKind) -> VectorResult<Self> {
        let mut env = EnvReader::new(kind.env_prefix());
        let config = match kind {
            BackendKind::Local => BackendConfig::Local(LanceConfig::read_env(&mut env)),
            BackendKind::Pinecone => BackendConfig::Pinecone(PineconeConfig::read_env(&mut env)),
            BackendKind::MongoDb => BackendConfig::MongoDb(MongoVectorConfig::read_env(&mut env)),
            BackendKind::Qdrant => BackendConfig::Qdrant(QdrantConfig::read_env(&mut env)),
        };
        env.finish()
            .map_err(|e| VectorError::from_config(kind.to_string(), e))?;
        config.validate()?;
        Ok(config)
    }
}

/// Ingestion tunables shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Texts per embedding call.
    pub embed_batch_size: usize,
    /// Documents processed concurrently.
    pub workers: usize,
    /// Chunks per adapter upsert call.
    pub write_batch_size: usize,
    /// Backoff for transient embedding and backend failures.
    pub retry: RetryConfig,
}

impl PipelineConfig {
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig::new(self.chunk_size).with_overlap(self.chunk_overlap)
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if let Err(VectorError::Configuration { fields: chunker, .. }) =
            self.chunker_config().validate()
        {
            fields.extend(chunker);
        }
        if self.embed_batch_size == 0 {
            fields.push("embed_batch_size".to_string());
        }
        if self.workers == 0 {
            fields.push("workers".to_string());
        }
        if self.write_batch_size == 0 {
            fields.push("write_batch_size".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("pipeline", fields))
        }
    }

    /// `CHUNK_SIZE`, `CHUNK_OVERLAP`, `EMBED_BATCH_SIZE`, `WORKERS`,
    /// `WRITE_BATCH_SIZE` and `MAX_RETRIES`, all optional.
    pub fn from_env() -> VectorResult<Self> {
        let defaults = Self::default();
        let mut env = EnvReader::new(ENV_PREFIX);
        let config = Self {
            chunk_size: env.parse_or("CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: env.parse_or("CHUNK_OVERLAP", defaults.chunk_overlap),
            embed_batch_size: env.parse_or("EMBED_BATCH_SIZE", defaults.embed_batch_size),
            workers: env.parse_or("WORKERS", defaults.workers),
            write_batch_size: env.parse_or("WRITE_BATCH_SIZE", defaults.write_batch_size),
            retry: defaults
                .retry
                .with_max_retries(env.parse_or("MAX_RETRIES", defaults.retry.max_retries)),
        };
        env.finish()
            .map_err(|e| VectorError::from_config("pipeline", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: 0,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            workers: 4,
            write_batch_size: 64,
            retry: RetryConfig::default(),
        }
    }
}

/// Everything a [`VectorStore`](crate::VectorStore) needs besides the embedder.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStoreConfig {
    pub backend: BackendConfig,
    pub pipeline: PipelineConfig,
}

impl VectorStoreConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn validate(&self) -> VectorResult<()> {
        self.backend.validate()?;
        self.pipeline.validate()
    }

    /// Backend named by `VECTOR_SEARCH_APP_BACKEND` (default `local`).
    pub fn selected_backend() -> VectorResult<BackendKind> {
        let env = EnvReader::new(ENV_PREFIX);
        match env.optional("BACKEND") {
            None => Ok(BackendKind::Local),
            Some(raw) => raw
                .parse()
                .map_err(|_| VectorError::configuration("config", vec![env.key("BACKEND")])),
        }
    }

    pub fn from_env() -> VectorResult<Self> {
        Self::from_env_for(Self::selected_backend()?)
    }

    /// Load the configuration for `kind`, ignoring the selector variable.
    pub fn from_env_for(kind: BackendKind) -> VectorResult<Self> {
        Ok(Self {
            backend: BackendConfig::from_env(kind)?,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::Local.to_string(), "local");
        assert_eq!(BackendKind::MongoDb.to_string(), "mongodb");
        assert_eq!("QDrant".parse::<BackendKind>().unwrap(), BackendKind::Qdrant);
        assert_eq!("lancedb".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert_eq!("mongo".parse::<BackendKind>().unwrap(), BackendKind::MongoDb);
        assert!("milvus".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::iter().count(), 4);
    }

    #[test]
    fn test_env_prefixes() {
        assert_eq!(BackendKind::Local.env_prefix(), "VECTOR_SEARCH_APP_LOCAL_");
        assert_eq!(BackendKind::MongoDb.env_prefix(), "VECTOR_SEARCH_APP_MONGODB_");
    }

    #[test]
    fn test_selected_backend_defaults_to_local() {
        temp_env::with_var_unset("VECTOR_SEARCH_APP_BACKEND", || {
            assert_eq!(VectorStoreConfig::selected_backend().unwrap(), BackendKind::Local);
        });
        temp_env::with_var("VECTOR_SEARCH_APP_BACKEND", Some("Pinecone"), || {
            assert_eq!(
                VectorStoreConfig::selected_backend().unwrap(),
                BackendKind::Pinecone
            );
        });
    }

    #[test]
    fn test_unknown_backend_is_a_configuration_error() {
        temp_env::with_var("VECTOR_SEARCH_APP_BACKEND", Some("milvus"), || {
            let err = VectorStoreConfig::selected_backend().unwrap_err();
            assert!(err.to_string().contains("VECTOR_SEARCH_APP_BACKEND"));
        });
    }

    #[test]
    fn test_missing_backend_fields_are_all_listed() {
        temp_env::with_vars(
            [
                ("VECTOR_SEARCH_APP_MONGODB_URI", None::<&str>),
                ("VECTOR_SEARCH_APP_MONGODB_DB_NAME", None),
                ("VECTOR_SEARCH_APP_MONGODB_COLLECTION_NAME", None),
            ],
            || match BackendConfig::from_env(BackendKind::MongoDb) {
                Err(VectorError::Configuration { backend, fields, .. }) => {
                    assert_eq!(backend, "mongodb");
                    assert_eq!(
                        fields,
                        vec![
                            "VECTOR_SEARCH_APP_MONGODB_URI".to_string(),
                            "VECTOR_SEARCH_APP_MONGODB_DB_NAME".to_string(),
                            "VECTOR_SEARCH_APP_MONGODB_COLLECTION_NAME".to_string(),
                        ]
                    );
                }
                other => panic!("unexpected result: {other:?}"),
            },
        );
    }

    #[test]
    fn test_only_selected_backend_is_read() {
        temp_env::with_vars(
            [
                ("VECTOR_SEARCH_APP_BACKEND", Some("qdrant")),
                ("VECTOR_SEARCH_APP_QDRANT_URL", Some("http://localhost:6334")),
                ("VECTOR_SEARCH_APP_QDRANT_COLLECTION_NAME", Some("docs")),
                ("VECTOR_SEARCH_APP_PINECONE_API_KEY", None),
                ("VECTOR_SEARCH_APP_CHUNK_SIZE", None),
            ],
            || {
                let config = VectorStoreConfig::from_env().unwrap();
                assert_eq!(config.backend.kind(), BackendKind::Qdrant);
                assert_eq!(config.backend.collection_name(), "docs");
                assert_eq!(config.pipeline.chunk_size, DEFAULT_CHUNK_SIZE);
            },
        );
    }

    #[test]
    fn test_pipeline_from_env() {
        temp_env::with_vars(
            [
                ("VECTOR_SEARCH_APP_CHUNK_SIZE", Some("200")),
                ("VECTOR_SEARCH_APP_CHUNK_OVERLAP", Some("20")),
                ("VECTOR_SEARCH_APP_WORKERS", Some("2")),
                ("VECTOR_SEARCH_APP_MAX_RETRIES", Some("5")),
                ("VECTOR_SEARCH_APP_EMBED_BATCH_SIZE", None),
                ("VECTOR_SEARCH_APP_WRITE_BATCH_SIZE", None),
            ],
            || {
                let pipeline = PipelineConfig::from_env().unwrap();
                assert_eq!(pipeline.chunk_size, 200);
                assert_eq!(pipeline.chunk_overlap, 20);
                assert_eq!(pipeline.workers, 2);
                assert_eq!(pipeline.retry.max_retries, 5);
                assert_eq!(pipeline.embed_batch_size, DEFAULT_EMBED_BATCH_SIZE);
            },
        );
    }

    #[test]
    fn test_pipeline_validation_lists_bad_fields() {
        let pipeline = PipelineConfig {
            chunk_overlap: DEFAULT_CHUNK_SIZE,
            workers: 0,
            ..PipelineConfig::default()
        };
        match pipeline.validate() {
            Err(VectorError::Configuration { fields, .. }) => {
                assert_eq!(fields, vec!["chunk_overlap".to_string(), "workers".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
