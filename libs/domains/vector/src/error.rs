use core_config::ConfigError;
use thiserror::Error;

/// Every failure that crosses the vector store boundary.
///
/// Adapters translate native client errors into these variants; raw
/// `qdrant_client`, `mongodb`, `lancedb` or `reqwest` errors never leak out.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Missing or invalid connection parameters, including an endpoint that
    /// cannot be reached at connect time. Fatal, never retried.
    #[error(
        "Configuration error ({backend}): missing or invalid [{}]{}",
        .fields.join(", "),
        .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
    )]
    Configuration {
        backend: String,
        fields: Vec<String>,
        reason: Option<String>,
    },

    #[error("Embedding request contained no texts")]
    EmptyInput,

    #[error("Embedding backend error: {message}")]
    EmbeddingBackend { message: String, retryable: bool },

    /// A vector does not match the dimension already established for the run
    /// or the collection. Fatal for the whole ingestion run.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Backend write failure; `written` chunks of the batch were stored first.
    #[error("Ingestion error after {written} chunk(s) written: {message}")]
    Ingestion { message: String, written: usize },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type VectorResult<T> = Result<T, VectorError>;

impl VectorError {
    pub fn configuration(backend: impl Into<String>, fields: Vec<String>) -> Self {
        VectorError::Configuration {
            backend: backend.into(),
            fields,
            reason: None,
        }
    }

    /// Connecting with `field` failed for `reason`.
    pub fn unreachable(
        backend: impl Into<String>,
        field: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        VectorError::Configuration {
            backend: backend.into(),
            fields: vec![field.into()],
            reason: Some(reason.to_string()),
        }
    }

    pub fn from_config(backend: impl Into<String>, err: ConfigError) -> Self {
        VectorError::configuration(backend, err.fields())
    }

    /// Permanent embedding failure (bad request, malformed output).
    pub fn embedding(message: impl Into<String>) -> Self {
        VectorError::EmbeddingBackend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Embedding failure worth retrying (timeout, unreachable, 429/5xx).
    pub fn embedding_transient(message: impl Into<String>) -> Self {
        VectorError::EmbeddingBackend {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn ingestion(written: usize, message: impl Into<String>) -> Self {
        VectorError::Ingestion {
            message: message.into(),
            written,
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        VectorError::Query(message.into())
    }

    /// Whether the batch-level retry loop may try the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VectorError::EmbeddingBackend {
                retryable: true,
                ..
            }
        )
    }

    /// Errors that must stop an ingestion run instead of failing one document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VectorError::Configuration { .. } | VectorError::DimensionMismatch { .. }
        )
    }

    /// Rewrap a failure that happened while serving a search.
    ///
    /// Argument and fatal errors pass through so callers can tell them apart.
    pub fn into_query_error(self) -> Self {
        match self {
            VectorError::Query(_)
            | VectorError::InvalidArgument(_)
            | VectorError::Configuration { .. }
            | VectorError::DimensionMismatch { .. } => self,
            other => VectorError::Query(other.to_string()),
        }
    }
}
