use std::fmt;

use core_config::EnvReader;

use crate::error::{VectorError, VectorResult};

/// Qdrant connection configuration
#[derive(Clone, PartialEq, Eq)]
pub struct QdrantConfig {
    /// gRPC endpoint, e.g. `http://localhost:6334`.
    pub url: String,
    pub collection_name: String,
    pub api_key: Option<String>,
    /// Named vector to read and write; `None` for the collection's unnamed vector.
    pub vector_name: Option<String>,
    pub timeout_secs: u64,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection_name: collection_name.into(),
            api_key: None,
            vector_name: None,
            timeout_secs: 30,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_vector_name(mut self, name: impl Into<String>) -> Self {
        self.vector_name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// `URL` and `COLLECTION_NAME` (required), `API_KEY`, `VECTOR_NAME`,
    /// `TIMEOUT_SECS`.
    pub fn read_env(env: &mut EnvReader) -> Self {
        let mut config = Self::new(env.required("URL"), env.required("COLLECTION_NAME"));
        config.api_key = env.optional("API_KEY");
        config.vector_name = env.optional("VECTOR_NAME");
        config.timeout_secs = env.parse_or("TIMEOUT_SECS", config.timeout_secs);
        config
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            fields.push("url".to_string());
        }
        if self.collection_name.trim().is_empty() {
            fields.push("collection_name".to_string());
        }
        if self.timeout_secs == 0 {
            fields.push("timeout_secs".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("qdrant", fields))
        }
    }
}

impl fmt::Debug for QdrantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QdrantConfig")
            .field("url", &self.url)
            .field("collection_name", &self.collection_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("vector_name", &self.vector_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(QdrantConfig::new("http://localhost:6334", "docs").validate().is_ok());
        match QdrantConfig::new("localhost:6334", " ").validate() {
            Err(VectorError::Configuration { fields, .. }) => {
                assert_eq!(fields, vec!["url".to_string(), "collection_name".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = QdrantConfig::new("https://xyz.cloud.qdrant.io:6334", "docs").with_api_key("secret");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_read_env() {
        temp_env::with_vars(
            [
                ("QDTEST_URL", Some("http://qdrant:6334")),
                ("QDTEST_COLLECTION_NAME", Some("docs")),
                ("QDTEST_API_KEY", None),
                ("QDTEST_VECTOR_NAME", Some("dense")),
                ("QDTEST_TIMEOUT_SECS", Some("nope")),
            ],
            || {
                let mut env = EnvReader::new("QDTEST_");
                let config = QdrantConfig::read_env(&mut env);
                assert_eq!(config.url, "http://qdrant:6334");
                assert_eq!(config.timeout_secs, 30);
                assert_eq!(config.vector_name.as_deref(), Some("dense"));
                let err = env.finish().unwrap_err();
                assert_eq!(err.fields().len(), 1);
                assert!(err.fields()[0].starts_with("QDTEST_TIMEOUT_SECS"));
            },
        );
    }
}
