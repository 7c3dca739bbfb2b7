use std::fmt;

use core_config::EnvReader;
use database::common::RetryConfig;

use crate::error::{VectorError, VectorResult};

pub const PINECONE_CONTROLLER_URL: &str = "https://api.pinecone.io";
pub const PINECONE_API_VERSION: &str = "2025-01";
/// Pinecone's request size limit allows roughly this many 1536-d vectors.
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

/// Managed Pinecone index settings.
///
/// The index is addressed by name; its data-plane host is looked up through
/// the control plane at connect time.
#[derive(Clone, PartialEq)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    /// Empty string is Pinecone's default namespace.
    pub namespace: String,
    pub controller_url: String,
    pub api_version: String,
    /// Serverless placement used when the index has to be created.
    /// Without both, a missing index is a configuration error.
    pub cloud: Option<String>,
    pub region: Option<String>,
    pub timeout_secs: u64,
    pub upsert_batch_size: usize,
    pub retry: RetryConfig,
}

impl PineconeConfig {
    pub fn new(api_key: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            index_name: index_name.into(),
            namespace: String::new(),
            controller_url: PINECONE_CONTROLLER_URL.to_string(),
            api_version: PINECONE_API_VERSION.to_string(),
            cloud: None,
            region: None,
            timeout_secs: 30,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_serverless(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = Some(cloud.into());
        self.region = Some(region.into());
        self
    }

    pub fn with_controller_url(mut self, url: impl Into<String>) -> Self {
        self.controller_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Serverless spec for index creation, when fully configured.
    pub fn serverless(&self) -> Option<(&str, &str)> {
        match (&self.cloud, &self.region) {
            (Some(cloud), Some(region)) => Some((cloud, region)),
            _ => None,
        }
    }

    /// Variables (after the reader's prefix):
    /// - `API_KEY`, `INDEX_NAME` (required)
    /// - `NAMESPACE`, `CLOUD`, `REGION`, `CONTROLLER_URL`, `TIMEOUT_SECS`
    pub fn read_env(env: &mut EnvReader) -> Self {
        let mut config = Self::new(env.required("API_KEY"), env.required("INDEX_NAME"))
            .with_namespace(env.optional("NAMESPACE").unwrap_or_default())
            .with_controller_url(env.or_default("CONTROLLER_URL", PINECONE_CONTROLLER_URL));
        config.cloud = env.optional("CLOUD");
        config.region = env.optional("REGION");
        config.timeout_secs = env.parse_or("TIMEOUT_SECS", config.timeout_secs);
        config
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if self.api_key.trim().is_empty() {
            fields.push("api_key".to_string());
        }
        if self.index_name.trim().is_empty() {
            fields.push("index_name".to_string());
        }
        if self.controller_url.trim().is_empty() {
            fields.push("controller_url".to_string());
        }
        // Half a placement is a typo, not a choice.
        match (&self.cloud, &self.region) {
            (Some(_), None) => fields.push("region".to_string()),
            (None, Some(_)) => fields.push("cloud".to_string()),
            _ => {}
        }
        if self.upsert_batch_size == 0 {
            fields.push("upsert_batch_size".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("pinecone", fields))
        }
    }
}

impl fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("api_key", &"***")
            .field("index_name", &self.index_name)
            .field("namespace", &self.namespace)
            .field("controller_url", &self.controller_url)
            .field("api_version", &self.api_version)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("timeout_secs", &self.timeout_secs)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .finish()
    }
}
