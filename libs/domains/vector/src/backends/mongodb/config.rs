use core_config::EnvReader;
use database::mongodb::MongoConfig;

use crate::error::{VectorError, VectorResult};

pub const DEFAULT_EMBEDDING_FIELD: &str = "embedding";
pub const DEFAULT_NUM_CANDIDATES: u32 = 100;

/// MongoDB collection whose documents carry an embedding field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoVectorConfig {
    pub connection: MongoConfig,
    pub collection_name: String,
    /// Atlas Search vector index name. When set, queries run as
    /// `$vectorSearch`; otherwise the adapter scans and scores client side.
    pub vector_index: Option<String>,
    /// `$vectorSearch` candidate pool; raised to `top_k` when smaller.
    pub num_candidates: u32,
    pub embedding_field: String,
}

impl MongoVectorConfig {
    pub fn new(connection: MongoConfig, collection_name: impl Into<String>) -> Self {
        Self {
            connection,
            collection_name: collection_name.into(),
            vector_index: None,
            num_candidates: DEFAULT_NUM_CANDIDATES,
            embedding_field: DEFAULT_EMBEDDING_FIELD.to_string(),
        }
    }

    pub fn with_vector_index(mut self, index: impl Into<String>) -> Self {
        self.vector_index = Some(index.into());
        self
    }

    pub fn with_num_candidates(mut self, num_candidates: u32) -> Self {
        self.num_candidates = num_candidates;
        self
    }

    /// Connection variables (`URI`, `DB_NAME`, pool settings) followed by
    /// `COLLECTION_NAME` (required), `VECTOR_INDEX` and `NUM_CANDIDATES`.
    pub fn read_env(env: &mut EnvReader) -> Self {
        let mut connection = MongoConfig::read_env(env);
        connection
            .app_name
            .get_or_insert_with(|| "zerg-vector".to_string());
        let mut config = Self::new(connection, env.required("COLLECTION_NAME"));
        config.vector_index = env.optional("VECTOR_INDEX");
        config.num_candidates = env.parse_or("NUM_CANDIDATES", DEFAULT_NUM_CANDIDATES);
        config
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if !self.connection.url.starts_with("mongodb://")
            && !self.connection.url.starts_with("mongodb+srv://")
        {
            fields.push("uri".to_string());
        }
        if self.connection.database.trim().is_empty() {
            fields.push("db_name".to_string());
        }
        if self.collection_name.trim().is_empty() || self.collection_name.contains('$') {
            fields.push("collection_name".to_string());
        }
        if self.embedding_field.trim().is_empty() || self.embedding_field.starts_with('$') {
            fields.push("embedding_field".to_string());
        }
        if self.vector_index.is_some() && self.num_candidates == 0 {
            fields.push("num_candidates".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("mongodb", fields))
        }
    }
}
