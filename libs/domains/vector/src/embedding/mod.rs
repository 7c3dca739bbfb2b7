mod embedder;
mod hashing;
mod openai;
mod provider;

use std::sync::Arc;

use core_config::EnvReader;
use strum::{Display, EnumString};

pub use embedder::{DEFAULT_EMBED_BATCH_SIZE, Embedder};
pub use hashing::{DEFAULT_HASHING_DIMENSION, HashingProvider};
pub use openai::{DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL, OpenAIConfig, OpenAIProvider};
#[cfg(test)]
pub use provider::MockEmbeddingProvider;
pub use provider::EmbeddingProvider;

use crate::config::ENV_PREFIX;
use crate::error::{VectorError, VectorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EmbeddingProviderKind {
    Hashing,
    OpenAI,
}

/// Which embedding runtime to use and how to reach it.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingConfig {
    Hashing { dimension: usize },
    OpenAI(OpenAIConfig),
}

impl EmbeddingConfig {
    pub fn kind(&self) -> EmbeddingProviderKind {
        match self {
            EmbeddingConfig::Hashing { .. } => EmbeddingProviderKind::Hashing,
            EmbeddingConfig::OpenAI(_) => EmbeddingProviderKind::OpenAI,
        }
    }

    /// Load from `VECTOR_SEARCH_APP_EMBEDDING_*`:
    ///
    /// - `PROVIDER`: `hashing` (default) or `openai`
    /// - `DIMENSION`: hashing output size, or requested OpenAI `dimensions`
    /// - `MODEL`, `BASE_URL`, `API_KEY`, `TIMEOUT_SECS`: OpenAI-compatible endpoint
    pub fn from_env() -> VectorResult<Self> {
        let mut env = EnvReader::new(format!("{ENV_PREFIX}EMBEDDING_"));

        let kind = match env.optional("PROVIDER") {
            None => EmbeddingProviderKind::Hashing,
            Some(raw) => raw.parse().map_err(|_| {
                VectorError::configuration("embedding", vec![env.key("PROVIDER")])
            })?,
        };

        let config = match kind {
            EmbeddingProviderKind::Hashing => EmbeddingConfig::Hashing {
                dimension: env.parse_or("DIMENSION", DEFAULT_HASHING_DIMENSION),
            },
            EmbeddingProviderKind::OpenAI => {
                let mut openai = OpenAIConfig::new(env.or_default("MODEL", DEFAULT_OPENAI_MODEL))
                    .with_base_url(env.or_default("BASE_URL", OPENAI_BASE_URL));
                openai.api_key = env.optional("API_KEY");
                openai.dimensions = env.parse_optional("DIMENSION");
                openai.timeout_secs = env.parse_or("TIMEOUT_SECS", openai.timeout_secs);
                if openai.base_url == OPENAI_BASE_URL && openai.api_key.is_none() {
                    env.required("API_KEY");
                }
                EmbeddingConfig::OpenAI(openai)
            }
        };

        env.finish()
            .map_err(|e| VectorError::from_config("embedding", e))?;
        Ok(config)
    }

    pub fn build(&self) -> VectorResult<Arc<dyn EmbeddingProvider>> {
        Ok(match self {
            EmbeddingConfig::Hashing { dimension } => Arc::new(HashingProvider::new(*dimension)?),
            EmbeddingConfig::OpenAI(config) => Arc::new(OpenAIProvider::new(config.clone())?),
        })
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Hashing {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}
