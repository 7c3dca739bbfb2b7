use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::error::{VectorError, VectorResult};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Any OpenAI-compatible `/embeddings` endpoint: OpenAI itself, or a local
/// server (Ollama, text-embeddings-inference, vLLM) via `base_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAIConfig {
    /// Required for api.openai.com; local servers usually accept none.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Requested output size; only `text-embedding-3-*` models honour it.
    pub dimensions: Option<u32>,
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            dimensions: None,
            timeout_secs: 30,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if self.model.trim().is_empty() {
            fields.push("model".to_string());
        }
        if self.base_url.trim().is_empty() {
            fields.push("base_url".to_string());
        }
        if self.base_url == OPENAI_BASE_URL && self.api_key.is_none() {
            fields.push("api_key".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("embedding", fields))
        }
    }

    /// Output size known without calling the endpoint.
    pub fn known_dimension(&self) -> Option<usize> {
        if let Some(dimensions) = self.dimensions {
            return Some(dimensions as usize);
        }
        match self.model.as_str() {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OPENAI_MODEL)
    }
}

pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> VectorResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorError::embedding(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Timeouts, refused connections, 429 and 5xx are worth another attempt.
fn classify_status(status: StatusCode, body: &str) -> VectorError {
    let message = format!("embedding endpoint returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        VectorError::embedding_transient(message)
    } else {
        VectorError::embedding(message)
    }
}

fn classify_transport(err: reqwest::Error) -> VectorError {
    let message = format!("embedding endpoint unreachable: {err}");
    if err.is_timeout() || err.is_connect() || err.is_request() {
        VectorError::embedding_transient(message)
    } else {
        VectorError::embedding(message)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> String {
        format!("openai:{}", self.config.model)
    }

    fn dimension(&self) -> Option<usize> {
        self.config.known_dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| VectorError::embedding(format!("malformed embedding response: {e}")))?;

        // Sort by index to maintain order
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        debug!(count = data.len(), model = %self.config.model, "Received embeddings");

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
