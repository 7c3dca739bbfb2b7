//! Pinecone REST implementation of VectorStoreAdapter

use std::time::{Duration, Instant};

use async_trait::async_trait;
use database::common::retry_if;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::PineconeConfig;
use crate::adapter::{HandleSlot, VectorStoreAdapter, batch_dimension, check_top_k};
use crate::backends::payload::{chunk_payload, result_from_payload};
use crate::config::BackendKind;
use crate::error::{VectorError, VectorResult};
use crate::models::{EmbeddedChunk, ScoreKind, SearchResult, rank_results};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum PineconeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Pinecone returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl PineconeError {
    /// Timeouts, refused connections, 429 and 5xx.
    fn is_transient(&self) -> bool {
        match self {
            PineconeError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PineconeError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }

    fn status(&self) -> Option<StatusCode> {
        match self {
            PineconeError::Status { status, .. } => Some(*status),
            PineconeError::Transport(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: Option<usize>,
    #[serde(default)]
    metric: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

async fn execute(request: RequestBuilder) -> Result<Response, PineconeError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(PineconeError::Status { status, body })
    }
}

/// Data-plane address and scoring rule of a ready index.
#[derive(Debug, Clone)]
struct IndexInfo {
    base_url: String,
    dimension: usize,
    score: ScoreKind,
}

impl IndexInfo {
    fn from_description(description: IndexDescription) -> VectorResult<Self> {
        let dimension = description.dimension.ok_or_else(|| {
            VectorError::configuration("pinecone", vec!["index_name".to_string()])
        })?;
        Ok(Self {
            base_url: data_plane_url(&description.host),
            dimension,
            score: score_kind(&description.metric),
        })
    }
}

/// Euclidean scores are distances; the similarity metrics are used as-is.
fn score_kind(metric: &str) -> ScoreKind {
    match metric {
        "euclidean" => ScoreKind::EuclideanDistance,
        "dotproduct" => ScoreKind::DotProduct,
        _ => ScoreKind::CosineSimilarity,
    }
}

/// Index hosts come back without a scheme.
fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

struct PineconeHandle {
    http: Client,
    /// `None` while the index is still to be created.
    index: RwLock<Option<IndexInfo>>,
}

/// Chunks in a Pinecone index namespace, over the REST API.
pub struct PineconeAdapter {
    config: PineconeConfig,
    handle: HandleSlot<PineconeHandle>,
    create_lock: Mutex<()>,
}

impl PineconeAdapter {
    pub fn new(config: PineconeConfig) -> Self {
        Self {
            config,
            handle: HandleSlot::new(),
            create_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PineconeConfig {
        &self.config
    }

    fn request(&self, http: &Client, method: Method, url: &str) -> RequestBuilder {
        http.request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    /// Send with retries; non-2xx statuses become [`PineconeError::Status`].
    async fn send<F>(&self, build: F) -> Result<Response, PineconeError>
    where
        F: Fn() -> RequestBuilder,
    {
        retry_if(
            || execute(build()),
            self.config.retry.clone(),
            PineconeError::is_transient,
        )
        .await
    }

    async fn describe(&self, http: &Client) -> Result<Option<IndexDescription>, PineconeError> {
        let url = format!(
            "{}/indexes/{}",
            self.config.controller_url, self.config.index_name
        );
        match self.send(|| self.request(http, Method::GET, &url)).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn open(&self) -> VectorResult<PineconeHandle> {
        info!(index = %self.config.index_name, "Connecting to Pinecone");
        let http = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| VectorError::unreachable("pinecone", "controller_url", e))?;

        let index = match self.describe(&http).await {
            Ok(Some(description)) => Some(IndexInfo::from_description(description)?),
            Ok(None) if self.config.serverless().is_some() => {
                info!(index = %self.config.index_name, "Index absent, will create on first write");
                None
            }
            Ok(None) => {
                return Err(VectorError::unreachable(
                    "pinecone",
                    "index_name",
                    format!(
                        "index `{}` does not exist and no cloud/region is configured to create it",
                        self.config.index_name
                    ),
                ));
            }
            Err(e)
                if e.status().is_some_and(|s| {
                    s == StatusCode::UNAUTHORIZED || s == StatusCode::FORBIDDEN
                }) =>
            {
                return Err(VectorError::unreachable("pinecone", "api_key", e));
            }
            Err(e) => return Err(VectorError::unreachable("pinecone", "controller_url", e)),
        };

        Ok(PineconeHandle {
            http,
            index: RwLock::new(index),
        })
    }

    async fn handle(&self) -> VectorResult<std::sync::Arc<PineconeHandle>> {
        self.handle.get_or_connect(|| self.open()).await
    }

    /// Cached index info, or a fresh description when the index was absent
    /// at connect time and may have been created since.
    async fn current_index(&self, handle: &PineconeHandle) -> Result<Option<IndexInfo>, String> {
        if let Some(info) = handle.index.read().await.clone() {
            return Ok(Some(info));
        }
        match self.describe(&handle.http).await {
            Ok(Some(description)) if description.status.ready => {
                let info = IndexInfo::from_description(description).map_err(|e| e.to_string())?;
                debug!(index = %self.config.index_name, "Index appeared since connect");
                *handle.index.write().await = Some(info.clone());
                Ok(Some(info))
            }
            Ok(_) => Ok(None),
            Err(e) => Err(format!("failed to describe index: {e}")),
        }
    }

    /// Index info for a write, creating a serverless index sized to `dimension`.
    async fn index_for_write(
        &self,
        handle: &PineconeHandle,
        dimension: usize,
    ) -> VectorResult<IndexInfo> {
        if let Some(info) = handle.index.read().await.clone() {
            return Ok(info);
        }

        let _create = self.create_lock.lock().await;
        if let Some(info) = handle.index.read().await.clone() {
            return Ok(info);
        }

        let Some((cloud, region)) = self.config.serverless() else {
            return Err(VectorError::configuration(
                "pinecone",
                vec!["cloud".to_string(), "region".to_string()],
            ));
        };

        let body = json!({
            "name": self.config.index_name,
            "dimension": dimension,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": cloud, "region": region } },
        });
        let url = format!("{}/indexes", self.config.controller_url);
        match self
            .send(|| self.request(&handle.http, Method::POST, &url).json(&body))
            .await
        {
            Ok(_) => info!(index = %self.config.index_name, dimension, "Created Pinecone index"),
            Err(e) if e.status() == Some(StatusCode::CONFLICT) => {
                debug!(index = %self.config.index_name, "Index created concurrently");
            }
            Err(e) => return Err(VectorError::ingestion(0, format!("failed to create index: {e}"))),
        }

        let info = self.wait_until_ready(&handle.http).await?;
        *handle.index.write().await = Some(info.clone());
        Ok(info)
    }

    async fn wait_until_ready(&self, http: &Client) -> VectorResult<IndexInfo> {
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs.max(1));
        loop {
            match self.describe(http).await {
                Ok(Some(description)) if description.status.ready => {
                    return IndexInfo::from_description(description);
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(VectorError::ingestion(0, format!("failed to describe index: {e}")));
                }
            }
            if Instant::now() >= deadline {
                return Err(VectorError::ingestion(
                    0,
                    format!("index `{}` did not become ready in time", self.config.index_name),
                ));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl VectorStoreAdapter for PineconeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Pinecone
    }

    #[instrument(skip(self), fields(index = %self.config.index_name))]
    async fn connect(&self) -> VectorResult<()> {
        self.config.validate()?;
        self.handle().await.map(|_| ())
    }

    #[instrument(skip(self, chunks), fields(index = %self.config.index_name, chunks = chunks.len()))]
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> VectorResult<usize> {
        let Some(dimension) = batch_dimension(chunks)? else {
            return Ok(0);
        };
        let handle = self.handle().await?;
        let info = self.index_for_write(&handle, dimension).await?;
        if info.dimension != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: info.dimension,
                actual: dimension,
            });
        }

        let url = format!("{}/vectors/upsert", info.base_url);
        let mut written = 0;
        for batch in chunks.chunks(self.config.upsert_batch_size) {
            let body = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|c| PineconeVector {
                        id: c.id(),
                        values: &c.vector,
                        metadata: chunk_payload(&c.chunk),
                    })
                    .collect(),
                namespace: &self.config.namespace,
            };
            self.send(|| self.request(&handle.http, Method::POST, &url).json(&body))
                .await
                .map_err(|e| VectorError::ingestion(written, e.to_string()))?;
            written += batch.len();
        }

        debug!(written, "Upserted vectors");
        Ok(written)
    }

    #[instrument(skip(self, vector), fields(index = %self.config.index_name))]
    async fn search(&self, vector: &[f32], top_k: usize) -> VectorResult<Vec<SearchResult>> {
        check_top_k(top_k)?;
        let handle = self.handle().await?;
        let Some(info) = self.current_index(&handle).await.map_err(VectorError::query)? else {
            return Ok(Vec::new());
        };
        if vector.len() != info.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        let url = format!("{}/query", info.base_url);
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.config.namespace,
        };
        // Queries are not retried; the caller decides.
        let response: QueryResponse = execute(self.request(&handle.http, Method::POST, &url).json(&body))
            .await
            .map_err(|e| VectorError::query(e.to_string()))?
            .json()
            .await
            .map_err(|e| VectorError::query(format!("malformed query response: {e}")))?;

        let results = response
            .matches
            .into_iter()
            .map(|m| {
                result_from_payload(
                    &m.id,
                    info.score.normalize(m.score),
                    m.metadata.unwrap_or_default(),
                )
            })
            .collect();
        Ok(rank_results(results, top_k))
    }

    #[instrument(skip(self), fields(index = %self.config.index_name, namespace = %self.config.namespace))]
    async fn delete_collection(&self) -> VectorResult<()> {
        let handle = self.handle().await?;
        let Some(info) = self
            .current_index(&handle)
            .await
            .map_err(|e| VectorError::ingestion(0, e))?
        else {
            debug!("Index absent, nothing to delete");
            return Ok(());
        };

        let url = format!("{}/vectors/delete", info.base_url);
        let body = json!({ "deleteAll": true, "namespace": self.config.namespace });
        match self
            .send(|| self.request(&handle.http, Method::POST, &url).json(&body))
            .await
        {
            Ok(_) => {
                info!("Deleted all vectors in namespace");
                Ok(())
            }
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                debug!("Namespace absent, nothing to delete");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Delete-all failed");
                Err(VectorError::ingestion(0, e.to_string()))
            }
        }
    }

    async fn dimension(&self) -> Option<usize> {
        let handle = self.handle.current().await?;
        let info = handle.index.read().await.clone();
        info.map(|i| i.dimension)
    }

    async fn close(&self) -> VectorResult<()> {
        self.handle.take().await;
        Ok(())
    }
}
