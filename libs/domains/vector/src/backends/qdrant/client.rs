//! Qdrant implementation of VectorStoreAdapter

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use database::common::{RetryConfig, retry_if};
use qdrant_client::qdrant::{
    self, CreateCollectionBuilder, Distance, PointId, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::QdrantConfig;
use crate::adapter::{HandleSlot, VectorStoreAdapter, batch_dimension, check_top_k};
use crate::backends::payload::{chunk_payload, result_from_payload};
use crate::config::BackendKind;
use crate::error::{VectorError, VectorResult};
use crate::models::{EmbeddedChunk, ScoreKind, SearchResult, rank_results};

/// Qdrant point ids must be integers or UUIDs; chunk ids map to a stable UUIDv5.
fn point_id(chunk_id: &str) -> PointId {
    PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string())
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    match point_id.as_ref().and_then(|p| p.point_id_options.as_ref()) {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// DEADLINE_EXCEEDED, RESOURCE_EXHAUSTED and UNAVAILABLE.
fn is_transient(err: &QdrantError) -> bool {
    match err {
        QdrantError::ResponseError { status, .. } => matches!(status.code() as i32, 4 | 8 | 14),
        _ => false,
    }
}

fn json_to_qdrant_value(val: serde_json::Value) -> Option<QdrantValue> {
    match val {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(QdrantValue::from(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else {
                n.as_f64().map(QdrantValue::from)
            }
        }
        serde_json::Value::String(s) => Some(QdrantValue::from(s)),
        // Nested values are stored as their JSON text
        other => Some(QdrantValue::from(other.to_string())),
    }
}

fn qdrant_value_to_json(val: QdrantValue) -> Option<serde_json::Value> {
    use qdrant::value::Kind;

    match val.kind {
        Some(Kind::NullValue(_)) => Some(serde_json::Value::Null),
        Some(Kind::BoolValue(b)) => Some(serde_json::Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(serde_json::Value::Number(i.into())),
        Some(Kind::DoubleValue(f)) => serde_json::Number::from_f64(f).map(serde_json::Value::Number),
        Some(Kind::StringValue(s)) => Some(serde_json::Value::String(s)),
        _ => None,
    }
}

fn to_point(chunk: &EmbeddedChunk, vector_name: Option<&str>) -> PointStruct {
    let payload: HashMap<String, QdrantValue> = chunk_payload(&chunk.chunk)
        .into_iter()
        .filter_map(|(k, v)| json_to_qdrant_value(v).map(|v| (k, v)))
        .collect();
    let id = point_id(chunk.id());
    match vector_name {
        Some(name) => PointStruct::new(
            id,
            HashMap::from([(name.to_string(), chunk.vector.clone())]),
            payload,
        ),
        None => PointStruct::new(id, chunk.vector.clone(), payload),
    }
}

fn from_scored_point(point: qdrant::ScoredPoint) -> SearchResult {
    let payload: serde_json::Map<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| qdrant_value_to_json(v).map(|v| (k, v)))
        .collect();
    result_from_payload(
        &point_id_to_string(&point.id),
        ScoreKind::CosineSimilarity.normalize(point.score),
        payload,
    )
}

/// Size of the unnamed vector, or of `vector_name` in a named-vector collection.
fn vector_size(info: &qdrant::GetCollectionInfoResponse, vector_name: Option<&str>) -> Option<usize> {
    let params = info.result.as_ref()?.config.as_ref()?.params.as_ref()?;
    match (params.vectors_config.as_ref()?.config.as_ref()?, vector_name) {
        (qdrant::vectors_config::Config::Params(p), None) => Some(p.size as usize),
        (qdrant::vectors_config::Config::ParamsMap(map), Some(name)) => {
            map.map.get(name).map(|p| p.size as usize)
        }
        _ => None,
    }
}

struct QdrantHandle {
    client: Qdrant,
    /// `None` until the collection exists.
    dimension: RwLock<Option<usize>>,
}

/// Qdrant-backed chunk store
pub struct QdrantAdapter {
    config: QdrantConfig,
    retry: RetryConfig,
    handle: HandleSlot<QdrantHandle>,
    create_lock: Mutex<()>,
}

impl QdrantAdapter {
    pub fn new(config: QdrantConfig) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
            handle: HandleSlot::new(),
            create_lock: Mutex::new(()),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &QdrantConfig {
        &self.config
    }

    async fn open(&self) -> VectorResult<QdrantHandle> {
        info!(url = %self.config.url, collection = %self.config.collection_name, "Connecting to Qdrant");

        let mut builder = Qdrant::from_url(&self.config.url);
        if let Some(api_key) = self.config.api_key.clone() {
            builder = builder.api_key(api_key);
        }
        builder = builder.timeout(Duration::from_secs(self.config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| VectorError::unreachable("qdrant", "url", e))?;

        let dimension = self
            .collection_dimension(&client, |e| VectorError::unreachable("qdrant", "url", e))
            .await?;
        debug!(dimension = ?dimension, "Collection state");

        Ok(QdrantHandle {
            client,
            dimension: RwLock::new(dimension),
        })
    }

    /// `None` when the collection does not exist. Client failures go through
    /// `on_error`; a collection without the configured vector is a
    /// configuration error.
    async fn collection_dimension(
        &self,
        client: &Qdrant,
        on_error: impl Fn(QdrantError) -> VectorError,
    ) -> VectorResult<Option<usize>> {
        let name = &self.config.collection_name;
        if !client.collection_exists(name).await.map_err(&on_error)? {
            return Ok(None);
        }
        let info = client.collection_info(name).await.map_err(&on_error)?;
        let vector_name = self.config.vector_name.as_deref();
        match vector_size(&info, vector_name) {
            Some(size) => Ok(Some(size)),
            None => Err(VectorError::unreachable(
                "qdrant",
                "vector_name",
                format!(
                    "collection `{name}` has no {} vector",
                    vector_name.map_or("unnamed".to_string(), |n| format!("`{n}`"))
                ),
            )),
        }
    }

    async fn handle(&self) -> VectorResult<Arc<QdrantHandle>> {
        self.handle.get_or_connect(|| self.open()).await
    }

    /// Known dimension, refreshed from the server when not cached yet.
    async fn current_dimension(&self, handle: &QdrantHandle) -> VectorResult<Option<usize>> {
        if let Some(dimension) = *handle.dimension.read().await {
            return Ok(Some(dimension));
        }
        let dimension = self
            .collection_dimension(&handle.client, |e| VectorError::query(e.to_string()))
            .await?;
        *handle.dimension.write().await = dimension;
        Ok(dimension)
    }

    /// Create a cosine collection sized to `dimension` unless one exists.
    async fn ensure_collection(&self, handle: &QdrantHandle, dimension: usize) -> VectorResult<usize> {
        if let Some(existing) = *handle.dimension.read().await {
            return Ok(existing);
        }

        let _create = self.create_lock.lock().await;
        let name = &self.config.collection_name;
        let existing = self
            .collection_dimension(&handle.client, |e| VectorError::ingestion(0, e.to_string()))
            .await?;
        let dimension = match existing {
            Some(existing) => existing,
            None => {
                let params = VectorParamsBuilder::new(dimension as u64, Distance::Cosine);
                let create = match &self.config.vector_name {
                    Some(vector) => {
                        let mut vectors = VectorsConfigBuilder::default();
                        vectors.add_named_vector_params(vector, params);
                        CreateCollectionBuilder::new(name).vectors_config(vectors)
                    }
                    None => CreateCollectionBuilder::new(name).vectors_config(params),
                };
                handle
                    .client
                    .create_collection(create)
                    .await
                    .map_err(|e| {
                        VectorError::ingestion(0, format!("failed to create collection: {e}"))
                    })?;
                info!(collection = %name, dimension, "Created Qdrant collection");
                dimension
            }
        };
        *handle.dimension.write().await = Some(dimension);
        Ok(dimension)
    }
}

#[async_trait]
impl VectorStoreAdapter for QdrantAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Qdrant
    }

    #[instrument(skip(self), fields(collection = %self.config.collection_name))]
    async fn connect(&self) -> VectorResult<()> {
        self.config.validate()?;
        self.handle().await.map(|_| ())
    }

    #[instrument(skip(self, chunks), fields(collection = %self.config.collection_name, chunks = chunks.len()))]
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> VectorResult<usize> {
        let Some(dimension) = batch_dimension(chunks)? else {
            return Ok(0);
        };
        let handle = self.handle().await?;
        let expected = self.ensure_collection(&handle, dimension).await?;
        if expected != dimension {
            return Err(VectorError::DimensionMismatch {
                expected,
                actual: dimension,
            });
        }

        let vector_name = self.config.vector_name.as_deref();
        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|chunk| to_point(chunk, vector_name))
            .collect();
        retry_if(
            || {
                handle.client.upsert_points(
                    UpsertPointsBuilder::new(&self.config.collection_name, points.clone())
                        .wait(true),
                )
            },
            self.retry.clone(),
            is_transient,
        )
        .await
        .map_err(|e| VectorError::ingestion(0, format!("Qdrant upsert failed: {e}")))?;

        debug!(written = chunks.len(), "Upserted points");
        Ok(chunks.len())
    }

    #[instrument(skip(self, vector), fields(collection = %self.config.collection_name))]
    async fn search(&self, vector: &[f32], top_k: usize) -> VectorResult<Vec<SearchResult>> {
        check_top_k(top_k)?;
        let handle = self.handle().await?;
        let Some(dimension) = self.current_dimension(&handle).await? else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let mut request =
            SearchPointsBuilder::new(&self.config.collection_name, vector.to_vec(), top_k as u64)
                .with_payload(true);
        if let Some(name) = &self.config.vector_name {
            request = request.vector_name(name);
        }
        let response = handle
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorError::query(format!("Qdrant search failed: {e}")))?;

        let results = response.result.into_iter().map(from_scored_point).collect();
        Ok(rank_results(results, top_k))
    }

    #[instrument(skip(self), fields(collection = %self.config.collection_name))]
    async fn delete_collection(&self) -> VectorResult<()> {
        let handle = self.handle().await?;
        let _create = self.create_lock.lock().await;
        let name = &self.config.collection_name;

        let exists = handle
            .client
            .collection_exists(name)
            .await
            .map_err(|e| VectorError::ingestion(0, e.to_string()))?;
        if exists {
            handle
                .client
                .delete_collection(name)
                .await
                .map_err(|e| VectorError::ingestion(0, format!("Qdrant delete failed: {e}")))?;
            info!(collection = %name, "Deleted collection");
        } else {
            debug!(collection = %name, "Collection absent, nothing to delete");
        }
        *handle.dimension.write().await = None;
        Ok(())
    }

    async fn dimension(&self) -> Option<usize> {
        let handle = self.handle.current().await?;
        *handle.dimension.read().await
    }

    async fn close(&self) -> VectorResult<()> {
        self.handle.take().await;
        Ok(())
    }
}
