//! MongoDB implementation of VectorStoreAdapter

use std::sync::Arc;

use async_trait::async_trait;
use database::common::{RetryConfig, retry_if};
use database::mongodb::{Collection, connect_from_config_with_retry, is_transient_error};
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::UpdateOptions;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::MongoVectorConfig;
use crate::adapter::{HandleSlot, VectorStoreAdapter, batch_dimension, check_top_k};
use crate::backends::payload::{DOCUMENT_ID, SEQUENCE, SOURCE_PATH, TEXT};
use crate::config::BackendKind;
use crate::error::{VectorError, VectorResult};
use crate::models::{EmbeddedChunk, Metadata, SearchResult, cosine_similarity, rank_results};

const METADATA: &str = "metadata";
const SCORE: &str = "score";

/// Atlas rejects a larger `numCandidates`.
const MAX_NUM_CANDIDATES: u32 = 10_000;

/// `$set` body for one chunk. Fields outside this set are left untouched.
fn chunk_fields(chunk: &EmbeddedChunk, embedding_field: &str) -> Document {
    let metadata: Document = chunk
        .chunk
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), Bson::String(v.clone())))
        .collect();
    let vector: Vec<Bson> = chunk
        .vector
        .iter()
        .map(|v| Bson::Double(f64::from(*v)))
        .collect();

    let mut fields = doc! {
        DOCUMENT_ID: chunk.chunk.document_id.as_str(),
        TEXT: chunk.chunk.text.as_str(),
        SEQUENCE: chunk.chunk.sequence as i64,
        SOURCE_PATH: chunk.chunk.source_path.as_str(),
        METADATA: metadata,
    };
    fields.insert(embedding_field, Bson::Array(vector));
    fields
}

/// Filter, update and options that write `chunk` over any earlier version
/// with the same id.
fn upsert_request(chunk: &EmbeddedChunk, embedding_field: &str) -> (Document, Document, UpdateOptions) {
    let filter = doc! { "_id": chunk.id() };
    let update = doc! { "$set": chunk_fields(chunk, embedding_field) };
    let options = UpdateOptions::builder().upsert(true).build();
    (filter, update, options)
}

/// `$vectorSearch` then `$project` with the score attached.
fn vector_search_pipeline(
    index: &str,
    embedding_field: &str,
    vector: &[f32],
    top_k: usize,
    num_candidates: u32,
) -> VectorResult<Vec<Document>> {
    let limit = u32::try_from(top_k)
        .ok()
        .filter(|limit| *limit <= MAX_NUM_CANDIDATES)
        .ok_or_else(|| {
            VectorError::InvalidArgument(format!(
                "top_k must be at most {MAX_NUM_CANDIDATES} for $vectorSearch, got {top_k}"
            ))
        })?;
    let num_candidates = num_candidates.max(limit).min(MAX_NUM_CANDIDATES);
    let query_vector: Vec<Bson> = vector.iter().map(|v| Bson::Double(f64::from(*v))).collect();

    Ok(vec![
        doc! {
            "$vectorSearch": {
                "index": index,
                "path": embedding_field,
                "queryVector": query_vector,
                "numCandidates": i64::from(num_candidates),
                "limit": i64::from(limit),
            }
        },
        doc! {
            "$project": {
                DOCUMENT_ID: 1,
                TEXT: 1,
                SOURCE_PATH: 1,
                METADATA: 1,
                SCORE: { "$meta": "vectorSearchScore" },
            }
        },
    ])
}

/// Cosine-score every stored document against `vector` and keep the best
/// `top_k`. Documents without a usable vector of the same length are skipped.
fn rank_scanned<I>(documents: I, embedding_field: &str, vector: &[f32], top_k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Document>,
{
    let results = documents
        .into_iter()
        .filter_map(|document| {
            let stored = read_vector(&document, embedding_field)?;
            (stored.len() == vector.len())
                .then(|| result_from_document(&document, cosine_similarity(vector, &stored)))
        })
        .collect();
    rank_results(results, top_k)
}

fn read_vector(document: &Document, embedding_field: &str) -> Option<Vec<f32>> {
    let values = document.get_array(embedding_field).ok()?;
    values
        .iter()
        .map(|v| match v {
            Bson::Double(d) => Some(*d as f32),
            Bson::Int32(i) => Some(*i as f32),
            Bson::Int64(i) => Some(*i as f32),
            _ => None,
        })
        .collect()
}

fn result_from_document(document: &Document, score: f32) -> SearchResult {
    let text_field = |key: &str| document.get_str(key).unwrap_or_default().to_string();
    let metadata: Metadata = document
        .get_document(METADATA)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    SearchResult {
        chunk_id: text_field("_id"),
        document_id: text_field(DOCUMENT_ID),
        text: text_field(TEXT),
        score,
        source_path: text_field(SOURCE_PATH),
        metadata,
    }
}

struct MongoHandle {
    collection: Collection<Document>,
    /// Length of the stored embeddings; `None` while the collection is empty.
    dimension: RwLock<Option<usize>>,
}

/// Chunks as ordinary MongoDB documents keyed by chunk id, with the vector
/// in a configurable field.
pub struct MongoVectorAdapter {
    config: MongoVectorConfig,
    retry: RetryConfig,
    handle: HandleSlot<MongoHandle>,
}

impl MongoVectorAdapter {
    pub fn new(config: MongoVectorConfig) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
            handle: HandleSlot::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &MongoVectorConfig {
        &self.config
    }

    async fn open(&self) -> VectorResult<MongoHandle> {
        let client =
            connect_from_config_with_retry(&self.config.connection, Some(self.retry.clone()))
                .await
                .map_err(|e| VectorError::unreachable("mongodb", "uri", e))?;
        let collection = client
            .database(&self.config.connection.database)
            .collection::<Document>(&self.config.collection_name);

        let field = &self.config.embedding_field;
        let sample = collection
            .find_one(doc! { field.as_str(): { "$exists": true } })
            .projection(doc! { field.as_str(): 1 })
            .await
            .map_err(|e| VectorError::unreachable("mongodb", "collection_name", e))?;
        let dimension = sample.and_then(|d| read_vector(&d, field)).map(|v| v.len());
        info!(
            collection = %self.config.collection_name,
            dimension = ?dimension,
            "Opened MongoDB collection"
        );

        Ok(MongoHandle {
            collection,
            dimension: RwLock::new(dimension),
        })
    }

    async fn handle(&self) -> VectorResult<Arc<MongoHandle>> {
        self.handle.get_or_connect(|| self.open()).await
    }

    /// Adopt `dimension` for an empty collection, or check it against the stored one.
    async fn claim_dimension(&self, handle: &MongoHandle, dimension: usize) -> VectorResult<()> {
        let mut current = handle.dimension.write().await;
        match *current {
            Some(expected) if expected != dimension => Err(VectorError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                *current = Some(dimension);
                Ok(())
            }
        }
    }

    async fn scan(
        &self,
        collection: &Collection<Document>,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, mongodb::error::Error> {
        let field = self.config.embedding_field.as_str();
        let documents: Vec<Document> = collection
            .find(doc! { field: { "$exists": true } })
            .await?
            .try_collect()
            .await?;
        Ok(rank_scanned(documents, field, vector, top_k))
    }

    async fn vector_search(
        &self,
        collection: &Collection<Document>,
        pipeline: Vec<Document>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, mongodb::error::Error> {
        let mut cursor = collection.aggregate(pipeline).await?;
        let mut results = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            let score = document.get_f64(SCORE).unwrap_or_default() as f32;
            results.push(result_from_document(&document, score));
        }
        Ok(rank_results(results, top_k))
    }
}

#[async_trait]
impl VectorStoreAdapter for MongoVectorAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
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
        self.claim_dimension(&handle, dimension).await?;

        let mut written = 0;
        for chunk in chunks {
            let (filter, update, options) = upsert_request(chunk, &self.config.embedding_field);
            retry_if(
                || {
                    handle
                        .collection
                        .update_one(filter.clone(), update.clone())
                        .with_options(options.clone())
                        .into_future()
                },
                self.retry.clone(),
                is_transient_error,
            )
            .await
            .map_err(|e| VectorError::ingestion(written, format!("MongoDB upsert failed: {e}")))?;
            written += 1;
        }

        debug!(written, "Upserted documents");
        Ok(written)
    }

    #[instrument(skip(self, vector), fields(collection = %self.config.collection_name))]
    async fn search(&self, vector: &[f32], top_k: usize) -> VectorResult<Vec<SearchResult>> {
        check_top_k(top_k)?;
        let handle = self.handle().await?;
        let stored = *handle.dimension.read().await;
        match stored {
            Some(expected) if expected != vector.len() => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            _ => {}
        }

        let results = match &self.config.vector_index {
            Some(index) => {
                let pipeline = vector_search_pipeline(
                    index,
                    &self.config.embedding_field,
                    vector,
                    top_k,
                    self.config.num_candidates,
                )?;
                self.vector_search(&handle.collection, pipeline, top_k).await
            }
            None => self.scan(&handle.collection, vector, top_k).await,
        };
        results.map_err(|e| VectorError::query(format!("MongoDB search failed: {e}")))
    }

    #[instrument(skip(self), fields(collection = %self.config.collection_name))]
    async fn delete_collection(&self) -> VectorResult<()> {
        let handle = self.handle().await?;
        // Emptying keeps the collection's indexes, Atlas vector index included.
        let deleted = handle
            .collection
            .delete_many(doc! {})
            .await
            .map_err(|e| {
                warn!(error = %e, "Delete failed");
                VectorError::ingestion(0, format!("MongoDB delete failed: {e}"))
            })?;
        *handle.dimension.write().await = None;
        info!(deleted = deleted.deleted_count, "Deleted all documents");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use database::mongodb::MongoConfig;
    use mongodb::bson::bson;

    fn embedded() -> EmbeddedChunk {
        EmbeddedChunk::new(
            Chunk {
                id: "a.txt:1".to_string(),
                document_id: "a.txt".to_string(),
                text: "second chunk".to_string(),
                sequence: 1,
                source_path: "notes/a.txt".to_string(),
                metadata: Metadata::from([("title".to_string(), "a.txt".to_string())]),
            },
            vec![0.5, -0.25],
        )
    }

    #[test]
    fn test_chunk_fields_layout() {
        let fields = chunk_fields(&embedded(), "embedding");
        assert_eq!(fields.get_str("document_id").unwrap(), "a.txt");
        assert_eq!(fields.get_i64("sequence").unwrap(), 1);
        assert_eq!(
            fields.get_document("metadata").unwrap().get_str("title").unwrap(),
            "a.txt"
        );
        assert_eq!(read_vector(&fields, "embedding"), Some(vec![0.5, -0.25]));
        assert!(!fields.contains_key("_id"));
    }

    #[test]
    fn test_result_from_document() {
        let mut document = chunk_fields(&embedded(), "vec");
        document.insert("_id", "a.txt:1");

        let result = result_from_document(&document, 0.8);
        assert_eq!(result.chunk_id, "a.txt:1");
        assert_eq!(result.text, "second chunk");
        assert_eq!(result.source_path, "notes/a.txt");
        assert_eq!(result.metadata.get("title").map(String::as_str), Some("a.txt"));
        assert_eq!(result.score, 0.8);
    }

    fn stored(id: &str, vector: Bson) -> Document {
        doc! { "_id": id, "text": format!("text of {id}"), "embedding": vector }
    }

    #[test]
    fn test_scan_ranks_by_cosine_then_chunk_id() {
        let documents = vec![
            stored("b.txt:0", bson!([1.0, 0.0])),
            stored("c.txt:0", bson!([0.0, 1.0])),
            stored("a.txt:0", bson!([2.0, 0.0])),
            stored("d.txt:0", bson!([0.6, 0.8])),
            stored("e.txt:0", bson!([1.0, 0.0, 0.0])),
            stored("f.txt:0", bson!(["x", "y"])),
            doc! { "_id": "g.txt:0", "text": "no vector" },
        ];

        let results = rank_scanned(documents.clone(), "embedding", &[1.0, 0.0], 3);
        let ids: Vec<_> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt:0", "b.txt:0", "d.txt:0"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[2].score - 0.6).abs() < 1e-6);
        assert_eq!(results[2].text, "text of d.txt:0");

        let everything = rank_scanned(documents, "embedding", &[1.0, 0.0], 50);
        assert_eq!(everything.len(), 4);
        assert_eq!(everything[3].chunk_id, "c.txt:0");
    }

    #[test]
    fn test_upsert_overwrites_by_chunk_id() {
        let (filter, update, options) = upsert_request(&embedded(), "embedding");
        assert_eq!(filter, doc! { "_id": "a.txt:1" });
        assert_eq!(update.keys().collect::<Vec<_>>(), vec!["$set"]);
        assert_eq!(
            update.get_document("$set").unwrap(),
            &chunk_fields(&embedded(), "embedding")
        );
        assert_eq!(options.upsert, Some(true));
    }

    #[test]
    fn test_vector_search_pipeline_bounds_candidates() {
        let pipeline = vector_search_pipeline("default", "embedding", &[0.5, 0.5], 5, 100).unwrap();
        let stage = pipeline[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_i64("limit").unwrap(), 5);
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 100);
        assert_eq!(stage.get_str("path").unwrap(), "embedding");

        let raised = vector_search_pipeline("default", "embedding", &[0.5], 500, 100).unwrap();
        let stage = raised[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 500);

        let capped = vector_search_pipeline("default", "embedding", &[0.5], 10, 50_000).unwrap();
        let stage = capped[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 10_000);

        assert!(matches!(
            vector_search_pipeline("default", "embedding", &[0.5], 10_001, 100),
            Err(VectorError::InvalidArgument(_))
        ));
        assert!(matches!(
            vector_search_pipeline("default", "embedding", &[0.5], usize::MAX, 100),
            Err(VectorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_read_vector_rejects_non_numeric() {
        let document = doc! { "embedding": [1.0, "x"] };
        assert_eq!(read_vector(&document, "embedding"), None);
        let ints = doc! { "embedding": [1_i32, 2_i64] };
        assert_eq!(read_vector(&ints, "embedding"), Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_configuration_error() {
        let connection = MongoConfig::new("mongodb://127.0.0.1:1/?connectTimeoutMS=200", "db")
            .with_timeouts(1, 1);
        let adapter = MongoVectorAdapter::new(MongoVectorConfig::new(connection, "chunks"))
            .with_retry(RetryConfig::none());
        match adapter.connect().await {
            Err(VectorError::Configuration { backend, fields, .. }) => {
                assert_eq!(backend, "mongodb");
                assert_eq!(fields, vec!["uri".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    /// Needs a MongoDB at `MONGODB_TEST_URI` (default `mongodb://localhost:27017`).
    #[tokio::test]
    #[ignore]
    async fn test_live_upsert_search_delete() {
        let uri = std::env::var("MONGODB_TEST_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let adapter = MongoVectorAdapter::new(MongoVectorConfig::new(
            MongoConfig::new(uri, "vector_store_test"),
            format!("chunks_{}", uuid::Uuid::new_v4().simple()),
        ));
        adapter.connect().await.unwrap();

        assert_eq!(adapter.upsert(&[embedded()]).await.unwrap(), 1);
        let results = adapter.search(&[0.5, -0.25], 1).await.unwrap();
        assert_eq!(results[0].chunk_id, "a.txt:1");
        assert!((results[0].score - 1.0).abs() < 1e-5);

        adapter.delete_collection().await.unwrap();
        assert!(adapter.search(&[0.5, -0.25], 1).await.unwrap().is_empty());
        adapter.close().await.unwrap();
    }
}
