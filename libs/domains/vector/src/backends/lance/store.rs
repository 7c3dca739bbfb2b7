//! LanceDB implementation of VectorStoreAdapter

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table, connect};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use super::LanceConfig;
use crate::adapter::{HandleSlot, VectorStoreAdapter, batch_dimension, check_top_k};
use crate::config::BackendKind;
use crate::error::{VectorError, VectorResult};
use crate::models::{EmbeddedChunk, Metadata, ScoreKind, SearchResult, rank_results};

const CHUNK_ID: &str = "chunk_id";
const DOCUMENT_ID: &str = "document_id";
const SEQUENCE: &str = "sequence";
const TEXT: &str = "text";
const SOURCE_PATH: &str = "source_path";
const METADATA: &str = "metadata";
const VECTOR: &str = "vector";
const DISTANCE: &str = "_distance";

/// Row layout of the chunk table; `metadata` holds a JSON object.
fn table_schema(dimension: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(CHUNK_ID, DataType::Utf8, false),
        Field::new(DOCUMENT_ID, DataType::Utf8, false),
        Field::new(SEQUENCE, DataType::Int64, false),
        Field::new(TEXT, DataType::Utf8, false),
        Field::new(SOURCE_PATH, DataType::Utf8, false),
        Field::new(METADATA, DataType::Utf8, false),
        Field::new(
            VECTOR,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            true,
        ),
    ]))
}

fn vector_dimension(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
        _ => None,
    }
}

fn to_record_batch(chunks: &[EmbeddedChunk], dimension: usize) -> VectorResult<RecordBatch> {
    let metadata = chunks
        .iter()
        .map(|c| serde_json::to_string(&c.chunk.metadata))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| VectorError::ingestion(0, format!("failed to encode metadata: {e}")))?;

    let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        chunks
            .iter()
            .map(|c| Some(c.vector.iter().copied().map(Some).collect::<Vec<_>>())),
        dimension as i32,
    );

    RecordBatch::try_new(
        table_schema(dimension),
        vec![
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id()))),
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.chunk.document_id.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                chunks.iter().map(|c| c.chunk.sequence as i64),
            )),
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.chunk.text.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.chunk.source_path.as_str()),
            )),
            Arc::new(StringArray::from(metadata)),
            Arc::new(vectors),
        ],
    )
    .map_err(|e| VectorError::ingestion(0, format!("failed to build record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> VectorResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| VectorError::query(format!("lancedb result is missing column `{name}`")))
}

fn read_results(batch: &RecordBatch) -> VectorResult<Vec<SearchResult>> {
    let chunk_ids = string_column(batch, CHUNK_ID)?;
    let document_ids = string_column(batch, DOCUMENT_ID)?;
    let texts = string_column(batch, TEXT)?;
    let source_paths = string_column(batch, SOURCE_PATH)?;
    let metadata = string_column(batch, METADATA)?;
    let distances = batch
        .column_by_name(DISTANCE)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| VectorError::query("lancedb result is missing `_distance`"))?;

    (0..batch.num_rows())
        .map(|i| {
            let metadata: Metadata = serde_json::from_str(metadata.value(i))
                .map_err(|e| VectorError::query(format!("corrupt metadata column: {e}")))?;
            Ok(SearchResult {
                chunk_id: chunk_ids.value(i).to_string(),
                document_id: document_ids.value(i).to_string(),
                text: texts.value(i).to_string(),
                score: ScoreKind::CosineDistance.normalize(distances.value(i)),
                source_path: source_paths.value(i).to_string(),
                metadata,
            })
        })
        .collect()
}

#[derive(Clone)]
struct OpenTable {
    table: Table,
    dimension: usize,
}

struct LanceHandle {
    conn: Connection,
    /// `None` until the table exists.
    table: RwLock<Option<OpenTable>>,
}

impl LanceHandle {
    async fn open(config: &LanceConfig) -> VectorResult<Self> {
        info!(uri = %config.uri, table = %config.table_name, "Opening LanceDB");
        let conn = connect(&config.uri)
            .execute()
            .await
            .map_err(|e| VectorError::unreachable("local", "uri", e))?;

        let table = Self::open_existing(&conn, &config.table_name)
            .await
            .map_err(|e| VectorError::unreachable("local", "uri", e))?;
        if let Some(open) = &table {
            debug!(dimension = open.dimension, "Found existing table");
        }

        Ok(Self {
            conn,
            table: RwLock::new(table),
        })
    }

    async fn open_existing(conn: &Connection, name: &str) -> VectorResult<Option<OpenTable>> {
        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| VectorError::query(e.to_string()))?;
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }

        let table = conn
            .open_table(name)
            .execute()
            .await
            .map_err(|e| VectorError::query(e.to_string()))?;
        let schema = table
            .schema()
            .await
            .map_err(|e| VectorError::query(e.to_string()))?;
        let dimension = vector_dimension(&schema).ok_or_else(|| {
            VectorError::query(format!("table `{name}` has no fixed-size `vector` column"))
        })?;
        Ok(Some(OpenTable { table, dimension }))
    }

    /// Cached table, or whatever another writer created since.
    async fn current_table(&self, name: &str) -> VectorResult<Option<OpenTable>> {
        if let Some(open) = self.table.read().await.clone() {
            return Ok(Some(open));
        }
        let mut slot = self.table.write().await;
        if slot.is_none() {
            *slot = Self::open_existing(&self.conn, name).await?;
        }
        Ok(slot.clone())
    }

    /// Open the table, creating it with `dimension` on first write.
    async fn table_for_write(&self, name: &str, dimension: usize) -> VectorResult<OpenTable> {
        if let Some(open) = self.current_table(name).await? {
            return Ok(open);
        }

        let mut slot = self.table.write().await;
        if let Some(open) = slot.clone() {
            return Ok(open);
        }

        let empty = RecordBatchIterator::new(vec![].into_iter(), table_schema(dimension));
        let table = self
            .conn
            .create_table(name, Box::new(empty))
            .execute()
            .await
            .map_err(|e| VectorError::ingestion(0, format!("failed to create table: {e}")))?;
        info!(table = %name, dimension, "Created LanceDB table");

        let open = OpenTable { table, dimension };
        *slot = Some(open.clone());
        Ok(open)
    }
}

/// Chunks in an embedded LanceDB dataset.
///
/// Reads share the connection freely; merge-inserts and deletes are
/// serialized through `write_lock`.
pub struct LanceAdapter {
    config: LanceConfig,
    handle: HandleSlot<LanceHandle>,
    write_lock: Mutex<()>,
}

impl LanceAdapter {
    pub fn new(config: LanceConfig) -> Self {
        Self {
            config,
            handle: HandleSlot::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LanceConfig {
        &self.config
    }

    async fn handle(&self) -> VectorResult<Arc<LanceHandle>> {
        self.handle
            .get_or_connect(|| LanceHandle::open(&self.config))
            .await
    }
}

#[async_trait]
impl VectorStoreAdapter for LanceAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    #[instrument(skip(self), fields(table = %self.config.table_name))]
    async fn connect(&self) -> VectorResult<()> {
        self.config.validate()?;
        self.handle().await.map(|_| ())
    }

    #[instrument(skip(self, chunks), fields(table = %self.config.table_name, chunks = chunks.len()))]
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> VectorResult<usize> {
        let Some(dimension) = batch_dimension(chunks)? else {
            return Ok(0);
        };
        let handle = self.handle().await?;

        let _write = self.write_lock.lock().await;
        let open = handle
            .table_for_write(&self.config.table_name, dimension)
            .await?;
        if open.dimension != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: open.dimension,
                actual: dimension,
            });
        }

        let batch = to_record_batch(chunks, dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);

        let mut merge = open.table.merge_insert(&[CHUNK_ID]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| VectorError::ingestion(0, format!("lancedb merge_insert failed: {e}")))?;

        debug!(written = chunks.len(), "Upserted chunks");
        Ok(chunks.len())
    }

    #[instrument(skip(self, vector), fields(table = %self.config.table_name))]
    async fn search(&self, vector: &[f32], top_k: usize) -> VectorResult<Vec<SearchResult>> {
        check_top_k(top_k)?;
        let handle = self.handle().await?;

        let Some(open) = handle.current_table(&self.config.table_name).await? else {
            return Ok(Vec::new());
        };
        if vector.len() != open.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: open.dimension,
                actual: vector.len(),
            });
        }

        let mut stream = open
            .table
            .vector_search(vector.to_vec())
            .map_err(|e| VectorError::query(e.to_string()))?
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&[
                CHUNK_ID,
                DOCUMENT_ID,
                TEXT,
                SOURCE_PATH,
                METADATA,
            ]))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| VectorError::query(format!("lancedb search failed: {e}")))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| VectorError::query(format!("lancedb search failed: {e}")))?
        {
            results.extend(read_results(&batch)?);
        }

        Ok(rank_results(results, top_k))
    }

    #[instrument(skip(self), fields(table = %self.config.table_name))]
    async fn delete_collection(&self) -> VectorResult<()> {
        let handle = self.handle().await?;
        let _write = self.write_lock.lock().await;

        let Some(open) = handle.current_table(&self.config.table_name).await? else {
            debug!("Table absent, nothing to delete");
            return Ok(());
        };

        // The schema (and with it the dimension) survives; only rows go.
        open.table
            .delete(&format!("{CHUNK_ID} IS NOT NULL"))
            .await
            .map_err(|e| VectorError::ingestion(0, format!("lancedb delete failed: {e}")))?;
        info!("Deleted all rows");
        Ok(())
    }

    async fn dimension(&self) -> Option<usize> {
        let handle = self.handle.current().await?;
        let open = handle.table.read().await.clone();
        open.map(|o| o.dimension)
    }

    async fn close(&self) -> VectorResult<()> {
        if self.handle.take().await.is_some() {
            debug!(table = %self.config.table_name, "Closed LanceDB connection");
        }
        Ok(())
    }
}
