//! Flat JSON payload shared by the engines that store chunk fields next to
//! the vector as free-form attributes (Pinecone metadata, Qdrant payload).

use serde_json::{Map, Value};

use crate::models::{Chunk, Metadata, SearchResult};

pub const CHUNK_ID: &str = "chunk_id";
pub const DOCUMENT_ID: &str = "document_id";
pub const TEXT: &str = "text";
pub const SEQUENCE: &str = "sequence";
pub const SOURCE_PATH: &str = "source_path";

/// Prefix of user metadata keys, keeping them apart from the chunk fields.
pub const METADATA_PREFIX: &str = "meta.";

const RESERVED: [&str; 5] = [CHUNK_ID, DOCUMENT_ID, TEXT, SEQUENCE, SOURCE_PATH];

/// Chunk fields plus the chunk metadata under [`METADATA_PREFIX`].
pub fn chunk_payload(chunk: &Chunk) -> Map<String, Value> {
    let mut payload: Map<String, Value> = chunk
        .metadata
        .iter()
        .map(|(k, v)| (format!("{METADATA_PREFIX}{k}"), Value::String(v.clone())))
        .collect();
    payload.insert(CHUNK_ID.to_string(), Value::String(chunk.id.clone()));
    payload.insert(
        DOCUMENT_ID.to_string(),
        Value::String(chunk.document_id.clone()),
    );
    payload.insert(TEXT.to_string(), Value::String(chunk.text.clone()));
    payload.insert(SEQUENCE.to_string(), Value::from(chunk.sequence as u64));
    payload.insert(
        SOURCE_PATH.to_string(),
        Value::String(chunk.source_path.clone()),
    );
    payload
}

fn into_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Inverse of [`chunk_payload`]. `fallback_id` is used when the payload
/// predates the `chunk_id` field. Unprefixed attributes written by other
/// tools are kept as metadata unless a prefixed key of the same name exists.
pub fn result_from_payload(
    fallback_id: &str,
    score: f32,
    mut payload: Map<String, Value>,
) -> SearchResult {
    let mut take = |key: &str| payload.remove(key).map(into_string);

    let chunk_id = take(CHUNK_ID).unwrap_or_else(|| fallback_id.to_string());
    let document_id = take(DOCUMENT_ID).unwrap_or_default();
    let text = take(TEXT).unwrap_or_default();
    let source_path = take(SOURCE_PATH).unwrap_or_default();
    payload.remove(SEQUENCE);

    let mut metadata = Metadata::new();
    let mut foreign = Vec::new();
    for (key, value) in payload {
        match key.strip_prefix(METADATA_PREFIX) {
            Some(name) => {
                metadata.insert(name.to_string(), into_string(value));
            }
            None if !RESERVED.contains(&key.as_str()) => foreign.push((key, value)),
            None => {}
        }
    }
    for (key, value) in foreign {
        metadata.entry(key).or_insert_with(|| into_string(value));
    }

    SearchResult {
        chunk_id,
        document_id,
        text,
        score,
        source_path,
        metadata,
    }
}
