use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Free-form string metadata stored next to each chunk.
pub type Metadata = BTreeMap<String, String>;

/// An uploaded text blob.
///
/// Lives for one ingestion batch; only its chunks are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// File name component of the upload name. Two uploads with the same file
    /// name share an id, and the later one overwrites the earlier chunks.
    pub id: String,
    pub text: String,
    /// Name as uploaded, possibly including directories.
    pub source_path: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_path: source_path.into(),
        }
    }

    /// Build a document from an upload boundary `(filename, text)` pair.
    pub fn from_upload(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let source_path = filename.into();
        let id = Path::new(&source_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| source_path.clone());
        Self {
            id,
            text: text.into(),
            source_path,
        }
    }
}

/// Contiguous slice of a document's text, the unit of embedding and indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{document_id}:{sequence}"`
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub sequence: usize,
    pub source_path: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn chunk_id(document_id: &str, sequence: usize) -> String {
        format!("{document_id}:{sequence}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// One ranked hit. Scores are "higher is better" and only comparable with
/// other scores from the same backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub score: f32,
    pub source_path: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// How a backend reports closeness, and the rule that turns it into a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Cosine similarity in [-1, 1]; used as-is.
    CosineSimilarity,
    /// Cosine distance in [0, 2]; score = 1 - d.
    CosineDistance,
    /// Dot product; used as-is.
    DotProduct,
    /// Euclidean (or squared Euclidean) distance; score = 1 / (1 + d).
    EuclideanDistance,
}

impl ScoreKind {
    pub fn normalize(self, raw: f32) -> f32 {
        match self {
            ScoreKind::CosineSimilarity | ScoreKind::DotProduct => raw,
            ScoreKind::CosineDistance => 1.0 - raw,
            ScoreKind::EuclideanDistance => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

/// Descending score, then ascending chunk id.
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Sort deterministically and keep at most `top_k` results.
pub fn rank_results(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    results.sort_by(compare_results);
    results.truncate(top_k);
    results
}

/// Cosine similarity of two equally long vectors; 0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Stage at which a document stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Chunk,
    Embed,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub source_path: String,
    pub stage: IngestStage,
    pub message: String,
    /// Chunks of this document that were committed before the failure.
    pub chunks_written: usize,
}

/// Outcome of one ingestion run, reported per document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Documents whose every chunk was written.
    pub documents_processed: usize,
    /// All chunks written, including those of documents that later failed.
    pub chunks_written: usize,
    pub errors: Vec<DocumentFailure>,
    /// Documents never started because the run was cancelled or hit a fatal error.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl IngestSummary {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.skipped.is_empty() && !self.cancelled
    }
}
