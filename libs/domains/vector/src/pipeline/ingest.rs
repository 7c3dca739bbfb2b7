use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::VectorStoreAdapter;
use crate::chunker::Chunker;
use crate::embedding::Embedder;
use crate::error::{VectorError, VectorResult};
use crate::models::{Chunk, Document, DocumentFailure, EmbeddedChunk, IngestStage, IngestSummary};

/// Chunk, embed and upsert documents with a bounded number of workers.
///
/// Every document is its own unit of failure: a broken document is reported
/// in the summary and its siblings carry on. Chunks written before a failure
/// stay written. A fatal error (bad configuration, dimension mismatch) stops
/// the run from starting new documents.
#[derive(Clone)]
pub struct IngestPipeline {
    adapter: Arc<dyn VectorStoreAdapter>,
    embedder: Embedder,
    chunker: Chunker,
    workers: usize,
    write_batch_size: usize,
}

impl IngestPipeline {
    pub fn new(adapter: Arc<dyn VectorStoreAdapter>, embedder: Embedder, chunker: Chunker) -> Self {
        Self {
            adapter,
            embedder,
            chunker,
            workers: 4,
            write_batch_size: 64,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_write_batch_size(mut self, write_batch_size: usize) -> Self {
        self.write_batch_size = write_batch_size.max(1);
        self
    }

    /// Ingest `documents` to completion.
    pub async fn run(&self, documents: Vec<Document>) -> IngestSummary {
        let (_cancel_tx, cancel) = watch::channel(false);
        self.run_with_cancel(documents, cancel).await
    }

    /// Ingest `documents`, stopping cooperatively once `cancel` turns `true`.
    ///
    /// No document and no embedding batch starts after cancellation; upserts
    /// already in flight complete and are counted.
    #[instrument(skip_all, fields(backend = %self.adapter.kind(), documents = documents.len()))]
    pub async fn run_with_cancel(
        &self,
        documents: Vec<Document>,
        cancel: watch::Receiver<bool>,
    ) -> IngestSummary {
        let run = Arc::new(RunContext {
            adapter: self.adapter.clone(),
            embedder: self.embedder.clone(),
            chunker: self.chunker,
            write_batch_size: self.write_batch_size,
            dimension: AtomicUsize::new(self.adapter.dimension().await.unwrap_or(0)),
            halted: AtomicBool::new(false),
        });

        info!(workers = self.workers, "Starting ingestion");

        let labels: Vec<(String, String)> = documents
            .iter()
            .map(|d| (d.id.clone(), d.source_path.clone()))
            .collect();
        let mut outcomes: Vec<Option<DocumentOutcome>> = vec![None; documents.len()];
        let progress: Vec<Arc<DocumentProgress>> = (0..documents.len())
            .map(|_| Arc::new(DocumentProgress::default()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (index, document) in documents.into_iter().enumerate() {
            if run.should_stop(&cancel) {
                outcomes[index] = Some(DocumentOutcome::Skipped);
                continue;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                outcomes[index] = Some(DocumentOutcome::Skipped);
                continue;
            };

            // A sibling may have failed fatally while we waited for the permit.
            if run.should_stop(&cancel) {
                outcomes[index] = Some(DocumentOutcome::Skipped);
                continue;
            }

            let run = run.clone();
            let cancel = cancel.clone();
            let progress = progress[index].clone();
            tasks.spawn(async move {
                let outcome = run.process(&document, &cancel, &progress).await;
                drop(permit);
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!(error = %e, "Ingestion worker panicked"),
            }
        }

        let summary = summarize(labels, outcomes, &progress, *cancel.borrow());
        info!(
            processed = summary.documents_processed,
            chunks = summary.chunks_written,
            failed = summary.errors.len(),
            skipped = summary.skipped.len(),
            cancelled = summary.cancelled,
            "Ingestion finished"
        );
        summary
    }
}

#[derive(Debug, Clone)]
enum DocumentOutcome {
    Done {
        chunks_written: usize,
    },
    Failed {
        stage: IngestStage,
        message: String,
        chunks_written: usize,
    },
    Skipped,
}

/// How far one document got, kept outside its worker so a panic does not
/// lose it.
#[derive(Debug, Default)]
struct DocumentProgress {
    stage: AtomicU8,
    written: AtomicUsize,
}

impl DocumentProgress {
    fn enter(&self, stage: IngestStage) {
        let code = match stage {
            IngestStage::Chunk => 0,
            IngestStage::Embed => 1,
            IngestStage::Upsert => 2,
        };
        self.stage.store(code, Ordering::SeqCst);
    }

    fn wrote(&self, count: usize) {
        self.written.fetch_add(count, Ordering::SeqCst);
    }

    fn stage(&self) -> IngestStage {
        match self.stage.load(Ordering::SeqCst) {
            0 => IngestStage::Chunk,
            1 => IngestStage::Embed,
            _ => IngestStage::Upsert,
        }
    }

    fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

/// State shared by every worker of one run.
struct RunContext {
    adapter: Arc<dyn VectorStoreAdapter>,
    embedder: Embedder,
    chunker: Chunker,
    write_batch_size: usize,
    /// Dimension fixed for the run; 0 until the first vector is seen.
    dimension: AtomicUsize,
    halted: AtomicBool,
}

impl RunContext {
    fn should_stop(&self, cancel: &watch::Receiver<bool>) -> bool {
        *cancel.borrow() || self.halted.load(Ordering::SeqCst)
    }

    fn claim_dimension(&self, actual: usize) -> VectorResult<()> {
        match self
            .dimension
            .compare_exchange(0, actual, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(()),
            Err(expected) if expected == actual => Ok(()),
            Err(expected) => Err(VectorError::DimensionMismatch { expected, actual }),
        }
    }

    fn fail(&self, stage: IngestStage, err: VectorError, chunks_written: usize) -> DocumentOutcome {
        if err.is_fatal() {
            self.halted.store(true, Ordering::SeqCst);
            error!(%stage, error = %err, "Fatal ingestion error, no new documents will start");
        } else {
            warn!(%stage, error = %err, chunks_written, "Document failed");
        }
        DocumentOutcome::Failed {
            stage,
            message: err.to_string(),
            chunks_written,
        }
    }

    #[instrument(skip_all, fields(document = %document.id))]
    async fn process(
        &self,
        document: &Document,
        cancel: &watch::Receiver<bool>,
        progress: &DocumentProgress,
    ) -> DocumentOutcome {
        if self.should_stop(cancel) {
            return DocumentOutcome::Skipped;
        }

        if document.id.trim().is_empty() {
            return self.fail(
                IngestStage::Chunk,
                VectorError::InvalidArgument("document id is empty".to_string()),
                0,
            );
        }

        let chunks: Vec<Chunk> = self.chunker.chunk(document).collect();
        debug!(chunks = chunks.len(), "Chunked document");

        let mut written = 0;
        for batch in chunks.chunks(self.embedder.batch_size()) {
            if self.should_stop(cancel) {
                if written == 0 {
                    return DocumentOutcome::Skipped;
                }
                let reason = if *cancel.borrow() {
                    "ingestion cancelled before the document finished"
                } else {
                    "ingestion halted by a fatal error before the document finished"
                };
                return DocumentOutcome::Failed {
                    stage: IngestStage::Embed,
                    message: reason.to_string(),
                    chunks_written: written,
                };
            }

            progress.enter(IngestStage::Embed);
            let embedded = match self.embed_batch(batch).await {
                Ok(embedded) => embedded,
                Err(e) => return self.fail(IngestStage::Embed, e, written),
            };

            progress.enter(IngestStage::Upsert);
            for group in embedded.chunks(self.write_batch_size) {
                match self.adapter.upsert(group).await {
                    Ok(count) => {
                        written += count;
                        progress.wrote(count);
                    }
                    Err(e) => {
                        if let VectorError::Ingestion { written: partial, .. } = &e {
                            written += partial;
                            progress.wrote(*partial);
                        }
                        return self.fail(IngestStage::Upsert, e, written);
                    }
                }
            }
        }

        debug!(chunks_written = written, "Document ingested");
        DocumentOutcome::Done {
            chunks_written: written,
        }
    }

    async fn embed_batch(&self, batch: &[Chunk]) -> VectorResult<Vec<EmbeddedChunk>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        for vector in &vectors {
            self.claim_dimension(vector.len())?;
        }
        Ok(batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk::new(chunk, vector))
            .collect())
    }
}

fn summarize(
    labels: Vec<(String, String)>,
    outcomes: Vec<Option<DocumentOutcome>>,
    progress: &[Arc<DocumentProgress>],
    cancelled: bool,
) -> IngestSummary {
    let mut summary = IngestSummary {
        cancelled,
        ..IngestSummary::default()
    };

    for (((document_id, source_path), outcome), progress) in
        labels.into_iter().zip(outcomes).zip(progress)
    {
        match outcome {
            Some(DocumentOutcome::Done { chunks_written }) => {
                summary.documents_processed += 1;
                summary.chunks_written += chunks_written;
            }
            Some(DocumentOutcome::Failed {
                stage,
                message,
                chunks_written,
            }) => {
                summary.chunks_written += chunks_written;
                summary.errors.push(DocumentFailure {
                    document_id,
                    source_path,
                    stage,
                    message,
                    chunks_written,
                });
            }
            Some(DocumentOutcome::Skipped) => summary.skipped.push(document_id),
            None => {
                let chunks_written = progress.written();
                summary.chunks_written += chunks_written;
                summary.errors.push(DocumentFailure {
                    document_id,
                    source_path,
                    stage: progress.stage(),
                    message: "ingestion worker stopped unexpectedly".to_string(),
                    chunks_written,
                });
            }
        }
    }

    summary
}
