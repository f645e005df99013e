//! Deduplicated ingestion of documents into a vector index.

use indicatif::{ProgressBar, ProgressStyle};

use crate::document::Document;
use crate::embed::Embedder;
use crate::index::{IndexError, VectorIndex};

/// Outcome of one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents embedded and inserted this run.
    pub accepted: usize,
    /// Documents whose id was already indexed.
    pub skipped: usize,
    /// Documents dropped after a per-document embedding failure.
    pub failed: usize,
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} accepted, {} skipped, {} failed",
            self.accepted, self.skipped, self.failed
        )
    }
}

/// Consumes a document stream, dedups against the index and inserts the
/// rest. The dedup check happens before embedding, so unchanged content is
/// never re-embedded (embedding is the expensive step).
pub struct Ingestor<'a> {
    index: &'a mut VectorIndex,
    embedder: &'a dyn Embedder,
    show_progress: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(index: &'a mut VectorIndex, embedder: &'a dyn Embedder) -> Self {
        Self {
            index,
            embedder,
            show_progress: false,
        }
    }

    /// Draw an indicatif progress bar over the batch on stderr.
    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }

    /// Ingest a batch of documents.
    ///
    /// Per-document embedding failures and zero-norm embeddings are logged
    /// and counted as `failed` without aborting the batch. A dimension
    /// mismatch between the embedder and the index means the collection was
    /// built with a different model and aborts the run.
    pub fn run(&mut self, docs: Vec<Document>) -> Result<IngestReport, IndexError> {
        let bar = if self.show_progress {
            let bar = ProgressBar::new(docs.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                    .expect("static template")
                    .progress_chars("=> "),
            );
            bar.set_message("indexing");
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut report = IngestReport::default();

        for doc in docs {
            bar.inc(1);

            if self.index.contains(&doc.id) {
                report.skipped += 1;
                continue;
            }

            let embedding = match self.embedder.embed(&doc.text) {
                Ok(embedding) => embedding,
                Err(err) => {
                    tracing::warn!(id = %doc.id, error = %err, "skipping document: embedding failed");
                    report.failed += 1;
                    continue;
                }
            };

            match self
                .index
                .insert_if_absent(&doc.id, doc.text, embedding, doc.metadata)
            {
                Ok(true) => report.accepted += 1,
                // Unreachable in practice: the `contains` check above runs
                // under the same `&mut` borrow, so the id cannot appear
                // between check and insert. Counted as skipped so the
                // report stays honest if that ever changes.
                Ok(false) => report.skipped += 1,
                Err(err @ IndexError::DimensionMismatch { .. }) => {
                    bar.abandon();
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(id = %doc.id, error = %err, "skipping document: not indexable");
                    report.failed += 1;
                }
            }
        }

        bar.finish_and_clear();
        Ok(report)
    }
}
