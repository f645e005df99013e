//! Similarity search with distance-threshold filtering.

use crate::embed::{EmbedError, Embedder};
use crate::index::{Hit, IndexError, VectorIndex};

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Issues nearest-neighbor queries and applies the distance threshold.
pub struct Retriever<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a VectorIndex, embedder: &'a dyn Embedder) -> Self {
        Self { index, embedder }
    }

    /// Retrieve up to `k` documents with cosine distance strictly below
    /// `threshold`, ordered by ascending distance.
    ///
    /// The threshold is a recall/precision knob: lower means fewer,
    /// more-confident results, and an empty result is a valid outcome
    /// meaning "no relevant context". Note that `k` caps the candidate
    /// pool *before* filtering, so raising the threshold cannot surface
    /// documents outside the top-k nearest.
    pub fn retrieve(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<Hit>, RetrieveError> {
        let query_embedding = self.embedder.embed(query)?;
        let candidates = self.index.nearest_neighbors(&query_embedding, k)?;

        // Strict inequality: a hit exactly at the threshold is excluded.
        Ok(candidates
            .into_iter()
            .filter(|hit| hit.distance < threshold)
            .collect())
    }
}
