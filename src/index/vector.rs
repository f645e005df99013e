//! In-memory vector index with cosine-distance search.
//!
//! Holds one entry per document id and answers nearest-neighbor queries.
//! Distances are cosine distances (`1 - cosine_similarity`), so smaller
//! means more similar and results sort ascending.

use std::collections::HashMap;

use crate::document::{Document, Metadata};

/// A stored record: the embedding plus the text and metadata it was
/// computed from. Immutable after insertion.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// One nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct Hit {
    pub document: Document,
    /// Cosine distance in [0.0, 2.0]; 0.0 = identical direction.
    pub distance: f32,
}

/// In-memory vector index keyed by document id.
pub struct VectorIndex {
    entries: HashMap<String, IndexEntry>,
    /// Expected embedding dimensions, fixed per collection.
    dimensions: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

impl VectorIndex {
    /// Create a new empty index with the given embedding dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point lookup by primary key.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert an entry unless the id already exists.
    ///
    /// Returns `Ok(true)` when the entry was inserted and `Ok(false)` when
    /// the id was already present. The existing entry is never overwritten;
    /// together with `&mut self` this makes check-then-insert a single
    /// atomic step per id, which is what keeps repeated ingest runs
    /// idempotent.
    pub fn insert_if_absent(
        &mut self,
        id: &str,
        text: String,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Result<bool, IndexError> {
        if self.entries.contains_key(id) {
            return Ok(false);
        }

        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        let norm = l2_norm(&embedding);
        if norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(
            id.to_string(),
            IndexEntry {
                embedding,
                text,
                metadata,
            },
        );

        Ok(true)
    }

    /// Return up to `k` entries sorted by ascending cosine distance.
    ///
    /// Fewer than `k` entries in the index returns all of them; an empty
    /// index returns an empty vec, not an error.
    pub fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut hits: Vec<Hit> = self
            .entries
            .iter()
            .map(|(id, entry)| {
                let similarity = cosine_similarity(query, &entry.embedding, query_norm);
                Hit {
                    document: Document {
                        id: id.clone(),
                        text: entry.text.clone(),
                        metadata: entry.metadata.clone(),
                    },
                    distance: 1.0 - similarity,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with a precomputed query norm.
fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot / (query_norm * target_norm)
}
