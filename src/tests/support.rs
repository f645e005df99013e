//! Shared test doubles.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::document::{Document, Metadata};
use crate::embed::{EmbedError, Embedder};

/// Deterministic embedder for tests.
///
/// By default hashes whitespace-separated tokens into buckets, so texts
/// sharing words land near each other. Exact vectors can be pinned per
/// text with `with_vector`, and `fail_on` makes any text containing the
/// given substring fail to embed.
pub struct FakeEmbedder {
    dimensions: usize,
    pinned: HashMap<String, Vec<f32>>,
    fail_substring: Option<String>,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            pinned: HashMap::new(),
            fail_substring: None,
        }
    }

    /// Pin an exact embedding for a given text.
    pub fn with_vector(mut self, text: &str, embedding: Vec<f32>) -> Self {
        assert_eq!(embedding.len(), self.dimensions);
        self.pinned.insert(text.to_string(), embedding);
        self
    }

    /// Fail embedding for any text containing `substring`.
    pub fn fail_on(mut self, substring: &str) -> Self {
        self.fail_substring = Some(substring.to_string());
        self
    }
}

impl Embedder for FakeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(needle) = &self.fail_substring {
            if text.contains(needle) {
                return Err(EmbedError::EmbeddingFailed(format!(
                    "fake failure for text containing '{needle}'"
                )));
            }
        }

        if let Some(pinned) = self.pinned.get(text) {
            return Ok(pinned.clone());
        }

        let mut v = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            v[bucket] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id_hash(&self) -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xFA;
        id[1] = 0x4E;
        id
    }
}

/// Build a document with a subject metadata field, the way the mail
/// connector does.
pub fn email_doc(id: &str, subject: &str, body: &str) -> Document {
    let mut metadata = Metadata::new();
    metadata.insert("subject".into(), subject.into());
    metadata.insert("type".into(), "email".into());
    Document::new(id, format!("Subject: {subject}\n\n{body}"), metadata)
}
