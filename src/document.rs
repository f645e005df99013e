//! Normalized documents as produced by a mail source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single scalar metadata value.
///
/// Metadata is schema-less: the index stores whatever the connector
/// attaches and only ever echoes it back at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl MetaValue {
    /// String content, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Descriptive fields attached to a document (date, subject, source type).
pub type Metadata = BTreeMap<String, MetaValue>;

/// Unit of indexed content.
///
/// `id` is the stable external identifier (the source message id) and the
/// primary key within a collection. `text` is the subject + cleaned body,
/// already whitespace-normalized and markup-free by the time the core
/// sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Subject line for display, if the connector recorded one.
    pub fn subject(&self) -> &str {
        self.metadata
            .get("subject")
            .and_then(MetaValue::as_str)
            .unwrap_or("(no subject)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_values_roundtrip_through_json() {
        let mut meta = Metadata::new();
        meta.insert("subject".into(), "Quarterly budget".into());
        meta.insert("priority".into(), MetaValue::Int(2));
        meta.insert("score".into(), MetaValue::Float(0.25));
        meta.insert("read".into(), MetaValue::Bool(true));

        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn subject_falls_back_when_missing() {
        let doc = Document::new("m1", "hello", Metadata::new());
        assert_eq!(doc.subject(), "(no subject)");

        let mut meta = Metadata::new();
        meta.insert("subject".into(), "Hello".into());
        let doc = Document::new("m1", "hello", meta);
        assert_eq!(doc.subject(), "Hello");
    }
}
