//! Data types for documents, chunks, and stored fragments.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar metadata value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{v}"),
            MetadataValue::Int(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<usize> for MetadataValue {
    /// Values above `i64::MAX` saturate.
    fn from(value: usize) -> Self {
        MetadataValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Key-value metadata attached to documents and fragments.
pub type Metadata = HashMap<String, MetadataValue>;

/// Raw text supplied for ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The text content of the document.
    pub content: String,
    /// Key-value metadata copied onto every fragment stored from this document.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: Metadata::new() }
    }

    /// Add a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded slice of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the chunker's output.
    pub index: usize,
    /// The chunk text, including any overlap with the previous chunk.
    pub text: String,
    /// Byte offset of `text` within the document content.
    pub source_offset: usize,
}

/// Identifier assigned by a vector store on insert.
pub type FragmentId = String;

/// A fragment ready to be inserted into a [`VectorStore`](crate::VectorStore).
#[derive(Debug, Clone, PartialEq)]
pub struct NewFragment {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    /// Tag of the embedding model that produced `vector`.
    pub model: String,
}

/// A persisted fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFragment {
    /// Store-assigned identifier.
    pub id: FragmentId,
    pub text: String,
    /// The embedding vector. Backends may leave this empty on search results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    /// Tag of the embedding model that produced `vector`.
    pub model: String,
}

/// A [`StoredFragment`] paired with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedFragment {
    /// The retrieved fragment.
    pub fragment: StoredFragment,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

impl RetrievedFragment {
    pub fn text(&self) -> &str {
        &self.fragment.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_values_deserialize_untagged() {
        let doc: Document = serde_json::from_str(
            r#"{"content":"text",
                "metadata":{"source":"a.txt","page":3,"score":0.5,"draft":false}}"#,
        )
        .unwrap();

        assert_eq!(doc.metadata["source"], MetadataValue::Text("a.txt".into()));
        assert_eq!(doc.metadata["page"], MetadataValue::Int(3));
        assert_eq!(doc.metadata["score"], MetadataValue::Float(0.5));
        assert_eq!(doc.metadata["draft"], MetadataValue::Bool(false));
    }

    #[test]
    fn usize_metadata_saturates() {
        assert_eq!(MetadataValue::from(42usize), MetadataValue::Int(42));
        assert_eq!(MetadataValue::from(usize::MAX), MetadataValue::Int(i64::MAX));
    }

    #[test]
    fn metadata_defaults_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"content":"text"}"#).unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(Document::new("text"), doc);
    }
}
