//! Document and retrieval types
//!
//! Documents are owned by the embedding index; retrieved items live only
//! for the duration of one `answer` call (or inside a cache entry).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar metadata value attached to documents and used in filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Canonical, type-tagged rendering used for cache keys.
    ///
    /// `Integer(1)` and `String("1")` must not collide, so the type is part
    /// of the text.
    pub fn canonical(&self) -> String {
        match self {
            MetadataValue::Bool(b) => format!("b:{}", b),
            MetadataValue::Integer(i) => format!("i:{}", i),
            MetadataValue::Float(f) => format!("f:{:?}", f),
            MetadataValue::String(s) => format!("s:{}", s),
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
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

/// Document metadata (title, source, timestamp, category, ...)
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Search filters. Ordered map, so construction order never matters.
pub type Filters = BTreeMap<String, MetadataValue>;

/// A document stored in the embedding index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One row returned by `EmbeddingIndex::search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// A search hit owned by the engine for one retrieval call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub document_id: String,
    /// Full text until assembly cuts it to the snippet limit
    pub snippet: String,
    pub similarity_score: f32,
    pub metadata: Metadata,
    /// First-seen position in the index result, used as the tie-break
    pub rank: usize,
    pub truncated: bool,
}

impl RetrievedItem {
    /// Convert ordered index hits, recording their first-seen rank
    pub fn from_hits(hits: Vec<SearchHit>) -> Vec<RetrievedItem> {
        hits.into_iter()
            .enumerate()
            .map(|(rank, hit)| RetrievedItem {
                document_id: hit.id,
                snippet: hit.text,
                similarity_score: hit.score,
                metadata: hit.metadata,
                rank,
                truncated: false,
            })
            .collect()
    }

    /// Title from metadata, falling back to the document id
    pub fn title(&self) -> &str {
        self.metadata
            .get("title")
            .and_then(MetadataValue::as_str)
            .unwrap_or(&self.document_id)
    }

    /// Source from metadata, "unknown" when absent
    pub fn source(&self) -> String {
        self.metadata
            .get("source")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Citation tag shown above the snippet in the context block
    pub fn citation_tag(&self, position: usize) -> String {
        format!(
            "[{}] {} (source: {}, id: {})",
            position,
            self.title(),
            self.source(),
            self.document_id
        )
    }
}
