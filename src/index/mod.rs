//! Embedding index module
//!
//! The engine talks to the index through `EmbeddingIndex::search` only.
//! `QdrantIndex` is the shipped adapter; it embeds query text locally with
//! an `Embedder` before searching.

pub mod embedding;
pub mod qdrant;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Filters, SearchHit};

pub use embedding::{Embedder, LocalEmbedder, DEFAULT_EMBEDDING_MODEL};
pub use qdrant::QdrantIndex;

/// Similarity search over indexed documents
///
/// Must return fewer than `top_k` hits (never an error) when the corpus is
/// smaller than requested, and an empty list for an empty corpus. Hits are
/// ordered by descending score.
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize, filters: &Filters) -> Result<Vec<SearchHit>>;
}
