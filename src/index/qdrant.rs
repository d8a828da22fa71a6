//! Qdrant-backed embedding index
//!
//! Documents are stored as points whose payload carries the text, the
//! original document id and scalar metadata. Point ids are UUID-v5 of the
//! document id, so re-indexing a document overwrites it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue,
        value::Kind, vectors_config::Config, with_payload_selector::SelectorOptions, Condition,
        CreateCollection, Distance, FieldCondition, Filter, Match, PointId, PointStruct, Range,
        SearchPoints, Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::index::{Embedder, EmbeddingIndex};
use crate::types::{Document, Filters, Metadata, MetadataValue, SearchHit};

/// Default Qdrant gRPC endpoint
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "documents";

const TEXT_FIELD: &str = "document";
const ID_FIELD: &str = "doc_id";

/// Embedding index over a single Qdrant collection
pub struct QdrantIndex {
    client: QdrantClient,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    /// Create a client without contacting the server
    ///
    /// Connection problems surface on the first search instead.
    pub fn new(url: &str, collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .context("Failed to create Qdrant client")?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            embedder,
        })
    }

    /// Connect and make sure the collection exists
    pub async fn connect(url: &str, collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index = Self::new(url, collection, embedder)?;
        index.ensure_collection().await?;
        Ok(index)
    }

    /// Create the collection with cosine distance if it is missing
    pub async fn ensure_collection(&self) -> Result<()> {
        let collections = self.client.list_collections().await?;
        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            info!(collection = %self.collection, "creating qdrant collection");
            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: self.embedder.dimension() as u64,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .context(format!("Failed to create collection: {}", self.collection))?;
        }

        Ok(())
    }

    /// Embed and upsert documents, returning how many were written
    pub async fn upsert(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut points = Vec::with_capacity(documents.len());
        for doc in documents {
            let vector = self.embed(&doc.text).await?;
            let mut payload: HashMap<String, QdrantValue> = doc
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), to_qdrant_value(v)))
                .collect();
            payload.insert(TEXT_FIELD.to_string(), QdrantValue::from(doc.text.clone()));
            payload.insert(ID_FIELD.to_string(), QdrantValue::from(doc.id.clone()));

            points.push(PointStruct::new(point_id_for(&doc.id), vector, payload));
        }

        self.client
            .upsert_points_blocking(&self.collection, None, points, None)
            .await
            .context("Failed to upsert points")?;

        debug!(count = documents.len(), collection = %self.collection, "upserted documents");
        Ok(documents.len())
    }

    /// Number of points in the collection
    pub async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .context("Failed to get collection info")?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .context("Embedding task panicked")?
    }
}

#[async_trait]
impl EmbeddingIndex for QdrantIndex {
    async fn search(&self, query: &str, top_k: usize, filters: &Filters) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector,
                limit: top_k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                filter: to_qdrant_filter(filters),
                ..Default::default()
            })
            .await
            .context("Failed to search points")?;

        let hits = search_result
            .result
            .into_iter()
            .map(|point| {
                let mut payload = point.payload;
                let text = payload
                    .remove(TEXT_FIELD)
                    .and_then(|v| as_string(&v))
                    .unwrap_or_default();
                let id = payload
                    .remove(ID_FIELD)
                    .and_then(|v| as_string(&v))
                    .unwrap_or_else(|| point_id_to_string(&point.id));
                let metadata: Metadata = payload
                    .iter()
                    .filter_map(|(k, v)| from_qdrant_value(v).map(|m| (k.clone(), m)))
                    .collect();

                SearchHit {
                    id,
                    text,
                    metadata,
                    score: point.score,
                }
            })
            .collect();

        Ok(hits)
    }
}

/// Deterministic point id for a document id
pub fn point_id_for(document_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
}

/// Every filter entry becomes a `must` condition
fn to_qdrant_filter(filters: &Filters) -> Option<Filter> {
    if filters.is_empty() {
        return None;
    }

    let must = filters
        .iter()
        .map(|(key, value)| {
            let mut field = FieldCondition {
                key: key.clone(),
                ..Default::default()
            };
            match value {
                MetadataValue::String(s) => {
                    field.r#match = Some(Match {
                        match_value: Some(MatchValue::Keyword(s.clone())),
                    })
                }
                MetadataValue::Integer(i) => {
                    field.r#match = Some(Match {
                        match_value: Some(MatchValue::Integer(*i)),
                    })
                }
                MetadataValue::Bool(b) => {
                    field.r#match = Some(Match {
                        match_value: Some(MatchValue::Boolean(*b)),
                    })
                }
                MetadataValue::Float(f) => {
                    field.range = Some(Range {
                        gte: Some(*f),
                        lte: Some(*f),
                        ..Default::default()
                    })
                }
            }
            Condition {
                condition_one_of: Some(ConditionOneOf::Field(field)),
            }
        })
        .collect();

    Some(Filter {
        must,
        ..Default::default()
    })
}

fn to_qdrant_value(value: &MetadataValue) -> QdrantValue {
    match value {
        MetadataValue::String(s) => QdrantValue::from(s.clone()),
        MetadataValue::Integer(i) => QdrantValue::from(*i),
        MetadataValue::Float(f) => QdrantValue::from(*f),
        MetadataValue::Bool(b) => QdrantValue::from(*b),
    }
}

fn from_qdrant_value(value: &QdrantValue) -> Option<MetadataValue> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(MetadataValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(MetadataValue::Integer(*i)),
        Kind::DoubleValue(f) => Some(MetadataValue::Float(*f)),
        Kind::BoolValue(b) => Some(MetadataValue::Bool(*b)),
        _ => None,
    })
}

fn as_string(value: &QdrantValue) -> Option<String> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    match point_id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => "unknown".to_string(),
    }
}
