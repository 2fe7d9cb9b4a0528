//! Shared retrieval types: the document/vector store seams `ckd-rag`
//! implements, and the internal [`SearchResult`] shape merged results flow
//! through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A hydrated document as returned by a document-store lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub fields: Value,
}

/// A structured-filter predicate against a document's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterOp {
    Eq(String, Value),
    In(String, Vec<Value>),
    Range { field: String, min: Option<Value>, max: Option<Value> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub predicates: Vec<FilterOp>,
}

/// One result row flowing through the hybrid-merge pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub payload: Value,
    pub keyword_score: Option<f32>,
    pub semantic_score: Option<f32>,
    pub fallback_order: Option<u32>,
    pub hybrid_score: f32,
}

impl SearchResult {
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

/// Status of one search sub-system within a single `search` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Success,
    /// The sub-system returned matches but all were filtered out by
    /// structured predicates.
    Partial,
    /// The sub-system is unreachable or misconfigured.
    Failed,
}

/// A curated full-text index over one collection's title-like and
/// description-like fields.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<(Vec<SearchResult>, SearchStatus), CoreError>;

    async fn structured_scan(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, CoreError>;

    async fn hydrate(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>, CoreError>;
}

/// A vector index namespaced per collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, namespace: &str, points: Vec<VectorPoint>) -> Result<(), CoreError>;

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<(Vec<VectorMatch>, SearchStatus), CoreError>;

    async fn health_check(&self) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// A biomedical-literature API: parallel search-by-query and fetch-by-id.
#[async_trait]
pub trait LiteratureApi: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>, CoreError>;
    async fn fetch(&self, id: &str) -> Result<Option<Document>, CoreError>;
}
