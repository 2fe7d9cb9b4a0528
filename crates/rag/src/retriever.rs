//! Hybrid retrieval engine.
//!
//! Runs keyword (Tantivy/BM25) and semantic (Qdrant) search against a named
//! collection in parallel, normalizes each stream's scores against its own
//! batch maximum, and merges by `alpha * keyword + beta * semantic`. If both
//! streams come back empty or unreachable, falls back to an unranked
//! structured scan over the collection's metadata so a query never returns
//! nothing just because search infrastructure is degraded.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use ckd_core::{Document as CoreDocument, MetadataFilter, SearchResult, SearchStatus};

use crate::cache::QueryCache;
use crate::sparse_search::{SparseConfig, SparseIndex};
use crate::vector_store::{Document as VsDocument, VectorStore};
use crate::RagError;

/// Weights and limits for the hybrid merge. Defaults mirror
/// `ckd-config::RagConfig` (alpha=0.4, beta=0.6).
#[derive(Debug, Clone)]
pub struct HybridEngineConfig {
    pub alpha: f32,
    pub beta: f32,
    pub dense_top_k_factor: usize,
    pub fallback_factor: usize,
}

impl Default for HybridEngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.6,
            dense_top_k_factor: 3,
            fallback_factor: 2,
        }
    }
}

impl From<&ckd_config::RagConfig> for HybridEngineConfig {
    fn from(config: &ckd_config::RagConfig) -> Self {
        Self {
            alpha: config.alpha,
            beta: config.beta,
            dense_top_k_factor: config.dense_top_k_factor,
            fallback_factor: config.fallback_factor,
        }
    }
}

struct CollectionState {
    sparse: Arc<SparseIndex>,
    documents: HashMap<String, VsDocument>,
}

/// Owns per-collection Tantivy indices and a shared Qdrant connection, and
/// exposes the merged-search entry point. One instance serves every
/// collection (hospitals, welfare programs, medical Q&A).
pub struct HybridEngine {
    config: HybridEngineConfig,
    vector_store: Arc<VectorStore>,
    collections: DashMap<String, CollectionState>,
    query_cache: Option<Arc<QueryCache>>,
}

impl HybridEngine {
    pub fn new(config: HybridEngineConfig, vector_store: Arc<VectorStore>) -> Self {
        Self {
            config,
            vector_store,
            collections: DashMap::new(),
            query_cache: None,
        }
    }

    pub fn with_query_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.query_cache = Some(cache);
        self
    }

    /// Registers a collection's document set for keyword search, structured
    /// fallback scan, and hydration. Idempotent: re-registering replaces the
    /// prior contents.
    pub fn register_collection(
        &self,
        collection: &str,
        documents: Vec<VsDocument>,
    ) -> Result<(), RagError> {
        let sparse = Arc::new(SparseIndex::new(SparseConfig::default())?);
        sparse.index_documents(&documents)?;

        let by_id = documents.into_iter().map(|d| (d.id.clone(), d)).collect();

        self.collections.insert(
            collection.to_string(),
            CollectionState {
                sparse,
                documents: by_id,
            },
        );

        Ok(())
    }

    /// Merged keyword + semantic search over one collection.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        query_embedding: &[f32],
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<(Vec<SearchResult>, SearchStatus, SearchStatus), RagError> {
        let cache_key = format!("{collection}::{query}::{limit}");
        if let Some(cache) = &self.query_cache {
            if let Some(raw) = cache.get_raw(&cache_key) {
                if let Ok(cached) = serde_json::from_slice::<Vec<SearchResult>>(&raw) {
                    return Ok((cached, SearchStatus::Success, SearchStatus::Success));
                }
            }
        }

        let (keyword_results, keyword_status) = self.keyword_search(collection, query, limit)?;
        let (semantic_results, semantic_status) = self
            .vector_store
            .search(
                collection,
                query_embedding,
                limit * self.config.dense_top_k_factor,
                None,
            )
            .await
            .map(|r| (r, SearchStatus::Success))
            .unwrap_or_else(|err| {
                tracing::warn!(collection, error = %err, "semantic search failed");
                (Vec::new(), SearchStatus::Failed)
            });

        let mut merged = self.merge(keyword_results, semantic_results);
        apply_filter(&mut merged, filter);

        if merged.len() < limit {
            tracing::warn!(
                collection,
                merged = merged.len(),
                limit,
                "search streams under-produced, topping up with structured fallback"
            );
            let existing: std::collections::HashSet<String> =
                merged.iter().map(|r| r.doc_id.clone()).collect();
            let fallback = self.structured_fallback(collection, filter, limit * self.config.fallback_factor);
            merged.extend(fallback.into_iter().filter(|r| !existing.contains(&r.doc_id)));
        }

        merged.truncate(limit);

        if let Some(cache) = &self.query_cache {
            if let Ok(bytes) = serde_json::to_vec(&merged) {
                cache.put_raw(cache_key, bytes);
            }
        }

        Ok((merged, keyword_status, semantic_status))
    }

    fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<(Vec<SearchResult>, SearchStatus), RagError> {
        let Some(state) = self.collections.get(collection) else {
            return Ok((Vec::new(), SearchStatus::Failed));
        };

        let results = state.sparse.search(query, Some(limit))?;
        let status = if results.is_empty() {
            SearchStatus::Partial
        } else {
            SearchStatus::Success
        };

        let search_results = results
            .into_iter()
            .map(|r| SearchResult {
                doc_id: r.id,
                payload: document_payload(&r.content, &r.metadata),
                keyword_score: Some(r.score),
                semantic_score: None,
                fallback_order: None,
                hybrid_score: 0.0,
            })
            .collect();

        Ok((search_results, status))
    }

    fn structured_fallback(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Vec<SearchResult> {
        let Some(state) = self.collections.get(collection) else {
            return Vec::new();
        };

        let mut ordered_docs: Vec<&VsDocument> = state.documents.values().collect();
        ordered_docs.sort_by(|a, b| a.id.cmp(&b.id));

        let mut results: Vec<SearchResult> = ordered_docs
            .into_iter()
            .map(|doc| SearchResult {
                doc_id: doc.id.clone(),
                payload: document_payload(&doc.content, &doc.metadata),
                keyword_score: None,
                semantic_score: None,
                fallback_order: None,
                hybrid_score: 0.0,
            })
            .collect();

        apply_filter(&mut results, filter);

        for (order, r) in results.iter_mut().enumerate() {
            r.fallback_order = Some(order as u32);
        }

        results.truncate(limit);
        results
    }

    fn merge(
        &self,
        keyword: Vec<SearchResult>,
        semantic: Vec<crate::vector_store::VectorSearchResult>,
    ) -> Vec<SearchResult> {
        let keyword_max = keyword
            .iter()
            .filter_map(|r| r.keyword_score)
            .fold(0.0f32, f32::max)
            .max(f32::EPSILON);
        let semantic_max = semantic
            .iter()
            .map(|r| r.score)
            .fold(0.0f32, f32::max)
            .max(f32::EPSILON);

        let mut by_id: HashMap<String, SearchResult> = HashMap::new();

        for r in keyword {
            by_id.insert(r.doc_id.clone(), r);
        }

        for r in semantic {
            let entry = by_id.entry(r.id.clone()).or_insert_with(|| SearchResult {
                doc_id: r.id.clone(),
                payload: document_payload(&r.content, &r.metadata),
                keyword_score: None,
                semantic_score: None,
                fallback_order: None,
                hybrid_score: 0.0,
            });
            entry.semantic_score = Some(r.score);
        }

        for result in by_id.values_mut() {
            let norm_keyword = result.keyword_score.unwrap_or(0.0) / keyword_max;
            let norm_semantic = result.semantic_score.unwrap_or(0.0) / semantic_max;
            result.hybrid_score = self.config.alpha * norm_keyword + self.config.beta * norm_semantic;
        }

        let mut merged: Vec<SearchResult> = by_id.into_values().collect();
        merged.sort_by(|a, b| b.hybrid_score.partial_cmp(&a.hybrid_score).unwrap());
        merged
    }
}

fn document_payload(content: &str, metadata: &HashMap<String, String>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("content".to_string(), Value::String(content.to_string()));
    for (k, v) in metadata {
        map.insert(k.clone(), Value::String(v.clone()));
    }
    Value::Object(map)
}

fn apply_filter(results: &mut Vec<SearchResult>, filter: &MetadataFilter) {
    if filter.predicates.is_empty() {
        return;
    }
    results.retain(|r| {
        filter.predicates.iter().all(|pred| match pred {
            ckd_core::FilterOp::Eq(field, value) => {
                r.payload.get(field).map(|v| v == value).unwrap_or(false)
            }
            ckd_core::FilterOp::In(field, values) => r
                .payload
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            ckd_core::FilterOp::Range { field, min, max } => {
                let Some(actual) = r.payload.get(field).and_then(|v| v.as_f64()) else {
                    return false;
                };
                let above_min = min.as_ref().and_then(|m| m.as_f64()).map_or(true, |m| actual >= m);
                let below_max = max.as_ref().and_then(|m| m.as_f64()).map_or(true, |m| actual <= m);
                above_min && below_max
            }
        })
    });
}

/// Converts a hydrated hybrid-search payload back into a [`CoreDocument`].
pub fn to_core_document(collection: &str, result: &SearchResult) -> CoreDocument {
    CoreDocument {
        id: result.doc_id.clone(),
        collection: collection.to_string(),
        fields: result.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> HybridEngine {
        let vector_store_config = crate::vector_store::VectorStoreConfig::default();
        let vector_store = Arc::new(
            // Never connects in tests; `new` only builds the client handle.
            futures::executor::block_on(VectorStore::new(vector_store_config)).unwrap(),
        );
        HybridEngine::new(HybridEngineConfig::default(), vector_store)
    }

    #[test]
    fn merge_weights_keyword_and_semantic() {
        let engine = engine();

        let keyword = vec![SearchResult {
            doc_id: "doc-1".to_string(),
            payload: serde_json::json!({"content": "low sodium diet"}),
            keyword_score: Some(2.0),
            semantic_score: None,
            fallback_order: None,
            hybrid_score: 0.0,
        }];
        let semantic = vec![crate::vector_store::VectorSearchResult {
            id: "doc-1".to_string(),
            score: 0.9,
            content: "low sodium diet".to_string(),
            metadata: HashMap::new(),
        }];

        let merged = engine.merge(keyword, semantic);
        assert_eq!(merged.len(), 1);
        // keyword normalizes to 1.0 (its own max), semantic normalizes to 1.0
        let expected = engine.config.alpha + engine.config.beta;
        assert!((merged[0].hybrid_score - expected).abs() < 1e-4);
    }

    #[test]
    fn structured_fallback_assigns_order() {
        let engine = engine();
        engine
            .register_collection(
                "welfare",
                vec![VsDocument {
                    id: "w1".to_string(),
                    content: "dialysis subsidy".to_string(),
                    title: Some("Welfare".to_string()),
                    category: Some("welfare".to_string()),
                    language: Some("en".to_string()),
                    metadata: HashMap::new(),
                }],
            )
            .unwrap();

        let results = engine.structured_fallback("welfare", &MetadataFilter::default(), 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fallback_order, Some(0));
    }
}
