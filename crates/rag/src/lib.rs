//! Hybrid retrieval engine: dense (Qdrant) + sparse (Tantivy) search merged
//! by a normalize-then-weighted-sum score, with a structured-scan fallback,
//! query/embedding caches, and background health supervision.

pub mod cache;
pub mod embeddings;
pub mod health;
pub mod ollama_embeddings;
pub mod retriever;
pub mod sparse_search;
pub mod vector_store;

pub use cache::{CacheStats, CachedEmbedder, EmbeddingCache, QueryCache};
pub use embeddings::{Embedder, EmbeddingConfig, SimpleEmbedder};
pub use health::HealthSupervisor;
pub use ollama_embeddings::{AsyncOllamaEmbedder, OllamaEmbedder, OllamaEmbeddingConfig};
pub use retriever::{to_core_document, HybridEngine, HybridEngineConfig};
pub use sparse_search::{SparseConfig, SparseIndex};
pub use vector_store::{
    CollectionInfo, Document, SearchFilter, VectorDistance, VectorSearchResult, VectorStore,
    VectorStoreConfig,
};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for ckd_core::CoreError {
    fn from(err: RagError) -> Self {
        ckd_core::CoreError::ExternalService {
            service: "ckd-rag".to_string(),
            message: err.to_string(),
        }
    }
}
