//! Text Embeddings
//!
//! `SimpleEmbedder` is a dependency-free hash-based embedder used for tests
//! and as a last-resort fallback; real embeddings for production use come
//! from `ollama_embeddings::OllamaEmbedder`.

use crate::RagError;

/// Embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Embedding dimension
    pub embedding_dim: usize,
    /// Normalize embeddings
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 1024,
            normalize: true,
        }
    }
}

/// Trait every embedding backend implements.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
    fn dim(&self) -> usize;
}

/// Simple hash-based embedder for testing (no model required)
pub struct SimpleEmbedder {
    config: EmbeddingConfig,
}

impl SimpleEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    /// Generate a simple hash-based embedding
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.config.embedding_dim];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % self.config.embedding_dim;
            embedding[idx] += 1.0;
        }

        if self.config.normalize {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut embedding {
                    *v /= norm;
                }
            }
        }

        embedding
    }
}

impl Embedder for SimpleEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed(text))
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_embedder() {
        let embedder = SimpleEmbedder::new(EmbeddingConfig::default());
        let embedding = embedder.embed("Hello world");

        assert_eq!(embedding.len(), 1024);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_config_default() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.embedding_dim, 1024);
        assert!(config.normalize);
    }
}
