//! Embedding provider trait and the local fastembed implementation

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

use super::l2_normalize;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    Initialization(String),

    #[error("Embedding generation failed: {0}")]
    Generation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Provider is not available")]
    Unavailable,
}

/// Trait for embedding providers
///
/// Abstracts over embedding backends; callers check `is_available` and fall
/// back to keyword retrieval when no provider can serve them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, order-preserving.
    ///
    /// Implementations process the input in bounded sub-batches to cap peak
    /// memory, not as a throughput guarantee.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embedding dimension
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Whether the backend can currently serve requests
    fn is_available(&self) -> bool {
        true
    }
}

/// Local embedding provider backed by fastembed
///
/// Models download on demand to `~/.cache/huggingface/` on first use; the
/// default all-MiniLM-L6-v2 is ~90MB at 384 dimensions.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    sub_batch_size: usize,
}

impl FastEmbedProvider {
    /// Create a provider for the named model.
    pub fn new(model_name: &str, sub_batch_size: usize) -> Result<Self, EmbeddingError> {
        let embedding_model = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => {
                return Err(EmbeddingError::Initialization(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        let dimension = match embedding_model {
            EmbeddingModel::BGEBaseENV15 => 768,
            _ => 384,
        };

        tracing::info!(
            "Initializing local embedding model: {} ({}D, downloads on first use)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::Initialization(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            sub_batch_size: sub_batch_size.max(1),
        })
    }

    /// Create a provider with the default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2", 5)
    }

    fn embed_sub_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = self
            .model
            .embed(texts, None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()))?;

        for embedding in &mut embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            l2_normalize(embedding);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self.embed_sub_batch(vec![text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("No embeddings generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().all(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "All texts are empty".to_string(),
            ));
        }

        let mut all = Vec::with_capacity(texts.len());
        for sub in texts.chunks(self.sub_batch_size) {
            let embeddings = self.embed_sub_batch(sub.to_vec())?;
            if embeddings.len() != sub.len() {
                return Err(EmbeddingError::Generation(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    sub.len(),
                    embeddings.len()
                )));
            }
            all.extend(embeddings);
        }

        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
