//! Local embedding provider backed by FastEmbed.
//!
//! **Important**: models are downloaded on-demand to `~/.cache/huggingface/`
//! on first use; the default model (all-MiniLM-L6-v2, 384 dims) is ~90MB.

use super::{ClientError, EmbeddingProvider};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

/// FastEmbed-backed implementation of [`EmbeddingProvider`].
///
/// The model handle is synchronous; calls are short enough that the engine
/// runs them inline on the runtime thread rather than through
/// `spawn_blocking`, matching the single-threaded scheduling model.
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

impl LocalEmbedder {
    pub fn new(model_name: &str) -> Result<Self, ClientError> {
        let (model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            other => {
                return Err(ClientError::InvalidInput(format!(
                    "Unsupported embedding model: {}",
                    other
                )))
            }
        };

        tracing::info!("Initializing embedding model {} ({}D)", model_name, dimension);

        let handle = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(true),
        )
        .map_err(|e| ClientError::Embedding(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(handle),
            dimension,
        })
    }

    pub fn with_default_model() -> Result<Self, ClientError> {
        Self::new("all-MiniLM-L6-v2")
    }

    fn check_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<(), ClientError> {
        for embedding in embeddings {
            if embedding.len() != self.dimension {
                return Err(ClientError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        if text.is_empty() {
            return Err(ClientError::InvalidInput("Empty text".to_string()));
        }
        let embeddings = self
            .model
            .lock()
            .unwrap()
            .embed(vec![text.to_string()], None)
            .map_err(|e| ClientError::Embedding(e.to_string()))?;
        self.check_dimensions(&embeddings)?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Embedding("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(ClientError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }
        let embeddings = self
            .model
            .lock()
            .unwrap()
            .embed(texts.to_vec(), None)
            .map_err(|e| ClientError::Embedding(e.to_string()))?;
        self.check_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_local_embedder() {
        let embedder = LocalEmbedder::with_default_model().unwrap();
        assert_eq!(embedder.dimension(), 384);

        let embedding = embedder.embed("rush banner job for Acme").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_batch_embedding() {
        let embedder = LocalEmbedder::with_default_model().unwrap();
        let texts = vec!["first order".to_string(), "second order".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
    }
}
