//! External collaborator seams: the record store (ERP source of truth),
//! the embedding provider, and the vector index.
//!
//! The engine depends only on these traits; implementations are injected
//! at construction time. The in-memory implementations double as
//! deterministic test doubles.

mod file;
mod local_embed;
mod memory;

pub use file::load_orders_from_json;
pub use local_embed::LocalEmbedder;
pub use memory::{HashingEmbedder, InMemoryRecordStore, InMemoryVectorIndex};

use crate::model::{Order, ScoredMatch, VectorRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Call timed out after {0}ms")]
    Timeout(u64),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Listing filter passed to the record store
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub due_date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub text_filter: Option<String>,
}

/// Source-of-truth order store (ERP)
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List orders matching the filter; an empty filter lists everything
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ClientError>;

    /// Fetch a single order by job number
    async fn get_order(&self, job_number: &str) -> Result<Order, ClientError>;
}

/// Embedding backend with fixed output dimensionality
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError>;

    /// Generate embeddings for multiple texts (batched for efficiency)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClientError>;

    /// Embedding dimension
    fn dimension(&self) -> usize;
}

/// Vector index over order records
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), ClientError>;

    async fn delete(&self, ids: &[String]) -> Result<(), ClientError>;

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>, ClientError>;

    /// All record ids currently in the index. Used by full-rebuild orphan
    /// cleanup only.
    async fn list_ids(&self) -> Result<Vec<String>, ClientError>;
}
