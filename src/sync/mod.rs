//! Incremental vector index synchronization.
//!
//! Keeps the vector index consistent with the record store: diffs the
//! current listing against known fingerprints, embeds only new and
//! updated orders, deletes vanished ones, and reports per-batch failures
//! without aborting the run (at-least-once over the full order set).

mod store;
mod tracker;

pub use store::{FingerprintStore, MemoryFingerprintStore, SqliteFingerprintStore};
pub use tracker::{content_hash, diff, fingerprint};

use crate::cache::{ResultCache, QUERY_RESULT_TAG};
use crate::clients::{ClientError, EmbeddingProvider, OrderFilter, RecordStore, VectorIndex};
use crate::error::JoblensError;
use crate::model::{ChangeSet, Order, OrderFingerprint, VectorMetadata, VectorRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Record store unavailable: {0}")]
    Store(#[from] ClientError),

    #[error("Fingerprint store error: {0}")]
    Fingerprints(#[from] JoblensError),
}

/// Batch discipline for embed/upsert calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub batch_size: usize,
    /// Inter-batch delay to respect embedding rate limits
    pub batch_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            batch_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Incremental,
    FullRebuild,
}

/// Outcome of one synchronization run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub new_vectors: usize,
    pub updated_vectors: usize,
    pub deleted_vectors: usize,
    pub unchanged_vectors: usize,
    /// Batch-level failures; the run continues past them
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// True when some batches failed but the run completed
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Synchronizes the vector index with the record store
pub struct VectorSynchronizer {
    record_store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    fingerprints: Arc<dyn FingerprintStore>,
    cache: Arc<ResultCache>,
    config: SyncConfig,
}

impl VectorSynchronizer {
    pub fn new(
        record_store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        fingerprints: Arc<dyn FingerprintStore>,
        cache: Arc<ResultCache>,
        config: SyncConfig,
    ) -> Self {
        Self {
            record_store,
            embedder,
            index,
            fingerprints,
            cache,
            config,
        }
    }

    /// Incremental pass: embed only what changed, delete only what a full
    /// listing explicitly no longer contains.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        tracing::info!("Starting incremental sync {}", run_id);

        let current = self.record_store.list_orders(&OrderFilter::default()).await?;
        let known = self.fingerprints.load_all()?;
        let changes = diff(&current, &known);

        tracing::info!(
            "Sync {}: {} new, {} updated, {} unchanged, {} deleted",
            run_id,
            changes.new_orders.len(),
            changes.updated_orders.len(),
            changes.unchanged_orders.len(),
            changes.deleted_order_ids.len()
        );

        let mut errors = Vec::new();
        let new_count = self
            .embed_and_upsert(&changes.new_orders, &mut errors)
            .await;
        let updated_count = self
            .embed_and_upsert(&changes.updated_orders, &mut errors)
            .await;
        let deleted_count = self
            .delete_orders(&changes.deleted_order_ids, &mut errors)
            .await;

        // A no-op pass must leave cached query results alone
        if !changes.is_noop() {
            self.cache.invalidate_by_tag(QUERY_RESULT_TAG);
        }

        let report = SyncReport {
            run_id,
            mode: SyncMode::Incremental,
            new_vectors: new_count,
            updated_vectors: updated_count,
            deleted_vectors: deleted_count,
            unchanged_vectors: changes.unchanged_orders.len(),
            errors,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.log_report(&report);
        Ok(report)
    }

    /// Full rebuild: re-derive fingerprints from scratch and clean up
    /// index records with no fingerprint at all. The only mode permitted
    /// to delete vectors it has not explicitly seen vanish.
    pub async fn rebuild(&self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        tracing::info!("Starting full rebuild {}", run_id);

        let current = self.record_store.list_orders(&OrderFilter::default()).await?;
        self.fingerprints.clear()?;

        let mut errors = Vec::new();
        let upserted = self.embed_and_upsert(&current, &mut errors).await;

        // Orphan cleanup: anything in the index without a fingerprint goes
        let live: HashSet<String> = self
            .fingerprints
            .load_all()?
            .into_iter()
            .map(|fp| format!("order-{}", fp.order_id))
            .collect();
        let mut deleted = 0;
        match self.index.list_ids().await {
            Ok(index_ids) => {
                let orphans: Vec<String> = index_ids
                    .into_iter()
                    .filter(|id| !live.contains(id))
                    .collect();
                if !orphans.is_empty() {
                    match self.index.delete(&orphans).await {
                        Ok(()) => deleted = orphans.len(),
                        Err(e) => errors.push(format!("orphan cleanup failed: {}", e)),
                    }
                }
            }
            Err(e) => errors.push(format!("index listing failed: {}", e)),
        }

        self.cache.invalidate_by_tag(QUERY_RESULT_TAG);

        let report = SyncReport {
            run_id,
            mode: SyncMode::FullRebuild,
            new_vectors: upserted,
            updated_vectors: 0,
            deleted_vectors: deleted,
            unchanged_vectors: 0,
            errors,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.log_report(&report);
        Ok(report)
    }

    /// Compute the change set without touching the index; used by status
    /// reporting.
    pub async fn pending_changes(&self) -> Result<ChangeSet, SyncError> {
        let current = self.record_store.list_orders(&OrderFilter::default()).await?;
        let known = self.fingerprints.load_all()?;
        Ok(diff(&current, &known))
    }

    /// Embed and upsert orders in bounded batches. A failed batch is
    /// recorded and skipped; its fingerprints stay stale so the next run
    /// retries it. Returns the number of successfully upserted orders.
    async fn embed_and_upsert(&self, orders: &[Order], errors: &mut Vec<String>) -> usize {
        let mut upserted = 0;
        let batch_count = orders.len().div_ceil(self.config.batch_size.max(1));

        for (batch_index, batch) in orders.chunks(self.config.batch_size.max(1)).enumerate() {
            if batch_index > 0 && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }

            match self.process_batch(batch).await {
                Ok(count) => {
                    upserted += count;
                    tracing::debug!(
                        "Batch {}/{} upserted {} vectors",
                        batch_index + 1,
                        batch_count,
                        count
                    );
                }
                Err(e) => {
                    tracing::warn!("Batch {}/{} failed: {}", batch_index + 1, batch_count, e);
                    errors.push(format!(
                        "batch {} ({} orders): {}",
                        batch_index + 1,
                        batch.len(),
                        e
                    ));
                }
            }
        }
        upserted
    }

    async fn process_batch(&self, batch: &[Order]) -> Result<usize, SyncError> {
        let texts: Vec<String> = batch.iter().map(|o| o.embedding_text()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(SyncError::Store(ClientError::Embedding(format!(
                "Embedding count mismatch: expected {}, got {}",
                batch.len(),
                embeddings.len()
            ))));
        }

        let records: Vec<VectorRecord> = batch
            .iter()
            .zip(embeddings)
            .map(|(order, embedding)| VectorRecord {
                id: order.vector_id(),
                embedding,
                metadata: VectorMetadata::from_order(order),
            })
            .collect();
        self.index.upsert(&records).await?;

        // Fingerprints advance only after the index accepted the batch
        let now = Utc::now();
        let fingerprints: Vec<OrderFingerprint> =
            batch.iter().map(|o| fingerprint(o, now)).collect();
        self.fingerprints.upsert(&fingerprints)?;

        Ok(batch.len())
    }

    /// Delete vanished orders from the index and the fingerprint store.
    /// Fingerprints are kept when the index delete fails so the next run
    /// retries the deletion.
    async fn delete_orders(&self, order_ids: &[String], errors: &mut Vec<String>) -> usize {
        if order_ids.is_empty() {
            return 0;
        }
        let vector_ids: Vec<String> = order_ids
            .iter()
            .map(|id| format!("order-{}", id))
            .collect();
        match self.index.delete(&vector_ids).await {
            Ok(()) => {
                if let Err(e) = self.fingerprints.remove(order_ids) {
                    errors.push(format!("fingerprint removal failed: {}", e));
                }
                order_ids.len()
            }
            Err(e) => {
                errors.push(format!("index deletion failed: {}", e));
                0
            }
        }
    }

    fn log_report(&self, report: &SyncReport) {
        if report.is_partial_failure() {
            tracing::warn!(
                "Sync {} finished with {} batch errors in {}ms",
                report.run_id,
                report.errors.len(),
                report.duration_ms
            );
        } else {
            tracing::info!(
                "Sync {} complete: {} new, {} updated, {} deleted, {}ms",
                report.run_id,
                report.new_vectors,
                report.updated_vectors,
                report.deleted_vectors,
                report.duration_ms
            );
        }
    }
}
