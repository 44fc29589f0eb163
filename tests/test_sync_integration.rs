use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use joblens::cache::{CachedResult, ResultCache, QUERY_RESULT_TAG};
use joblens::clients::{
    ClientError, EmbeddingProvider, HashingEmbedder, InMemoryRecordStore, InMemoryVectorIndex,
    VectorIndex,
};
use joblens::model::{Customer, Order, Tag, VectorMetadata, VectorRecord};
use joblens::sync::{MemoryFingerprintStore, SyncConfig, SyncMode, VectorSynchronizer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn order(job: &str, description: &str) -> Order {
    Order {
        job_number: job.to_string(),
        customer: Customer {
            id: format!("C-{}", job),
            name: "Test Co".to_string(),
        },
        description: description.to_string(),
        comments: None,
        master_status: "Approved".to_string(),
        stock_status: None,
        entered_date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        due_date: Utc.with_ymd_and_hms(2024, 3, 14, 17, 0, 0).unwrap(),
        due_factory_date: None,
        days_to_due: None,
        total: 100.0,
        tags: vec![Tag::new("rush")],
        line_items: vec![],
        shipments: vec![],
        rush: false,
    }
}

fn orders() -> Vec<Order> {
    vec![
        order("1001", "Banner print run"),
        order("1002", "Vinyl decals"),
        order("1003", "Laser etched plaques"),
    ]
}

struct Fixture {
    store: Arc<InMemoryRecordStore>,
    index: Arc<InMemoryVectorIndex>,
    cache: Arc<ResultCache>,
    synchronizer: VectorSynchronizer,
}

fn fixture_with_embedder(embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Fixture {
    let store = Arc::new(InMemoryRecordStore::new(orders()));
    let index = Arc::new(InMemoryVectorIndex::new());
    let cache = Arc::new(ResultCache::new());
    let synchronizer = VectorSynchronizer::new(
        store.clone(),
        embedder,
        index.clone(),
        Arc::new(MemoryFingerprintStore::new()),
        cache.clone(),
        SyncConfig {
            batch_size,
            batch_delay_ms: 0,
        },
    );
    Fixture {
        store,
        index,
        cache,
        synchronizer,
    }
}

fn fixture() -> Fixture {
    fixture_with_embedder(Arc::new(HashingEmbedder::new(32)), 25)
}

fn seed_cache(cache: &ResultCache) {
    cache.set(
        "some-query",
        CachedResult {
            strategy: "vector".to_string(),
            orders: vec![],
            confidence: 0.8,
            aggregates: None,
        },
        Duration::from_secs(300),
        vec![QUERY_RESULT_TAG.to_string()],
    );
}

#[tokio::test]
async fn test_initial_sync_indexes_everything() {
    let fx = fixture();

    let report = fx.synchronizer.sync().await.unwrap();
    assert_eq!(report.mode, SyncMode::Incremental);
    assert_eq!(report.new_vectors, 3);
    assert_eq!(report.updated_vectors, 0);
    assert_eq!(report.deleted_vectors, 0);
    assert!(!report.is_partial_failure());
    assert_eq!(fx.index.len(), 3);
}

#[tokio::test]
async fn test_noop_sync_preserves_cache() {
    let fx = fixture();
    fx.synchronizer.sync().await.unwrap();

    seed_cache(&fx.cache);
    let report = fx.synchronizer.sync().await.unwrap();

    assert_eq!(report.new_vectors + report.updated_vectors + report.deleted_vectors, 0);
    assert_eq!(report.unchanged_vectors, 3);
    // Nothing changed upstream, so cached results stay valid
    assert!(fx.cache.get("some-query").is_some());
}

#[tokio::test]
async fn test_content_change_reindexes_and_flushes_cache() {
    let fx = fixture();
    fx.synchronizer.sync().await.unwrap();
    seed_cache(&fx.cache);

    let mut changed = order("1002", "Vinyl decals");
    changed.master_status = "In Production".to_string();
    fx.store.insert(changed);

    let report = fx.synchronizer.sync().await.unwrap();
    assert_eq!(report.new_vectors, 0);
    assert_eq!(report.updated_vectors, 1);
    assert_eq!(report.unchanged_vectors, 2);
    assert!(fx.cache.get("some-query").is_none());
}

#[tokio::test]
async fn test_vanished_order_is_deleted() {
    let fx = fixture();
    fx.synchronizer.sync().await.unwrap();

    fx.store.remove("1003");
    let report = fx.synchronizer.sync().await.unwrap();

    assert_eq!(report.deleted_vectors, 1);
    assert_eq!(fx.index.len(), 2);
    let ids = fx.index.list_ids().await.unwrap();
    assert!(!ids.contains(&"order-1003".to_string()));
}

#[tokio::test]
async fn test_rebuild_cleans_orphans() {
    let fx = fixture();
    fx.synchronizer.sync().await.unwrap();

    // A record the order book knows nothing about
    let stray = order("9999", "Stale leftover");
    fx.index
        .upsert(&[VectorRecord {
            id: "order-9999".to_string(),
            embedding: vec![0.5; 32],
            metadata: VectorMetadata::from_order(&stray),
        }])
        .await
        .unwrap();
    assert_eq!(fx.index.len(), 4);

    seed_cache(&fx.cache);
    let report = fx.synchronizer.rebuild().await.unwrap();

    assert_eq!(report.mode, SyncMode::FullRebuild);
    assert_eq!(report.new_vectors, 3);
    assert_eq!(report.deleted_vectors, 1);
    assert_eq!(fx.index.len(), 3);
    // Rebuild always flushes query results
    assert!(fx.cache.get("some-query").is_none());
}

#[tokio::test]
async fn test_incremental_never_cleans_orphans() {
    let fx = fixture();
    fx.synchronizer.sync().await.unwrap();

    let stray = order("9999", "Stale leftover");
    fx.index
        .upsert(&[VectorRecord {
            id: "order-9999".to_string(),
            embedding: vec![0.5; 32],
            metadata: VectorMetadata::from_order(&stray),
        }])
        .await
        .unwrap();

    // Incremental passes only delete what the listing explicitly dropped
    fx.synchronizer.sync().await.unwrap();
    let ids = fx.index.list_ids().await.unwrap();
    assert!(ids.contains(&"order-9999".to_string()));
}

/// Fails the first embed_batch call, then behaves normally
struct FlakyEmbedder {
    inner: HashingEmbedder,
    failed_once: AtomicBool,
}

impl FlakyEmbedder {
    fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(32),
            failed_once: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClientError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Embedding("transient backend error".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[tokio::test]
async fn test_batch_failure_is_captured_and_retried() {
    let fx = fixture_with_embedder(Arc::new(FlakyEmbedder::new()), 1);

    let report = fx.synchronizer.sync().await.unwrap();
    assert!(report.is_partial_failure());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.new_vectors, 2);
    assert_eq!(fx.index.len(), 2);

    // The failed batch kept stale fingerprints, so the next pass retries it
    let retry = fx.synchronizer.sync().await.unwrap();
    assert!(!retry.is_partial_failure());
    assert_eq!(retry.new_vectors, 1);
    assert_eq!(fx.index.len(), 3);
}

#[tokio::test]
async fn test_pending_changes_is_read_only() {
    let fx = fixture();

    let pending = fx.synchronizer.pending_changes().await.unwrap();
    assert_eq!(pending.new_orders.len(), 3);
    // Scanning must not touch the index
    assert!(fx.index.is_empty());
}
