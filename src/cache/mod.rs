//! Tagged, TTL-based cache for routed query results.
//!
//! Entries expire by exact TTL and are evicted lazily on access plus
//! periodically by a sweep task. Tag invalidation removes every entry
//! carrying the tag in one pass; the synchronizer uses it to flush
//! `query-result` entries after an index rebuild.

use crate::model::{Aggregates, OrderSummary};
use ahash::AHashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache tag carried by every routed query result entry
pub const QUERY_RESULT_TAG: &str = "query-result";

/// The cacheable subset of a routed query result
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub strategy: String,
    pub orders: Vec<OrderSummary>,
    pub confidence: f32,
    /// Present when the entry holds a calculation result
    pub aggregates: Option<Aggregates>,
}

#[derive(Debug)]
struct CacheEntry {
    value: CachedResult,
    created_at: Instant,
    ttl: Duration,
    tags: Vec<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// In-memory result cache. Constructor-injected; no process-wide state.
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<AHashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch an entry. Never returns a value past its TTL; expired
    /// entries are evicted on the spot.
    pub fn get(&self, key: &str) -> Option<CachedResult> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: CachedResult, ttl: Duration, tags: Vec<String>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
                tags,
            },
        );
    }

    /// Remove every entry carrying the tag. Returns the removal count.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("Invalidated {} cache entries tagged {:?}", removed, tag);
        }
        removed
    }

    /// Evict all expired entries. Returns the eviction count.
    pub fn invalidate_stale(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Spawn a background sweep that evicts stale entries on an interval
pub fn spawn_sweeper(
    cache: std::sync::Arc<ResultCache>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let evicted = cache.invalidate_stale();
            if evicted > 0 {
                tracing::debug!("Cache sweep evicted {} stale entries", evicted);
            }
        }
    })
}
