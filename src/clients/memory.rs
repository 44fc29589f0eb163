//! In-memory collaborator implementations.
//!
//! `InMemoryRecordStore` backs the CLI's JSON order book and the test
//! suites; `InMemoryVectorIndex` is a brute-force cosine index that
//! supports the full upsert/delete/query/list contract.

use super::{ClientError, EmbeddingProvider, OrderFilter, RecordStore, VectorIndex};
use crate::model::{Order, ScoredMatch, VectorRecord};
use ahash::AHashMap;
use async_trait::async_trait;
use std::sync::Mutex;

/// Record store backed by a process-local order map
#[derive(Default)]
pub struct InMemoryRecordStore {
    orders: Mutex<AHashMap<String, Order>>,
}

impl InMemoryRecordStore {
    pub fn new(orders: Vec<Order>) -> Self {
        let map = orders
            .into_iter()
            .map(|o| (o.job_number.clone(), o))
            .collect();
        Self {
            orders: Mutex::new(map),
        }
    }

    /// Replace the full order set (used by tests to simulate upstream churn)
    pub fn replace_all(&self, orders: Vec<Order>) {
        let mut map = self.orders.lock().unwrap();
        map.clear();
        for order in orders {
            map.insert(order.job_number.clone(), order);
        }
    }

    pub fn insert(&self, order: Order) {
        self.orders
            .lock()
            .unwrap()
            .insert(order.job_number.clone(), order);
    }

    pub fn remove(&self, job_number: &str) {
        self.orders.lock().unwrap().remove(job_number);
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ClientError> {
        let orders = self.orders.lock().unwrap();
        let mut result: Vec<Order> = orders
            .values()
            .filter(|o| {
                if let Some(status) = &filter.status {
                    if !o.master_status.eq_ignore_ascii_case(status) {
                        return false;
                    }
                }
                if let Some((start, end)) = &filter.due_date_range {
                    if o.due_date < *start || o.due_date > *end {
                        return false;
                    }
                }
                if let Some(text) = &filter.text_filter {
                    let needle = text.to_lowercase();
                    let hay = format!(
                        "{} {} {}",
                        o.job_number,
                        o.customer.name.to_lowercase(),
                        o.description.to_lowercase()
                    );
                    if !hay.contains(&needle) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| a.job_number.cmp(&b.job_number));
        Ok(result)
    }

    async fn get_order(&self, job_number: &str) -> Result<Order, ClientError> {
        self.orders
            .lock()
            .unwrap()
            .get(job_number)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(job_number.to_string()))
    }
}

/// Brute-force cosine similarity index.
///
/// Linear scan per query; adequate for order books in the thousands and
/// exact rather than approximate, which keeps the relaxation ladder tests
/// deterministic.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: Mutex<AHashMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), ClientError> {
        let mut map = self.records.lock().unwrap();
        for record in records {
            map.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), ClientError> {
        let mut map = self.records.lock().unwrap();
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>, ClientError> {
        let map = self.records.lock().unwrap();
        let mut matches: Vec<ScoredMatch> = map
            .values()
            .map(|r| ScoredMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.embedding),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn list_ids(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.records.lock().unwrap().keys().cloned().collect())
    }
}

/// Deterministic embedding provider for tests and offline smoke runs.
///
/// Hashes character trigrams into a fixed-size vector; similar strings
/// land near each other, identical strings embed identically.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        for window in chars.windows(3) {
            let mut hasher = blake3::Hasher::new();
            let trigram: String = window.iter().collect();
            hasher.update(trigram.as_bytes());
            let digest = hasher.finalize();
            let bucket = u32::from_le_bytes(digest.as_bytes()[..4].try_into().unwrap()) as usize
                % self.dimension;
            vector[bucket] += 1.0;
        }
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        if text.is_empty() {
            return Err(ClientError::InvalidInput("Empty text".to_string()));
        }
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClientError> {
        texts
            .iter()
            .map(|t| {
                if t.is_empty() {
                    Err(ClientError::InvalidInput("Empty text".to_string()))
                } else {
                    Ok(self.embed_sync(t))
                }
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
