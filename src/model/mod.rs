//! Core data model: orders as fetched from the record store, plus the
//! derived records the engine maintains (fingerprints, change sets, vector
//! records).
//!
//! Orders are immutable snapshots per fetch; the engine never mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Customer reference on an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
}

/// A tag applied to an order (raw text plus provenance)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub raw: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl Tag {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            author: None,
            applied_at: None,
        }
    }
}

/// A line item on an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: f64,
}

/// A shipment attached to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
}

/// An order snapshot as fetched from the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Job number, the order identifier
    pub job_number: String,
    pub customer: Customer,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: Option<String>,
    pub master_status: String,
    #[serde(default)]
    pub stock_status: Option<String>,
    pub entered_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub due_factory_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub days_to_due: Option<i64>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub shipments: Vec<Shipment>,
    /// Rush/priority flag used by priority sorting
    #[serde(default)]
    pub rush: bool,
}

impl Order {
    /// Vector index record id for this order
    pub fn vector_id(&self) -> String {
        format!("order-{}", self.job_number)
    }

    /// Text fed to the embedding provider. Concatenates the fields a
    /// semantic query is likely to reference.
    pub fn embedding_text(&self) -> String {
        let tags: Vec<&str> = self.tags.iter().map(|t| t.raw.as_str()).collect();
        format!(
            "Job {} for {}. Status: {}. Due {}. {} Tags: {}",
            self.job_number,
            self.customer.name,
            self.master_status,
            self.due_date.format("%Y-%m-%d"),
            self.description,
            tags.join(", ")
        )
    }
}

/// Content fingerprint for change detection without re-embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFingerprint {
    pub order_id: String,
    pub content_hash: String,
    pub last_seen_at: DateTime<Utc>,
}

/// Partition of a full order listing against the known fingerprint set.
/// Every order id appears in exactly one bucket.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub new_orders: Vec<Order>,
    pub updated_orders: Vec<Order>,
    pub unchanged_orders: Vec<Order>,
    pub deleted_order_ids: Vec<String>,
}

impl ChangeSet {
    /// True when nothing changed upstream since the last pass
    pub fn is_noop(&self) -> bool {
        self.new_orders.is_empty()
            && self.updated_orders.is_empty()
            && self.deleted_order_ids.is_empty()
    }
}

/// Denormalized projection of an order stored alongside its vector,
/// bounded so the index entry stays small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub job_number: String,
    pub customer_name: String,
    pub master_status: String,
    pub due_date: DateTime<Utc>,
    /// Description truncated to `DESCRIPTION_LIMIT` characters
    pub description: String,
    pub tags: Vec<String>,
    pub rush: bool,
}

/// Truncation bound for metadata descriptions
pub const DESCRIPTION_LIMIT: usize = 200;

impl VectorMetadata {
    pub fn from_order(order: &Order) -> Self {
        let mut description = order.description.clone();
        if description.len() > DESCRIPTION_LIMIT {
            let cut = description
                .char_indices()
                .take_while(|(i, _)| *i < DESCRIPTION_LIMIT)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            description.truncate(cut);
        }
        Self {
            job_number: order.job_number.clone(),
            customer_name: order.customer.name.clone(),
            master_status: order.master_status.clone(),
            due_date: order.due_date,
            description,
            tags: order.tags.iter().map(|t| t.raw.clone()).collect(),
            rush: order.rush,
        }
    }
}

/// One record in the vector index: one per live order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// "order-<jobNumber>"
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A scored hit returned by the vector index
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub id: String,
    /// Cosine similarity, higher is more similar
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Display projection of an order returned to callers. Built either from
/// a live order fetch or from indexed vector metadata, so volatile fields
/// like `total` are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub job_number: String,
    pub customer_name: String,
    pub master_status: String,
    pub due_date: DateTime<Utc>,
    pub description: String,
    pub tags: Vec<String>,
    pub rush: bool,
    #[serde(default)]
    pub total: Option<f64>,
    /// Similarity score when the order came out of the vector index
    #[serde(default)]
    pub score: Option<f32>,
}

impl OrderSummary {
    pub fn from_order(order: &Order) -> Self {
        Self {
            job_number: order.job_number.clone(),
            customer_name: order.customer.name.clone(),
            master_status: order.master_status.clone(),
            due_date: order.due_date,
            description: order.description.clone(),
            tags: order.tags.iter().map(|t| t.raw.clone()).collect(),
            rush: order.rush,
            total: Some(order.total),
            score: None,
        }
    }

    pub fn from_metadata(metadata: &VectorMetadata, score: f32) -> Self {
        Self {
            job_number: metadata.job_number.clone(),
            customer_name: metadata.customer_name.clone(),
            master_status: metadata.master_status.clone(),
            due_date: metadata.due_date,
            description: metadata.description.clone(),
            tags: metadata.tags.clone(),
            rush: metadata.rush,
            total: None,
            score: Some(score),
        }
    }
}

/// Aggregates computed over a result set for calculation queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub order_count: usize,
    /// Sum over orders whose monetary total is known
    pub total_value: f64,
    pub rush_count: usize,
}
