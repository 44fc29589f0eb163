//! Order change detection via content fingerprints.
//!
//! The content hash covers a stable subset of fields (status, description,
//! due date, tag set) so volatile upstream churn does not force
//! re-embedding. Tags are hashed as a sorted, lowercased set: two orders
//! with the same tags in different array order hash identically.

use crate::model::{ChangeSet, Order, OrderFingerprint};
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};

/// Stable content hash over the embed-relevant subset of an order
pub fn content_hash(order: &Order) -> String {
    let mut tags: Vec<String> = order.tags.iter().map(|t| t.raw.to_lowercase()).collect();
    tags.sort();
    tags.dedup();

    let mut hasher = blake3::Hasher::new();
    for field in [
        order.master_status.as_str(),
        order.stock_status.as_deref().unwrap_or(""),
        order.description.as_str(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(order.due_date.to_rfc3339().as_bytes());
    hasher.update(&[0]);
    for tag in &tags {
        hasher.update(tag.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Build the fingerprint for an order as of `seen_at`
pub fn fingerprint(order: &Order, seen_at: DateTime<Utc>) -> OrderFingerprint {
    OrderFingerprint {
        order_id: order.job_number.clone(),
        content_hash: content_hash(order),
        last_seen_at: seen_at,
    }
}

/// Partition a current full listing against the known fingerprints.
///
/// Pure given its inputs: every order id lands in exactly one of the four
/// buckets, and ids present only in `known` come back as deleted.
pub fn diff(current: &[Order], known: &[OrderFingerprint]) -> ChangeSet {
    let known_by_id: AHashMap<&str, &OrderFingerprint> = known
        .iter()
        .map(|fp| (fp.order_id.as_str(), fp))
        .collect();

    let mut changes = ChangeSet::default();
    let mut seen: AHashSet<&str> = AHashSet::with_capacity(current.len());

    for order in current {
        seen.insert(order.job_number.as_str());
        match known_by_id.get(order.job_number.as_str()) {
            None => changes.new_orders.push(order.clone()),
            Some(fp) if fp.content_hash != content_hash(order) => {
                changes.updated_orders.push(order.clone())
            }
            Some(_) => changes.unchanged_orders.push(order.clone()),
        }
    }

    changes.deleted_order_ids = known
        .iter()
        .filter(|fp| !seen.contains(&fp.order_id.as_str()))
        .map(|fp| fp.order_id.clone())
        .collect();

    changes
}
