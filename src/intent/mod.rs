//! Query intent classification.
//!
//! Turns free text into a structured [`QueryIntent`]: an intent type, the
//! entities the query references (tags, date ranges, job numbers, customer
//! names), a breadth classification for dynamic recall sizing, and a
//! confidence score. Extraction is pluggable behind [`IntentExtractor`] so
//! a model-backed extractor can replace the rule-based one without
//! touching the router.

mod dates;
mod extractor;

pub use dates::{resolve_date_phrase, DateRange, DateResolution};
pub use extractor::{IntentExtractor, RuleBasedExtractor};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntentError {
    #[error("Extraction failed: {0}")]
    Extraction(String),
}

/// What kind of retrieval the query calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// Direct record-store lookup, no embedding call
    ExactData,
    /// Vector similarity search
    SemanticSearch,
    /// Aggregation over a widened recall set
    Calculation,
}

/// How wide the query casts its net; drives the dynamic topK tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryBreadth {
    /// A specific entity: job number or a single customer
    Narrow,
    /// Urgency, date, or material scoped
    Medium,
    /// "all orders", "every order"
    Broad,
}

/// Entities extracted from the query text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryEntities {
    pub tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub date_ranges: Vec<DateRange>,
    pub job_numbers: Vec<String>,
    pub customer_names: Vec<String>,
}

/// Structured intent derived from free text. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIntent {
    pub intent_type: IntentType,
    pub entities: QueryEntities,
    pub breadth: QueryBreadth,
    pub confidence: f32,
    /// Entities the query referenced but extraction could not resolve
    /// (e.g. an ambiguous date phrase). Lowers confidence, never guessed.
    pub missing_entities: Vec<String>,
}

impl QueryIntent {
    /// True when the query combines tags with a date range, which forces
    /// the hybrid strategy.
    pub fn combines_tags_and_dates(&self) -> bool {
        !self.entities.tags.is_empty() && !self.entities.date_ranges.is_empty()
    }

    /// Freshness-sensitive queries get a shorter cache TTL. Urgency
    /// queries classify as exact-data, so both axes are covered.
    pub fn is_freshness_sensitive(&self) -> bool {
        self.intent_type == IntentType::ExactData || !self.entities.date_ranges.is_empty()
    }
}

/// Classifier facade over a pluggable extractor
pub struct IntentClassifier {
    extractor: Arc<dyn IntentExtractor>,
}

impl IntentClassifier {
    pub fn new(extractor: Arc<dyn IntentExtractor>) -> Self {
        Self { extractor }
    }

    /// Rule-based classifier, the deterministic default
    pub fn rule_based() -> Self {
        Self::new(Arc::new(RuleBasedExtractor::new()))
    }

    /// Classify a query relative to `now` (the caller's clock)
    pub fn classify(&self, query: &str, now: DateTime<Utc>) -> Result<QueryIntent, IntentError> {
        let intent = self.extractor.extract(query, now)?;
        tracing::debug!(
            "Classified query as {:?} ({:?}, confidence {:.2})",
            intent.intent_type,
            intent.breadth,
            intent.confidence
        );
        Ok(intent)
    }
}
