//! Strategy routing orchestrator.
//!
//! `route()` is the engine's front door: check the cache, classify the
//! query, pick a retrieval strategy, execute it with threshold relaxation
//! and backend-failure degradation, then filter, sort, and cache the
//! outcome. Callers always get a [`RoutedQueryResult`] with explicit
//! confidence and fallback bookkeeping; the only rejection is
//! [`RouteError::RetrievalUnavailable`] when both backends are down.

mod relaxation;

pub use relaxation::{run_ladder, tier_label, LadderOutcome};

pub use crate::model::Aggregates;

use crate::cache::{CachedResult, ResultCache, QUERY_RESULT_TAG};
use crate::clients::{ClientError, EmbeddingProvider, OrderFilter, RecordStore, VectorIndex};
use crate::filter::{self, FilterCriteria};
use crate::intent::{IntentClassifier, IntentError, IntentType, QueryBreadth, QueryIntent};
use crate::model::OrderSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fallback marker recorded when the record store degraded the strategy
pub const STORE_UNAVAILABLE: &str = "store-unavailable";
/// Fallback marker recorded when the vector backend degraded the strategy
pub const INDEX_UNAVAILABLE: &str = "index-unavailable";
/// Fallback marker recorded when a caller deadline cut execution short
pub const DEADLINE_EXCEEDED: &str = "deadline-exceeded";

#[derive(Error, Debug)]
pub enum RouteError {
    /// Both backends down; the only error surfaced to callers
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Intent classification failed: {0}")]
    Intent(#[from] IntentError),
}

/// Retrieval strategy chosen for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Record store lookup, no embedding call
    Direct,
    /// Vector similarity search
    Vector,
    /// Widened vector recall plus live-store enrichment and aggregation
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Vector => "vector",
            Strategy::Hybrid => "hybrid",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Strategy::Direct),
            "vector" => Some(Strategy::Vector),
            "hybrid" => Some(Strategy::Hybrid),
            _ => None,
        }
    }
}

/// Where the result's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFreshness {
    Cached,
    Live,
    Indexed,
    /// Indexed recall refreshed by live enrichment
    Mixed,
}

/// The single normalized context axis hashed into the cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessPreference {
    #[default]
    Default,
    /// Bypass the cache entirely
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Score,
    DueDate,
    Priority,
}

/// Per-call context. Everything beyond the freshness preference stays out
/// of the cache key.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub freshness: FreshnessPreference,
    pub sort: SortOrder,
    /// Caller-side deadline; aborts the relaxation ladder early
    pub deadline: Option<Duration>,
    /// Clock override for deterministic date resolution in tests
    pub now: Option<DateTime<Utc>>,
}

/// The unit returned to callers. Not persisted; its cacheable subset goes
/// into the result cache.
#[derive(Debug, Clone, Serialize)]
pub struct RoutedQueryResult {
    pub strategy: Strategy,
    pub orders: Vec<OrderSummary>,
    pub confidence: f32,
    pub data_freshness: DataFreshness,
    pub fallbacks_used: Vec<String>,
    pub aggregates: Option<Aggregates>,
    pub processing_time_ms: u64,
}

/// Tunables for routing. Thresholds and tiers are empirically tuned
/// configuration, not protocol; only their monotonic shape is relied on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Descending minimum-similarity tiers, strict to loose
    pub relaxation_thresholds: Vec<f32>,
    pub top_k_narrow: usize,
    pub top_k_medium: usize,
    pub top_k_broad: usize,
    /// Live-fetch ceiling for hybrid enrichment
    pub enrichment_cap: usize,
    pub call_timeout_ms: u64,
    /// TTL for freshness-sensitive (date/urgency) results
    pub fresh_ttl_secs: u64,
    pub general_ttl_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            relaxation_thresholds: vec![0.75, 0.6, 0.45, 0.3],
            top_k_narrow: 5,
            top_k_medium: 15,
            top_k_broad: 50,
            enrichment_cap: 8,
            call_timeout_ms: 5000,
            fresh_ttl_secs: 60,
            general_ttl_secs: 300,
        }
    }
}

/// Tracks the caller deadline across execution steps
struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn exceeded(&self) -> bool {
        self.budget
            .map(|b| self.started.elapsed() >= b)
            .unwrap_or(false)
    }
}

/// Output of one strategy execution before merge/sort/cache
struct Execution {
    summaries: Vec<OrderSummary>,
    freshness: DataFreshness,
    tiers: Vec<String>,
    deadline_hit: bool,
}

impl Execution {
    fn live(summaries: Vec<OrderSummary>) -> Self {
        Self {
            summaries,
            freshness: DataFreshness::Live,
            tiers: Vec::new(),
            deadline_hit: false,
        }
    }
}

/// The orchestrator
pub struct StrategyRouter {
    classifier: IntentClassifier,
    record_store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<ResultCache>,
    config: RoutingConfig,
}

impl StrategyRouter {
    pub fn new(
        classifier: IntentClassifier,
        record_store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<ResultCache>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            classifier,
            record_store,
            embedder,
            index,
            cache,
            config,
        }
    }

    /// Route a query end to end.
    ///
    /// Note on concurrency: two concurrent calls for the same key may both
    /// miss the cache and retrieve redundantly. At-most-one-build-per-key
    /// would need an in-flight request map; not provided here.
    pub async fn route(
        &self,
        query: &str,
        ctx: &QueryContext,
    ) -> Result<RoutedQueryResult, RouteError> {
        let started = Instant::now();
        let key = self.cache_key(query, ctx.freshness);

        if ctx.freshness != FreshnessPreference::Fresh {
            if let Some(hit) = self.cache.get(&key) {
                tracing::debug!("Cache hit for query {:?}", query);
                return Ok(RoutedQueryResult {
                    strategy: Strategy::parse(&hit.strategy).unwrap_or(Strategy::Direct),
                    orders: hit.orders,
                    confidence: hit.confidence,
                    data_freshness: DataFreshness::Cached,
                    fallbacks_used: Vec::new(),
                    aggregates: hit.aggregates,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        let now = ctx.now.unwrap_or_else(Utc::now);
        let intent = self.classifier.classify(query, now)?;
        let criteria = FilterCriteria::from_entities(&intent.entities);
        let strategy = Self::select_strategy(&intent);
        let deadline = Deadline {
            started,
            budget: ctx.deadline,
        };

        tracing::debug!(
            "Routing {:?} via {:?} (breadth {:?})",
            query,
            strategy,
            intent.breadth
        );

        let mut fallbacks: Vec<String> = Vec::new();
        let execution = self
            .execute_with_degradation(strategy, query, &intent, &criteria, &deadline, &mut fallbacks)
            .await?;

        fallbacks.extend(execution.tiers.iter().cloned());
        if execution.deadline_hit {
            fallbacks.push(DEADLINE_EXCEEDED.to_string());
        }

        let mut orders = dedupe_by_job(execution.summaries);
        sort_orders(&mut orders, ctx.sort);

        let aggregates = if intent.intent_type == IntentType::Calculation {
            Some(aggregate(&orders))
        } else {
            None
        };

        let mut confidence = if orders.is_empty() {
            // Relaxation exhausted: an explicit empty result
            0.0
        } else {
            intent.confidence
        };
        if execution.deadline_hit {
            confidence *= 0.5;
        }

        // Deadline-aborted executions are incomplete; never cache them
        if !execution.deadline_hit {
            let ttl = if intent.is_freshness_sensitive() {
                Duration::from_secs(self.config.fresh_ttl_secs)
            } else {
                Duration::from_secs(self.config.general_ttl_secs)
            };
            self.cache.set(
                key,
                CachedResult {
                    strategy: strategy.as_str().to_string(),
                    orders: orders.clone(),
                    confidence,
                    aggregates: aggregates.clone(),
                },
                ttl,
                vec![QUERY_RESULT_TAG.to_string(), strategy.as_str().to_string()],
            );
        }

        Ok(RoutedQueryResult {
            strategy,
            orders,
            confidence,
            data_freshness: execution.freshness,
            fallbacks_used: fallbacks,
            aggregates,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Normalized query + freshness axis, hashed. Free-form context never
    /// enters the key.
    fn cache_key(&self, query: &str, freshness: FreshnessPreference) -> String {
        let normalized = normalize_query(query);
        let axis = match freshness {
            FreshnessPreference::Default => "default",
            FreshnessPreference::Fresh => "fresh",
        };
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized.as_bytes());
        hasher.update(&[0]);
        hasher.update(axis.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    fn select_strategy(intent: &QueryIntent) -> Strategy {
        if intent.intent_type == IntentType::Calculation || intent.combines_tags_and_dates() {
            return Strategy::Hybrid;
        }
        match intent.intent_type {
            IntentType::ExactData => Strategy::Direct,
            _ => Strategy::Vector,
        }
    }

    /// Recall breadth scales with classified query breadth, monotonically
    fn top_k(&self, breadth: QueryBreadth) -> usize {
        match breadth {
            QueryBreadth::Narrow => self.config.top_k_narrow,
            QueryBreadth::Medium => self.config.top_k_medium,
            QueryBreadth::Broad => self.config.top_k_broad,
        }
    }

    async fn execute_with_degradation(
        &self,
        strategy: Strategy,
        query: &str,
        intent: &QueryIntent,
        criteria: &FilterCriteria,
        deadline: &Deadline,
        fallbacks: &mut Vec<String>,
    ) -> Result<Execution, RouteError> {
        match strategy {
            Strategy::Direct => match self.execute_direct(intent, criteria).await {
                Ok(execution) => Ok(execution),
                Err(store_err) => {
                    tracing::warn!("Record store failed, degrading to vector: {}", store_err);
                    fallbacks.push(STORE_UNAVAILABLE.to_string());
                    self.execute_vector(query, intent, criteria, deadline, false)
                        .await
                        .map_err(|index_err| {
                            RouteError::RetrievalUnavailable(format!(
                                "record store: {}; vector index: {}",
                                store_err, index_err
                            ))
                        })
                }
            },
            Strategy::Vector | Strategy::Hybrid => {
                let enrich = strategy == Strategy::Hybrid;
                match self
                    .execute_vector(query, intent, criteria, deadline, enrich)
                    .await
                {
                    Ok(execution) => Ok(execution),
                    Err(index_err) => {
                        tracing::warn!("Vector backend failed, degrading to direct: {}", index_err);
                        fallbacks.push(INDEX_UNAVAILABLE.to_string());
                        // Widened listing: drop entity constraints down to
                        // the date range and filter locally
                        self.execute_direct(intent, criteria).await.map_err(|store_err| {
                            RouteError::RetrievalUnavailable(format!(
                                "vector index: {}; record store: {}",
                                index_err, store_err
                            ))
                        })
                    }
                }
            }
        }
    }

    async fn execute_direct(
        &self,
        intent: &QueryIntent,
        criteria: &FilterCriteria,
    ) -> Result<Execution, ClientError> {
        if !intent.entities.job_numbers.is_empty() {
            let mut summaries = Vec::new();
            for job_number in &intent.entities.job_numbers {
                match self
                    .with_timeout(self.record_store.get_order(job_number))
                    .await
                {
                    Ok(order) => summaries.push(OrderSummary::from_order(&order)),
                    Err(ClientError::NotFound(_)) => {
                        tracing::debug!("Job {} not found", job_number);
                    }
                    Err(e) => return Err(e),
                }
            }
            return Ok(Execution::live(summaries));
        }

        let mut list_filter = OrderFilter::default();
        if let Some(range) = intent.entities.date_ranges.first() {
            list_filter.due_date_range = Some((range.start, range.end));
        }
        if let Some(customer) = intent.entities.customer_names.first() {
            list_filter.text_filter = Some(customer.clone());
        }

        let orders = self
            .with_timeout(self.record_store.list_orders(&list_filter))
            .await?;
        let filtered = filter::apply(orders, criteria);
        Ok(Execution::live(
            filtered.iter().map(OrderSummary::from_order).collect(),
        ))
    }

    async fn execute_vector(
        &self,
        query: &str,
        intent: &QueryIntent,
        criteria: &FilterCriteria,
        deadline: &Deadline,
        enrich: bool,
    ) -> Result<Execution, ClientError> {
        let vector = self.with_timeout(self.embedder.embed(query)).await?;

        // Hybrid recall is widened before exact filtering narrows it back
        let top_k = if enrich {
            self.config.top_k_broad
        } else {
            self.top_k(intent.breadth)
        };
        let matches = self
            .with_timeout(self.index.query(&vector, top_k))
            .await?;

        let outcome = run_ladder(
            &matches,
            &self.config.relaxation_thresholds,
            criteria,
            || deadline.exceeded(),
        );

        let mut freshness = DataFreshness::Indexed;
        let mut summaries: Vec<OrderSummary> = Vec::with_capacity(outcome.matches.len());

        if enrich && !outcome.matches.is_empty() && outcome.matches.len() <= self.config.enrichment_cap
        {
            // Refresh volatile fields with live fetches, hard-capped so a
            // wide result set cannot fan out into unbounded calls
            for m in outcome.matches.iter().take(self.config.enrichment_cap) {
                let job_number = m.id.strip_prefix("order-").unwrap_or(&m.id);
                match self
                    .with_timeout(self.record_store.get_order(job_number))
                    .await
                {
                    Ok(order) => {
                        let mut summary = OrderSummary::from_order(&order);
                        summary.score = Some(m.score);
                        summaries.push(summary);
                        freshness = DataFreshness::Mixed;
                    }
                    Err(e) => {
                        tracing::debug!("Enrichment fetch for {} failed: {}", m.id, e);
                        summaries.push(OrderSummary::from_metadata(&m.metadata, m.score));
                    }
                }
            }
        } else {
            summaries.extend(
                outcome
                    .matches
                    .iter()
                    .map(|m| OrderSummary::from_metadata(&m.metadata, m.score)),
            );
        }

        Ok(Execution {
            summaries,
            freshness,
            tiers: outcome.tiers_attempted,
            deadline_hit: outcome.deadline_hit,
        })
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let budget = Duration::from_millis(self.config.call_timeout_ms);
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.config.call_timeout_ms)),
        }
    }
}

/// Lowercase, whitespace-collapsed form used for cache keying
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedupe_by_job(summaries: Vec<OrderSummary>) -> Vec<OrderSummary> {
    let mut seen = ahash::AHashSet::new();
    summaries
        .into_iter()
        .filter(|s| seen.insert(s.job_number.clone()))
        .collect()
}

fn sort_orders(orders: &mut [OrderSummary], sort: SortOrder) {
    match sort {
        SortOrder::Score => orders.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortOrder::DueDate => orders.sort_by_key(|o| o.due_date),
        SortOrder::Priority => orders.sort_by_key(|o| (!o.rush, o.due_date)),
    }
}

fn aggregate(orders: &[OrderSummary]) -> Aggregates {
    Aggregates {
        order_count: orders.len(),
        total_value: orders.iter().filter_map(|o| o.total).sum(),
        rush_count: orders.iter().filter(|o| o.rush).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::QueryEntities;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  What's  DUE   today "), "what's due today");
    }

    #[test]
    fn test_strategy_parse_round_trip() {
        for strategy in [Strategy::Direct, Strategy::Vector, Strategy::Hybrid] {
            assert_eq!(Strategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(Strategy::parse("bogus"), None);
    }

    #[test]
    fn test_select_strategy_mapping() {
        let intent = |t: IntentType, entities: QueryEntities| QueryIntent {
            intent_type: t,
            entities,
            breadth: QueryBreadth::Medium,
            confidence: 0.8,
            missing_entities: vec![],
        };

        assert_eq!(
            StrategyRouter::select_strategy(&intent(IntentType::ExactData, QueryEntities::default())),
            Strategy::Direct
        );
        assert_eq!(
            StrategyRouter::select_strategy(&intent(
                IntentType::SemanticSearch,
                QueryEntities::default()
            )),
            Strategy::Vector
        );
        assert_eq!(
            StrategyRouter::select_strategy(&intent(
                IntentType::Calculation,
                QueryEntities::default()
            )),
            Strategy::Hybrid
        );

        // Tags combined with dates force hybrid regardless of type
        let entities = QueryEntities {
            tags: vec!["laser".to_string()],
            date_ranges: vec![crate::intent::DateRange {
                start: Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 3, 17, 23, 59, 59).unwrap(),
                label: "this week".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(
            StrategyRouter::select_strategy(&intent(IntentType::ExactData, entities)),
            Strategy::Hybrid
        );
    }

    #[test]
    fn test_sort_priority_puts_rush_first() {
        let mut orders = vec![
            OrderSummary {
                job_number: "1".to_string(),
                customer_name: String::new(),
                master_status: String::new(),
                due_date: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
                description: String::new(),
                tags: vec![],
                rush: false,
                total: None,
                score: None,
            },
            OrderSummary {
                job_number: "2".to_string(),
                customer_name: String::new(),
                master_status: String::new(),
                due_date: Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap(),
                description: String::new(),
                tags: vec![],
                rush: true,
                total: None,
                score: None,
            },
        ];
        sort_orders(&mut orders, SortOrder::Priority);
        assert_eq!(orders[0].job_number, "2");
    }

    #[test]
    fn test_aggregate_counts() {
        let orders = vec![
            OrderSummary {
                job_number: "1".to_string(),
                customer_name: String::new(),
                master_status: String::new(),
                due_date: Utc::now(),
                description: String::new(),
                tags: vec![],
                rush: true,
                total: Some(100.0),
                score: None,
            },
            OrderSummary {
                job_number: "2".to_string(),
                customer_name: String::new(),
                master_status: String::new(),
                due_date: Utc::now(),
                description: String::new(),
                tags: vec![],
                rush: false,
                total: None,
                score: None,
            },
        ];
        let agg = aggregate(&orders);
        assert_eq!(agg.order_count, 2);
        assert_eq!(agg.total_value, 100.0);
        assert_eq!(agg.rush_count, 1);
    }
}
