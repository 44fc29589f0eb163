//! Similarity-threshold relaxation.
//!
//! Vector matches are evaluated against a descending sequence of minimum
//! score thresholds. Each tier filters by score and then by entity
//! predicates; the first tier producing a non-empty set wins. Because the
//! tiers only relax the score cut, a stricter tier's result is always a
//! subset of the next looser tier's candidate set.

use crate::filter::{metadata_passes, FilterCriteria};
use crate::model::ScoredMatch;

/// Result of walking the ladder
#[derive(Debug, Clone, Default)]
pub struct LadderOutcome {
    pub matches: Vec<ScoredMatch>,
    /// Every tier attempted, strictest first
    pub tiers_attempted: Vec<String>,
    /// Set when a caller deadline cut the walk short
    pub deadline_hit: bool,
}

pub fn tier_label(threshold: f32) -> String {
    format!("score>={:.2}", threshold)
}

/// Walk the thresholds from strict to loose, stopping at the first tier
/// that yields a non-empty, filter-satisfying set. `out_of_time` is
/// polled between tiers so a caller deadline aborts the walk early.
pub fn run_ladder(
    matches: &[ScoredMatch],
    thresholds: &[f32],
    criteria: &FilterCriteria,
    mut out_of_time: impl FnMut() -> bool,
) -> LadderOutcome {
    let mut outcome = LadderOutcome::default();

    for threshold in thresholds {
        if out_of_time() {
            outcome.deadline_hit = true;
            tracing::debug!("Relaxation ladder aborted by deadline at {}", tier_label(*threshold));
            return outcome;
        }
        outcome.tiers_attempted.push(tier_label(*threshold));

        let survivors: Vec<ScoredMatch> = matches
            .iter()
            .filter(|m| m.score >= *threshold && metadata_passes(&m.metadata, criteria))
            .cloned()
            .collect();

        if !survivors.is_empty() {
            outcome.matches = survivors;
            return outcome;
        }
    }

    // Loosest tier still empty: explicit empty result, never an unrelated one
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Customer, Order, Tag, VectorMetadata};
    use chrono::{TimeZone, Utc};

    const THRESHOLDS: [f32; 4] = [0.75, 0.6, 0.45, 0.3];

    fn scored(id: &str, score: f32, tags: &[&str]) -> ScoredMatch {
        let order = Order {
            job_number: id.to_string(),
            customer: Customer {
                id: "C1".to_string(),
                name: "Test Co".to_string(),
            },
            description: String::new(),
            comments: None,
            master_status: "Approved".to_string(),
            stock_status: None,
            entered_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            due_date: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            due_factory_date: None,
            days_to_due: None,
            total: 0.0,
            tags: tags.iter().map(|t| Tag::new(*t)).collect(),
            line_items: vec![],
            shipments: vec![],
            rush: false,
        };
        ScoredMatch {
            id: format!("order-{}", id),
            score,
            metadata: VectorMetadata::from_order(&order),
        }
    }

    #[test]
    fn test_strict_tier_wins_when_populated() {
        let matches = vec![scored("1", 0.9, &[]), scored("2", 0.5, &[])];
        let outcome = run_ladder(&matches, &THRESHOLDS, &FilterCriteria::default(), || false);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].id, "order-1");
        assert_eq!(outcome.tiers_attempted, vec!["score>=0.75"]);
    }

    #[test]
    fn test_falls_through_to_loosest_tier() {
        // Nothing above 0.45; two matches at the loosest tier
        let matches = vec![scored("1", 0.35, &[]), scored("2", 0.32, &[])];
        let outcome = run_ladder(&matches, &THRESHOLDS, &FilterCriteria::default(), || false);

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(
            outcome.tiers_attempted,
            vec!["score>=0.75", "score>=0.60", "score>=0.45", "score>=0.30"]
        );
    }

    #[test]
    fn test_exhausted_ladder_is_empty() {
        let matches = vec![scored("1", 0.1, &[])];
        let outcome = run_ladder(&matches, &THRESHOLDS, &FilterCriteria::default(), || false);

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.tiers_attempted.len(), 4);
    }

    #[test]
    fn test_monotonic_subset_property() {
        let matches = vec![
            scored("1", 0.9, &[]),
            scored("2", 0.7, &[]),
            scored("3", 0.5, &[]),
        ];
        for window in THRESHOLDS.windows(2) {
            let strict: Vec<String> = matches
                .iter()
                .filter(|m| m.score >= window[0])
                .map(|m| m.id.clone())
                .collect();
            let loose: Vec<String> = matches
                .iter()
                .filter(|m| m.score >= window[1])
                .map(|m| m.id.clone())
                .collect();
            assert!(strict.iter().all(|id| loose.contains(id)));
        }
    }

    #[test]
    fn test_filter_applies_within_tier() {
        // High-score match fails the tag filter; lower tier has a tagged one
        let matches = vec![scored("1", 0.9, &["vinyl"]), scored("2", 0.5, &["@laser"])];
        let criteria = FilterCriteria {
            tags: vec!["laser".to_string()],
            ..Default::default()
        };
        let outcome = run_ladder(&matches, &THRESHOLDS, &criteria, || false);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].id, "order-2");
        assert!(outcome.tiers_attempted.len() > 1);
    }

    #[test]
    fn test_deadline_aborts_walk() {
        let matches = vec![scored("1", 0.1, &[])];
        let mut calls = 0;
        let outcome = run_ladder(&matches, &THRESHOLDS, &FilterCriteria::default(), || {
            calls += 1;
            calls > 2
        });

        assert!(outcome.deadline_hit);
        assert!(outcome.tiers_attempted.len() < 4);
    }
}
