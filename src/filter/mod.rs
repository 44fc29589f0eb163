//! Tag and date predicate filtering over candidate order sets.
//!
//! Tag matching is deliberately loose: shop-floor tags are typed by hand
//! ("@laser", "Laser", "laser-cut", "laser cut") so a requested tag is
//! expanded into normalized variants and compared against every stored
//! tag's variants, with substring containment in both directions.
//!
//! Predicates are applied date-range first, then include-tags (OR), then
//! exclude-tags; the net effect is the same regardless of evaluation
//! order since each predicate only removes orders.

use crate::intent::{DateRange, QueryEntities};
use crate::model::{Order, VectorMetadata};
use chrono::{DateTime, Utc};

/// Filter criteria extracted from a query
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub date_ranges: Vec<DateRange>,
}

impl FilterCriteria {
    pub fn from_entities(entities: &QueryEntities) -> Self {
        Self {
            tags: entities.tags.clone(),
            exclude_tags: entities.exclude_tags.clone(),
            date_ranges: entities.date_ranges.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.exclude_tags.is_empty() && self.date_ranges.is_empty()
    }
}

/// Normalized variants of a tag, all lowercased: the tag itself, the
/// @-toggled form, the alphanumeric-only form, and space-to-hyphen /
/// space-removed forms.
pub fn tag_variants(tag: &str) -> Vec<String> {
    let lowered = tag.trim().to_lowercase();
    let mut variants = vec![lowered.clone()];

    let toggled = if let Some(stripped) = lowered.strip_prefix('@') {
        stripped.to_string()
    } else {
        format!("@{}", lowered)
    };
    variants.push(toggled);

    let alphanumeric: String = lowered.chars().filter(|c| c.is_alphanumeric()).collect();
    variants.push(alphanumeric);

    if lowered.contains(' ') {
        variants.push(lowered.replace(' ', "-"));
        variants.push(lowered.replace(' ', ""));
    }

    variants.retain(|v| !v.is_empty());
    variants.dedup();
    variants
}

/// True if the requested tag matches the stored tag under any variant
/// pairing, including substring containment in either direction.
pub fn tag_matches(requested: &str, stored: &str) -> bool {
    let requested_variants = tag_variants(requested);
    let stored_variants = tag_variants(stored);
    for rv in &requested_variants {
        for sv in &stored_variants {
            if rv == sv || rv.contains(sv.as_str()) || sv.contains(rv.as_str()) {
                return true;
            }
        }
    }
    false
}

fn passes(due_date: DateTime<Utc>, tags: &[String], criteria: &FilterCriteria) -> bool {
    if !criteria.date_ranges.is_empty()
        && !criteria.date_ranges.iter().any(|r| r.contains(due_date))
    {
        return false;
    }
    if !criteria.tags.is_empty()
        && !criteria
            .tags
            .iter()
            .any(|req| tags.iter().any(|t| tag_matches(req, t)))
    {
        return false;
    }
    if criteria
        .exclude_tags
        .iter()
        .any(|req| tags.iter().any(|t| tag_matches(req, t)))
    {
        return false;
    }
    true
}

/// Apply the criteria to a candidate set. Returns the orders that pass
/// every predicate.
pub fn apply(orders: Vec<Order>, criteria: &FilterCriteria) -> Vec<Order> {
    if criteria.is_empty() {
        return orders;
    }
    orders
        .into_iter()
        .filter(|order| {
            let tags: Vec<String> = order.tags.iter().map(|t| t.raw.clone()).collect();
            passes(order.due_date, &tags, criteria)
        })
        .collect()
}

/// Predicate form over indexed vector metadata, used by the relaxation
/// ladder before any live fetch happens.
pub fn metadata_passes(metadata: &VectorMetadata, criteria: &FilterCriteria) -> bool {
    passes(metadata.due_date, &metadata.tags, criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Customer, Tag};
    use chrono::{TimeZone, Utc};

    fn order(job: &str, tags: &[&str]) -> Order {
        Order {
            job_number: job.to_string(),
            customer: Customer {
                id: "C1".to_string(),
                name: "Test Co".to_string(),
            },
            description: String::new(),
            comments: None,
            master_status: "Approved".to_string(),
            stock_status: None,
            entered_date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            due_date: Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap(),
            due_factory_date: None,
            days_to_due: None,
            total: 0.0,
            tags: tags.iter().map(|t| Tag::new(*t)).collect(),
            line_items: vec![],
            shipments: vec![],
            rush: false,
        }
    }

    #[test]
    fn test_variant_symmetry() {
        // If stored "@laser" matches request "laser", the reverse holds too
        assert!(tag_matches("laser", "@laser"));
        assert!(tag_matches("@laser", "laser"));
    }

    #[test]
    fn test_variant_case_insensitive() {
        assert!(tag_matches("Laser", "@LASER"));
    }

    #[test]
    fn test_variant_space_forms() {
        assert!(tag_matches("laser cut", "laser-cut"));
        assert!(tag_matches("laser cut", "lasercut"));
    }

    #[test]
    fn test_variant_substring_containment() {
        assert!(tag_matches("laser", "laser-etching"));
        assert!(tag_matches("laser-etching", "laser"));
    }

    #[test]
    fn test_no_match() {
        assert!(!tag_matches("vinyl", "@laser"));
    }

    #[test]
    fn test_scenario_tagged_laser() {
        let orders = vec![order("1", &["@laser"]), order("2", &["rush"])];
        let criteria = FilterCriteria {
            tags: vec!["@laser".to_string()],
            ..Default::default()
        };
        let result = apply(orders, &criteria);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].job_number, "1");
    }

    #[test]
    fn test_exclude_removes_any_match() {
        let orders = vec![order("1", &["@laser", "rush"]), order("2", &["@laser"])];
        let criteria = FilterCriteria {
            tags: vec!["laser".to_string()],
            exclude_tags: vec!["rush".to_string()],
            ..Default::default()
        };
        let result = apply(orders, &criteria);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].job_number, "2");
    }

    #[test]
    fn test_include_tags_are_or() {
        let orders = vec![order("1", &["@laser"]), order("2", &["vinyl"]), order("3", &["dtg"])];
        let criteria = FilterCriteria {
            tags: vec!["laser".to_string(), "vinyl".to_string()],
            ..Default::default()
        };
        let result = apply(orders, &criteria);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_date_range_inclusive_bounds() {
        let mut early = order("1", &[]);
        early.due_date = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        let mut late = order("2", &[]);
        late.due_date = Utc.with_ymd_and_hms(2024, 3, 17, 23, 59, 59).unwrap();
        let mut outside = order("3", &[]);
        outside.due_date = Utc.with_ymd_and_hms(2024, 3, 18, 0, 0, 0).unwrap();

        let criteria = FilterCriteria {
            date_ranges: vec![DateRange {
                start: Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 3, 17, 23, 59, 59).unwrap(),
                label: "this week".to_string(),
            }],
            ..Default::default()
        };
        let result = apply(vec![early, late, outside], &criteria);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_filter_order_independence() {
        let orders = vec![
            order("1", &["@laser"]),
            order("2", &["@laser", "rush"]),
            order("3", &["vinyl"]),
        ];
        let full = FilterCriteria {
            tags: vec!["laser".to_string()],
            exclude_tags: vec!["rush".to_string()],
            ..Default::default()
        };

        // Sequential application in either order gives the same net set
        let tags_first = apply(
            apply(
                orders.clone(),
                &FilterCriteria {
                    tags: full.tags.clone(),
                    ..Default::default()
                },
            ),
            &FilterCriteria {
                exclude_tags: full.exclude_tags.clone(),
                ..Default::default()
            },
        );
        let excludes_first = apply(
            apply(
                orders.clone(),
                &FilterCriteria {
                    exclude_tags: full.exclude_tags.clone(),
                    ..Default::default()
                },
            ),
            &FilterCriteria {
                tags: full.tags.clone(),
                ..Default::default()
            },
        );
        let combined = apply(orders, &full);

        let ids = |orders: &[Order]| -> Vec<String> {
            orders.iter().map(|o| o.job_number.clone()).collect()
        };
        assert_eq!(ids(&tags_first), ids(&excludes_first));
        assert_eq!(ids(&tags_first), ids(&combined));
    }

    #[test]
    fn test_empty_criteria_passes_everything() {
        let orders = vec![order("1", &[]), order("2", &["rush"])];
        let result = apply(orders, &FilterCriteria::default());
        assert_eq!(result.len(), 2);
    }
}
