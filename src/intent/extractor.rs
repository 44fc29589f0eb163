//! Rule-based intent extraction.
//!
//! Implements the classification precedence and entity extraction rules
//! with pre-compiled regexes. Keyword lists are constants rather than
//! config: they define the classifier's contract and the tests pin them.

use super::dates::{resolve_date_phrase, DateResolution};
use super::{IntentError, IntentType, QueryBreadth, QueryEntities, QueryIntent};
use chrono::{DateTime, Utc};
use regex::Regex;

/// Pluggable free-text → structured-intent step
pub trait IntentExtractor: Send + Sync {
    fn extract(&self, query: &str, now: DateTime<Utc>) -> Result<QueryIntent, IntentError>;
}

/// Temporal keywords that force the exact-data strategy
const TEMPORAL_KEYWORDS: &[&str] = &["today", "tomorrow", "due", "overdue", "rush", "urgent"];

/// Aggregate keywords that force the calculation strategy
const AGGREGATE_KEYWORDS: &[&str] = &["total", "reach", "prioritize", "how many"];

/// Process/material vocabulary that signals category search
const CATEGORY_KEYWORDS: &[&str] = &[
    "laser", "vinyl", "banner", "engraving", "embroidery", "screen print", "dtg", "acrylic",
    "fabric", "metal", "wood", "decal", "sign",
];

/// Phrases that request the maximum recall breadth
const BROAD_PHRASES: &[&str] = &["all orders", "every order", "all jobs", "everything"];

/// Date phrases checked against the query, longest first so "next week"
/// is consumed before "week" could misfire.
const DATE_PHRASES: &[&str] = &[
    "this week", "next week", "tomorrow", "today", "overdue", "sometime", "eventually",
    "a while", "soon", "later",
];

pub struct RuleBasedExtractor {
    job_number: Regex,
    at_tag: Regex,
    tagged: Regex,
    excluding: Regex,
    customer: Regex,
}

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self {
            // "job 51234", "order #51234", "#51234", or a bare 4-7 digit run
            job_number: Regex::new(
                r"(?i)\b(?:job|order)\s*#?\s*(\d{3,7})\b|#(\d{3,7})\b|\b(\d{4,7})\b",
            )
            .unwrap(),
            at_tag: Regex::new(r"@([\w-]+)").unwrap(),
            tagged: Regex::new(r"(?i)\b(not\s+)?tagged\s+(@?[\w-]+)").unwrap(),
            excluding: Regex::new(r"(?i)\bexcluding\s+(@?[\w-]+)").unwrap(),
            // A capitalized run after "for"/"from"/"customer"
            customer: Regex::new(
                r"(?:\bfor|\bfrom|\bcustomer)\s+([A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*)*)",
            )
            .unwrap(),
        }
    }

    fn extract_job_numbers(&self, query: &str) -> Vec<String> {
        let mut numbers = Vec::new();
        for captures in self.job_number.captures_iter(query) {
            let number = captures
                .get(1)
                .or_else(|| captures.get(2))
                .or_else(|| captures.get(3));
            if let Some(m) = number {
                let value = m.as_str().to_string();
                if !numbers.contains(&value) {
                    numbers.push(value);
                }
            }
        }
        numbers
    }

    fn extract_tags(&self, query: &str, entities: &mut QueryEntities) {
        for captures in self.at_tag.captures_iter(query) {
            let tag = format!("@{}", &captures[1]);
            if !entities.tags.contains(&tag) {
                entities.tags.push(tag);
            }
        }

        for captures in self.tagged.captures_iter(query) {
            let tag = captures[2].to_string();
            if captures.get(1).is_some() {
                // "not tagged X"
                if !entities.exclude_tags.contains(&tag) {
                    entities.exclude_tags.push(tag);
                }
            } else if !entities.tags.contains(&tag) {
                entities.tags.push(tag);
            }
        }

        for captures in self.excluding.captures_iter(query) {
            let tag = captures[1].to_string();
            entities.tags.retain(|t| t != &tag);
            if !entities.exclude_tags.contains(&tag) {
                entities.exclude_tags.push(tag);
            }
        }

        let lowered = query.to_lowercase();
        if lowered.contains("in production") && !entities.tags.iter().any(|t| t == "production") {
            entities.tags.push("production".to_string());
        }

        // A tag mentioned with @ elsewhere may also have matched "tagged X";
        // dedupe after normalization happens downstream in the filter.
        entities.tags.dedup();
    }

    fn extract_dates(
        &self,
        lowered: &str,
        now: DateTime<Utc>,
        entities: &mut QueryEntities,
        missing: &mut Vec<String>,
    ) {
        let mut consumed = vec![false; lowered.len()];
        for phrase in DATE_PHRASES {
            let mut search_from = 0;
            while let Some(pos) = lowered[search_from..].find(phrase) {
                let start = search_from + pos;
                search_from = start + phrase.len();
                if consumed[start] {
                    continue;
                }
                for flag in consumed
                    .iter_mut()
                    .skip(start)
                    .take(phrase.len())
                {
                    *flag = true;
                }
                match resolve_date_phrase(phrase, now) {
                    DateResolution::Resolved(range) => entities.date_ranges.push(range),
                    DateResolution::Ambiguous(p) => {
                        if !missing.contains(&"date_range".to_string()) {
                            tracing::debug!("Ambiguous date phrase: {:?}", p);
                            missing.push("date_range".to_string());
                        }
                    }
                    DateResolution::NotADate => {}
                }
            }
        }
    }

    fn extract_customers(&self, query: &str, entities: &mut QueryEntities) {
        for captures in self.customer.captures_iter(query) {
            let name = captures[1].trim().to_string();
            if !entities.customer_names.contains(&name) {
                entities.customer_names.push(name);
            }
        }
    }

    fn classify_type(&self, lowered: &str, entities: &QueryEntities) -> IntentType {
        // Precedence order is load-bearing; first match wins.
        let has_digit = lowered.chars().any(|c| c.is_ascii_digit());
        if !entities.job_numbers.is_empty() && has_digit {
            return IntentType::ExactData;
        }
        if TEMPORAL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return IntentType::ExactData;
        }
        if AGGREGATE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return IntentType::Calculation;
        }
        if lowered.contains(" like ")
            || lowered.starts_with("like ")
            || CATEGORY_KEYWORDS.iter().any(|k| lowered.contains(k))
        {
            return IntentType::SemanticSearch;
        }
        IntentType::SemanticSearch
    }

    fn classify_breadth(&self, lowered: &str, entities: &QueryEntities) -> QueryBreadth {
        if BROAD_PHRASES.iter().any(|p| lowered.contains(p)) {
            return QueryBreadth::Broad;
        }
        if !entities.job_numbers.is_empty()
            || (entities.customer_names.len() == 1 && entities.date_ranges.is_empty())
        {
            return QueryBreadth::Narrow;
        }
        QueryBreadth::Medium
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentExtractor for RuleBasedExtractor {
    fn extract(&self, query: &str, now: DateTime<Utc>) -> Result<QueryIntent, IntentError> {
        let lowered = query.to_lowercase();
        let mut entities = QueryEntities::default();
        let mut missing = Vec::new();

        entities.job_numbers = self.extract_job_numbers(query);
        self.extract_tags(query, &mut entities);
        self.extract_dates(&lowered, now, &mut entities, &mut missing);
        self.extract_customers(query, &mut entities);

        let intent_type = self.classify_type(&lowered, &entities);
        let breadth = self.classify_breadth(&lowered, &entities);

        let mut confidence: f32 = if !entities.job_numbers.is_empty() {
            0.9
        } else if intent_type == IntentType::ExactData || intent_type == IntentType::Calculation {
            0.8
        } else if CATEGORY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            0.7
        } else {
            0.6
        };
        // Ambiguity attenuates confidence instead of guessing
        confidence -= 0.3 * missing.len() as f32;
        confidence = confidence.max(0.1);

        Ok(QueryIntent {
            intent_type,
            entities,
            breadth,
            confidence,
            missing_entities: missing,
        })
    }
}
