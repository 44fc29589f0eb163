//! Relative date phrase resolution.
//!
//! "today" and "tomorrow" resolve to single-day ranges; "this week" is
//! Monday 00:00:00 through Sunday 23:59:59 of the current ISO week and
//! "next week" the following such window. Vague phrases ("soon",
//! "sometime") resolve to nothing so the caller can surface a
//! missing-entity condition instead of silently defaulting to today.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive date range with the phrase it was resolved from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

fn day_bounds(day: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = day.date_naive();
    let start = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
    let end = Utc
        .from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap());
    (start, end)
}

fn iso_week_bounds(now: DateTime<Utc>, weeks_ahead: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_from_monday = now.weekday().num_days_from_monday() as i64;
    let monday = now.date_naive() - Duration::days(days_from_monday)
        + Duration::weeks(weeks_ahead);
    let sunday = monday + Duration::days(6);
    let start = Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0).unwrap());
    let end = Utc.from_utc_datetime(&sunday.and_hms_opt(23, 59, 59).unwrap());
    (start, end)
}

/// Outcome of resolving one date phrase
#[derive(Debug, Clone, PartialEq)]
pub enum DateResolution {
    Resolved(DateRange),
    /// Phrase refers to time but cannot be pinned to a range
    Ambiguous(String),
    NotADate,
}

/// Resolve a single known phrase against the caller's clock.
pub fn resolve_date_phrase(phrase: &str, now: DateTime<Utc>) -> DateResolution {
    let range = |start, end| DateRange {
        start,
        end,
        label: phrase.to_string(),
    };
    match phrase {
        "today" => {
            let (start, end) = day_bounds(now);
            DateResolution::Resolved(range(start, end))
        }
        "tomorrow" => {
            let (start, end) = day_bounds(now + Duration::days(1));
            DateResolution::Resolved(range(start, end))
        }
        "this week" => {
            let (start, end) = iso_week_bounds(now, 0);
            DateResolution::Resolved(range(start, end))
        }
        "next week" => {
            let (start, end) = iso_week_bounds(now, 1);
            DateResolution::Resolved(range(start, end))
        }
        "overdue" => {
            // Everything due before now
            let start = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
            DateResolution::Resolved(range(start, now))
        }
        "soon" | "sometime" | "eventually" | "later" | "a while" => {
            DateResolution::Ambiguous(phrase.to_string())
        }
        _ => DateResolution::NotADate,
    }
}
