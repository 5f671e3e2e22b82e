//! Timeline date normalization.
//!
//! The model is asked for ISO dates but routinely returns regional numeric
//! formats, spelled-out months, or relative expressions. Every date is
//! re-validated locally; converted dates get an `[Original: ...]` note on the
//! event text, unparsable dates pass through untouched rather than dropping
//! the event.

use chrono::{Duration, NaiveDate, Utc};

use crate::document::TimelineEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateNormalization {
    /// Already `YYYY-MM-DD`; returned unchanged.
    AlreadyIso,
    /// Converted to ISO from another recognized format.
    Converted(String),
    /// Not a recognizable date; left as-is.
    Unparsable,
}

/// Numeric and spelled-out formats tried in order. `%m/%d/%Y` before
/// `%d/%m/%Y` so `08/13/2024` resolves the US way; day-first only matches
/// when the month slot would be invalid.
const NUMERIC_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
];

const TEXTUAL_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y", "%B %d %Y"];

pub fn normalize_date(raw: &str) -> DateNormalization {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DateNormalization::Unparsable;
    }

    // Idempotence: a valid ISO date is never rewritten.
    if NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok() {
        return DateNormalization::AlreadyIso;
    }

    for format in NUMERIC_FORMATS.iter().chain(TEXTUAL_FORMATS) {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return DateNormalization::Converted(date.format("%Y-%m-%d").to_string());
        }
    }

    if let Some(date) = parse_relative(trimmed) {
        return DateNormalization::Converted(date.format("%Y-%m-%d").to_string());
    }

    DateNormalization::Unparsable
}

fn parse_relative(raw: &str) -> Option<NaiveDate> {
    let today = Utc::now().date_naive();
    match raw.to_ascii_lowercase().as_str() {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        "tomorrow" => Some(today + Duration::days(1)),
        _ => None,
    }
}

/// Normalizes every event in place. All-or-nothing is preserved upstream:
/// this runs on the fully parsed array, never on partial JSON.
pub fn normalize_events(events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    events
        .into_iter()
        .map(|entry| match normalize_date(&entry.date) {
            DateNormalization::AlreadyIso | DateNormalization::Unparsable => entry,
            DateNormalization::Converted(iso) => TimelineEvent {
                event: format!("{} [Original: {}]", entry.event, entry.date.trim()),
                date: iso,
            },
        })
        .collect()
}
