//! statusdex - status search with visibility lists and content filters
//!
//! This library indexes social statuses for full-text search and decides, at
//! render time, whether a viewer's keyword filters hide or drop a status.
//!
//! # Modules
//!
//! - [`normalize`] - Width, punctuation and half-width kana folding
//! - [`filter`] - Filter rules compiled into cached matchers
//! - [`crutch`] / [`document`] - Batch edge loading and index document assembly
//! - [`analysis`] / [`tokenizer`] - Analyzer settings and their tokenizers
//! - [`search`] - Tantivy-based index store with per-viewer visibility
//! - [`evaluator`] - Drop/hide decisions for rendered statuses
//! - [`storage`] / [`import`] / [`indexer`] - `SQLite` data, JSON import, indexing pipeline

pub mod analysis;
pub mod cli;
pub mod config;
pub mod crutch;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod import;
pub mod indexer;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod perf;
pub mod search;
pub mod storage;
pub mod tokenizer;

pub use analysis::AnalysisSettings;
pub use cli::*;
pub use config::Config;
pub use error::{
    Result, ResultExt, StatusdexError, VALID_CONFIG_KEYS, find_closest_match, format_error,
    format_unknown_value_error,
};
pub use evaluator::ResultFilterEvaluator;
pub use filter::FilterCache;
pub use import::Export;
pub use model::*;
pub use normalize::normalize;
pub use search::SearchEngine;
pub use storage::Storage;

use chrono::{DateTime, Datelike, Utc};

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "statusdex.db";

/// Default index directory name
pub const DEFAULT_INDEX_DIR: &str = "statusdex_index";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for statusdex
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("statusdex")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Get the default index path
#[must_use]
pub fn default_index_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_INDEX_DIR)
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Format a datetime as a human-friendly relative string.
#[must_use]
pub fn format_relative_date(dt: DateTime<Utc>) -> String {
    format_relative_date_with_base(dt, Utc::now())
}

/// Format a datetime relative to a fixed base time.
///
/// Under a minute is "just now", then minutes, hours and days up to a week,
/// then a calendar date with the year shown only when it differs.
#[must_use]
pub fn format_relative_date_with_base(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(dt);

    if duration.num_seconds() < 0 {
        return dt.format("%b %d, %Y").to_string();
    }

    let minutes = duration.num_minutes();
    let hours = duration.num_hours();
    let days = duration.num_days();

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if dt.year() == now.year() {
        dt.format("%b %d").to_string()
    } else {
        dt.format("%b %d, %Y").to_string()
    }
}

/// Shorten `text` to at most `max_chars` characters, marking the cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::{format_number, format_relative_date_with_base, truncate_chars};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345_678), "12,345,678");
        assert_eq!(format_number(-12_345), "-12,345");
    }

    #[test]
    fn format_relative_date_thresholds() {
        let base = Utc
            .with_ymd_and_hms(2025, 1, 10, 12, 0, 0)
            .single()
            .unwrap();

        assert_eq!(
            format_relative_date_with_base(base - Duration::seconds(30), base),
            "just now"
        );
        assert_eq!(
            format_relative_date_with_base(base - Duration::minutes(5), base),
            "5m ago"
        );
        assert_eq!(
            format_relative_date_with_base(base - Duration::days(2), base),
            "2d ago"
        );

        let different_year = Utc
            .with_ymd_and_hms(2024, 12, 11, 0, 0, 0)
            .single()
            .unwrap();
        assert_eq!(
            format_relative_date_with_base(different_year, base),
            "Dec 11, 2024"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("東京都に住んでいます", 6), "東京都...");
    }
}
