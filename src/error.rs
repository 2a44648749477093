//! Custom error types for statusdex.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics. Index-store and database failures are flagged retryable so
//! callers can decide whether to re-run a batch; the core never retries on
//! its own.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for statusdex operations.
#[derive(Error, Debug)]
pub enum StatusdexError {
    // =========================================================================
    // Import Errors
    // =========================================================================
    /// Export file not found at the specified path.
    #[error("Export file not found at '{path}'")]
    ExportNotFound { path: PathBuf },

    /// Failed to parse an export file.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database file not found (nothing imported yet).
    #[error(
        "No imported data found. Run 'statusdex import <export.json>' first.\nExpected database at: {path}"
    )]
    DatabaseNotFound { path: PathBuf },

    /// Database schema version mismatch.
    #[error("Database schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // Search Index Errors
    // =========================================================================
    /// Search index not found.
    #[error("Search index not found at '{path}'. Run 'statusdex index' first.")]
    IndexNotFound { path: PathBuf },

    /// The analysis settings on disk differ from the ones in use.
    #[error("Index analysis settings changed (on disk {on_disk}, current {current})")]
    AnalysisMismatch { on_disk: String, current: String },

    /// Analysis settings failed validation.
    #[error("Invalid analysis settings: {reason}")]
    InvalidAnalysis { reason: String },

    /// Search query could not be turned into terms.
    #[error("Invalid search query: {reason}")]
    InvalidQuery { reason: String },

    /// Tantivy-specific error.
    #[error("Search engine error: {0}")]
    TantivyError(#[from] tantivy::TantivyError),

    // =========================================================================
    // Filter Errors
    // =========================================================================
    /// Filter phrases could not be compiled into a matcher.
    #[error("Failed to compile {rules} filter rule(s): {source}")]
    FilterCompile {
        rules: usize,
        #[source]
        source: regex::Error,
    },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Duration string could not be parsed.
    #[error("Invalid duration '{value}': expected forms like 500ms, 30s, 15m, 1h")]
    InvalidDuration { value: String },

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// Data not found.
    #[error("{item_type} with ID '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for statusdex operations.
pub type Result<T> = std::result::Result<T, StatusdexError>;

impl StatusdexError {
    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }

    /// Create an index not found error.
    pub fn index_not_found(path: impl Into<PathBuf>) -> Self {
        Self::IndexNotFound { path: path.into() }
    }

    /// Create an invalid analysis settings error.
    pub fn invalid_analysis(reason: impl Into<String>) -> Self {
        Self::InvalidAnalysis {
            reason: reason.into(),
        }
    }

    /// Create an invalid query error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            item_type,
            id: id.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ExportNotFound { .. }
                | Self::DatabaseNotFound { .. }
                | Self::IndexNotFound { .. }
                | Self::InvalidQuery { .. }
                | Self::InvalidArgument { .. }
                | Self::InvalidDuration { .. }
                | Self::NotFound { .. }
        )
    }

    /// Check if retrying the same operation may succeed.
    ///
    /// Index-store writes/queries and busy databases are transient from the
    /// core's point of view.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TantivyError(_) | Self::IoError(_) | Self::PathError { .. } => true,
            Self::DatabaseError(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }

    /// Check if this error suggests re-indexing.
    #[must_use]
    pub const fn suggests_reindex(&self) -> bool {
        matches!(
            self,
            Self::AnalysisMismatch { .. } | Self::IndexNotFound { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ExportNotFound { .. } => Some("Verify the path to the JSON export."),
            Self::DatabaseNotFound { .. } => {
                Some("Run 'statusdex import <export.json>' to create the database.")
            }
            Self::IndexNotFound { .. } | Self::AnalysisMismatch { .. } => {
                Some("Run 'statusdex index --force' to rebuild the index.")
            }
            Self::InvalidQuery { .. } => {
                Some("Use at least two letters or digits; punctuation alone is not searchable.")
            }
            Self::FilterCompile { .. } => {
                Some("Shorten or remove some filter phrases; the combined pattern is too large.")
            }
            Self::InvalidDuration { .. } => Some("Use a number followed by ms, s, m or h."),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| StatusdexError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StatusdexError::with_context(f(), e))
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the closest candidate within `max_distance` edits (default 2).
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format an error for an unknown value with "did you mean?" support.
#[must_use]
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();
    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format!("Did you mean '{}'?", closest.green()));
    }
    if valid_options.len() <= 12 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

/// Config keys accepted by `statusdex config --set`.
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "paths.db",
    "paths.index",
    "index.refresh_interval",
    "index.batch_size",
    "index.writer_heap_mb",
    "index.jobs",
    "search.default_limit",
    "filters.cache_size",
    "output.format",
    "output.colors",
    "output.quiet",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StatusdexError::index_not_found("/path/to/index");
        assert!(err.to_string().contains("/path/to/index"));
    }

    #[test]
    fn test_error_suggestions() {
        let err = StatusdexError::database_not_found("/path/to/db");
        assert!(err.suggestion().is_some());
        assert!(err.is_recoverable());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_reindex_suggestion() {
        let err = StatusdexError::AnalysisMismatch {
            on_disk: "abc".to_string(),
            current: "def".to_string(),
        };
        assert!(err.suggests_reindex());
    }

    #[test]
    fn index_store_failures_are_retryable() {
        let err: StatusdexError =
            tantivy::TantivyError::InvalidArgument("boom".to_string()).into();
        assert!(err.is_retryable());

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: StatusdexError = io_err.into();
        assert!(err.is_retryable());
    }

    #[test]
    fn busy_database_is_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StatusdexError::from(busy).is_retryable());

        let missing = rusqlite::Error::QueryReturnedNoRows;
        assert!(!StatusdexError::from(missing).is_retryable());
    }

    #[test]
    fn filter_compile_errors_carry_a_hint() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = StatusdexError::FilterCompile { rules: 3, source };
        assert!(err.to_string().contains("3 filter rule(s)"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("cat", "cats"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }

    #[test]
    fn find_closest_config_key() {
        assert_eq!(
            find_closest_match("search.default_limt", VALID_CONFIG_KEYS, None),
            Some("search.default_limit")
        );
        assert_eq!(find_closest_match("zzz", VALID_CONFIG_KEYS, None), None);
    }

    #[test]
    fn format_unknown_value_with_suggestion() {
        let output = format_unknown_value_error("key", "index.jbos", VALID_CONFIG_KEYS);
        assert!(output.contains("Unknown key"));
        assert!(output.contains("index.jobs"));
    }
}
