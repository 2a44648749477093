//! JSON export import.
//!
//! An export is one JSON document:
//!
//! ```json
//! {
//!   "posts": [{"id": 1, "account_id": 10, "text": "hello", "created_at": "2024-01-01T00:00:00Z"}],
//!   "mentions": [{"post_id": 1, "account_id": 20}],
//!   "favourites": [],
//!   "filters": [{"id": 1, "account_id": 20, "phrase": "spoiler", "context": ["home"]}]
//! }
//! ```
//!
//! Every section is optional. Importing the same export twice is harmless.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, StatusdexError};
use crate::logging::OperationGuard;
use crate::model::{AccountId, FilterRule, ImportStats, Post, PostId};
use crate::storage::Storage;

/// A `(post, account)` edge as it appears in an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub post_id: PostId,
    pub account_id: AccountId,
}

/// Parsed export document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Export {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub mentions: Vec<EdgeRecord>,
    #[serde(default)]
    pub favourites: Vec<EdgeRecord>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
}

impl Export {
    /// Read and parse an export file.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::ExportNotFound`] if the file is missing and
    /// [`StatusdexError::ParseError`] if it is not a valid export.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StatusdexError::ExportNotFound {
                path: path.to_path_buf(),
            });
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| StatusdexError::path_error("read", path, e))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse an export from a string; `source` names it in errors.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::ParseError`] on malformed JSON or invalid
    /// records.
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let export: Self = serde_json::from_str(content)
            .map_err(|e| StatusdexError::parse_error(source, e.to_string()))?;
        export.validate(source)?;
        Ok(export)
    }

    fn validate(&self, source: &str) -> Result<()> {
        if let Some(post) = self.posts.iter().find(|p| p.reblog_of_id == Some(p.id)) {
            return Err(StatusdexError::parse_error(
                source,
                format!("post {} reblogs itself", post.id),
            ));
        }
        if let Some(rule) = self.filters.iter().find(|r| r.context.is_empty()) {
            return Err(StatusdexError::parse_error(
                source,
                format!("filter {} has no context", rule.id),
            ));
        }

        let blank = self
            .filters
            .iter()
            .filter(|r| r.phrase.trim().is_empty())
            .count();
        if blank > 0 {
            warn!(count = blank, "filters with blank phrases never match");
        }
        Ok(())
    }

    /// Write every section into `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn store(&self, storage: &mut Storage) -> Result<ImportStats> {
        let guard = OperationGuard::new("import");
        match self.store_sections(storage) {
            Ok(stats) => {
                info!(
                    posts = stats.posts,
                    mentions = stats.mentions,
                    favourites = stats.favourites,
                    filters = stats.filters,
                    "import complete"
                );
                guard.complete(stats.posts);
                Ok(stats)
            }
            Err(err) => {
                guard.fail(&err);
                Err(err)
            }
        }
    }

    fn store_sections(&self, storage: &mut Storage) -> Result<ImportStats> {
        let edges = |records: &[EdgeRecord]| -> Vec<(PostId, AccountId)> {
            records.iter().map(|e| (e.post_id, e.account_id)).collect()
        };

        Ok(ImportStats {
            posts: storage.store_posts(&self.posts)?,
            media_attachments: self.posts.iter().map(|p| p.media_attachments.len()).sum(),
            mentions: storage.store_mentions(&edges(&self.mentions))?,
            favourites: storage.store_favourites(&edges(&self.favourites))?,
            filters: storage.store_filters(&self.filters)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterContext;

    const SAMPLE: &str = r#"{
        "posts": [
            {"id": 1, "account_id": 10, "spoiler_text": "cw", "text": "hello world",
             "media_attachments": [{"id": 100, "description": "a cat"}],
             "created_at": "2024-01-01T00:00:00Z"},
            {"id": 2, "account_id": 20, "reblog_of_id": 1, "created_at": "2024-01-02T00:00:00Z"},
            {"id": 3, "account_id": 30, "text": "<p>remote</p>", "local": false,
             "created_at": "2024-01-03T00:00:00Z"}
        ],
        "mentions": [{"post_id": 1, "account_id": 30}],
        "favourites": [{"post_id": 1, "account_id": 40}, {"post_id": 1, "account_id": 40}],
        "filters": [
            {"id": 1, "account_id": 30, "phrase": "hello", "whole_word": true,
             "context": ["home", "public"], "irreversible": true}
        ]
    }"#;

    #[test]
    fn parses_all_sections() {
        let export = Export::parse(SAMPLE, "sample").unwrap();
        assert_eq!(export.posts.len(), 3);
        assert_eq!(export.posts[1].reblog_of_id, Some(1));
        assert!(export.posts[0].local);
        assert!(!export.posts[2].local);
        assert_eq!(
            export.filters[0].context,
            vec![FilterContext::Home, FilterContext::Public]
        );
        assert!(export.filters[0].expires_at.is_none());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let export = Export::parse("{}", "empty").unwrap();
        assert!(export.posts.is_empty());
        assert!(export.filters.is_empty());
    }

    #[test]
    fn store_reports_counts() {
        let export = Export::parse(SAMPLE, "sample").unwrap();
        let mut storage = Storage::open_memory().unwrap();
        let stats = export.store(&mut storage).unwrap();
        assert_eq!(stats.posts, 3);
        assert_eq!(stats.media_attachments, 1);
        assert_eq!(stats.mentions, 1);
        assert_eq!(stats.favourites, 1);
        assert_eq!(stats.filters, 1);

        // Idempotent.
        let again = export.store(&mut storage).unwrap();
        assert_eq!(again.favourites, 0);
        assert_eq!(storage.counts().unwrap().posts, 3);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Export::parse("{\"posts\": [", "broken.json").unwrap_err();
        assert!(matches!(err, StatusdexError::ParseError { ref file, .. } if file == "broken.json"));
    }

    #[test]
    fn self_reblog_is_rejected() {
        let json = r#"{"posts": [{"id": 5, "account_id": 1, "reblog_of_id": 5,
                                  "created_at": "2024-01-01T00:00:00Z"}]}"#;
        assert!(Export::parse(json, "x").is_err());
    }

    #[test]
    fn contextless_filter_is_rejected() {
        let json = r#"{"filters": [{"id": 1, "account_id": 1, "phrase": "x", "context": []}]}"#;
        assert!(Export::parse(json, "x").is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Export::read(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, StatusdexError::ExportNotFound { .. }));
    }
}
