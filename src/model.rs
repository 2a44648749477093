//! Data models for statuses, filters and index documents.
//!
//! These structures are the plain records exchanged between the upstream data
//! provider, the document builder, the index store and the filter evaluator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a status.
pub type PostId = i64;

/// Identifier of an account.
pub type AccountId = i64;

/// A status as supplied by the upstream data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub account_id: AccountId,
    #[serde(default)]
    pub spoiler_text: String,
    /// Plain source for local posts, HTML for remote ones.
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_local")]
    pub local: bool,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
    #[serde(default)]
    pub reblog_of_id: Option<PostId>,
    pub created_at: DateTime<Utc>,
}

const fn default_local() -> bool {
    true
}

impl Post {
    /// Whether this status is a thin pointer to another status.
    #[must_use]
    pub const fn is_reblog(&self) -> bool {
        self.reblog_of_id.is_some()
    }
}

/// Media attached to a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// The four canonical contexts a filter can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterContext {
    Home,
    Notifications,
    Public,
    Thread,
}

impl FilterContext {
    /// Map a UI column name onto a canonical context.
    ///
    /// Columns containing `list:` read like the home feed, including scoped
    /// names such as `acct:list:3`. Every other ad-hoc column (community,
    /// account, hashtag, ...) reads like a public one.
    /// An empty column selects nothing.
    #[must_use]
    pub fn from_column(column: &str) -> Option<Self> {
        match column {
            "" => None,
            "home" => Some(Self::Home),
            "notifications" => Some(Self::Notifications),
            "public" => Some(Self::Public),
            "thread" => Some(Self::Thread),
            other if other.contains("list:") => Some(Self::Home),
            _ => Some(Self::Public),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Notifications => "notifications",
            Self::Public => "public",
            Self::Thread => "thread",
        }
    }
}

impl std::fmt::Display for FilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilterContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Self::Home),
            "notifications" => Ok(Self::Notifications),
            "public" => Ok(Self::Public),
            "thread" => Ok(Self::Thread),
            other => Err(format!("unknown filter context '{other}'")),
        }
    }
}

/// A user-defined content filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: i64,
    /// Owner of the filter.
    pub account_id: AccountId,
    pub phrase: String,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub context: Vec<FilterContext>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub irreversible: bool,
}

impl FilterRule {
    /// Active when the context matches and the rule has not expired.
    #[must_use]
    pub fn is_active(&self, context: FilterContext, now: DateTime<Utc>) -> bool {
        self.context.contains(&context) && self.expires_at.is_none_or(|at| at > now)
    }
}

/// Render-time verdict for one status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub drop: bool,
    pub hide: bool,
}

impl FilterDecision {
    pub const VISIBLE: Self = Self {
        drop: false,
        hide: false,
    };
    pub const DROP: Self = Self {
        drop: true,
        hide: false,
    };
}

/// A document as written to the index store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: PostId,
    pub account_id: AccountId,
    /// Indexed twice: n-gram analyzed and stemmed.
    pub text: String,
    /// Sorted, deduplicated.
    pub searchable_by: Vec<AccountId>,
    pub created_at: DateTime<Utc>,
}

/// A search hit returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PostId,
    pub account_id: AccountId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub score: f32,
}

/// Render-time projection of a status.
///
/// `search_index` holds the normalized searchable text, computed once when the
/// view is built and reused for every filter evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: PostId,
    pub account_id: AccountId,
    pub search_index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reblog: Option<Box<PostView>>,
}

impl PostView {
    /// The status whose content is displayed: the reblog target if any.
    #[must_use]
    pub fn effective(&self) -> &Self {
        self.reblog.as_deref().unwrap_or(self)
    }
}

/// A status annotated for display after filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: PostId,
    pub account_id: AccountId,
    pub hidden: bool,
}

/// Counts of imported records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStats {
    pub posts: usize,
    pub media_attachments: usize,
    pub mentions: usize,
    pub favourites: usize,
    pub filters: usize,
}
