//! Content filter compilation.
//!
//! A viewer's active filter rules are folded into a single case-insensitive
//! alternation. Two matchers exist per rule set: `drop` built from the
//! irreversible subset and `hide` built from every active rule. Compiled pairs
//! are memoized in [`FilterCache`] keyed by a fingerprint of the rule set.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use ring::digest::{Context as DigestContext, SHA256};
use tracing::{debug, trace};

use crate::error::{Result, StatusdexError};
use crate::model::{FilterContext, FilterRule};
use crate::normalize::normalize;
use crate::perf::{self, Timer};

/// Default number of distinct rule sets kept compiled.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// ASCII word boundary, matching the `\w` class filter phrases are written against.
const WORD_BOUNDARY: &str = r"(?-u:\b)";

/// A compiled alternation of filter phrases.
#[derive(Debug, Clone)]
pub struct FilterMatcher {
    regex: Regex,
    rules: usize,
}

impl FilterMatcher {
    /// Test normalized text against the matcher.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Number of rules folded into this matcher.
    #[must_use]
    pub const fn rule_count(&self) -> usize {
        self.rules
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Build the pattern fragment for one phrase.
///
/// The phrase is normalized and escaped. With `whole_word`, a boundary is
/// asserted only on a side whose edge character is an ASCII word character;
/// a boundary next to punctuation could never match.
#[must_use]
pub fn phrase_pattern(phrase: &str, whole_word: bool) -> String {
    let normalized = normalize(phrase);
    let escaped = regex::escape(&normalized);

    if !whole_word {
        return escaped;
    }

    let starts_word = normalized.chars().next().is_some_and(is_ascii_word);
    let ends_word = normalized.chars().next_back().is_some_and(is_ascii_word);

    let mut pattern = String::with_capacity(escaped.len() + 2 * WORD_BOUNDARY.len());
    if starts_word {
        pattern.push_str(WORD_BOUNDARY);
    }
    pattern.push_str(&escaped);
    if ends_word {
        pattern.push_str(WORD_BOUNDARY);
    }
    pattern
}

const fn is_ascii_word(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Compile rules into one matcher.
///
/// Returns `Ok(None)` when no rule carries a phrase, so callers can treat the
/// absence of a matcher as "never matches".
///
/// # Errors
///
/// Returns [`StatusdexError::FilterCompile`] when the combined pattern exceeds
/// the regex engine's size limits.
pub fn compile<'a, I>(rules: I) -> Result<Option<FilterMatcher>>
where
    I: IntoIterator<Item = &'a FilterRule>,
{
    let fragments: Vec<String> = rules
        .into_iter()
        .filter(|rule| !rule.phrase.is_empty())
        .map(|rule| phrase_pattern(&rule.phrase, rule.whole_word))
        .collect();

    if fragments.is_empty() {
        return Ok(None);
    }

    let pattern = fragments.join("|");
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| StatusdexError::FilterCompile {
            rules: fragments.len(),
            source,
        })?;

    Ok(Some(FilterMatcher {
        regex,
        rules: fragments.len(),
    }))
}

/// Select the rules active for a UI column at `now`.
///
/// An empty column selects nothing.
#[must_use]
pub fn active_filters<'a>(
    rules: &'a [FilterRule],
    column: &str,
    now: DateTime<Utc>,
) -> Vec<&'a FilterRule> {
    let Some(context) = FilterContext::from_column(column) else {
        return Vec::new();
    };
    rules
        .iter()
        .filter(|rule| rule.is_active(context, now))
        .collect()
}

/// The matcher pair for one active rule set.
#[derive(Debug, Default)]
pub struct CompiledFilters {
    /// Irreversible rules only.
    pub drop: Option<FilterMatcher>,
    /// Every active rule.
    pub hide: Option<FilterMatcher>,
}

impl CompiledFilters {
    /// # Errors
    ///
    /// Propagates [`compile`] failures.
    pub fn compile(active: &[&FilterRule]) -> Result<Self> {
        let drop = compile(active.iter().copied().filter(|rule| rule.irreversible))?;
        let hide = compile(active.iter().copied())?;
        Ok(Self { drop, hide })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.drop.is_none() && self.hide.is_none()
    }
}

/// Fingerprint of a rule set, independent of rule order.
pub type RuleSetKey = [u8; 32];

/// SHA-256 over the fields that influence compilation.
#[must_use]
pub fn rule_set_key(active: &[&FilterRule]) -> RuleSetKey {
    let mut sorted: Vec<&FilterRule> = active.to_vec();
    sorted.sort_by_key(|rule| rule.id);

    let mut ctx = DigestContext::new(&SHA256);
    for rule in sorted {
        ctx.update(&rule.id.to_le_bytes());
        ctx.update(&[u8::from(rule.whole_word), u8::from(rule.irreversible)]);
        ctx.update(&(rule.phrase.len() as u64).to_le_bytes());
        ctx.update(rule.phrase.as_bytes());
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(ctx.finish().as_ref());
    key
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub compiles: u64,
    pub entries: usize,
}

/// LRU of [`CompiledFilters`] keyed by rule-set fingerprint.
///
/// Entries are immutable once inserted and shared as `Arc`s. A lookup takes
/// the write lock because it promotes the entry; a miss compiles while still
/// holding it, so concurrent callers with the same rule set compile it once.
pub struct FilterCache {
    entries: RwLock<LruCache<RuleSetKey, Arc<CompiledFilters>>>,
    hits: AtomicU64,
    compiles: AtomicU64,
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl std::fmt::Debug for FilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCache")
            .field("stats", &self.stats())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl FilterCache {
    /// A cache holding at most `capacity` rule sets; zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
        }
    }

    /// Fetch the compiled pair for `active`, compiling on first use.
    ///
    /// # Errors
    ///
    /// Propagates [`compile`] failures; nothing is cached on error.
    pub fn get_or_compile(&self, active: &[&FilterRule]) -> Result<Arc<CompiledFilters>> {
        let key = rule_set_key(active);

        let mut entries = self.entries.write();
        if let Some(found) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(rules = active.len(), "filter cache hit");
            return Ok(Arc::clone(found));
        }

        let timer = Timer::start(perf::FILTER_COMPILE);
        let compiled = Arc::new(CompiledFilters::compile(active)?);
        timer.stop();
        self.compiles.fetch_add(1, Ordering::Relaxed);

        if entries.push(key, Arc::clone(&compiled)).is_some() {
            trace!("filter cache evicted least recently used set");
        }
        debug!(rules = active.len(), entries = entries.len(), "compiled filter set");
        Ok(compiled)
    }

    /// Whether `active` is compiled, without touching recency.
    #[must_use]
    pub fn contains(&self, active: &[&FilterRule]) -> bool {
        self.entries.read().contains(&rule_set_key(active))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.read().cap().get()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
