//! Batch side-data ("crutches") for index documents.
//!
//! Visibility of a status is derived from who mentioned it, favourited it or
//! reblogged it. Those edges are fetched once per batch with one bulk lookup
//! per edge type and handed to the document builder as a parameter object.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::model::{AccountId, PostId};

/// Post id to the accounts on the other side of an edge.
pub type EdgeMap = HashMap<PostId, Vec<AccountId>>;

/// Bulk edge lookups keyed by post id.
///
/// Each method is called at most once per indexing batch. Ids without rows may
/// simply be absent from the returned map.
pub trait CrutchSource {
    /// Accounts mentioned by each post.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream lookup fails.
    fn mentions(&self, ids: &[PostId]) -> Result<EdgeMap>;

    /// Accounts that favourited each post.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream lookup fails.
    fn favourites(&self, ids: &[PostId]) -> Result<EdgeMap>;

    /// Accounts that reblogged each post.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream lookup fails.
    fn reblogs(&self, ids: &[PostId]) -> Result<EdgeMap>;
}

/// Edge data for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crutches {
    pub mentions: EdgeMap,
    pub favourites: EdgeMap,
    pub reblogs: EdgeMap,
}

impl Crutches {
    /// Load all three edge maps for `ids`, one lookup each.
    ///
    /// # Errors
    ///
    /// Propagates the first failing lookup.
    pub fn load<S: CrutchSource + ?Sized>(source: &S, ids: &[PostId]) -> Result<Self> {
        if ids.is_empty() {
            return Ok(Self::default());
        }

        let crutches = Self {
            mentions: source.mentions(ids)?,
            favourites: source.favourites(ids)?,
            reblogs: source.reblogs(ids)?,
        };

        debug!(
            posts = ids.len(),
            mentions = crutches.mentions.len(),
            favourites = crutches.favourites.len(),
            reblogs = crutches.reblogs.len(),
            "loaded crutches"
        );
        Ok(crutches)
    }

    #[must_use]
    pub fn mentions_of(&self, id: PostId) -> &[AccountId] {
        self.mentions.get(&id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn favourites_of(&self, id: PostId) -> &[AccountId] {
        self.favourites.get(&id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn reblogs_of(&self, id: PostId) -> &[AccountId] {
        self.reblogs.get(&id).map_or(&[], Vec::as_slice)
    }
}

/// Group `(post_id, account_id)` rows into an [`EdgeMap`], keeping row order.
pub fn group_edges<I>(rows: I) -> EdgeMap
where
    I: IntoIterator<Item = (PostId, AccountId)>,
{
    let mut map = EdgeMap::new();
    for (post_id, account_id) in rows {
        map.entry(post_id).or_default().push(account_id);
    }
    map
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;

    /// In-memory source that counts lookups.
    #[derive(Debug, Default)]
    pub struct CountingSource {
        pub mentions: Vec<(PostId, AccountId)>,
        pub favourites: Vec<(PostId, AccountId)>,
        pub reblogs: Vec<(PostId, AccountId)>,
        pub calls: Cell<usize>,
    }

    impl CountingSource {
        fn lookup(&self, rows: &[(PostId, AccountId)], ids: &[PostId]) -> EdgeMap {
            self.calls.set(self.calls.get() + 1);
            group_edges(rows.iter().copied().filter(|(id, _)| ids.contains(id)))
        }
    }

    impl CrutchSource for CountingSource {
        fn mentions(&self, ids: &[PostId]) -> Result<EdgeMap> {
            Ok(self.lookup(&self.mentions, ids))
        }

        fn favourites(&self, ids: &[PostId]) -> Result<EdgeMap> {
            Ok(self.lookup(&self.favourites, ids))
        }

        fn reblogs(&self, ids: &[PostId]) -> Result<EdgeMap> {
            Ok(self.lookup(&self.reblogs, ids))
        }
    }
}
