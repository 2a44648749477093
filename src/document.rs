//! Index document assembly.
//!
//! Every field of an [`IndexedDocument`] comes from a builder function taking
//! the post and the batch [`Crutches`] explicitly. Reblogs are thin pointers
//! and never produce a document of their own.

use std::borrow::Cow;

use itertools::Itertools;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::crutch::{CrutchSource, Crutches};
use crate::error::Result;
use crate::model::{AccountId, IndexedDocument, Post, PostId};

/// Separator between the parts of the searchable text.
pub const PART_SEPARATOR: &str = "\n\n";

static LINE_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:<br\s*/?>|</p>)+").expect("valid regex"));

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static ENTITIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]+));").expect("valid regex")
});

/// Build documents for a batch, loading crutches exactly once.
///
/// # Errors
///
/// Propagates crutch lookup failures.
pub fn build<S: CrutchSource + ?Sized>(batch: &[Post], source: &S) -> Result<Vec<IndexedDocument>> {
    let ids: Vec<PostId> = batch
        .iter()
        .filter(|post| !post.is_reblog())
        .map(|post| post.id)
        .collect();
    let crutches = Crutches::load(source, &ids)?;
    Ok(build_with_crutches(batch, &crutches))
}

/// Build documents in parallel from already-loaded crutches.
#[must_use]
pub fn build_with_crutches(batch: &[Post], crutches: &Crutches) -> Vec<IndexedDocument> {
    batch
        .par_iter()
        .filter(|post| !post.is_reblog())
        .map(|post| IndexedDocument::from_post(post, crutches))
        .collect()
}

impl IndexedDocument {
    /// Assemble the document for a non-reblog post.
    #[must_use]
    pub fn from_post(post: &Post, crutches: &Crutches) -> Self {
        Self {
            id: post.id,
            account_id: post.account_id,
            text: searchable_text(post),
            searchable_by: searchable_by(post, crutches),
            created_at: post.created_at,
        }
    }
}

/// Content warning, plain body and non-empty media descriptions.
#[must_use]
pub fn searchable_text(post: &Post) -> String {
    let body = plaintext(post);
    let descriptions = post
        .media_attachments
        .iter()
        .filter_map(|media| media.description.as_deref())
        .filter(|description| !description.is_empty());

    [post.spoiler_text.as_str(), body.as_ref()]
        .into_iter()
        .chain(descriptions)
        .join(PART_SEPARATOR)
}

/// Plain text of the body.
///
/// Local posts store their source text; remote posts carry HTML whose line
/// breaks survive as newlines.
#[must_use]
pub fn plaintext(post: &Post) -> Cow<'_, str> {
    if post.local {
        Cow::Borrowed(post.text.as_str())
    } else {
        html_to_text(&post.text)
    }
}

/// Strip markup from a fragment of status HTML.
#[must_use]
pub fn html_to_text(html: &str) -> Cow<'_, str> {
    let bytes = html.as_bytes();
    if memchr::memchr2(b'<', b'&', bytes).is_none() {
        return Cow::Borrowed(html);
    }

    let with_breaks = LINE_BREAKS.replace_all(html, "\n");
    let stripped = TAGS.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);
    Cow::Owned(decoded.trim_end_matches('\n').to_string())
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    if memchr::memchr(b'&', text.as_bytes()).is_none() {
        return Cow::Borrowed(text);
    }

    ENTITIES.replace_all(text, |caps: &regex::Captures<'_>| {
        let decoded = if let Some(dec) = caps.get(1) {
            dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
        } else if let Some(hex) = caps.get(2) {
            u32::from_str_radix(hex.as_str(), 16)
                .ok()
                .and_then(char::from_u32)
        } else {
            caps.get(3).and_then(|name| named_entity(name.as_str()))
        };
        decoded.map_or_else(|| caps[0].to_string(), |ch| ch.to_string())
    })
}

fn named_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        _ => None,
    }
}

/// Accounts allowed to find the post through search.
///
/// Union of mentioned, favouriting and reblogging accounts, sorted and
/// deduplicated. The author is only present when one of those edges adds them.
#[must_use]
pub fn searchable_by(post: &Post, crutches: &Crutches) -> Vec<AccountId> {
    crutches
        .mentions_of(post.id)
        .iter()
        .chain(crutches.favourites_of(post.id))
        .chain(crutches.reblogs_of(post.id))
        .copied()
        .sorted_unstable()
        .dedup()
        .collect()
}
