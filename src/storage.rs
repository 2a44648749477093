//! `SQLite` storage for statuses, edges and filter rules.
//!
//! This is the upstream data provider for indexing: posts are paged by id and
//! mention, favourite and reblog edges are served in bulk through
//! [`CrutchSource`].

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

use crate::crutch::{CrutchSource, EdgeMap, group_edges};
use crate::error::{Result, ResultExt, StatusdexError};
use crate::model::{AccountId, FilterContext, FilterRule, MediaAttachment, Post, PostId};

const SCHEMA_VERSION: i32 = 1;
// SQLite default limit on host parameters is usually 999 or 32766.
// We use a safe batch size to avoid "too many SQL variables" errors.
const SQLITE_BATCH_SIZE: usize = 900;

const POST_COLUMNS: &str =
    "id, account_id, spoiler_text, text, local, reblog_of_id, created_at";

fn parse_rfc3339_or_epoch(value: Option<String>) -> DateTime<Utc> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc))
}

fn parse_rfc3339_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn placeholders(n: usize) -> String {
    std::iter::repeat_n("?", n).join(",")
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        account_id: row.get(1)?,
        spoiler_text: row.get(2)?,
        text: row.get(3)?,
        local: row.get::<_, i32>(4)? != 0,
        media_attachments: Vec::new(),
        reblog_of_id: row.get(5)?,
        created_at: parse_rfc3339_or_epoch(row.get(6)?),
    })
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StorageCounts {
    pub posts: i64,
    pub reblogs: i64,
    pub media_attachments: i64,
    pub mentions: i64,
    pub favourites: i64,
    pub filters: i64,
}

/// Edge tables sharing the `(post_id, account_id)` layout.
#[derive(Debug, Clone, Copy)]
enum EdgeTable {
    Mentions,
    Favourites,
}

impl EdgeTable {
    const fn name(self) -> &'static str {
        match self {
            Self::Mentions => "mentions",
            Self::Favourites => "favourites",
        }
    }
}

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).with_context(|| {
            format!("Failed to open database at {}", db_path.as_ref().display())
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open a database that must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::DatabaseNotFound`] if there is no file at
    /// `db_path`.
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if !db_path.exists() {
            return Err(StatusdexError::database_not_found(db_path));
        }
        Self::open(db_path)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version > SCHEMA_VERSION {
            return Err(StatusdexError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }
        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL,
                spoiler_text TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL DEFAULT '',
                local INTEGER NOT NULL DEFAULT 1,
                reblog_of_id INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_reblog_of_id ON posts(reblog_of_id);
            CREATE INDEX IF NOT EXISTS idx_posts_account_id ON posts(account_id);

            CREATE TABLE IF NOT EXISTS media_attachments (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL,
                description TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_media_post_id ON media_attachments(post_id);

            CREATE TABLE IF NOT EXISTS mentions (
                post_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, account_id)
            );

            CREATE TABLE IF NOT EXISTS favourites (
                post_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, account_id)
            );

            CREATE TABLE IF NOT EXISTS filters (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL,
                phrase TEXT NOT NULL,
                whole_word INTEGER NOT NULL DEFAULT 0,
                context_json TEXT NOT NULL DEFAULT '[]',
                expires_at TEXT,
                irreversible INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_filters_account_id ON filters(account_id);
            ",
        )?;
        Ok(())
    }

    /// Store posts and their media in a transaction.
    ///
    /// Re-storing a post replaces it along with its media.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn store_posts(&mut self, posts: &[Post]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            for chunk in posts.chunks(SQLITE_BATCH_SIZE) {
                let delete_sql = format!(
                    "DELETE FROM media_attachments WHERE post_id IN ({})",
                    placeholders(chunk.len())
                );
                let mut delete_stmt = tx.prepare_cached(&delete_sql)?;
                delete_stmt.execute(params_from_iter(chunk.iter().map(|p| p.id)))?;
            }

            let mut stmt = tx.prepare(
                r"
                INSERT OR REPLACE INTO posts
                (id, account_id, spoiler_text, text, local, reblog_of_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            let mut media_stmt = tx.prepare(
                "INSERT OR REPLACE INTO media_attachments (id, post_id, description) VALUES (?, ?, ?)",
            )?;

            for post in posts {
                stmt.execute(params![
                    post.id,
                    post.account_id,
                    post.spoiler_text,
                    post.text,
                    i32::from(post.local),
                    post.reblog_of_id,
                    post.created_at.to_rfc3339(),
                ])?;
                for media in &post.media_attachments {
                    media_stmt.execute(params![media.id, post.id, media.description])?;
                }
                count += 1;
            }
        }

        tx.commit()?;
        info!("Stored {} posts", count);
        Ok(count)
    }

    fn store_edges(&mut self, table: EdgeTable, edges: &[(PostId, AccountId)]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let sql = format!(
                "INSERT OR IGNORE INTO {} (post_id, account_id) VALUES (?, ?)",
                table.name()
            );
            let mut stmt = tx.prepare(&sql)?;
            for (post_id, account_id) in edges {
                count += stmt.execute(params![post_id, account_id])?;
            }
        }

        tx.commit()?;
        info!("Stored {} {}", count, table.name());
        Ok(count)
    }

    /// Store mention edges; duplicates are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn store_mentions(&mut self, edges: &[(PostId, AccountId)]) -> Result<usize> {
        self.store_edges(EdgeTable::Mentions, edges)
    }

    /// Store favourite edges; duplicates are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn store_favourites(&mut self, edges: &[(PostId, AccountId)]) -> Result<usize> {
        self.store_edges(EdgeTable::Favourites, edges)
    }

    /// Store filter rules, replacing rules with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub fn store_filters(&mut self, rules: &[FilterRule]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                r"
                INSERT OR REPLACE INTO filters
                (id, account_id, phrase, whole_word, context_json, expires_at, irreversible)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for rule in rules {
                stmt.execute(params![
                    rule.id,
                    rule.account_id,
                    rule.phrase,
                    i32::from(rule.whole_word),
                    serde_json::to_string(&rule.context)?,
                    rule.expires_at.map(|at| at.to_rfc3339()),
                    i32::from(rule.irreversible),
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        info!("Stored {} filters", count);
        Ok(count)
    }

    /// Fill in media attachments for already-loaded posts.
    fn attach_media(&self, posts: &mut [Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut by_post: HashMap<PostId, Vec<MediaAttachment>> = HashMap::new();
        for chunk in posts.chunks(SQLITE_BATCH_SIZE) {
            let sql = format!(
                "SELECT id, post_id, description FROM media_attachments WHERE post_id IN ({}) ORDER BY id",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|p| p.id)), |row| {
                Ok((
                    row.get::<_, PostId>(1)?,
                    MediaAttachment {
                        id: row.get(0)?,
                        description: row.get(2)?,
                    },
                ))
            })?;
            for row in rows {
                let (post_id, media) = row?;
                by_post.entry(post_id).or_default().push(media);
            }
        }

        for post in posts.iter_mut() {
            if let Some(media) = by_post.remove(&post.id) {
                post.media_attachments = media;
            }
        }
        Ok(())
    }

    /// Next page of posts with id greater than `after`, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn load_batch(&self, after: Option<PostId>, limit: usize) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id > ? ORDER BY id LIMIT ?");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut posts = stmt
            .query_map(
                params![after.unwrap_or(i64::MIN), limit_to_i64(limit)],
                post_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        self.attach_media(&mut posts)?;
        debug!(after = ?after, loaded = posts.len(), "loaded post batch");
        Ok(posts)
    }

    /// Most recent posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn latest_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC LIMIT ?");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut posts = stmt
            .query_map(params![limit_to_i64(limit)], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        self.attach_media(&mut posts)?;
        Ok(posts)
    }

    /// Posts for `ids`, in the order given. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        let mut found: HashMap<PostId, Post> = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(SQLITE_BATCH_SIZE) {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), post_from_row)?;
            for row in rows {
                let post = row?;
                found.insert(post.id, post);
            }
        }

        let mut posts: Vec<Post> = ids
            .iter()
            .unique()
            .filter_map(|id| found.remove(id))
            .collect();
        self.attach_media(&mut posts)?;
        Ok(posts)
    }

    /// A single post.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::NotFound`] if no post has this id.
    pub fn post(&self, id: PostId) -> Result<Post> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");
        let post = self
            .conn
            .query_row(&sql, params![id], post_from_row)
            .optional()?;
        let mut posts = vec![post.ok_or_else(|| StatusdexError::not_found("post", id.to_string()))?];
        self.attach_media(&mut posts)?;
        Ok(posts.remove(0))
    }

    /// Every filter rule owned by `account_id`, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored context list is corrupt.
    pub fn filters_for_account(&self, account_id: AccountId) -> Result<Vec<FilterRule>> {
        let mut stmt = self.conn.prepare_cached(
            r"
            SELECT id, account_id, phrase, whole_word, context_json, expires_at, irreversible
            FROM filters
            WHERE account_id = ?
            ORDER BY id
            ",
        )?;

        let rows = stmt
            .query_map(params![account_id], |row| {
                Ok((
                    FilterRule {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        phrase: row.get(2)?,
                        whole_word: row.get::<_, i32>(3)? != 0,
                        context: Vec::new(),
                        expires_at: parse_rfc3339_opt(row.get(5)?),
                        irreversible: row.get::<_, i32>(6)? != 0,
                    },
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut rule, context_json)| -> Result<FilterRule> {
                rule.context = serde_json::from_str::<Vec<FilterContext>>(&context_json)?;
                Ok(rule)
            })
            .collect()
    }

    /// Row counts for every table.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn counts(&self) -> Result<StorageCounts> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(StorageCounts {
            posts: count("SELECT COUNT(*) FROM posts")?,
            reblogs: count("SELECT COUNT(*) FROM posts WHERE reblog_of_id IS NOT NULL")?,
            media_attachments: count("SELECT COUNT(*) FROM media_attachments")?,
            mentions: count("SELECT COUNT(*) FROM mentions")?,
            favourites: count("SELECT COUNT(*) FROM favourites")?,
            filters: count("SELECT COUNT(*) FROM filters")?,
        })
    }

    /// Number of posts that produce index documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn indexable_post_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE reblog_of_id IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    fn lookup_edges(&self, select: &str, key_column: &str, ids: &[PostId]) -> Result<EdgeMap> {
        let mut rows: Vec<(PostId, AccountId)> = Vec::new();
        for chunk in ids.chunks(SQLITE_BATCH_SIZE) {
            let sql = format!(
                "{select} WHERE {key_column} IN ({}) ORDER BY rowid",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let chunk_rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.extend(chunk_rows);
        }
        Ok(group_edges(rows))
    }
}

impl CrutchSource for Storage {
    fn mentions(&self, ids: &[PostId]) -> Result<EdgeMap> {
        self.lookup_edges("SELECT post_id, account_id FROM mentions", "post_id", ids)
    }

    fn favourites(&self, ids: &[PostId]) -> Result<EdgeMap> {
        self.lookup_edges("SELECT post_id, account_id FROM favourites", "post_id", ids)
    }

    fn reblogs(&self, ids: &[PostId]) -> Result<EdgeMap> {
        self.lookup_edges(
            "SELECT reblog_of_id, account_id FROM posts",
            "reblog_of_id",
            ids,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crutch::Crutches;
    use chrono::Duration;

    fn create_test_post(id: PostId, account_id: AccountId, text: &str) -> Post {
        Post {
            id,
            account_id,
            spoiler_text: String::new(),
            text: text.to_string(),
            local: true,
            media_attachments: vec![],
            reblog_of_id: None,
            created_at: Utc::now(),
        }
    }

    fn create_test_rule(id: i64, account_id: AccountId, phrase: &str) -> FilterRule {
        FilterRule {
            id,
            account_id,
            phrase: phrase.to_string(),
            whole_word: true,
            context: vec![FilterContext::Home, FilterContext::Thread],
            expires_at: None,
            irreversible: false,
        }
    }

    #[test]
    fn test_storage_memory() {
        let storage = Storage::open_memory().unwrap();
        let counts = storage.counts().unwrap();
        assert_eq!(counts.posts, 0);
        assert_eq!(counts.filters, 0);
    }

    #[test]
    fn posts_roundtrip_with_media() {
        let mut storage = Storage::open_memory().unwrap();
        let mut post = create_test_post(1, 10, "hello");
        post.spoiler_text = "cw".to_string();
        post.local = false;
        post.media_attachments = vec![
            MediaAttachment {
                id: 5,
                description: Some("a cat".to_string()),
            },
            MediaAttachment {
                id: 6,
                description: None,
            },
        ];
        storage.store_posts(&[post.clone()]).unwrap();

        let loaded = storage.post(1).unwrap();
        assert_eq!(loaded.spoiler_text, "cw");
        assert!(!loaded.local);
        assert_eq!(loaded.media_attachments, post.media_attachments);
        assert_eq!(loaded.created_at.timestamp(), post.created_at.timestamp());
    }

    #[test]
    fn restoring_a_post_replaces_media() {
        let mut storage = Storage::open_memory().unwrap();
        let mut post = create_test_post(1, 10, "hello");
        post.media_attachments = vec![MediaAttachment {
            id: 5,
            description: Some("old".to_string()),
        }];
        storage.store_posts(&[post.clone()]).unwrap();

        post.media_attachments = vec![MediaAttachment {
            id: 7,
            description: Some("new".to_string()),
        }];
        storage.store_posts(&[post]).unwrap();

        let loaded = storage.post(1).unwrap();
        assert_eq!(loaded.media_attachments.len(), 1);
        assert_eq!(loaded.media_attachments[0].id, 7);
        assert_eq!(storage.counts().unwrap().media_attachments, 1);
    }

    #[test]
    fn missing_post_is_not_found() {
        let storage = Storage::open_memory().unwrap();
        let err = storage.post(42).unwrap_err();
        assert!(matches!(err, StatusdexError::NotFound { .. }));
    }

    #[test]
    fn batches_page_by_id() {
        let mut storage = Storage::open_memory().unwrap();
        let posts: Vec<Post> = (1..=7).map(|i| create_test_post(i, 1, "x")).collect();
        storage.store_posts(&posts).unwrap();

        let first = storage.load_batch(None, 3).unwrap();
        assert_eq!(first.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let second = storage.load_batch(Some(3), 3).unwrap();
        assert_eq!(second.iter().map(|p| p.id).collect::<Vec<_>>(), vec![4, 5, 6]);
        let third = storage.load_batch(Some(6), 3).unwrap();
        assert_eq!(third.iter().map(|p| p.id).collect::<Vec<_>>(), vec![7]);
        assert!(storage.load_batch(Some(7), 3).unwrap().is_empty());

        let latest = storage.latest_posts(2).unwrap();
        assert_eq!(latest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![7, 6]);
    }

    #[test]
    fn posts_by_ids_keeps_request_order() {
        let mut storage = Storage::open_memory().unwrap();
        let posts: Vec<Post> = (1..=3).map(|i| create_test_post(i, 1, "x")).collect();
        storage.store_posts(&posts).unwrap();

        let loaded = storage.posts_by_ids(&[3, 99, 1, 3]).unwrap();
        assert_eq!(loaded.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 1]);
    }

    #[test]
    fn crutches_come_from_edges_and_reblogs() {
        let mut storage = Storage::open_memory().unwrap();
        let mut boost = create_test_post(3, 30, "");
        boost.reblog_of_id = Some(1);
        storage
            .store_posts(&[create_test_post(1, 10, "a"), create_test_post(2, 20, "b"), boost])
            .unwrap();
        storage.store_mentions(&[(1, 11), (1, 12), (1, 11)]).unwrap();
        storage.store_favourites(&[(2, 21)]).unwrap();

        let crutches = Crutches::load(&storage, &[1, 2]).unwrap();
        assert_eq!(crutches.mentions_of(1), &[11, 12]);
        assert_eq!(crutches.favourites_of(2), &[21]);
        assert_eq!(crutches.reblogs_of(1), &[30]);
        assert!(crutches.reblogs_of(2).is_empty());
        assert_eq!(storage.counts().unwrap().mentions, 2);
    }

    #[test]
    fn edge_lookups_chunk_large_id_lists() {
        let mut storage = Storage::open_memory().unwrap();
        let edges: Vec<(PostId, AccountId)> = (1..=2000).map(|i| (i, i + 1)).collect();
        storage.store_mentions(&edges).unwrap();

        let ids: Vec<PostId> = (1..=2000).collect();
        let map = storage.mentions(&ids).unwrap();
        assert_eq!(map.len(), 2000);
        assert_eq!(map[&1500], vec![1501]);
    }

    #[test]
    fn filters_roundtrip() {
        let mut storage = Storage::open_memory().unwrap();
        let mut expiring = create_test_rule(2, 1, "later");
        expiring.expires_at = Some(Utc::now() + Duration::hours(1));
        expiring.irreversible = true;
        storage
            .store_filters(&[create_test_rule(1, 1, "spoiler"), expiring, create_test_rule(3, 2, "other")])
            .unwrap();

        let rules = storage.filters_for_account(1).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].phrase, "spoiler");
        assert_eq!(rules[0].context, vec![FilterContext::Home, FilterContext::Thread]);
        assert!(rules[0].whole_word);
        assert!(rules[1].irreversible);
        assert!(rules[1].expires_at.is_some());
        assert!(storage.filters_for_account(9).unwrap().is_empty());
    }

    #[test]
    fn indexable_count_skips_reblogs() {
        let mut storage = Storage::open_memory().unwrap();
        let mut boost = create_test_post(2, 1, "");
        boost.reblog_of_id = Some(1);
        storage
            .store_posts(&[create_test_post(1, 1, "x"), boost])
            .unwrap();
        assert_eq!(storage.indexable_post_count().unwrap(), 1);
        assert_eq!(storage.counts().unwrap().reblogs, 1);
    }

    #[test]
    fn on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statusdex.db");
        assert!(matches!(
            Storage::open_existing(&path).err().unwrap(),
            StatusdexError::DatabaseNotFound { .. }
        ));
        {
            let mut storage = Storage::open(&path).unwrap();
            storage.store_posts(&[create_test_post(1, 1, "kept")]).unwrap();
        }
        let storage = Storage::open_existing(&path).unwrap();
        assert_eq!(storage.post(1).unwrap().text, "kept");
    }
}
