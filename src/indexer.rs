//! Batch indexing pipeline.
//!
//! ```text
//! loader thread ──IndexBatch──▶ worker threads ──documents──▶ writer (caller)
//! ```
//!
//! The loader owns the data source, pages posts by id and loads crutches for
//! each batch with three bulk lookups. Workers assemble documents. The calling
//! thread owns the index writer and upserts, so batches may finish in any
//! order. The first error stops the pipeline and nothing is committed.

use std::num::NonZeroUsize;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, info, warn};

use crate::crutch::{CrutchSource, Crutches};
use crate::document::build_with_crutches;
use crate::error::{Result, StatusdexError};
use crate::{log_metric, log_progress};
use crate::model::{IndexedDocument, Post, PostId};
use crate::perf::{self, Timer};
use crate::search::SearchEngine;
use crate::storage::Storage;

/// Posts paged by ascending id, plus their edges.
pub trait PostSource: CrutchSource {
    /// Up to `limit` posts with id greater than `after`, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream read fails.
    fn load_batch(&self, after: Option<PostId>, limit: usize) -> Result<Vec<Post>>;
}

impl PostSource for Storage {
    fn load_batch(&self, after: Option<PostId>, limit: usize) -> Result<Vec<Post>> {
        Self::load_batch(self, after, limit)
    }
}

/// Tuning for one indexing run.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub batch_size: usize,
    /// Worker threads; 0 uses the available parallelism.
    pub jobs: usize,
    pub writer_heap_bytes: usize,
    /// Expected number of indexable posts, for progress logging.
    pub expected_posts: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            jobs: 0,
            writer_heap_bytes: 128 * 1024 * 1024,
            expected_posts: 0,
        }
    }
}

impl IndexOptions {
    fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexReport {
    pub batches: usize,
    pub posts_seen: usize,
    pub documents: usize,
    pub reblogs_skipped: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl IndexReport {
    /// Indexing throughput; zero when no time was measured.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn documents_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.documents as f64 / secs
        } else {
            0.0
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

/// One page of posts with its crutches.
struct IndexBatch {
    number: usize,
    posts: Vec<Post>,
    crutches: Crutches,
}

struct BuiltBatch {
    number: usize,
    posts_seen: usize,
    documents: Vec<IndexedDocument>,
}

fn load_batches<S: PostSource>(source: &S, batch_size: usize, tx: &Sender<Result<IndexBatch>>) {
    let mut after: Option<PostId> = None;
    let mut number = 0;

    loop {
        let loaded = source.load_batch(after, batch_size).and_then(|posts| {
            let ids: Vec<PostId> = posts
                .iter()
                .filter(|post| !post.is_reblog())
                .map(|post| post.id)
                .collect();
            let timer = Timer::start(perf::CRUTCH_LOAD);
            let crutches = Crutches::load(source, &ids)?;
            timer.stop();
            Ok((posts, crutches))
        });

        let (posts, crutches) = match loaded {
            Ok((posts, _)) if posts.is_empty() => return,
            Ok(loaded) => loaded,
            Err(err) => {
                tx.send(Err(err)).ok();
                return;
            }
        };

        after = posts.last().map(|post| post.id);
        let short = posts.len() < batch_size;
        number += 1;
        debug!(batch = number, posts = posts.len(), "loaded batch");

        if tx
            .send(Ok(IndexBatch {
                number,
                posts,
                crutches,
            }))
            .is_err()
        {
            return;
        }
        if short {
            return;
        }
    }
}

fn build_batches(rx: &Receiver<Result<IndexBatch>>, tx: &Sender<Result<BuiltBatch>>) {
    for batch in rx {
        let built = batch.map(|batch| {
            let timer = Timer::start(perf::DOCUMENT_BUILD);
            let documents = build_with_crutches(&batch.posts, &batch.crutches);
            timer.stop();
            BuiltBatch {
                number: batch.number,
                posts_seen: batch.posts.len(),
                documents,
            }
        });
        if tx.send(built).is_err() {
            return;
        }
    }
}

/// Index every post from `source` into `engine` and commit.
///
/// `on_progress` receives the running count of posts processed.
///
/// # Errors
///
/// Returns the first load, build or write failure. Nothing is committed when
/// an error occurs.
pub fn run<S, F>(
    source: S,
    engine: &SearchEngine,
    options: &IndexOptions,
    mut on_progress: F,
) -> Result<IndexReport>
where
    S: PostSource + Send,
    F: FnMut(usize),
{
    if options.batch_size == 0 {
        return Err(StatusdexError::InvalidArgument {
            reason: "batch size must be at least 1".to_string(),
        });
    }

    let full = Timer::start(perf::INDEX_FULL);
    let workers = options.worker_count();
    let mut writer = engine.writer(options.writer_heap_bytes)?;
    let mut report = IndexReport::default();
    info!(
        workers,
        batch_size = options.batch_size,
        "starting indexing pipeline"
    );

    let outcome: Result<()> = std::thread::scope(|scope| {
        let (batch_tx, batch_rx) = bounded::<Result<IndexBatch>>(workers * 2);
        let (doc_tx, doc_rx) = bounded::<Result<BuiltBatch>>(workers * 2);

        let batch_size = options.batch_size;
        scope.spawn(move || load_batches(&source, batch_size, &batch_tx));

        for _ in 0..workers {
            let rx = batch_rx.clone();
            let tx = doc_tx.clone();
            scope.spawn(move || build_batches(&rx, &tx));
        }
        drop(batch_rx);
        drop(doc_tx);

        let mut result = Ok(());
        for built in &doc_rx {
            let batch = match built {
                Ok(batch) => batch,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };

            let timer = Timer::start(perf::INDEX_BATCH);
            if let Err(err) = engine.index_documents(&mut writer, &batch.documents) {
                result = Err(err);
                break;
            }
            timer.stop();

            report.batches += 1;
            report.posts_seen += batch.posts_seen;
            report.documents += batch.documents.len();
            report.reblogs_skipped += batch.posts_seen - batch.documents.len();
            debug!(
                batch = batch.number,
                documents = batch.documents.len(),
                "indexed batch"
            );
            log_progress!(report.posts_seen, options.expected_posts, "indexing posts");
            on_progress(report.posts_seen);
        }
        // Unblock the loader and workers before the scope joins them.
        drop(doc_rx);
        result
    });

    if let Err(err) = outcome {
        warn!(error = %err, "indexing aborted, rolling back");
        writer.rollback()?;
        return Err(err);
    }

    let timer = Timer::start(perf::INDEX_COMMIT);
    writer.commit()?;
    timer.stop();
    engine.refresh_if_due()?;

    report.duration = full.stop();
    info!(
        batches = report.batches,
        documents = report.documents,
        reblogs_skipped = report.reblogs_skipped,
        "indexing complete"
    );
    log_metric!("index_throughput", report.documents_per_second(), "docs/s");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisSettings;
    use crate::crutch::EdgeMap;
    use chrono::Utc;

    fn post(id: PostId, account_id: i64, text: &str) -> Post {
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

    fn seeded_storage(n: i64) -> Storage {
        let mut storage = Storage::open_memory().unwrap();
        let mut posts: Vec<Post> = (1..=n).map(|i| post(i, 1, &format!("status number {i}"))).collect();
        let mut boost = post(n + 1, 2, "");
        boost.reblog_of_id = Some(1);
        posts.push(boost);
        storage.store_posts(&posts).unwrap();
        storage.store_mentions(&[(1, 7)]).unwrap();
        storage
    }

    fn options(batch_size: usize, jobs: usize) -> IndexOptions {
        IndexOptions {
            batch_size,
            jobs,
            writer_heap_bytes: 15_000_000,
            expected_posts: 0,
        }
    }

    #[test]
    fn indexes_everything_across_batches() {
        let engine = SearchEngine::open_memory(AnalysisSettings::default()).unwrap();
        let mut seen = Vec::new();
        let report = run(seeded_storage(25), &engine, &options(10, 3), |n| seen.push(n)).unwrap();

        assert_eq!(report.posts_seen, 26);
        assert_eq!(report.documents, 25);
        assert_eq!(report.reblogs_skipped, 1);
        assert_eq!(report.batches, 3);
        assert_eq!(seen.last(), Some(&26));

        engine.refresh().unwrap();
        assert_eq!(engine.doc_count(), 25);
        // Mention and reblog edges both grant visibility.
        let hits = engine.search("number", 7, 50, 0).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);
        let hits = engine.search("number", 2, 50, 0).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn reindexing_is_idempotent() {
        let engine = SearchEngine::open_memory(AnalysisSettings::default()).unwrap();
        run(seeded_storage(5), &engine, &options(2, 2), |_| {}).unwrap();
        run(seeded_storage(5), &engine, &options(3, 1), |_| {}).unwrap();
        engine.refresh().unwrap();
        assert_eq!(engine.doc_count(), 5);
    }

    #[test]
    fn empty_source_commits_nothing() {
        let engine = SearchEngine::open_memory(AnalysisSettings::default()).unwrap();
        let report = run(Storage::open_memory().unwrap(), &engine, &options(10, 2), |_| {}).unwrap();
        assert_eq!(report.batches, 0);
        assert_eq!(report.documents, 0);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let engine = SearchEngine::open_memory(AnalysisSettings::default()).unwrap();
        let err = run(Storage::open_memory().unwrap(), &engine, &options(0, 1), |_| {}).unwrap_err();
        assert!(matches!(err, StatusdexError::InvalidArgument { .. }));
    }

    struct FailingSource;

    impl CrutchSource for FailingSource {
        fn mentions(&self, _ids: &[PostId]) -> Result<EdgeMap> {
            Err(StatusdexError::invalid_query("mentions unavailable"))
        }

        fn favourites(&self, _ids: &[PostId]) -> Result<EdgeMap> {
            Ok(EdgeMap::new())
        }

        fn reblogs(&self, _ids: &[PostId]) -> Result<EdgeMap> {
            Ok(EdgeMap::new())
        }
    }

    impl PostSource for FailingSource {
        fn load_batch(&self, after: Option<PostId>, _limit: usize) -> Result<Vec<Post>> {
            Ok(if after.is_none() {
                vec![post(1, 1, "never indexed")]
            } else {
                Vec::new()
            })
        }
    }

    #[test]
    fn crutch_failure_aborts_without_commit() {
        let engine = SearchEngine::open_memory(AnalysisSettings::default()).unwrap();
        let err = run(FailingSource, &engine, &options(10, 2), |_| {}).unwrap_err();
        assert!(matches!(err, StatusdexError::InvalidQuery { .. }));
        engine.refresh().unwrap();
        assert_eq!(engine.doc_count(), 0);
    }

    #[test]
    fn throughput_handles_zero_duration() {
        let mut report = IndexReport {
            documents: 500,
            ..IndexReport::default()
        };
        assert!(report.documents_per_second().abs() < f64::EPSILON);
        report.duration = Duration::from_millis(250);
        assert!((report.documents_per_second() - 2000.0).abs() < 1e-6);
    }
}
