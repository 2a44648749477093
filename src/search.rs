//! Tantivy-based status index.
//!
//! The schema and analyzers come from [`AnalysisSettings`]. Text is indexed
//! twice, n-gram analyzed for substring matching and stemmed for whole-word
//! matching. `searchable_by` is a multi-valued long field checked at query
//! time. Writes land on commit; readers only see them after a refresh.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use crate::analysis::{
    AnalysisSettings, FIELD_ACCOUNT_ID, FIELD_CREATED_AT, FIELD_ID, FIELD_SEARCHABLE_BY,
    FIELD_TEXT, FIELD_TEXT_STEMMED, FieldType,
};
use crate::error::{Result, ResultExt, StatusdexError};
use crate::model::{AccountId, IndexedDocument, SearchHit};
use crate::tokenizer::register_analyzers;

/// File beside the index recording the analysis it was built with.
pub const ANALYSIS_FILE: &str = "statusdex_analysis.json";

const REQUIRED_FIELDS: &[&str] = &[
    FIELD_ID,
    FIELD_ACCOUNT_ID,
    FIELD_TEXT,
    FIELD_TEXT_STEMMED,
    FIELD_SEARCHABLE_BY,
    FIELD_CREATED_AT,
];

/// Build the Tantivy schema from field mappings.
fn build_schema(settings: &AnalysisSettings) -> Schema {
    let mut schema_builder = Schema::builder();

    for mapping in &settings.mappings {
        match mapping.field_type {
            FieldType::Long => {
                let mut options = NumericOptions::default().set_indexed();
                if mapping.stored {
                    options = options.set_stored();
                }
                if mapping.fast {
                    options = options.set_fast();
                }
                schema_builder.add_i64_field(&mapping.name, options);
            }
            FieldType::Text => {
                let analyzer = mapping.analyzer.as_deref().unwrap_or("default");
                let mut options = TextOptions::default().set_indexing_options(
                    TextFieldIndexing::default()
                        .set_tokenizer(analyzer)
                        .set_index_option(IndexRecordOption::WithFreqsAndPositions),
                );
                if mapping.stored {
                    options = options.set_stored();
                }
                schema_builder.add_text_field(&mapping.name, options);
            }
        }
    }

    schema_builder.build()
}

/// What is written to [`ANALYSIS_FILE`].
#[derive(Debug, Serialize, Deserialize)]
struct AnalysisMarker {
    fingerprint: String,
    settings: AnalysisSettings,
}

#[derive(Debug, Clone, Copy)]
struct Fields {
    id: Field,
    account_id: Field,
    text: Field,
    text_stemmed: Field,
    searchable_by: Field,
    created_at: Field,
}

impl Fields {
    fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            id: schema.get_field(FIELD_ID)?,
            account_id: schema.get_field(FIELD_ACCOUNT_ID)?,
            text: schema.get_field(FIELD_TEXT)?,
            text_stemmed: schema.get_field(FIELD_TEXT_STEMMED)?,
            searchable_by: schema.get_field(FIELD_SEARCHABLE_BY)?,
            created_at: schema.get_field(FIELD_CREATED_AT)?,
        })
    }
}

/// Search engine wrapping Tantivy
pub struct SearchEngine {
    index: Index,
    reader: IndexReader,
    fields: Fields,
    copy_fields: Vec<Field>,
    settings: AnalysisSettings,
    index_path: Option<PathBuf>,
    last_refresh: Mutex<Instant>,
}

impl SearchEngine {
    /// Create or open an index at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::AnalysisMismatch`] when the index on disk was
    /// built with different analysis settings, or an error if the directory
    /// cannot be created or opened.
    pub fn open(index_path: impl AsRef<Path>, settings: AnalysisSettings) -> Result<Self> {
        let index_path = index_path.as_ref();
        settings.validate()?;
        settings.require_fields(REQUIRED_FIELDS)?;
        std::fs::create_dir_all(index_path)
            .map_err(|e| StatusdexError::path_error("create", index_path, e))?;

        let current = settings.fingerprint()?;
        let index = if index_path.join("meta.json").exists() {
            let on_disk = read_marker(index_path)?;
            if on_disk.as_deref() != Some(current.as_str()) {
                return Err(StatusdexError::AnalysisMismatch {
                    on_disk: on_disk.unwrap_or_else(|| "none".to_string()),
                    current,
                });
            }
            Index::open_in_dir(index_path)
                .with_context(|| format!("Failed to open index at {}", index_path.display()))?
        } else {
            let index = Index::create_in_dir(index_path, build_schema(&settings))
                .with_context(|| format!("Failed to create index at {}", index_path.display()))?;
            write_marker(index_path, &settings, &current)?;
            info!("Created index at {}", index_path.display());
            index
        };

        Self::from_index(index, settings, Some(index_path.to_path_buf()))
    }

    /// Open an index that must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::IndexNotFound`] if nothing has been indexed
    /// at `index_path`, otherwise the errors of [`SearchEngine::open`].
    pub fn open_existing(index_path: impl AsRef<Path>, settings: AnalysisSettings) -> Result<Self> {
        let index_path = index_path.as_ref();
        if !index_path.join("meta.json").exists() {
            return Err(StatusdexError::index_not_found(index_path));
        }
        Self::open(index_path, settings)
    }

    /// Delete any index at `index_path` and create a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the old directory cannot be removed or the new
    /// index cannot be created.
    pub fn recreate(index_path: impl AsRef<Path>, settings: AnalysisSettings) -> Result<Self> {
        let index_path = index_path.as_ref();
        if index_path.exists() {
            std::fs::remove_dir_all(index_path)
                .map_err(|e| StatusdexError::path_error("remove", index_path, e))?;
            info!("Removed existing index at {}", index_path.display());
        }
        Self::open(index_path, settings)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn open_memory(settings: AnalysisSettings) -> Result<Self> {
        settings.validate()?;
        settings.require_fields(REQUIRED_FIELDS)?;
        let index = Index::create_in_ram(build_schema(&settings));
        Self::from_index(index, settings, None)
    }

    fn from_index(index: Index, settings: AnalysisSettings, index_path: Option<PathBuf>) -> Result<Self> {
        register_analyzers(&index, &settings)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let schema = index.schema();
        let fields = Fields::resolve(&schema)?;
        let copy_fields = settings
            .copies_of(FIELD_TEXT)
            .map(|m| schema.get_field(&m.name))
            .collect::<tantivy::Result<Vec<_>>>()?;

        Ok(Self {
            index,
            reader,
            fields,
            copy_fields,
            settings,
            index_path,
            last_refresh: Mutex::new(Instant::now()),
        })
    }

    /// Return the on-disk index path when available.
    #[must_use]
    pub fn index_path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    #[must_use]
    pub const fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.settings.refresh_interval
    }

    /// Get a writer for indexing.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer cannot be created.
    pub fn writer(&self, heap_size: usize) -> Result<IndexWriter> {
        self.index
            .writer(heap_size)
            .context("Failed to create index writer")
    }

    /// Reload the reader so committed writes become searchable.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be reloaded.
    pub fn refresh(&self) -> Result<()> {
        self.reader.reload()?;
        *self.last_refresh.lock() = Instant::now();
        debug!("Index reader refreshed");
        Ok(())
    }

    /// Refresh when the refresh interval has elapsed; returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader cannot be reloaded.
    pub fn refresh_if_due(&self) -> Result<bool> {
        let due = self.last_refresh.lock().elapsed() >= self.settings.refresh_interval;
        if due {
            self.refresh()?;
        }
        Ok(due)
    }

    /// Upsert documents keyed by id.
    ///
    /// Any earlier document with the same id is deleted first, so repeated
    /// and out-of-order writes converge on the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if any document cannot be added to the index.
    pub fn index_documents(&self, writer: &mut IndexWriter, docs: &[IndexedDocument]) -> Result<usize> {
        let f = self.fields;

        let mut count = 0;
        for document in docs {
            writer.delete_term(Term::from_field_i64(f.id, document.id));

            let mut doc = TantivyDocument::default();
            doc.add_i64(f.id, document.id);
            doc.add_i64(f.account_id, document.account_id);
            doc.add_text(f.text, &document.text);
            for copy in &self.copy_fields {
                doc.add_text(*copy, &document.text);
            }
            for account in &document.searchable_by {
                doc.add_i64(f.searchable_by, *account);
            }
            doc.add_i64(f.created_at, document.created_at.timestamp());

            writer.add_document(doc)?;
            count += 1;
        }

        debug!("Indexed {} documents", count);
        Ok(count)
    }

    /// Terms the field's analyzer produces for `text`, deduplicated.
    fn query_terms(&self, field: Field, text: &str) -> Result<Vec<Term>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut terms: Vec<Term> = Vec::new();
        while stream.advance() {
            let term = Term::from_field_text(field, &stream.token().text);
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        Ok(terms)
    }

    /// Search on behalf of `viewer`.
    ///
    /// A status matches when every query n-gram hits `text` or every stemmed
    /// query term hits `text_stemmed`, and the viewer is either listed in
    /// `searchable_by` or is the author.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::InvalidQuery`] when the query yields no
    /// terms, or an error if the search fails.
    pub fn search(
        &self,
        query_str: &str,
        viewer: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let f = self.fields;

        let ngram_terms = self.query_terms(f.text, query_str)?;
        let stemmed_terms = self.query_terms(f.text_stemmed, query_str)?;
        if ngram_terms.is_empty() && stemmed_terms.is_empty() {
            return Err(StatusdexError::invalid_query(format!(
                "'{query_str}' produces no searchable terms"
            )));
        }

        let mut text_match: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(2);
        if !ngram_terms.is_empty() {
            text_match.push((Occur::Should, all_terms(ngram_terms)));
        }
        if !stemmed_terms.is_empty() {
            text_match.push((Occur::Should, all_terms(stemmed_terms)));
        }

        let visibility = BooleanQuery::new(vec![
            (Occur::Should, term_query(Term::from_field_i64(f.searchable_by, viewer))),
            (Occur::Should, term_query(Term::from_field_i64(f.account_id, viewer))),
        ]);

        let query = BooleanQuery::new(vec![
            (Occur::Must, Box::new(BooleanQuery::new(text_match)) as Box<dyn Query>),
            (Occur::Must, Box::new(visibility)),
        ]);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit).and_offset(offset))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;

            let id = doc.get_first(f.id).and_then(|v| v.as_i64()).unwrap_or(0);
            let account_id = doc
                .get_first(f.account_id)
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            let text = doc
                .get_first(f.text)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let created_at_ts = doc
                .get_first(f.created_at)
                .and_then(|v| v.as_i64())
                .unwrap_or(0);

            results.push(SearchHit {
                id,
                account_id,
                text,
                created_at: DateTime::<Utc>::from_timestamp(created_at_ts, 0).unwrap_or_default(),
                score,
            });
        }

        Ok(results)
    }

    /// Get document count.
    #[must_use]
    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Delete all documents and reset the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be cleared or committed.
    pub fn clear(&self) -> Result<()> {
        let mut writer = self.writer(50_000_000)?;
        writer.delete_all_documents()?;
        writer.commit()?;
        self.refresh()?;
        Ok(())
    }
}

fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
}

fn all_terms(terms: Vec<Term>) -> Box<dyn Query> {
    Box::new(BooleanQuery::new(
        terms
            .into_iter()
            .map(|term| (Occur::Must, term_query(term)))
            .collect(),
    ))
}

fn read_marker(index_path: &Path) -> Result<Option<String>> {
    let path = index_path.join(ANALYSIS_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(&path).map_err(|e| StatusdexError::path_error("read", &path, e))?;
    let marker: AnalysisMarker = serde_json::from_str(&content)
        .map_err(|e| StatusdexError::parse_error(path.display().to_string(), e.to_string()))?;
    Ok(Some(marker.fingerprint))
}

fn write_marker(index_path: &Path, settings: &AnalysisSettings, fingerprint: &str) -> Result<()> {
    let path = index_path.join(ANALYSIS_FILE);
    let marker = AnalysisMarker {
        fingerprint: fingerprint.to_string(),
        settings: settings.clone(),
    };
    let content = serde_json::to_string_pretty(&marker)?;
    std::fs::write(&path, content).map_err(|e| StatusdexError::path_error("write", &path, e))
}
