//! Declarative analysis settings for the status index.
//!
//! Char filters, tokenizers, token filters and analyzers are named entries in
//! an explicit data structure, wired together by name and attached to fields
//! through mappings. The structure is validated before use and fingerprinted;
//! the fingerprint is stored beside the index so a changed analysis chain is
//! detected on open instead of silently mixing token formats.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use ring::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};

use crate::config::duration_str;
use crate::error::{Result, StatusdexError};

pub const NGRAM_ANALYZER: &str = "ngram_analyzer";
pub const CONTENT_ANALYZER: &str = "content";

pub const FIELD_ID: &str = "id";
pub const FIELD_ACCOUNT_ID: &str = "account_id";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_TEXT_STEMMED: &str = "text_stemmed";
pub const FIELD_SEARCHABLE_BY: &str = "searchable_by";
pub const FIELD_CREATED_AT: &str = "created_at";

/// Default reader refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Largest allowed spread between `min_gram` and `max_gram`.
pub const MAX_NGRAM_DIFF: usize = 1;

/// Text rewrites applied before tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CharFilterSpec {
    /// NFKC composition with case folding.
    IcuNormalizer,
    /// Expand 々 ゝ ゞ ヽ ヾ into the character they repeat.
    IterationMark,
}

/// Character classes an n-gram may span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenChars {
    Letter,
    Digit,
    Whitespace,
    Punctuation,
    Symbol,
}

impl TokenChars {
    #[must_use]
    pub fn accepts(self, ch: char) -> bool {
        match self {
            Self::Letter => ch.is_alphabetic(),
            Self::Digit => ch.is_numeric(),
            Self::Whitespace => ch.is_whitespace(),
            Self::Punctuation => ch.is_ascii_punctuation() || is_cjk_punctuation(ch),
            Self::Symbol => !ch.is_alphanumeric() && !ch.is_whitespace() && !ch.is_control(),
        }
    }
}

const fn is_cjk_punctuation(ch: char) -> bool {
    matches!(ch, '\u{3001}'..='\u{3003}' | '\u{3008}'..='\u{3011}' | '\u{30FB}')
}

/// How the Japanese tokenizer treats long kanji compounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Dictionary entries stay whole.
    Normal,
    /// Long compounds are decomposed into their dictionary parts.
    #[default]
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenizerSpec {
    /// Overlapping substrings over runs of the accepted classes.
    Ngram {
        min_gram: usize,
        max_gram: usize,
        token_chars: Vec<TokenChars>,
    },
    /// Latin words split on separators; Japanese runs analyzed against IPADIC.
    Japanese {
        #[serde(default)]
        mode: SegmentationMode,
    },
}

/// Part of speech taken from the first IPADIC feature column.
///
/// Latin words and dictionary misses are tagged [`PartOfSpeech::Word`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfSpeech {
    Word,
    Noun,
    /// 名詞,数
    Number,
    Verb,
    Adjective,
    Adverb,
    Adnominal,
    Conjunction,
    Interjection,
    Prefix,
    Particle,
    Auxiliary,
    Symbol,
    Filler,
}

impl PartOfSpeech {
    /// Tag for an IPADIC feature row.
    #[must_use]
    pub fn from_ipadic(features: &[&str]) -> Self {
        match features.first().copied() {
            Some("名詞") if features.get(1).copied() == Some("数") => Self::Number,
            Some("名詞") => Self::Noun,
            Some("動詞") => Self::Verb,
            Some("形容詞") => Self::Adjective,
            Some("副詞") => Self::Adverb,
            Some("連体詞") => Self::Adnominal,
            Some("接続詞") => Self::Conjunction,
            Some("感動詞") => Self::Interjection,
            Some("接頭詞") => Self::Prefix,
            Some("助詞") => Self::Particle,
            Some("助動詞") => Self::Auxiliary,
            Some("記号") => Self::Symbol,
            Some("フィラー") => Self::Filler,
            _ => Self::Word,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopList {
    Japanese,
    English,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemLanguage {
    English,
    PossessiveEnglish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenFilterSpec {
    IcuNormalizer,
    /// Replace conjugated words with their dictionary base form.
    BaseForm,
    PartOfSpeech {
        stoptags: Vec<PartOfSpeech>,
    },
    Stop {
        stopwords: StopList,
    },
    /// Join adjacent numeral tokens and rewrite kanji numerals as digits.
    Number,
    /// Drop a trailing prolonged sound mark from long katakana words.
    KatakanaStemmer {
        minimum_length: usize,
    },
    Stemmer {
        language: StemLanguage,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerSpec {
    #[serde(default)]
    pub char_filters: Vec<String>,
    pub tokenizer: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Long,
    Text,
}

/// How one index field is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default)]
    pub stored: bool,
    #[serde(default)]
    pub fast: bool,
    /// Index the value of another text field with this field's analyzer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_from: Option<String>,
}

impl FieldMapping {
    fn long(name: &str, stored: bool, fast: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Long,
            analyzer: None,
            stored,
            fast,
            copy_from: None,
        }
    }

    fn text(name: &str, analyzer: &str, stored: bool, copy_from: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Text,
            analyzer: Some(analyzer.to_string()),
            stored,
            fast: false,
            copy_from: copy_from.map(str::to_string),
        }
    }
}

/// The full analysis graph plus field mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(with = "duration_str")]
    pub refresh_interval: Duration,
    pub char_filters: BTreeMap<String, CharFilterSpec>,
    pub tokenizers: BTreeMap<String, TokenizerSpec>,
    pub filters: BTreeMap<String, TokenFilterSpec>,
    pub analyzers: BTreeMap<String, AnalyzerSpec>,
    pub mappings: Vec<FieldMapping>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let char_filters = BTreeMap::from([
            ("icu_normalizer".to_string(), CharFilterSpec::IcuNormalizer),
            ("iteration_mark".to_string(), CharFilterSpec::IterationMark),
        ]);

        let tokenizers = BTreeMap::from([
            (
                "ngram_tokenizer".to_string(),
                TokenizerSpec::Ngram {
                    min_gram: 2,
                    max_gram: 3,
                    token_chars: vec![TokenChars::Letter, TokenChars::Digit],
                },
            ),
            (
                "ja_tokenizer".to_string(),
                TokenizerSpec::Japanese {
                    mode: SegmentationMode::Search,
                },
            ),
        ]);

        let filters = BTreeMap::from([
            ("baseform".to_string(), TokenFilterSpec::BaseForm),
            (
                "part_of_speech".to_string(),
                TokenFilterSpec::PartOfSpeech {
                    stoptags: vec![
                        PartOfSpeech::Particle,
                        PartOfSpeech::Auxiliary,
                        PartOfSpeech::Symbol,
                    ],
                },
            ),
            (
                "ja_stop".to_string(),
                TokenFilterSpec::Stop {
                    stopwords: StopList::Japanese,
                },
            ),
            ("number".to_string(), TokenFilterSpec::Number),
            (
                "katakana_stemmer".to_string(),
                TokenFilterSpec::KatakanaStemmer { minimum_length: 4 },
            ),
            (
                "english_stop".to_string(),
                TokenFilterSpec::Stop {
                    stopwords: StopList::English,
                },
            ),
            (
                "english_possessive_stemmer".to_string(),
                TokenFilterSpec::Stemmer {
                    language: StemLanguage::PossessiveEnglish,
                },
            ),
            (
                "english_stemmer".to_string(),
                TokenFilterSpec::Stemmer {
                    language: StemLanguage::English,
                },
            ),
            ("icu_normalizer".to_string(), TokenFilterSpec::IcuNormalizer),
        ]);

        let analyzers = BTreeMap::from([
            (
                NGRAM_ANALYZER.to_string(),
                AnalyzerSpec {
                    char_filters: vec!["icu_normalizer".to_string()],
                    tokenizer: "ngram_tokenizer".to_string(),
                    filters: vec![],
                },
            ),
            (
                CONTENT_ANALYZER.to_string(),
                AnalyzerSpec {
                    char_filters: vec!["icu_normalizer".to_string(), "iteration_mark".to_string()],
                    tokenizer: "ja_tokenizer".to_string(),
                    filters: [
                        "baseform",
                        "part_of_speech",
                        "ja_stop",
                        "number",
                        "katakana_stemmer",
                        "english_stop",
                        "english_possessive_stemmer",
                        "english_stemmer",
                        "icu_normalizer",
                    ]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                },
            ),
        ]);

        let mappings = vec![
            FieldMapping::long(FIELD_ID, true, true),
            FieldMapping::long(FIELD_ACCOUNT_ID, true, false),
            FieldMapping::text(FIELD_TEXT, NGRAM_ANALYZER, true, None),
            FieldMapping::text(FIELD_TEXT_STEMMED, CONTENT_ANALYZER, false, Some(FIELD_TEXT)),
            FieldMapping::long(FIELD_SEARCHABLE_BY, false, false),
            FieldMapping::long(FIELD_CREATED_AT, true, true),
        ];

        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            char_filters,
            tokenizers,
            filters,
            analyzers,
            mappings,
        }
    }
}

/// The parts of [`AnalysisSettings`] that change how text becomes terms.
#[derive(Serialize)]
struct FingerprintView<'a> {
    char_filters: &'a BTreeMap<String, CharFilterSpec>,
    tokenizers: &'a BTreeMap<String, TokenizerSpec>,
    filters: &'a BTreeMap<String, TokenFilterSpec>,
    analyzers: &'a BTreeMap<String, AnalyzerSpec>,
    mappings: &'a [FieldMapping],
}

impl AnalysisSettings {
    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Check every reference and numeric bound.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::InvalidAnalysis`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        for (name, tokenizer) in &self.tokenizers {
            if let TokenizerSpec::Ngram {
                min_gram,
                max_gram,
                token_chars,
            } = tokenizer
            {
                if *min_gram == 0 {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "tokenizer '{name}': min_gram must be at least 1"
                    )));
                }
                if max_gram < min_gram {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "tokenizer '{name}': max_gram {max_gram} is below min_gram {min_gram}"
                    )));
                }
                if max_gram - min_gram > MAX_NGRAM_DIFF {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "tokenizer '{name}': gram spread {} exceeds {MAX_NGRAM_DIFF}",
                        max_gram - min_gram
                    )));
                }
                if token_chars.is_empty() {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "tokenizer '{name}': token_chars must not be empty"
                    )));
                }
            }
        }

        for (name, filter) in &self.filters {
            if matches!(filter, TokenFilterSpec::KatakanaStemmer { minimum_length: 0 }) {
                return Err(StatusdexError::invalid_analysis(format!(
                    "filter '{name}': minimum_length must be at least 1"
                )));
            }
        }

        for (name, analyzer) in &self.analyzers {
            if !self.tokenizers.contains_key(&analyzer.tokenizer) {
                return Err(StatusdexError::invalid_analysis(format!(
                    "analyzer '{name}' references unknown tokenizer '{}'",
                    analyzer.tokenizer
                )));
            }
            if let Some(missing) = analyzer
                .char_filters
                .iter()
                .find(|cf| !self.char_filters.contains_key(*cf))
            {
                return Err(StatusdexError::invalid_analysis(format!(
                    "analyzer '{name}' references unknown char filter '{missing}'"
                )));
            }
            if let Some(missing) = analyzer
                .filters
                .iter()
                .find(|f| !self.filters.contains_key(*f))
            {
                return Err(StatusdexError::invalid_analysis(format!(
                    "analyzer '{name}' references unknown filter '{missing}'"
                )));
            }
        }

        self.validate_mappings()
    }

    fn validate_mappings(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for mapping in &self.mappings {
            if !seen.insert(mapping.name.as_str()) {
                return Err(StatusdexError::invalid_analysis(format!(
                    "field '{}' is mapped twice",
                    mapping.name
                )));
            }
            match (mapping.field_type, mapping.analyzer.as_deref()) {
                (FieldType::Text, None) => {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "text field '{}' needs an analyzer",
                        mapping.name
                    )));
                }
                (FieldType::Text, Some(analyzer)) if !self.analyzers.contains_key(analyzer) => {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "field '{}' references unknown analyzer '{analyzer}'",
                        mapping.name
                    )));
                }
                (FieldType::Long, Some(_)) => {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "long field '{}' cannot have an analyzer",
                        mapping.name
                    )));
                }
                _ => {}
            }
        }

        for mapping in &self.mappings {
            if let Some(source) = &mapping.copy_from {
                let source_is_text = self
                    .mapping(source)
                    .is_some_and(|m| m.field_type == FieldType::Text && m.copy_from.is_none());
                if mapping.field_type != FieldType::Text || !source_is_text {
                    return Err(StatusdexError::invalid_analysis(format!(
                        "field '{}' must be text copied from a text field, not '{source}'",
                        mapping.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fail unless every named field is mapped.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::InvalidAnalysis`] naming the missing field.
    pub fn require_fields(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| self.mapping(name).is_none()) {
            Some(missing) => Err(StatusdexError::invalid_analysis(format!(
                "required field '{missing}' is not mapped"
            ))),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn mapping(&self, name: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.name == name)
    }

    /// Text fields indexing a copy of `source`.
    pub fn copies_of<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a FieldMapping> {
        self.mappings
            .iter()
            .filter(move |m| m.copy_from.as_deref() == Some(source))
    }

    /// Hex SHA-256 of the canonical JSON of the analysis graph and mappings.
    ///
    /// `refresh_interval` is excluded: it changes when documents become
    /// visible, not how they are tokenized.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn fingerprint(&self) -> Result<String> {
        let view = FingerprintView {
            char_filters: &self.char_filters,
            tokenizers: &self.tokenizers,
            filters: &self.filters,
            analyzers: &self.analyzers,
            mappings: &self.mappings,
        };
        let canonical = serde_json::to_vec(&view)?;
        let hash = digest(&SHA256, &canonical);
        Ok(hash.as_ref().iter().map(|b| format!("{b:02x}")).collect())
    }
}
