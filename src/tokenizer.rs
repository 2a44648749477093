//! Tantivy tokenizers driven by [`AnalysisSettings`].
//!
//! An analyzer is resolved by name into a [`ConfiguredTokenizer`]: char
//! filters rewrite the text, the tokenizer produces tagged tokens, and token
//! filters transform or drop them in order. The result is fed to tantivy as a
//! vector-backed token stream. Offsets refer to the char-filtered text.
//!
//! Japanese runs go through lindera with the embedded IPADIC dictionary, which
//! supplies each token's part of speech and base form.

use std::collections::HashSet;
use std::sync::Arc;

use lindera_core::mode::{Mode, Penalty};
use lindera_dictionary::{DictionaryConfig, DictionaryKind};
use lindera_tokenizer::tokenizer::{Tokenizer as LinderaTokenizer, TokenizerConfig};
use once_cell::sync::OnceCell;
use tantivy::Index;
use tantivy::tokenizer::{
    Language, RawTokenizer, Stemmer, TextAnalyzer, Token, TokenStream, Tokenizer,
};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::analysis::{
    AnalysisSettings, CharFilterSpec, PartOfSpeech, SegmentationMode, StemLanguage, StopList,
    TokenChars, TokenFilterSpec, TokenizerSpec,
};
use crate::error::{Result, StatusdexError};

/// Words dropped by the `english_stop` list.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Words dropped by the `ja_stop` list.
pub const JAPANESE_STOP_WORDS: &[&str] = &[
    "あそこ", "あの", "あのかた", "あり", "あります", "ある", "あれ", "いう", "います", "いる",
    "うち", "および", "おり", "おります", "かつて", "ここ", "こちら", "こと", "この", "これ",
    "これら", "さらに", "しかし", "する", "そこ", "そして", "その", "それ", "それぞれ", "それで",
    "ただし", "たち", "ため", "たり", "だれ", "でき", "できる", "では", "という", "といった",
    "とき", "ところ", "として", "とともに", "とも", "どこ", "どの", "なお", "ながら", "なく",
    "など", "なに", "なら", "なり", "なる", "なん", "において", "における", "について", "にて",
    "によって", "により", "による", "ので", "のみ", "ほか", "ほとんど", "ほど", "また", "または",
    "もの", "ものの", "よう", "より", "何", "及び", "彼", "彼女", "我々", "特に", "私", "私達",
];

/// IPADIC feature column holding the base form.
const BASE_FORM_COLUMN: usize = 6;

static IPADIC_NORMAL: OnceCell<Arc<LinderaTokenizer>> = OnceCell::new();
static IPADIC_SEARCH: OnceCell<Arc<LinderaTokenizer>> = OnceCell::new();

/// Shared IPADIC tokenizer for `mode`, loaded on first use.
fn ipadic(mode: SegmentationMode) -> Result<Arc<LinderaTokenizer>> {
    let (cell, lindera_mode) = match mode {
        SegmentationMode::Normal => (&IPADIC_NORMAL, Mode::Normal),
        SegmentationMode::Search => (&IPADIC_SEARCH, Mode::Decompose(Penalty::default())),
    };
    cell.get_or_try_init(|| {
        let config = TokenizerConfig {
            dictionary: DictionaryConfig {
                kind: Some(DictionaryKind::IPADIC),
                path: None,
            },
            user_dictionary: None,
            mode: lindera_mode,
        };
        LinderaTokenizer::from_config(config)
            .map(Arc::new)
            .map_err(|e| StatusdexError::invalid_analysis(format!("failed to load IPADIC: {e}")))
    })
    .cloned()
}

/// A token while it moves through the filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    pub text: String,
    pub offset_from: usize,
    pub offset_to: usize,
    pub position: usize,
    pub position_length: usize,
    pub pos: PartOfSpeech,
    /// Dictionary form, when the dictionary knows one.
    pub base_form: Option<String>,
}

impl AnalyzedToken {
    fn new(text: &str, from: usize, position: usize, pos: PartOfSpeech) -> Self {
        Self {
            text: text.to_string(),
            offset_from: from,
            offset_to: from + text.len(),
            position,
            position_length: 1,
            pos,
            base_form: None,
        }
    }
}

#[derive(Clone)]
enum Segmenter {
    Ngram {
        min_gram: usize,
        max_gram: usize,
        token_chars: Vec<TokenChars>,
    },
    Japanese(Arc<LinderaTokenizer>),
}

/// A resolved analyzer, usable as a tantivy [`Tokenizer`].
#[derive(Clone)]
pub struct ConfiguredTokenizer {
    char_filters: Vec<CharFilterSpec>,
    segmenter: Segmenter,
    filters: Vec<TokenFilterSpec>,
    stemmer: TextAnalyzer,
}

impl ConfiguredTokenizer {
    /// Resolve analyzer `name` from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusdexError::InvalidAnalysis`] when the analyzer or any
    /// component it references is not declared, or the dictionary fails to load.
    pub fn from_settings(settings: &AnalysisSettings, name: &str) -> Result<Self> {
        let spec = settings
            .analyzers
            .get(name)
            .ok_or_else(|| StatusdexError::invalid_analysis(format!("unknown analyzer '{name}'")))?;

        let tokenizer = settings.tokenizers.get(&spec.tokenizer).ok_or_else(|| {
            StatusdexError::invalid_analysis(format!("unknown tokenizer '{}'", spec.tokenizer))
        })?;
        let segmenter = match tokenizer {
            TokenizerSpec::Ngram {
                min_gram,
                max_gram,
                token_chars,
            } => Segmenter::Ngram {
                min_gram: *min_gram,
                max_gram: *max_gram,
                token_chars: token_chars.clone(),
            },
            TokenizerSpec::Japanese { mode } => Segmenter::Japanese(ipadic(*mode)?),
        };

        let char_filters = spec
            .char_filters
            .iter()
            .map(|cf| {
                settings.char_filters.get(cf).copied().ok_or_else(|| {
                    StatusdexError::invalid_analysis(format!("unknown char filter '{cf}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let filters = spec
            .filters
            .iter()
            .map(|f| {
                settings.filters.get(f).cloned().ok_or_else(|| {
                    StatusdexError::invalid_analysis(format!("unknown filter '{f}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            char_filters,
            segmenter,
            filters,
            stemmer: TextAnalyzer::builder(RawTokenizer::default())
                .filter(Stemmer::new(Language::English))
                .build(),
        })
    }

    /// Run the whole chain over `text`.
    pub fn analyze(&mut self, text: &str) -> Vec<AnalyzedToken> {
        let filtered = self
            .char_filters
            .iter()
            .fold(text.to_string(), |acc, cf| apply_char_filter(*cf, &acc));

        let mut tokens = match &self.segmenter {
            Segmenter::Ngram {
                min_gram,
                max_gram,
                token_chars,
            } => ngrams(&filtered, *min_gram, *max_gram, token_chars),
            Segmenter::Japanese(lindera) => segment(&filtered, lindera),
        };

        for filter in &self.filters {
            tokens = apply_token_filter(filter, tokens, &mut self.stemmer);
        }
        tokens
    }

    /// Terms produced for `text`, deduplicated, in first-seen order.
    pub fn terms(&mut self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.analyze(text)
            .into_iter()
            .filter_map(|t| seen.insert(t.text.clone()).then_some(t.text))
            .collect()
    }
}

impl Tokenizer for ConfiguredTokenizer {
    type TokenStream<'a> = AnalyzedTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        let tokens = self
            .analyze(text)
            .into_iter()
            .map(|t| Token {
                offset_from: t.offset_from,
                offset_to: t.offset_to,
                position: t.position,
                text: t.text,
                position_length: t.position_length,
            })
            .collect();
        AnalyzedTokenStream { tokens, index: 0 }
    }
}

/// Vector-backed token stream.
pub struct AnalyzedTokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenStream for AnalyzedTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.index - 1]
    }
}

/// Register every declared analyzer with `index` under its own name.
///
/// # Errors
///
/// Returns an error if an analyzer cannot be resolved.
pub fn register_analyzers(index: &Index, settings: &AnalysisSettings) -> Result<()> {
    for name in settings.analyzers.keys() {
        let tokenizer = ConfiguredTokenizer::from_settings(settings, name)?;
        index.tokenizers().register(name, TextAnalyzer::from(tokenizer));
    }
    Ok(())
}

// =============================================================================
// Char filters
// =============================================================================

fn apply_char_filter(filter: CharFilterSpec, text: &str) -> String {
    match filter {
        CharFilterSpec::IcuNormalizer => icu_normalize(text),
        CharFilterSpec::IterationMark => expand_iteration_marks(text),
    }
}

/// NFKC composition followed by lowercasing.
#[must_use]
pub fn icu_normalize(text: &str) -> String {
    if text.is_ascii() {
        return text.to_ascii_lowercase();
    }
    text.nfkc().flat_map(char::to_lowercase).collect()
}

/// Expand iteration marks into the character they repeat.
#[must_use]
pub fn expand_iteration_marks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for ch in text.chars() {
        let expanded = match (ch, prev) {
            ('々', Some(p)) if is_han(p) => p,
            ('ゝ', Some(p)) if is_hiragana(p) => unvoiced(p),
            ('ゞ', Some(p)) if is_hiragana(p) => voiced(unvoiced(p)),
            ('ヽ', Some(p)) if is_katakana(p) => unvoiced(p),
            ('ヾ', Some(p)) if is_katakana(p) => voiced(unvoiced(p)),
            _ => ch,
        };
        out.push(expanded);
        prev = Some(expanded);
    }
    out
}

/// Kana whose voiced form is the next code point.
const VOICEABLE: &str = "かきくけこさしすせそたちつてとはひふへほカキクケコサシスセソタチツテトハヒフヘホ";

fn voiced(ch: char) -> char {
    if VOICEABLE.contains(ch) {
        char::from_u32(ch as u32 + 1).unwrap_or(ch)
    } else {
        ch
    }
}

fn unvoiced(ch: char) -> char {
    match char::from_u32((ch as u32).wrapping_sub(1)) {
        Some(base) if VOICEABLE.contains(base) => base,
        _ => ch,
    }
}

// =============================================================================
// Tokenizers
// =============================================================================

fn ngrams(text: &str, min: usize, max: usize, token_chars: &[TokenChars]) -> Vec<AnalyzedToken> {
    let accepts = |ch: char| token_chars.iter().any(|class| class.accepts(ch));
    let mut tokens = Vec::new();
    let mut run: Vec<(usize, char)> = Vec::new();

    let flush = |run: &mut Vec<(usize, char)>, tokens: &mut Vec<AnalyzedToken>| {
        for start in 0..run.len() {
            for len in min..=max {
                let end = start + len;
                if end > run.len() {
                    break;
                }
                let from = run[start].0;
                let to = run[end - 1].0 + run[end - 1].1.len_utf8();
                let position = tokens.len();
                tokens.push(AnalyzedToken::new(&text[from..to], from, position, PartOfSpeech::Word));
            }
        }
        run.clear();
    };

    for (idx, ch) in text.char_indices() {
        if accepts(ch) {
            run.push((idx, ch));
        } else {
            flush(&mut run, &mut tokens);
        }
    }
    flush(&mut run, &mut tokens);
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Japanese,
    Separator,
}

const fn is_han(ch: char) -> bool {
    matches!(ch, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}' | '々' | '〆')
}

const fn is_hiragana(ch: char) -> bool {
    matches!(ch, '\u{3041}'..='\u{309F}')
}

const fn is_katakana(ch: char) -> bool {
    matches!(ch, '\u{30A1}'..='\u{30FA}' | '\u{30FC}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}')
}

fn script_of(ch: char) -> Script {
    if is_han(ch) || is_hiragana(ch) || is_katakana(ch) {
        Script::Japanese
    } else if ch.is_alphanumeric() {
        Script::Latin
    } else {
        Script::Separator
    }
}

/// One same-script run within the text.
struct Run<'a> {
    script: Script,
    from: usize,
    text: &'a str,
}

fn runs(text: &str) -> Vec<Run<'_>> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let script = script_of(ch);
        let mut end = start + ch.len_utf8();
        while let Some(&(idx, next)) = chars.peek() {
            let next_script = script_of(next);
            // Apostrophes stay inside Latin words: "don't", "cat's".
            let joins = next_script == script
                || (script == Script::Latin
                    && matches!(next, '\'' | '\u{2019}')
                    && text[idx + next.len_utf8()..]
                        .chars()
                        .next()
                        .is_some_and(|after| script_of(after) == Script::Latin));
            if !joins {
                break;
            }
            end = idx + next.len_utf8();
            chars.next();
        }
        if script != Script::Separator {
            out.push(Run {
                script,
                from: start,
                text: &text[start..end],
            });
        }
    }
    out
}

/// Split text into Latin words and dictionary-analyzed Japanese tokens.
fn segment(text: &str, lindera: &LinderaTokenizer) -> Vec<AnalyzedToken> {
    let mut tokens: Vec<AnalyzedToken> = Vec::new();
    for run in runs(text) {
        match run.script {
            Script::Latin => {
                let position = tokens.len();
                tokens.push(AnalyzedToken::new(run.text, run.from, position, PartOfSpeech::Word));
            }
            Script::Japanese => push_morphemes(&run, lindera, &mut tokens),
            Script::Separator => {}
        }
    }
    tokens
}

/// Analyze one Japanese run and append its morphemes.
fn push_morphemes(run: &Run<'_>, lindera: &LinderaTokenizer, tokens: &mut Vec<AnalyzedToken>) {
    let morphemes = match lindera.tokenize(run.text) {
        Ok(morphemes) => morphemes,
        Err(e) => {
            warn!(error = %e, text = run.text, "Japanese analysis failed; run skipped");
            return;
        }
    };

    for mut morpheme in morphemes {
        let surface = morpheme.text.to_string();
        if !surface.chars().any(char::is_alphanumeric) {
            continue;
        }
        let from = run.from + morpheme.byte_start;
        let to = run.from + morpheme.byte_end;
        let (pos, base_form) = morpheme.get_details().map_or((PartOfSpeech::Word, None), |features| {
            let base = features
                .get(BASE_FORM_COLUMN)
                .filter(|base| **base != "*" && **base != surface)
                .map(|base| (*base).to_string());
            (PartOfSpeech::from_ipadic(&features), base)
        });

        let mut token = AnalyzedToken::new(&surface, from, tokens.len(), pos);
        token.offset_to = to;
        token.base_form = base_form;
        tokens.push(token);
    }
}

// =============================================================================
// Token filters
// =============================================================================

fn apply_token_filter(
    filter: &TokenFilterSpec,
    tokens: Vec<AnalyzedToken>,
    stemmer: &mut TextAnalyzer,
) -> Vec<AnalyzedToken> {
    match filter {
        TokenFilterSpec::IcuNormalizer => map_text(tokens, icu_normalize),
        TokenFilterSpec::BaseForm => tokens
            .into_iter()
            .map(|mut t| {
                if let Some(base) = t.base_form.take() {
                    t.text = base;
                }
                t
            })
            .collect(),
        TokenFilterSpec::PartOfSpeech { stoptags } => tokens
            .into_iter()
            .filter(|t| !stoptags.contains(&t.pos))
            .collect(),
        TokenFilterSpec::Stop { stopwords } => {
            let list = match stopwords {
                StopList::English => ENGLISH_STOP_WORDS,
                StopList::Japanese => JAPANESE_STOP_WORDS,
            };
            tokens
                .into_iter()
                .filter(|t| !list.contains(&t.text.as_str()))
                .collect()
        }
        TokenFilterSpec::Number => join_numerals(tokens)
            .into_iter()
            .map(|mut t| {
                if let Some(value) = kanji_number(&t.text) {
                    t.text = value.to_string();
                    t.pos = PartOfSpeech::Number;
                }
                t
            })
            .collect(),
        TokenFilterSpec::KatakanaStemmer { minimum_length } => {
            map_text(tokens, |t| stem_katakana(t, *minimum_length))
        }
        TokenFilterSpec::Stemmer {
            language: StemLanguage::PossessiveEnglish,
        } => map_text(tokens, strip_possessive),
        TokenFilterSpec::Stemmer {
            language: StemLanguage::English,
        } => tokens
            .into_iter()
            .map(|mut t| {
                if t.pos == PartOfSpeech::Word && t.text.chars().all(|c| c.is_ascii_alphabetic()) {
                    t.text = stem_english(stemmer, &t.text);
                }
                t
            })
            .collect(),
    }
}

fn map_text<F>(tokens: Vec<AnalyzedToken>, f: F) -> Vec<AnalyzedToken>
where
    F: Fn(&str) -> String,
{
    tokens
        .into_iter()
        .map(|mut t| {
            t.text = f(&t.text);
            t
        })
        .filter(|t| !t.text.is_empty())
        .collect()
}

fn stem_english(stemmer: &mut TextAnalyzer, word: &str) -> String {
    let mut stream = stemmer.token_stream(word);
    if stream.advance() {
        stream.token().text.clone()
    } else {
        word.to_string()
    }
}

/// Drop a trailing `'s` or `'`.
#[must_use]
pub fn strip_possessive(word: &str) -> String {
    for suffix in ["'s", "\u{2019}s", "'", "\u{2019}"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }
    word.to_string()
}

/// Drop a trailing prolonged sound mark from long katakana words.
#[must_use]
pub fn stem_katakana(word: &str, minimum_length: usize) -> String {
    let long_enough = word.chars().count() >= minimum_length;
    if long_enough && word.chars().all(is_katakana) {
        if let Some(stem) = word.strip_suffix('ー') {
            return stem.to_string();
        }
    }
    word.to_string()
}

/// Merge runs of adjacent numeral tokens: 三 千 五 百 becomes 三千五百.
fn join_numerals(tokens: Vec<AnalyzedToken>) -> Vec<AnalyzedToken> {
    let mut out: Vec<AnalyzedToken> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match out.last_mut() {
            Some(prev)
                if prev.pos == PartOfSpeech::Number
                    && token.pos == PartOfSpeech::Number
                    && prev.offset_to == token.offset_from =>
            {
                prev.text.push_str(&token.text);
                prev.offset_to = token.offset_to;
            }
            _ => out.push(token),
        }
    }
    out
}

/// Kanji numerals and positional multipliers.
const fn is_kanji_numeral(ch: char) -> bool {
    matches!(
        ch,
        '〇' | '零' | '一' | '二' | '三' | '四' | '五' | '六' | '七' | '八' | '九' | '十' | '百'
            | '千' | '万' | '億' | '兆'
    )
}

/// Value of a token made only of kanji numerals and ASCII digits.
#[must_use]
pub fn kanji_number(text: &str) -> Option<u64> {
    if text.is_empty() || !text.chars().any(is_kanji_numeral) {
        return None;
    }

    let mut total: u64 = 0;
    let mut section: u64 = 0;
    let mut digits: Option<u64> = None;

    for ch in text.chars() {
        if let Some(d) = kanji_digit(ch) {
            digits = Some(digits.unwrap_or(0).checked_mul(10)?.checked_add(d)?);
            continue;
        }
        match ch {
            '十' | '百' | '千' => {
                let unit = match ch {
                    '十' => 10,
                    '百' => 100,
                    _ => 1000,
                };
                section = section.checked_add(digits.take().unwrap_or(1).checked_mul(unit)?)?;
            }
            '万' | '億' | '兆' => {
                let unit: u64 = match ch {
                    '万' => 10_000,
                    '億' => 100_000_000,
                    _ => 1_000_000_000_000,
                };
                let group = section.checked_add(digits.take().unwrap_or(0))?;
                total = total.checked_add(group.max(1).checked_mul(unit)?)?;
                section = 0;
            }
            _ => return None,
        }
    }
    total
        .checked_add(section)?
        .checked_add(digits.unwrap_or(0))
}

fn kanji_digit(ch: char) -> Option<u64> {
    match ch {
        '〇' | '零' => Some(0),
        '一' => Some(1),
        '二' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => ch.to_digit(10).map(u64::from),
    }
}
