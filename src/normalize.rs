//! Text normalization for filter matching.
//!
//! Folds punctuation and width variants onto a canonical form so that a filter
//! phrase typed one way matches status text written another way. Half-width
//! katakana is widened through an ordered table matched leftmost-longest, so
//! a base kana followed by a voicing mark becomes a single voiced kana.
//!
//! The four folding steps touch disjoint code-point ranges, which makes
//! [`normalize`] idempotent.

use aho_corasick::{AhoCorasick, MatchKind};
use once_cell::sync::Lazy;

/// Half-width to full-width kana pairs.
///
/// Voiced and semi-voiced pairs sit next to their base kana; leftmost-longest
/// matching picks the two-character source whenever it applies.
pub const KANA_TABLE: &[(&str, &str)] = &[
    ("ｧ", "ァ"),
    ("ｱ", "ア"),
    ("ｨ", "ィ"),
    ("ｲ", "イ"),
    ("ｩ", "ゥ"),
    ("ｳ", "ウ"),
    ("ｪ", "ェ"),
    ("ｴ", "エ"),
    ("ｫ", "ォ"),
    ("ｵ", "オ"),
    ("ｶ", "カ"),
    ("ｶﾞ", "ガ"),
    ("ｷ", "キ"),
    ("ｷﾞ", "ギ"),
    ("ｸ", "ク"),
    ("ｸﾞ", "グ"),
    ("ｹ", "ケ"),
    ("ｹﾞ", "ゲ"),
    ("ｺ", "コ"),
    ("ｺﾞ", "ゴ"),
    ("ｻ", "サ"),
    ("ｻﾞ", "ザ"),
    ("ｼ", "シ"),
    ("ｼﾞ", "ジ"),
    ("ｽ", "ス"),
    ("ｽﾞ", "ズ"),
    ("ｾ", "セ"),
    ("ｾﾞ", "ゼ"),
    ("ｿ", "ソ"),
    ("ｿﾞ", "ゾ"),
    ("ﾀ", "タ"),
    ("ﾀﾞ", "ダ"),
    ("ﾁ", "チ"),
    ("ﾁﾞ", "ヂ"),
    ("ｯ", "ッ"),
    ("ﾂ", "ツ"),
    ("ﾂﾞ", "ヅ"),
    ("ﾃ", "テ"),
    ("ﾃﾞ", "デ"),
    ("ﾄ", "ト"),
    ("ﾄﾞ", "ド"),
    ("ﾅ", "ナ"),
    ("ﾆ", "ニ"),
    ("ﾇ", "ヌ"),
    ("ﾈ", "ネ"),
    ("ﾉ", "ノ"),
    ("ﾊ", "ハ"),
    ("ﾊﾞ", "バ"),
    ("ﾊﾟ", "パ"),
    ("ﾋ", "ヒ"),
    ("ﾋﾞ", "ビ"),
    ("ﾋﾟ", "ピ"),
    ("ﾌ", "フ"),
    ("ﾌﾞ", "ブ"),
    ("ﾌﾟ", "プ"),
    ("ﾍ", "ヘ"),
    ("ﾍﾞ", "ベ"),
    ("ﾍﾟ", "ペ"),
    ("ﾎ", "ホ"),
    ("ﾎﾞ", "ボ"),
    ("ﾎﾟ", "ポ"),
    ("ﾏ", "マ"),
    ("ﾐ", "ミ"),
    ("ﾑ", "ム"),
    ("ﾒ", "メ"),
    ("ﾓ", "モ"),
    ("ｬ", "ャ"),
    ("ﾔ", "ヤ"),
    ("ｭ", "ュ"),
    ("ﾕ", "ユ"),
    ("ｮ", "ョ"),
    ("ﾖ", "ヨ"),
    ("ﾗ", "ラ"),
    ("ﾘ", "リ"),
    ("ﾙ", "ル"),
    ("ﾚ", "レ"),
    ("ﾛ", "ロ"),
    ("ﾜ", "ワ"),
    ("ｦ", "ヲ"),
    ("ﾝ", "ン"),
    ("ｳﾞ", "ヴ"),
    ("｡", "。"),
    ("ｰ", "ー"),
    ("｢", "「"),
    ("｣", "」"),
    ("､", "、"),
    ("･", "・"),
    ("ﾞ", "゛"),
    ("ﾟ", "゜"),
];

const HALF_WIDTH_KANA: std::ops::RangeInclusive<char> = '\u{FF61}'..='\u{FF9F}';

/// Offset between full-width ASCII forms and their ASCII counterparts.
const FULL_WIDTH_OFFSET: u32 = 0xFEE0;

static KANA_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(KANA_TABLE.iter().map(|(from, _)| from))
        .expect("kana table builds")
});

static KANA_TARGETS: Lazy<Vec<&'static str>> =
    Lazy::new(|| KANA_TABLE.iter().map(|(_, to)| *to).collect());

/// Normalize `text` for filter matching.
///
/// Total: any input yields a string, unmapped code points pass through.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut has_half_width_kana = false;

    for ch in text.chars() {
        if HALF_WIDTH_KANA.contains(&ch) {
            has_half_width_kana = true;
        }
        out.push(fold_char(ch));
    }

    if has_half_width_kana {
        KANA_MATCHER.replace_all(&out, &KANA_TARGETS)
    } else {
        out
    }
}

/// Single-character folds: spaces, punctuation and full-width ASCII.
#[must_use]
pub const fn fold_char(ch: char) -> char {
    match ch {
        '\u{3000}' => ' ',
        '\u{2018}' => '`',
        '\u{3008}' => '<',
        '\u{3009}' => '>',
        '\u{FFE5}' => '\u{00A5}',
        '\u{00B4}' | '\u{2019}' => '\'',
        '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FF0D}' => '-',
        '\u{201C}' | '\u{201D}' => '"',
        '\u{FF01}' | '\u{FF03}'..='\u{FF06}' | '\u{FF08}'..='\u{FF5D}' => {
            match char::from_u32(ch as u32 - FULL_WIDTH_OFFSET) {
                Some(narrow) => narrow,
                None => ch,
            }
        }
        _ => ch,
    }
}
