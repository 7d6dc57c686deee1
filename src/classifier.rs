//! Unicode classifier (C1).
//!
//! Thin, stateless, thread-safe wrapper over `unicode-script` and
//! `unicode-general-category` that exposes exactly the predicates the
//! pre-tokenizer and factorizer need: script identity, a coarse
//! "major designation" collapsing the full general-category table to the
//! seven top-level Unicode categories, and a handful of special-purpose
//! predicates (numerals including CJK numeral letters, combiners,
//! bicameral letters, continuous-script scripts).

use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_script::{Script, UnicodeScript};

/// The seven top-level Unicode general-category groups, collapsed from the
/// fine-grained `GeneralCategory` enum. This is the granularity the
/// pre-tokenizer's break rules operate on (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MajorDesignation {
    L,
    M,
    N,
    P,
    S,
    Z,
    C,
}

/// Explicit CJK numeral letters that Unicode's `N` category misses:
/// the native digits, magnitude words, and formal/regional variants used
/// across Chinese, Japanese, and Korean numeral systems, plus the
/// Japanese/Chinese zero glyph `○`.
const CJK_NUMERAL_LETTERS: &[char] = &[
    '〇', '○', '零', '一', '二', '三', '四', '五', '六', '七', '八', '九', '十', '百', '千', '万',
    '萬', '億', '兆', '壱', '弐', '参', '肆', '伍', '陸', '柒', '捌', '玖', '拾', '佰', '仟',
    '壹', '貳', '參', '肄', '伯', '仠',
];

/// Returns the top-level general-category group for `c`.
#[must_use]
pub fn major_designation(c: char) -> MajorDesignation {
    use GeneralCategory::*;
    match get_general_category(c) {
        UppercaseLetter | LowercaseLetter | TitlecaseLetter | ModifierLetter | OtherLetter => {
            MajorDesignation::L
        }
        NonspacingMark | SpacingMark | EnclosingMark => MajorDesignation::M,
        DecimalNumber | LetterNumber | OtherNumber => MajorDesignation::N,
        ConnectorPunctuation
        | DashPunctuation
        | OpenPunctuation
        | ClosePunctuation
        | InitialPunctuation
        | FinalPunctuation
        | OtherPunctuation => MajorDesignation::P,
        MathSymbol | CurrencySymbol | ModifierSymbol | OtherSymbol => MajorDesignation::S,
        SpaceSeparator | LineSeparator | ParagraphSeparator => MajorDesignation::Z,
        Control | Format | Surrogate | PrivateUse | Unassigned => MajorDesignation::C,
    }
}

/// Unicode script of `c`, or `None` for surrogate code points (which do
/// not occur in valid `char`s but are kept as an explicit `Option` to
/// match spec.md §4.1's contract for callers that classify raw code
/// points read off the wire).
#[must_use]
pub fn script(c: char) -> Option<Script> {
    Some(c.script())
}

/// True for Unicode category N, and for the explicit CJK numeral letters
/// (native digits zero through ten, the magnitude words hundred/thousand/
/// wan-man/oku/chō, their formal and regional variants, and `○`).
#[must_use]
pub fn is_numeral(c: char) -> bool {
    matches!(major_designation(c), MajorDesignation::N) || CJK_NUMERAL_LETTERS.contains(&c)
}

/// True if `c` is a combining mark (general category `M`) or a variation
/// selector (which Unicode classifies outside `M` but which behaves like a
/// combiner for segmentation purposes: it always attaches to the
/// preceding character rather than starting a new token).
#[must_use]
pub fn is_combiner(c: char) -> bool {
    matches!(major_designation(c), MajorDesignation::M) || is_variation_selector(c)
}

#[must_use]
fn is_variation_selector(c: char) -> bool {
    matches!(c as u32, 0xFE00..=0xFE0F | 0x180B..=0x180D | 0xE0100..=0xE01EF)
}

/// True iff `c` has distinct upper and lower case forms, i.e. it belongs
/// to a bicameral script (Latin, Greek, Cyrillic, Armenian, ...).
#[must_use]
pub fn is_bicameral(c: char) -> bool {
    let mut lower = c.to_lowercase();
    let mut upper = c.to_uppercase();
    // A single-char fast path covers the overwhelming majority of bicameral
    // letters; chars that case-fold to multiple chars (e.g. 'ß' -> "SS")
    // are compared element-wise so they still count as bicameral when any
    // mapped form differs.
    match (lower.next(), upper.next()) {
        (Some(l), Some(u)) => l != u || lower.next().is_some() || upper.next().is_some(),
        _ => false,
    }
}

/// True iff `c` is present in its script's lowercase form and that form is
/// itself lowercase (i.e. `c` has a distinct uppercase counterpart).
#[must_use]
pub fn has_and_is_upper(c: char) -> bool {
    is_bicameral(c) && c.is_uppercase()
}

/// True iff `c` has a distinct lowercase counterpart and `c` is that
/// lowercase form.
#[must_use]
pub fn has_and_is_lower(c: char) -> bool {
    is_bicameral(c) && c.is_lowercase()
}

/// True for scripts written without inter-word spacing: Han, Hiragana,
/// Katakana, and Thai (spec.md GLOSSARY, "Continuous script").
#[must_use]
pub fn is_continuous_script(c: char) -> bool {
    matches!(
        c.script(),
        Script::Han | Script::Hiragana | Script::Katakana | Script::Thai
    )
}

/// A combiner has no designation of its own — it inherits one from its
/// left context (spec.md §4.1) — except variation selectors, which are
/// always punctuation-like (`P`), and all other combiners, which default
/// to `L`. This exists purely so a combiner run can be assigned *some*
/// factor-type set before the left-context inheritance pass runs; see I1.
#[must_use]
pub fn combiner_typical_major_designation(c: char) -> MajorDesignation {
    if is_variation_selector(c) {
        MajorDesignation::P
    } else {
        MajorDesignation::L
    }
}
