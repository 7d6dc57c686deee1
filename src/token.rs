//! Tokens and lemma derivation (spec.md §3).
//!
//! A `Token` tracks two ranges: the *underlying* string it contributes to
//! the lemma, and the *original* range it occupies in the source line, for
//! alignment. The two usually coincide; they diverge exactly in the cases
//! spec.md §3 calls out — phrase-fix substitution (`encodeAsIf`), class
//! tokens (empty underlying, non-empty original), and digit/delimiter
//! pseudo-tokens (non-empty underlying, zero-length original).

use crate::factor::{FactorTypeId, FactorValue};

/// What kind of thing a token stands for, which in turn determines how its
/// lemma is derived (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A letter/number run that takes capitalization and word-boundary
    /// factors.
    Word,
    /// Punctuation, symbols, or anything else that isn't word-nature and
    /// isn't a space.
    NonWord,
    /// A single space character, elided by the factorizer whenever
    /// possible (spec.md §4.4).
    Space,
    /// A user-annotated span rendered as a class token (phrase-fix,
    /// inline-fix target slot).
    Class,
    /// A single code point with no entry in the trained lemma set.
    Unrepresentable,
}

/// A fixed-shape record with one slot per factor type (spec.md §3).
/// Array index equals `FactorTypeId as usize`, which — because
/// `FactorTypeId`'s variants are declared in canonical wire order — means
/// iterating the array in index order already yields factors in canonical
/// (I5) order with no separate sort.
#[derive(Debug, Clone, Default)]
pub struct FactorTuple {
    slots: [Option<FactorValue>; 12],
}

impl FactorTuple {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, value: FactorValue) {
        self.slots[value.factor_type() as usize] = Some(value);
    }

    #[must_use]
    pub fn get(&self, ty: FactorTypeId) -> Option<&FactorValue> {
        self.slots[ty as usize].as_ref()
    }

    pub fn remove(&mut self, ty: FactorTypeId) -> Option<FactorValue> {
        self.slots[ty as usize].take()
    }

    #[must_use]
    pub fn has(&self, ty: FactorTypeId) -> bool {
        self.slots[ty as usize].is_some()
    }

    /// Factors in canonical wire order (I5).
    pub fn iter(&self) -> impl Iterator<Item = &FactorValue> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// The set of factor types this tuple carries, in canonical order.
    /// Used to check I1 (a lemma's factor-type set is fixed across every
    /// occurrence) and to name unrepresentable-character lemmas.
    #[must_use]
    pub fn type_set(&self) -> Vec<FactorTypeId> {
        self.iter().map(FactorValue::factor_type).collect()
    }

    /// A copy of this tuple with `ty`'s slot cleared, used when a factor
    /// is pulled out to be serialized as a separate digit-run pseudo-token.
    #[must_use]
    pub fn clone_without(&self, ty: FactorTypeId) -> FactorTuple {
        let mut copy = self.clone();
        copy.remove(ty);
        copy
    }
}

/// A backing string for a token's underlying slice: either a byte range
/// borrowed from the original line, or an owned string installed by
/// "override-as-if" or a pseudo-token constructor.
#[derive(Debug, Clone)]
enum Underlying<'a> {
    Borrowed { start: usize, len: usize, line: &'a str },
    Owned(String),
}

impl<'a> Underlying<'a> {
    fn as_str(&self) -> &str {
        match self {
            Underlying::Borrowed { start, len, line } => &line[*start..*start + *len],
            Underlying::Owned(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token<'a> {
    underlying: Underlying<'a>,
    /// Byte offset of the original range within the source line.
    pub original_start: usize,
    /// Byte length of the original range (may be zero).
    pub original_len: usize,
    pub kind: TokenKind,
    pub factors: FactorTuple,
}

impl<'a> Token<'a> {
    /// A plain token whose underlying slice is a byte range of `line`,
    /// coinciding with its original range.
    #[must_use]
    pub fn from_line(line: &'a str, start: usize, len: usize, kind: TokenKind) -> Self {
        Token {
            underlying: Underlying::Borrowed { start, len, line },
            original_start: start,
            original_len: len,
            kind,
            factors: FactorTuple::new(),
        }
    }

    /// Constructs a pseudo-token at the left or right edge of `at`,
    /// carrying a synthetic underlying string and a zero-length original
    /// range (spec.md §3: "pseudo-token-at"). Used for digit tokens and
    /// delimiter tags.
    #[must_use]
    pub fn pseudo_at_edge(original_edge: usize, kind: TokenKind, synthetic: String) -> Self {
        Token {
            underlying: Underlying::Owned(synthetic),
            original_start: original_edge,
            original_len: 0,
            kind,
            factors: FactorTuple::new(),
        }
    }

    /// Replaces the underlying string with `replacement` while freezing
    /// the original range (spec.md §3: "override-as-if"), used for
    /// phrase-fix `encodeAsIf` substitution.
    pub fn override_as_if(&mut self, replacement: String) {
        self.underlying = Underlying::Owned(replacement);
    }

    /// Narrows the token to the sub-range `[offset, offset+len)` of its
    /// current underlying slice. The original range narrows in lockstep
    /// only while the underlying slice is still a borrowed view of the
    /// original line; once overridden, the original range stays frozen, so
    /// repeated narrowing after `override_as_if` is a logic error the
    /// caller must avoid (it would silently stop tracking position).
    pub fn narrow(&mut self, offset: usize, len: usize) {
        match &mut self.underlying {
            Underlying::Borrowed {
                start,
                len: blen,
                line: _,
            } => {
                debug_assert!(offset + len <= *blen);
                *start += offset;
                *blen = len;
                self.original_start += offset;
                self.original_len = len;
            }
            Underlying::Owned(s) => {
                debug_assert!(offset + len <= s.len());
                *s = s[offset..offset + len].to_string();
            }
        }
    }

    #[must_use]
    pub fn underlying(&self) -> &str {
        self.underlying.as_str()
    }

    #[must_use]
    pub fn is_empty_underlying(&self) -> bool {
        self.underlying().is_empty()
    }
}

/// The four literal class-kind lemma strings (spec.md §3).
pub const CLASS_LEMMA_WORD: &str = "{word}";
pub const CLASS_LEMMA_CONTINUOUS_SCRIPT: &str = "{continuousScript}";
pub const CLASS_LEMMA_PUNCTUATION: &str = "{punctuation}";
pub const CLASS_LEMMA_WORD_WO_CASE: &str = "{word-wo-case}";

/// U+2581 LOW LINE (▁), the word-beginning piece prefix used when the
/// model distinguishes word-initial from word-internal pieces.
pub const WORD_BEGIN_PREFIX: char = '\u{2581}';

/// Derives the lemma for a word- or non-word-nature token (spec.md §3):
/// word-nature tokens uppercase, everything else passes through as-is.
/// `is_word_beginning` and `distinguish_pieces` control the U+2581 prefix
/// applied to the first sub-piece of a word when the model distinguishes
/// word-initial from word-internal pieces.
#[must_use]
pub fn derive_lemma(kind: TokenKind, underlying: &str, is_word_beginning: bool, distinguish_pieces: bool) -> String {
    let base = match kind {
        TokenKind::Word => underlying.to_uppercase(),
        _ => underlying.to_string(),
    };
    if distinguish_pieces && is_word_beginning {
        format!("{WORD_BEGIN_PREFIX}{base}")
    } else {
        base
    }
}

/// Derives the synthetic `{unk,<factorTypes>}` lemma for an unrepresentable
/// single code point, from the alphabetical list of factor-type prefixes
/// the token's own factor tuple carries (spec.md §3, §4.5). Each distinct
/// factor-type set therefore gets its own lemma, which is what keeps I1
/// satisfied for unrepresentable characters.
#[must_use]
pub fn unrepresentable_lemma(type_set: &[FactorTypeId]) -> String {
    let mut prefixes: Vec<&'static str> = type_set.iter().map(|t| t.prefix()).collect();
    prefixes.sort_unstable();
    format!("{{unk,{}}}", prefixes.join(","))
}
