//! Factorizer (C4, spec.md §4.4).
//!
//! Walks the pre-tokenizer's token stream and assigns every remaining
//! factor: capitalization (`Cap`/`SingleCap`), word-piece boundaries
//! (`WordBeg`/`WordEnd`/`WordInt`), continuous-script boundaries
//! (`CsBeg`/`CsEnd`), and glue (`GlueLeft`/`GlueRight`). Word-nature
//! tokens are split into pieces with the piece oracle (C3) along the way;
//! space tokens are elided (their presence/absence becomes the glue
//! factor on their neighbors, per spec.md §4.4).

use std::collections::BTreeSet;

use crate::classifier;
use crate::error::Error;
use crate::factor::{Cap, FactorTypeId, FactorValue, Glue, SingleCap, WordBeg, WordEnd};
use crate::model::SegmenterOptions;
use crate::piece_oracle::PieceOracle;
use crate::token::{
    derive_lemma, unrepresentable_lemma, FactorTuple, Token, TokenKind, CLASS_LEMMA_WORD,
};

/// One fully factorized output unit: its lemma text and its complete
/// factor tuple.
#[derive(Debug, Clone)]
pub struct FactorizedToken {
    pub lemma: String,
    pub factors: FactorTuple,
    pub original_start: usize,
    pub original_len: usize,
    /// Set when `lemma` is a synthetic `{unk,<types>}` head: the Unicode
    /// scalar value of the original code point, which the serializer must
    /// always spell out as a digit run regardless of
    /// `serialize_indices_and_unrepresentables` (spec.md §4.5).
    pub unrepresentable_codepoint: Option<u32>,
}

/// Runs C4 over the pre-tokenizer's output (spec.md §4.4).
///
/// `known_lemmas` is the trained model's recognized lemma set; pieces
/// that don't appear in it become `Unrepresentable`-kind single-character
/// tokens instead (spec.md §3, §4.4). Pass an empty set during the
/// bootstrap phase of training, before any lemma set exists yet — every
/// piece is then accepted as-is.
pub fn factorize<'a>(
    tokens: &[Token<'a>],
    oracle: &dyn PieceOracle,
    known_lemmas: &BTreeSet<String>,
    options: &SegmenterOptions,
) -> Result<Vec<FactorizedToken>, Error> {
    let mut out = Vec::new();
    let mut preceded_by_space = true; // start-of-line counts as a boundary
    let mut prev_original_end: Option<usize> = None;

    for token in tokens {
        match token.kind {
            TokenKind::Space => {
                preceded_by_space = true;
                continue;
            }
            TokenKind::Class => {
                let is_inline_fix = token.factors.has(FactorTypeId::InlineFix);
                let lemma = if is_inline_fix {
                    token.underlying().to_string()
                } else {
                    CLASS_LEMMA_WORD.to_string()
                };
                let glue_left = glue_for_gap(preceded_by_space, prev_original_end, token.original_start);
                let mut factors = token.factors.clone();
                factors.set(FactorValue::GlueLeft(glue_left));
                out.push(FactorizedToken {
                    lemma,
                    factors,
                    original_start: token.original_start,
                    original_len: token.original_len,
                    unrepresentable_codepoint: None,
                });
                preceded_by_space = false;
                prev_original_end = Some(token.original_start + token.original_len);
                continue;
            }
            TokenKind::Unrepresentable => {
                // Not produced by the pre-tokenizer directly; kept as a
                // pass-through arm for tokens callers may construct
                // directly (e.g. a decoder round-trip test fixture).
                out.push(FactorizedToken {
                    lemma: token.underlying().to_string(),
                    factors: token.factors.clone(),
                    original_start: token.original_start,
                    original_len: token.original_len,
                    unrepresentable_codepoint: None,
                });
                continue;
            }
            TokenKind::NonWord => {
                let glue_left = glue_for_gap(preceded_by_space, prev_original_end, token.original_start);

                let mut factors = FactorTuple::new();
                factors.set(FactorValue::GlueLeft(glue_left));
                let lemma = derive_lemma(TokenKind::NonWord, token.underlying(), false, false);
                let codepoint = unrepresentable_codepoint(&lemma, known_lemmas, token.underlying());
                out.push(FactorizedToken {
                    lemma,
                    factors,
                    original_start: token.original_start,
                    original_len: token.original_len,
                    unrepresentable_codepoint: codepoint,
                });
                preceded_by_space = false;
                prev_original_end = Some(token.original_start + token.original_len);
            }
            TokenKind::Word => {
                let word = token.underlying();
                let cap_factor = capitalization_factor(word, options);
                let is_continuous = word.chars().next().map(classifier::is_continuous_script).unwrap_or(false);

                let pieces = match oracle.split(word)? {
                    Some(cuts) if !cuts.is_empty() => cuts,
                    _ => word.char_indices().map(|(i, c)| (i, c.len_utf8())).collect(),
                };

                let glue_left = glue_for_gap(preceded_by_space, prev_original_end, token.original_start);

                for (piece_index, (start, len)) in pieces.iter().enumerate() {
                    let is_first = piece_index == 0;
                    let is_last = piece_index == pieces.len() - 1;
                    let piece_text = &word[*start..*start + *len];

                    let mut factors = FactorTuple::new();
                    // The word's cap factor describes the word as a whole
                    // (spec.md §4.4); only the first sub-piece renders it.
                    // Later pieces decode in their lemma's plain lowercase
                    // form, except under Cap::All, where every piece of
                    // the word is uppercase throughout.
                    let piece_cap = if is_first || matches!(cap_factor, FactorValue::Cap(Cap::All)) {
                        cap_factor.clone()
                    } else {
                        FactorValue::Cap(Cap::None)
                    };
                    factors.set(piece_cap);
                    factors.set(FactorValue::WordBeg(if is_first { WordBeg::Beg } else { WordBeg::BegNot }));
                    // wordEnd/csEnd are only symmetric companions to
                    // wordBeg/csBeg when right-word-glue is enabled
                    // (spec.md §4.4); otherwise a piece boundary is
                    // recoverable from the next piece's wordBeg alone.
                    if options.right_word_glue {
                        factors.set(FactorValue::WordEnd(if is_last { WordEnd::End } else { WordEnd::EndNot }));
                    }
                    if !is_first {
                        factors.set(FactorValue::WordInt);
                    }
                    if is_continuous {
                        factors.set(FactorValue::CsBeg(if is_first {
                            crate::factor::CsBeg::Beg
                        } else {
                            crate::factor::CsBeg::BegNot
                        }));
                        if options.right_word_glue {
                            factors.set(FactorValue::CsEnd(if is_last {
                                crate::factor::CsEnd::End
                            } else {
                                crate::factor::CsEnd::EndNot
                            }));
                        }
                    }
                    factors.set(FactorValue::GlueLeft(if is_first { glue_left } else { Glue::Plus }));
                    if !is_last {
                        factors.set(FactorValue::GlueRight(Glue::Plus));
                    }

                    let is_word_beginning = is_first;
                    let lemma = derive_lemma(
                        TokenKind::Word,
                        piece_text,
                        is_word_beginning,
                        options.distinguish_initial_and_internal_pieces,
                    );
                    let codepoint = unrepresentable_codepoint(&lemma, known_lemmas, piece_text);

                    out.push(FactorizedToken {
                        lemma,
                        factors,
                        original_start: token.original_start + *start,
                        original_len: *len,
                        unrepresentable_codepoint: codepoint,
                    });
                }
                preceded_by_space = false;
                prev_original_end = Some(token.original_start + token.original_len);
            }
        }
    }

    // Resolve the GlueRight of every non-word-internal token from the
    // gap to its successor (mirrors glue_for_gap's GlueLeft logic, but
    // must run after the full pass since it depends on the next token's
    // boundary).
    backfill_glue_right(&mut out, options);

    // The synthetic `{unk,<types>}` lemma name must reflect the token's
    // *final* factor-type set (I1), which isn't complete until GlueRight
    // has been backfilled above — resolving it any earlier would leave
    // the lemma's declared types one short of what the token actually
    // carries, and the decoder's factor_types_match check would reject it.
    for token in &mut out {
        if token.unrepresentable_codepoint.is_some() {
            token.lemma = unrepresentable_lemma(&token.factors.type_set());
        }
    }

    if options.context_dependent_single_letter_capitalization {
        apply_context_dependent_single_letter_capitalization(&mut out);
    }

    Ok(out)
}

/// Context-dependent single-letter capitalization re-scan (spec.md §4.4,
/// second pass): promotes a lone `CAP_INITIAL` single-letter word to
/// `CAP_ALL` either when it sits in a word run that is otherwise entirely
/// all-caps, or when both of its immediate neighbor words are all-caps
/// (sentence edges count as satisfying a missing neighbor, per the
/// documented boundary relaxation).
///
/// A "word run" here is a maximal sequence of word heads (the first piece
/// of each word) uninterrupted by a non-word-nature token (punctuation,
/// class, unrepresentable); word-internal pieces neither extend nor break
/// the run they belong to.
fn apply_context_dependent_single_letter_capitalization(tokens: &mut [FactorizedToken]) {
    let mut runs: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        let word_beg = matches!(t.factors.get(FactorTypeId::WordBeg), Some(FactorValue::WordBeg(WordBeg::Beg)));
        let word_int = t.factors.has(FactorTypeId::WordInt)
            || matches!(t.factors.get(FactorTypeId::WordBeg), Some(FactorValue::WordBeg(WordBeg::BegNot)));
        if word_beg && t.factors.has(FactorTypeId::Cap) {
            current.push(i);
        } else if !word_int && !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    let is_single_letter_initial = |tokens: &[FactorizedToken], i: usize| {
        tokens[i].original_len == 1
            && matches!(tokens[i].factors.get(FactorTypeId::Cap), Some(FactorValue::Cap(Cap::Initial)))
    };
    let is_all = |tokens: &[FactorizedToken], i: usize| {
        matches!(tokens[i].factors.get(FactorTypeId::Cap), Some(FactorValue::Cap(Cap::All)))
    };

    for run in &runs {
        if run.len() < 2 {
            continue;
        }
        let has_all = run.iter().any(|&i| is_all(tokens, i));
        let has_none = run.iter().any(|&i| {
            matches!(tokens[i].factors.get(FactorTypeId::Cap), Some(FactorValue::Cap(Cap::None)))
        });
        if has_all && !has_none {
            for &i in run {
                if is_single_letter_initial(tokens, i) {
                    tokens[i].factors.set(FactorValue::Cap(Cap::All));
                }
            }
        }

        for (pos, &i) in run.iter().enumerate() {
            if !is_single_letter_initial(tokens, i) {
                continue;
            }
            let prev_all = pos == 0 || is_all(tokens, run[pos - 1]);
            let next_all = pos + 1 == run.len() || is_all(tokens, run[pos + 1]);
            if prev_all && next_all {
                tokens[i].factors.set(FactorValue::Cap(Cap::All));
            }
        }
    }
}

/// `Minus` when a source gap (space, span boundary, or line edge)
/// separates two tokens; `Plus` when they were adjacent in the original
/// text with nothing between them.
fn glue_for_gap(preceded_by_space: bool, prev_end: Option<usize>, this_start: usize) -> Glue {
    match prev_end {
        None => Glue::Minus,
        Some(end) if preceded_by_space || end != this_start => Glue::Minus,
        Some(_) => Glue::Plus,
    }
}

fn backfill_glue_right(tokens: &mut [FactorizedToken], options: &SegmenterOptions) {
    for i in 0..tokens.len().saturating_sub(1) {
        if tokens[i].factors.has(FactorTypeId::GlueRight) {
            continue; // already fixed (internal word piece)
        }
        let adjacent = tokens[i].original_start + tokens[i].original_len == tokens[i + 1].original_start;
        let glue = if adjacent { Glue::Plus } else { Glue::Minus };
        tokens[i].factors.set(FactorValue::GlueRight(glue));
    }
    if let Some(last) = tokens.last_mut() {
        if !last.factors.has(FactorTypeId::GlueRight) {
            let glue = if options.right_word_glue { Glue::Plus } else { Glue::Minus };
            last.factors.set(FactorValue::GlueRight(glue));
        }
    }
}

/// Computes the word's capitalization factor (spec.md §4.4): single
/// letters get `SingleCap` when the model is configured to distinguish
/// them, everything else gets `Cap::All`/`Cap::Initial`/`Cap::None`.
fn capitalization_factor(word: &str, options: &SegmenterOptions) -> FactorValue {
    let letters: Vec<char> = word.chars().filter(|c| classifier::is_bicameral(*c)).collect();

    if options.single_letter_case_factors && word.chars().count() == 1 {
        return if word.chars().next().unwrap().is_uppercase() {
            FactorValue::SingleCap(SingleCap::Upper)
        } else {
            FactorValue::SingleCap(SingleCap::Lower)
        };
    }

    if letters.is_empty() {
        return FactorValue::Cap(Cap::None);
    }
    // CAP_ALL requires more than one case-bearing letter (spec.md §4.4);
    // a lone uppercase letter falls through to CAP_INITIAL instead, so
    // context-dependent single-letter capitalization has something to
    // promote.
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        FactorValue::Cap(Cap::All)
    } else if letters[0].is_uppercase() && letters[1..].iter().all(|c| !c.is_uppercase()) {
        FactorValue::Cap(Cap::Initial)
    } else {
        FactorValue::Cap(Cap::None)
    }
}

/// If `known_lemmas` is non-empty and doesn't contain `lemma`, and the
/// piece this lemma came from is a single code point, returns that code
/// point's scalar value so the caller can later synthesize the `{unk,
/// <factorTypes>}` lemma (spec.md §3, §4.4) once the token's factor set is
/// final. Resolution is split into this detection half and a later
/// lemma-rewrite pass (run after `backfill_glue_right`) because the
/// synthetic lemma's declared factor-type list must include GlueRight,
/// which isn't assigned until then (I1).
fn unrepresentable_codepoint(lemma: &str, known_lemmas: &BTreeSet<String>, original_text: &str) -> Option<u32> {
    if known_lemmas.is_empty() || known_lemmas.contains(lemma) {
        return None;
    }
    single_char(original_text).map(|c| c as u32)
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        None
    } else {
        Some(c)
    }
}
