//! Pre-tokenizer (C2, spec.md §4.2).
//!
//! Applies annotated spans, fills the gaps between them with plain text,
//! sorts the whole thing by `(start, length)`, then splits each plain-text
//! run into word/non-word/space tokens using the unambiguous word-break
//! rules followed by the further-splitting rules. Grounded on the
//! teacher's regex-driven pre-tokenizer (`bpe.rs::pre_tokenize`) for the
//! overall shape (one pass that turns a line into ordered fragments
//! before the per-fragment tokenizer runs) but the break logic itself is
//! a bespoke character classifier rather than a regex, since the rules
//! here key off per-character Unicode properties the teacher's patterns
//! don't need.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::classifier::{self, MajorDesignation};
use crate::error::Error;
use crate::factor::{FactorValue, InlineFixRole, MAX_INDEX};
use crate::model::SegmenterOptions;
use crate::span::{AnnotatedSpan, ClassSpanMode};
use crate::token::{Token, TokenKind};
use unicode_script::{Script, UnicodeScript};

/// Output of pre-tokenization: the ordered token stream plus the
/// per-index `decodeAs` text the decoder needs to resolve class tokens
/// back to surface text. The map is part of this call's result, not the
/// persisted model, because its contents are specific to this one input
/// line (spec.md §4.1, §4.6).
pub struct PreTokenizeResult<'a> {
    pub tokens: Vec<Token<'a>>,
    pub decode_as_by_index: HashMap<u32, String>,
}

#[derive(Clone, Copy)]
struct CharInfo {
    ch: char,
    byte_start: usize,
    byte_len: usize,
}

/// Runs the pre-tokenizer over `line` (spec.md §4.1, §4.2).
///
/// `seed` drives the index assignment for class spans (spec.md §4.2): the
/// caller must pass the same seed when encoding the paired source and
/// target side of a sentence pair so the two sides' indices line up.
pub fn pretokenize<'a>(
    line: &'a str,
    spans: &[AnnotatedSpan],
    options: &SegmenterOptions,
    seed: u64,
) -> Result<PreTokenizeResult<'a>, Error> {
    let mut sorted_spans = spans.to_vec();
    sorted_spans.sort_by_key(|s| (s.start_index, s.length));
    for pair in sorted_spans.windows(2) {
        if pair[0].end() > pair[1].start_index {
            return Err(Error::InvalidAnnotation(format!(
                "overlapping annotated spans at {} and {}",
                pair[0].start_index, pair[1].start_index
            )));
        }
    }

    let mut tokens: Vec<Token<'a>> = Vec::new();
    let mut decode_as_by_index = HashMap::new();
    let mut used_indices: HashSet<u32> = HashSet::new();
    let mut cursor = 0usize;

    for (ordinal, span) in sorted_spans.iter().enumerate() {
        if span.start_index > cursor {
            split_plain_run(line, cursor, span.start_index, options, &mut tokens);
        }

        if span.is_pure_deletion() {
            cursor = span.end();
            continue;
        }

        if span.class_type.is_none() {
            // Plain `encodeAsIf` substitution with no class: the span
            // keeps its original range but its underlying text is
            // replaced before the rest of the pipeline ever sees it
            // (spec.md §4.1 step 1).
            let replacement = span.encode_as_if.clone().unwrap_or_default();
            let kind = replacement
                .chars()
                .next()
                .map(|c| {
                    if matches!(classifier::major_designation(c), MajorDesignation::L | MajorDesignation::N) {
                        TokenKind::Word
                    } else {
                        TokenKind::NonWord
                    }
                })
                .unwrap_or(TokenKind::NonWord);
            let mut token = Token::from_line(line, span.start_index, span.length, kind);
            token.override_as_if(replacement);
            tokens.push(token);
            cursor = span.end();
            continue;
        }

        emit_span_tokens(
            line,
            span,
            ordinal,
            seed,
            options,
            &mut used_indices,
            &mut decode_as_by_index,
            &mut tokens,
        );
        cursor = span.end();
    }

    if cursor < line.len() {
        split_plain_run(line, cursor, line.len(), options, &mut tokens);
    }

    Ok(PreTokenizeResult { tokens, decode_as_by_index })
}

fn emit_span_tokens<'a>(
    line: &'a str,
    span: &AnnotatedSpan,
    ordinal: usize,
    seed: u64,
    options: &SegmenterOptions,
    used_indices: &mut HashSet<u32>,
    decode_as_by_index: &mut HashMap<u32, String>,
    tokens: &mut Vec<Token<'a>>,
) {
    let index = assign_index(ordinal, seed, used_indices);

    match options.class_span_mode {
        ClassSpanMode::Replaced => {
            let mut token = Token::pseudo_at_edge(span.start_index, TokenKind::Class, String::new());
            token.original_len = span.length;
            if let Some(kind) = &span.class_type {
                token.factors.set(FactorValue::Class(kind.clone()));
            }
            if let Some(idx) = index {
                token.factors.set(FactorValue::Index(idx));
                if let Some(decode_as) = &span.decode_as {
                    decode_as_by_index.insert(idx, decode_as.clone());
                }
            } else if let Some(decode_as) = &span.decode_as {
                // Index space exhausted: fall back to passing the
                // replacement text through literally rather than losing it
                // (spec.md §4.2 only specifies that further class spans
                // are dropped, not that their content vanishes).
                token.override_as_if(decode_as.clone());
                token.factors.remove(crate::factor::FactorTypeId::Class);
            }
            tokens.push(token);
        }
        ClassSpanMode::InlineFix => {
            // The "what" token keeps its non-empty original range (for
            // alignment) but carries no underlying text of its own
            // (spec.md §3, §4.1): the decoder never surfaces it, and
            // boundary/glue computation sees through it to the tokens
            // around it (spec.md §4.4).
            let mut what = Token::from_line(line, span.start_index, span.length, TokenKind::Class);
            what.override_as_if(String::new());
            what.factors.set(FactorValue::InlineFix(InlineFixRole::What));
            tokens.push(what);

            let with_text = span.decode_as.clone().unwrap_or_default();
            let mut with = Token::pseudo_at_edge(span.end(), TokenKind::Class, with_text);
            with.factors.set(FactorValue::InlineFix(InlineFixRole::With));
            tokens.push(with);
        }
    }
}

/// Seeded-PRNG-with-linear-probing index assignment (spec.md §4.2). The
/// same `seed` on both sides of a sentence pair, combined with each
/// span's position in encounter order, reproduces the same candidate
/// sequence — so as long as both sides have the same number of prior
/// class spans, they land on the same index.
fn assign_index(ordinal: usize, seed: u64, used_indices: &mut HashSet<u32>) -> Option<u32> {
    if used_indices.len() as u32 >= MAX_INDEX {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(ordinal as u64));
    let start: u32 = rng.gen_range(0..MAX_INDEX);
    for probe in 0..MAX_INDEX {
        let candidate = (start + probe) % MAX_INDEX;
        if !used_indices.contains(&candidate) {
            used_indices.insert(candidate);
            return Some(candidate);
        }
    }
    None
}

/// Classifies and splits `line[start..end]` into word/non-word/space
/// tokens (spec.md §4.2 "unambiguous word breaks" and "further
/// splitting").
fn split_plain_run<'a>(
    line: &'a str,
    start: usize,
    end: usize,
    options: &SegmenterOptions,
    tokens: &mut Vec<Token<'a>>,
) {
    let chars: Vec<CharInfo> = line[start..end]
        .char_indices()
        .map(|(i, c)| CharInfo { ch: c, byte_start: start + i, byte_len: c.len_utf8() })
        .collect();
    if chars.is_empty() {
        return;
    }

    let base = base_designations(&chars);
    let flipped = apply_flips(&chars, &base);

    let mut cut_after = vec![false; chars.len()];
    for i in 1..chars.len() {
        if unambiguous_break_before(i, &chars, &flipped) {
            cut_after[i - 1] = true;
        }
        if further_split_before(i, &chars, &base, options) {
            cut_after[i - 1] = true;
        }
    }
    *cut_after.last_mut().unwrap() = true;

    let mut run_start = 0;
    for i in 0..chars.len() {
        if cut_after[i] {
            emit_chunk(line, &chars[run_start..=i], &flipped[run_start..=i], tokens);
            run_start = i + 1;
        }
    }
}

fn emit_chunk<'a>(line: &'a str, chunk: &[CharInfo], designations: &[MajorDesignation], tokens: &mut Vec<Token<'a>>) {
    let byte_start = chunk[0].byte_start;
    let last = chunk.last().unwrap();
    let byte_end = last.byte_start + last.byte_len;

    let kind = if chunk.len() == 1 && (chunk[0].ch as u32) <= 0x20 {
        TokenKind::Space
    } else if matches!(designations[0], MajorDesignation::L | MajorDesignation::N) {
        TokenKind::Word
    } else {
        TokenKind::NonWord
    };

    tokens.push(Token::from_line(line, byte_start, byte_end - byte_start, kind));
}

/// Base per-character designation: combining marks and variation
/// selectors inherit the preceding character's designation (spec.md
/// §4.1's combiner rule), and the explicit CJK numeral letters are forced
/// to `N` regardless of their raw Unicode category (spec.md §4.1).
fn base_designations(chars: &[CharInfo]) -> Vec<MajorDesignation> {
    let mut out = Vec::with_capacity(chars.len());
    for (i, info) in chars.iter().enumerate() {
        let d = if classifier::is_combiner(info.ch) {
            if i == 0 {
                classifier::combiner_typical_major_designation(info.ch)
            } else {
                out[i - 1]
            }
        } else if classifier::is_numeral(info.ch) {
            MajorDesignation::N
        } else {
            classifier::major_designation(info.ch)
        };
        out.push(d);
    }
    out
}

const APOSTROPHE_HYPHEN_SOFT_HYPHEN: [char; 4] = ['\'', '\u{2019}', '-', '\u{00AD}'];
const DOT_COMMA_THIN_SPACE: [char; 3] = ['.', ',', '\u{2009}'];

/// Flips specific punctuation characters' designation to match their
/// neighbors, so they don't trigger an unwanted break (spec.md §4.2):
/// apostrophe/hyphen/soft hyphen between two `L` characters become `L`
/// (keeps contractions and hyphenated words whole); `.`/`,`/thin space
/// between two `N` characters become `N` (keeps decimal/thousands
/// separators from splitting off on their own, though they still end up
/// as single-character tokens via the unconditional "any N boundary"
/// further-split rule).
fn apply_flips(chars: &[CharInfo], base: &[MajorDesignation]) -> Vec<MajorDesignation> {
    let mut out = base.to_vec();
    for i in 1..chars.len().saturating_sub(1) {
        if APOSTROPHE_HYPHEN_SOFT_HYPHEN.contains(&chars[i].ch)
            && base[i - 1] == MajorDesignation::L
            && base[i + 1] == MajorDesignation::L
        {
            out[i] = MajorDesignation::L;
        } else if DOT_COMMA_THIN_SPACE.contains(&chars[i].ch)
            && base[i - 1] == MajorDesignation::N
            && base[i + 1] == MajorDesignation::N
        {
            out[i] = MajorDesignation::N;
        }
    }
    out
}

/// Step-4 "unambiguous word breaks" (spec.md §4.2): a designation change
/// breaks only when at least one side is `L` or `N`; a script change
/// breaks unless one side is the `Common` script (which absorbs into
/// whichever neighbor it's adjacent to).
fn unambiguous_break_before(i: usize, chars: &[CharInfo], designations: &[MajorDesignation]) -> bool {
    let d_change = designations[i - 1] != designations[i];
    if d_change
        && matches!(
            (designations[i - 1], designations[i]),
            (MajorDesignation::L, _) | (_, MajorDesignation::L) | (MajorDesignation::N, _) | (_, MajorDesignation::N)
        )
    {
        return true;
    }

    let script_a = chars[i - 1].ch.script();
    let script_b = chars[i].ch.script();
    if script_a != script_b && script_a != Script::Common && script_b != Script::Common {
        return true;
    }
    false
}

/// Step-5 "further splitting" rules (spec.md §4.2), applied in addition
/// to the unambiguous breaks: numerals are always single-character
/// tokens; a space on either side always breaks; `<`/`{` (reserved
/// pre-annotation delimiters) always break; Han characters optionally
/// split one-per-token (`split_han`); and camelCase/PascalCase humps
/// split between a lower-then-upper or an upper-upper-then-lower run.
fn further_split_before(i: usize, chars: &[CharInfo], base: &[MajorDesignation], options: &SegmenterOptions) -> bool {
    if base[i - 1] == MajorDesignation::N || base[i] == MajorDesignation::N {
        return true;
    }
    if (chars[i - 1].ch as u32) <= 0x20 || (chars[i].ch as u32) <= 0x20 {
        return true;
    }
    if chars[i - 1].ch == '<' || chars[i].ch == '<' || chars[i - 1].ch == '{' || chars[i].ch == '{' {
        return true;
    }
    if options.split_han && chars[i - 1].ch.script() == Script::Han && chars[i].ch.script() == Script::Han {
        return true;
    }

    // xY: lowercase followed by uppercase.
    if classifier::has_and_is_lower(chars[i - 1].ch) && classifier::has_and_is_upper(chars[i].ch) {
        return true;
    }
    // XYz: two uppercase followed by a lowercase; split between X and Yz.
    if i + 1 < chars.len()
        && classifier::has_and_is_upper(chars[i - 1].ch)
        && classifier::has_and_is_upper(chars[i].ch)
        && classifier::has_and_is_lower(chars[i + 1].ch)
    {
        return true;
    }

    false
}
