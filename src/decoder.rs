//! Decoder (C6, spec.md §4.6): the inverse pipeline from wire token
//! strings back to a surface string — parse, undo digit serialization,
//! reinsert any phrase-fix spans the hypothesis dropped, compact, and
//! reconstruct spacing from the glue/cap factors.
//!
//! `DecoderPackage` is the non-cyclic replacement for the source's
//! `Encoded`/`DecoderPackage` pair (spec.md §9's design note): everything
//! `decode` needs from the matching `encode` call, threaded in as a plain
//! value instead of a back-reference.

use std::collections::HashMap;

use crate::alignment::Alignment;
use crate::error::Error;
use crate::factor::{Cap, FactorTypeId, FactorValue, Glue, InlineFixRole, SingleCap};
use crate::serializer;
use crate::token::{FactorTuple, WORD_BEGIN_PREFIX};

/// Everything `decode` needs from the `encode` call that produced the
/// source side of a sentence pair (spec.md §4.6 step 4, §9).
#[derive(Debug, Clone, Default)]
pub struct DecoderPackage {
    /// Class index -> surface text to substitute at decode time
    /// (phrase-fix's `decodeAs`).
    pub decode_as_by_index: HashMap<u32, String>,
    /// Class index -> the source token's position, used to look up an
    /// insertion point via the alignment when the decoded side is
    /// missing that index entirely.
    pub source_index_by_class: HashMap<u32, usize>,
}

impl DecoderPackage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
struct DecodedToken {
    lemma: String,
    factors: FactorTuple,
    /// Cleared by §4.6 step 3 when a digit-encoded tail is malformed;
    /// invalid tokens are kept in place (so alignment indices stay valid)
    /// until step 5's compaction drops them (spec.md §7).
    valid: bool,
    /// Set when this token's lemma was a synthetic `{unk,<types>}` head
    /// that deserialized to an actual code point: its surface form is
    /// that literal character, bypassing the usual cap-driven casing.
    literal: Option<char>,
}

/// Output of `decode`: the reconstructed surface string, plus the
/// alignment re-projected across whatever tokens this pass inserted or
/// dropped.
pub struct DecodeResult {
    pub text: String,
    pub alignment: Alignment,
}

/// Runs C6 over one line's wire tokens (spec.md §4.6).
pub fn decode(
    wire_tokens: &[String],
    package: &DecoderPackage,
    alignment: &Alignment,
) -> Result<DecodeResult, Error> {
    let tokens = parse_and_strip_sla(wire_tokens)?;
    let tokens = parse_inline_fix_tags(tokens);
    let tokens = deserialize_digits(tokens);
    let (tokens, alignment) = insert_missing_phrase_fixes(tokens, package, alignment);
    let (tokens, alignment) = compact(tokens, alignment);
    let text = reconstruct_surface(&tokens, package);
    Ok(DecodeResult { text, alignment })
}

/// Step 1 (parse) + step 2 (strip sentence-level annotations).
fn parse_and_strip_sla(wire_tokens: &[String]) -> Result<Vec<DecodedToken>, Error> {
    let mut out = Vec::with_capacity(wire_tokens.len());
    for wire in wire_tokens {
        if serializer::parse_sla(wire).is_some() {
            continue;
        }
        let (lemma, factor_list) = serializer::parse_token(wire)?;
        let mut factors = FactorTuple::new();
        for f in factor_list {
            factors.set(f);
        }
        out.push(DecodedToken { lemma, factors, valid: true, literal: None });
    }
    Ok(out)
}

fn is_bare_tag(t: &DecodedToken, tag: &str) -> bool {
    t.factors.iter().next().is_none() && t.lemma == tag
}

/// Undoes the `<IOPEN>…<IDELIM>…<ICLOSE>` wire form of an inline-fix pair
/// (spec.md §4.4, "use-tags" option): replaces the five-token run with the
/// two tokens it wraps, re-attaching the `inlineFix=WHAT`/`inlineFix=WITH`
/// factors the tags stood in for so the rest of the pipeline can treat
/// every inline-fix pair uniformly, whichever wire form produced it. A run
/// that doesn't match the expected shape is left as-is (its literal `<#>`-
/// style tag lemmas just pass through to the surface, same as any other
/// malformed sequence spec.md §7 tolerates).
fn parse_inline_fix_tags(tokens: Vec<DecodedToken>) -> Vec<DecodedToken> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if is_bare_tag(&tokens[i], serializer::TAG_IOPEN)
            && i + 4 < tokens.len()
            && is_bare_tag(&tokens[i + 2], serializer::TAG_IDELIM)
            && is_bare_tag(&tokens[i + 4], serializer::TAG_ICLOSE)
        {
            let mut what = tokens[i + 1].clone();
            what.factors.set(FactorValue::InlineFix(InlineFixRole::What));
            let mut with = tokens[i + 3].clone();
            with.factors.set(FactorValue::InlineFix(InlineFixRole::With));
            out.push(what);
            out.push(with);
            i += 5;
            continue;
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

fn is_bare_digit(t: &DecodedToken) -> bool {
    t.factors.iter().next().is_none()
        && t.lemma.len() == 1
        && t.lemma.chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn is_terminator(t: &DecodedToken) -> bool {
    t.factors.iter().next().is_none() && t.lemma == serializer::TAG_DIGIT_END
}

/// Step 3: scans for `{unk,…}` heads or `class`-bearing heads with no
/// `Index` factor yet, accumulates a trailing digit sub-sequence up to
/// `<#>`, and folds it back into the head token. Malformed runs (no
/// terminator, unparsable digits, or a reconstructed code point/factor
/// set that fails validation) leave the head marked invalid rather than
/// erroring — spec.md §7's deliberate leniency toward a model that may
/// emit ill-formed digit runs.
fn deserialize_digits(tokens: Vec<DecodedToken>) -> Vec<DecodedToken> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let is_unk_head = serializer::unk_types(&tokens[i].lemma).is_some();
        let is_class_head =
            tokens[i].factors.has(FactorTypeId::Class) && !tokens[i].factors.has(FactorTypeId::Index);

        if !is_unk_head && !is_class_head {
            out.push(tokens[i].clone());
            i += 1;
            continue;
        }

        let mut j = i + 1;
        let mut digits = String::new();
        while j < tokens.len() && is_bare_digit(&tokens[j]) {
            digits.push_str(&tokens[j].lemma);
            j += 1;
        }
        let terminated = j < tokens.len() && is_terminator(&tokens[j]);

        let mut head = tokens[i].clone();
        if !terminated || digits.is_empty() {
            head.valid = false;
            out.push(head);
            i += 1;
            continue;
        }

        let Ok(n) = digits.parse::<u32>() else {
            head.valid = false;
            out.push(head);
            i = j + 1;
            continue;
        };

        if is_unk_head {
            match char::from_u32(n) {
                Some(c) if factor_types_match(&head, &head.lemma) => {
                    head.literal = Some(c);
                }
                _ => head.valid = false,
            }
        } else {
            head.factors.set(FactorValue::Index(n));
        }
        out.push(head);
        i = j + 1;
    }
    out
}

/// Validates a reconstructed `{unk,<types>}` token's own factor-type set
/// against the types its lemma advertises (I1/I3).
fn factor_types_match(token: &DecodedToken, lemma: &str) -> bool {
    let Some(declared) = serializer::unk_types(lemma) else {
        return false;
    };
    let mut declared: Vec<String> = declared;
    declared.sort();
    let mut actual: Vec<String> = token.factors.type_set().iter().map(|t| t.prefix().to_string()).collect();
    actual.sort();
    declared == actual
}

/// Step 4: for every class index the source side allocated but the
/// decoded side is missing, inserts the original class token at the
/// alignment-suggested target position (or appends it), updating the
/// alignment accordingly.
fn insert_missing_phrase_fixes(
    mut tokens: Vec<DecodedToken>,
    package: &DecoderPackage,
    alignment: &Alignment,
) -> (Vec<DecodedToken>, Alignment) {
    let mut alignment = alignment.clone();

    let mut present = std::collections::BTreeSet::new();
    for t in &tokens {
        if t.valid && t.factors.has(FactorTypeId::Class) {
            if let Some(FactorValue::Index(n)) = t.factors.get(FactorTypeId::Index) {
                present.insert(*n);
            }
        }
    }

    let mut missing: Vec<u32> = package
        .source_index_by_class
        .keys()
        .copied()
        .filter(|idx| !present.contains(idx))
        .collect();
    missing.sort_unstable();

    for idx in missing {
        if !package.decode_as_by_index.contains_key(&idx) {
            continue;
        }
        let target_pos = package
            .source_index_by_class
            .get(&idx)
            .and_then(|src_idx| alignment.target_for_source(*src_idx))
            .unwrap_or(tokens.len())
            .min(tokens.len());

        let mut factors = FactorTuple::new();
        factors.set(FactorValue::Class("phrasefix".to_string()));
        factors.set(FactorValue::Index(idx));
        alignment.shift_targets_from(target_pos);
        tokens.insert(
            target_pos,
            DecodedToken {
                lemma: crate::token::CLASS_LEMMA_WORD.to_string(),
                factors,
                valid: true,
                literal: None,
            },
        );
    }

    (tokens, alignment)
}

/// Step 5: drops invalid tokens and projects the alignment onto the
/// surviving indices.
fn compact(tokens: Vec<DecodedToken>, alignment: Alignment) -> (Vec<DecodedToken>, Alignment) {
    let mut remap = Vec::with_capacity(tokens.len());
    let mut kept = Vec::with_capacity(tokens.len());
    for t in tokens {
        if t.valid {
            remap.push(Some(kept.len()));
            kept.push(t);
        } else {
            remap.push(None);
        }
    }
    let alignment = alignment.project_targets(&remap);
    (kept, alignment)
}

/// Step 6: walks tokens left to right, picking each one's surface form
/// and deciding whether a space separates it from the previous token.
fn reconstruct_surface(tokens: &[DecodedToken], package: &DecoderPackage) -> String {
    let mut out = String::new();
    let mut prev_had_right_glue = true; // sentence start counts as "had glue"

    for t in tokens {
        if matches!(t.factors.get(FactorTypeId::InlineFix), Some(FactorValue::InlineFix(InlineFixRole::What))) {
            // The "WHAT" half of an inline-fix pair carries no surface
            // text of its own; only "WITH" is emitted (spec.md §4.4).
            prev_had_right_glue = has_right_glue(t);
            continue;
        }

        let needs_space = !prev_had_right_glue && !has_left_glue(t) && !out.is_empty();
        if needs_space {
            out.push(' ');
        }
        out.push_str(&surface_form(t, package));
        prev_had_right_glue = has_right_glue(t);
    }
    out
}

fn has_left_glue(t: &DecodedToken) -> bool {
    matches!(t.factors.get(FactorTypeId::GlueLeft), Some(FactorValue::GlueLeft(Glue::Plus)))
}

fn has_right_glue(t: &DecodedToken) -> bool {
    matches!(t.factors.get(FactorTypeId::GlueRight), Some(FactorValue::GlueRight(Glue::Plus)))
}

fn surface_form(t: &DecodedToken, package: &DecoderPackage) -> String {
    if let Some(c) = t.literal {
        return c.to_string();
    }

    if t.factors.has(FactorTypeId::Class) {
        return t
            .factors
            .get(FactorTypeId::Index)
            .and_then(|f| match f {
                FactorValue::Index(n) => package.decode_as_by_index.get(n),
                _ => None,
            })
            .cloned()
            .unwrap_or_default();
    }

    let base = t.lemma.strip_prefix(WORD_BEGIN_PREFIX).unwrap_or(&t.lemma);

    match (t.factors.get(FactorTypeId::SingleCap), t.factors.get(FactorTypeId::Cap)) {
        (Some(FactorValue::SingleCap(SingleCap::Upper)), _) => base.to_uppercase(),
        (Some(FactorValue::SingleCap(SingleCap::Lower)), _) => base.to_lowercase(),
        (_, Some(FactorValue::Cap(Cap::All))) => base.to_uppercase(),
        (_, Some(FactorValue::Cap(Cap::Initial))) => title_case(base),
        (_, Some(FactorValue::Cap(Cap::None))) => base.to_lowercase(),
        _ => base.to_string(),
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{WordBeg, WordEnd};
    use crate::model::SegmenterOptions;

    fn wire_word(lemma: &str, cap: Cap, glue_left: Glue, glue_right: Glue) -> String {
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::Cap(cap));
        factors.set(FactorValue::WordBeg(WordBeg::Beg));
        factors.set(FactorValue::WordEnd(WordEnd::End));
        factors.set(FactorValue::GlueLeft(glue_left));
        factors.set(FactorValue::GlueRight(glue_right));
        let _ = SegmenterOptions::default();
        crate::serializer::serialize_token(lemma, &factors, None, &SegmenterOptions::default())[0].clone()
    }

    #[test]
    fn reconstructs_simple_two_word_sentence() {
        let tokens = vec![
            wire_word("HELLO", Cap::Initial, Glue::Minus, Glue::Minus),
            wire_word("WORLD", Cap::None, Glue::Minus, Glue::Minus),
        ];
        let result = decode(&tokens, &DecoderPackage::new(), &Alignment::default()).unwrap();
        assert_eq!(result.text, "Hello world");
    }

    #[test]
    fn unrepresentable_roundtrips_through_digit_run() {
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::Cap(Cap::None));
        factors.set(FactorValue::GlueLeft(Glue::Minus));
        factors.set(FactorValue::GlueRight(Glue::Minus));
        let wire = crate::serializer::serialize_token(
            "{unk,c,gl,gr}",
            &factors,
            Some('x' as u32),
            &SegmenterOptions::default(),
        );
        let result = decode(&wire, &DecoderPackage::new(), &Alignment::default()).unwrap();
        assert_eq!(result.text, "x");
    }

    #[test]
    fn malformed_digit_run_is_dropped_not_fatal() {
        // head with no terminator token at all: the head is invalidated
        // and dropped, while the stray digit token is left to decode as
        // an ordinary (if nonsensical) token rather than failing the
        // whole line.
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::Cap(Cap::None));
        let head = crate::serializer::serialize_token("{unk,c}", &factors, None, &SegmenterOptions::default());
        let wire = vec![head[0].clone(), "4".to_string()];
        let result = decode(&wire, &DecoderPackage::new(), &Alignment::default()).unwrap();
        assert_eq!(result.text, "4");
    }

    #[test]
    fn missing_phrase_fix_is_reinserted_from_package() {
        let mut package = DecoderPackage::new();
        package.decode_as_by_index.insert(3, "First Class".to_string());
        package.source_index_by_class.insert(3, 0);
        let tokens = vec![wire_word("HELLO", Cap::Initial, Glue::Minus, Glue::Minus)];
        let result = decode(&tokens, &package, &Alignment::default()).unwrap();
        assert_eq!(result.text, "Hello First Class");
    }
}
