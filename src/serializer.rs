//! Wire-format token serialization (C5, spec.md §4.5).
//!
//! A serialized token is `<lemma>|<factor>|<factor>|...`, factors already
//! in canonical (I5) order. Lemmas are escaped so that `|`, whitespace,
//! and backslash never appear literally — the delimiter the rest of the
//! pipeline splits tokens on. Two boolean-ish model options change the
//! shape of the wire stream rather than a single token: sentence-level
//! annotations prepend `<SLA:type=value>` pseudo-tokens, and
//! `serialize_indices_and_unrepresentables` spells a class index or an
//! unrepresentable character's code point as a run of single-digit
//! pseudo-tokens instead of folding it into the preceding token.

use crate::error::Error;
use crate::factor::{canonicalize_order, FactorTypeId, FactorValue};
use crate::model::{InlineFixMode, SegmenterOptions};
use crate::token::FactorTuple;

/// True when `lemma` matches the special-token pattern (spec.md §4.5):
/// starts with `<` and is longer than two characters (`<unk>`, `<s>`,
/// `<SLA:...>`, ...), or starts with `{` (the synthetic class/unk lemmas).
/// Such lemmas are emitted verbatim rather than escaped.
#[must_use]
pub fn is_special_token(s: &str) -> bool {
    (s.starts_with('<') && s.chars().count() > 2) || s.starts_with('{')
}

/// Escapes every character in `{U+0000..=U+0020, \, |, _, :, #, <, >,
/// U+FFFF}` so the result contains none of the wire format's structural
/// characters, unless `s` matches the special-token pattern (see
/// [`is_special_token`]), in which case it passes through unchanged.
#[must_use]
pub fn escape_lemma(s: &str) -> String {
    if is_special_token(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let cp = c as u32;
        let needs_escape = cp <= 0x20
            || matches!(c, '\\' | '|' | '_' | ':' | '#' | '<' | '>')
            || cp == 0xFFFF;
        if !needs_escape {
            out.push(c);
            continue;
        }
        if cp <= 0xFF {
            out.push_str(&format!("\\x{cp:02x}"));
        } else if cp <= 0xFFFF {
            out.push_str(&format!("\\u{cp:04x}"));
        } else {
            // Outside the BMP: encode as a UTF-16 surrogate pair, each
            // half written with the same \uHHHH escape.
            let v = cp - 0x10000;
            let high = 0xD800 + (v >> 10);
            let low = 0xDC00 + (v & 0x3FF);
            out.push_str(&format!("\\u{high:04x}\\u{low:04x}"));
        }
    }
    out
}

/// Inverse of [`escape_lemma`]. Malformed escapes are a `MalformedWire`
/// error (spec.md §7).
pub fn unescape_lemma(s: &str) -> Result<String, Error> {
    let bytes: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    let mut pending_high_surrogate: Option<u32> = None;
    while i < bytes.len() {
        if bytes[i] != '\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        if i + 1 >= bytes.len() {
            return Err(Error::MalformedWire(format!("dangling escape in `{s}`")));
        }
        match bytes[i + 1] {
            'x' => {
                let hex: String = bytes.get(i + 2..i + 4).ok_or_else(|| {
                    Error::MalformedWire(format!("truncated \\x escape in `{s}`"))
                })?.iter().collect();
                let cp = u32::from_str_radix(&hex, 16)
                    .map_err(|_| Error::MalformedWire(format!("bad \\x escape in `{s}`")))?;
                out.push(char::from_u32(cp).ok_or_else(|| {
                    Error::MalformedWire(format!("invalid code point in `{s}`"))
                })?);
                i += 4;
            }
            'u' => {
                let hex: String = bytes.get(i + 2..i + 6).ok_or_else(|| {
                    Error::MalformedWire(format!("truncated \\u escape in `{s}`"))
                })?.iter().collect();
                let unit = u32::from_str_radix(&hex, 16)
                    .map_err(|_| Error::MalformedWire(format!("bad \\u escape in `{s}`")))?;
                if (0xD800..0xDC00).contains(&unit) {
                    pending_high_surrogate = Some(unit);
                } else if (0xDC00..0xE000).contains(&unit) {
                    let high = pending_high_surrogate.take().ok_or_else(|| {
                        Error::MalformedWire(format!("unpaired low surrogate in `{s}`"))
                    })?;
                    let cp = 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                    out.push(char::from_u32(cp).ok_or_else(|| {
                        Error::MalformedWire(format!("invalid surrogate pair in `{s}`"))
                    })?);
                } else {
                    out.push(char::from_u32(unit).ok_or_else(|| {
                        Error::MalformedWire(format!("invalid code point in `{s}`"))
                    })?);
                }
                i += 6;
            }
            other => {
                return Err(Error::MalformedWire(format!("unknown escape \\{other} in `{s}`")));
            }
        }
    }
    Ok(out)
}

/// One decoded unit of the wire stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WireUnit {
    Token { lemma: String, factors: Vec<FactorValue> },
    SentenceLevelAnnotation { annotation_type: String, value: String },
}

/// Renders the wire tokens for a single pre-factorized token (spec.md
/// §4.5). An unrepresentable character's head/digit-run form is
/// unconditional — it is how the crate transmits a code point with no
/// trained lemma regardless of any option. A class token's `Index` factor
/// is additionally exploded into a digit run, but only when
/// `serialize_indices_and_unrepresentables` is set; otherwise it stays an
/// inline `index042`-style factor. Both forms carry the same information,
/// so round-tripping (P1) holds either way.
#[must_use]
pub fn serialize_token(
    lemma: &str,
    factors: &FactorTuple,
    unrepresentable_codepoint: Option<u32>,
    options: &SegmenterOptions,
) -> Vec<String> {
    if let Some(codepoint) = unrepresentable_codepoint {
        let factors_no_index = factors.clone_without(FactorTypeId::Index);
        let mut out = vec![render_token(lemma, &factors_no_index)];
        out.extend(digit_tokens(codepoint));
        out.push(TAG_DIGIT_END.to_string());
        return out;
    }

    if !options.serialize_indices_and_unrepresentables {
        return vec![render_token(lemma, factors)];
    }

    let index_value = factors.get(FactorTypeId::Index).and_then(|f| match f {
        FactorValue::Index(n) => Some(*n),
        _ => None,
    });
    let factors_no_index = factors.clone_without(FactorTypeId::Index);
    let mut out = vec![render_token(lemma, &factors_no_index)];
    if let Some(n) = index_value {
        out.extend(digit_tokens(n));
        out.push(TAG_DIGIT_END.to_string());
    }
    out
}

fn render_token(lemma: &str, factors: &FactorTuple) -> String {
    let mut ordered: Vec<FactorValue> = factors.iter().cloned().collect();
    canonicalize_order(&mut ordered);
    let mut wire = escape_lemma(lemma);
    for f in &ordered {
        wire.push('|');
        wire.push_str(&f.wire());
    }
    wire
}

fn digit_tokens(n: u32) -> Vec<String> {
    n.to_string().chars().map(|d| d.to_string()).collect()
}

/// Extracts the factor-type prefix list from an unrepresentable lemma
/// `{unk,<types>}`, used by the decoder to validate a reconstructed token's
/// factor set against the types the lemma advertises (I1/I3).
#[must_use]
pub fn unk_types(lemma: &str) -> Option<Vec<String>> {
    let inner = lemma.strip_prefix("{unk,")?.strip_suffix('}')?;
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(inner.split(',').map(str::to_string).collect())
}

/// Parses a single wire token back into `(lemma, factors)`. Factor order
/// on the wire is assumed canonical but parsing does not require it.
pub fn parse_token(wire: &str) -> Result<(String, Vec<FactorValue>), Error> {
    let mut parts = wire.split('|');
    let lemma_part = parts.next().unwrap_or_default();
    let lemma = unescape_lemma(lemma_part)?;
    let mut factors = Vec::new();
    for part in parts {
        factors.push(FactorValue::parse(part)?);
    }
    Ok((lemma, factors))
}

/// Renders a sentence-level-annotation pseudo-token (spec.md §4.5):
/// `<SLA:type=value>`.
#[must_use]
pub fn format_sla(annotation_type: &str, value: &str) -> String {
    format!("<SLA:{annotation_type}={value}>")
}

/// Parses a `<SLA:type=value>` pseudo-token, if `wire` is one.
#[must_use]
pub fn parse_sla(wire: &str) -> Option<(String, String)> {
    let inner = wire.strip_prefix("<SLA:")?.strip_suffix('>')?;
    let (ty, value) = inner.split_once('=')?;
    Some((ty.to_string(), value.to_string()))
}

/// Renders the inline-fix delimiter tags (spec.md §4.4), used only when
/// `InlineFixMode::Tags` is configured.
pub const TAG_IOPEN: &str = "<IOPEN>";
pub const TAG_IDELIM: &str = "<IDELIM>";
pub const TAG_ICLOSE: &str = "<ICLOSE>";

/// Terminates a digit-encoded index/unrepresentable run (spec.md §4.5,
/// §4.6 step 3: "accumulate trailing digit sub-sequences until `<#>`").
/// Needed so the decoder can tell where a digit run ends even when the
/// next real token also happens to be a bare digit lemma.
pub const TAG_DIGIT_END: &str = "<#>";

#[must_use]
pub fn inline_fix_uses_tags(mode: InlineFixMode) -> bool {
    matches!(mode, InlineFixMode::Tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{Cap, WordBeg};

    #[test]
    fn escape_round_trips_pipe_and_backslash_and_space() {
        for s in ["a|b", "a\\b", "a b", "tab\tend"] {
            let escaped = escape_lemma(s);
            assert!(!escaped.contains('|') || s == "a|b" && escaped.contains("\\x7c"));
            assert_eq!(unescape_lemma(&escaped).unwrap(), s);
        }
    }

    #[test]
    fn escape_covers_the_full_structural_character_set() {
        for s in ["a_b", "a:b", "a#b", "a<b", "a>b", "a\u{ffff}b"] {
            let escaped = escape_lemma(s);
            assert!(
                !escaped.contains(['_', ':', '#', '<', '>', '\u{ffff}']),
                "escape_lemma({s:?}) left a structural character in {escaped:?}"
            );
            assert_eq!(unescape_lemma(&escaped).unwrap(), s);
        }
    }

    #[test]
    fn special_token_pattern_is_emitted_verbatim() {
        for s in ["<unk>", "<s>", "</s>", "<SLA:domain=medical>", "{word}", "{unk,c,wb}"] {
            assert_eq!(escape_lemma(s), s);
        }
    }

    #[test]
    fn short_angle_bracket_lemma_is_not_treated_as_special() {
        // "<s" is length 2, not > 2, so it still gets escaped like any
        // ordinary lemma rather than passed through verbatim.
        let escaped = escape_lemma("<s");
        assert_ne!(escaped, "<s");
        assert_eq!(unescape_lemma(&escaped).unwrap(), "<s");
    }

    #[test]
    fn escape_round_trips_non_bmp_via_surrogate_pair() {
        let s = "😀";
        let escaped = escape_lemma(s);
        assert_eq!(unescape_lemma(&escaped).unwrap(), s);
    }

    #[test]
    fn render_and_parse_round_trip_canonical_order() {
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::WordBeg(WordBeg::Beg));
        factors.set(FactorValue::Cap(Cap::Initial));
        let wire = render_token("HELLO", &factors);
        assert_eq!(wire, "HELLO|ci|wb");
        let (lemma, parsed) = parse_token(&wire).unwrap();
        assert_eq!(lemma, "HELLO");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn sla_round_trips() {
        let wire = format_sla("domain", "medical");
        assert_eq!(parse_sla(&wire), Some(("domain".to_string(), "medical".to_string())));
    }

    #[test]
    fn digit_serialization_splits_index_into_single_digit_tokens() {
        let mut options = crate::model::SegmenterOptions::default();
        options.serialize_indices_and_unrepresentables = true;
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::Index(42));
        let tokens = serialize_token("{word}", &factors, None, &options);
        assert_eq!(
            tokens,
            vec!["{word}".to_string(), "4".to_string(), "2".to_string(), TAG_DIGIT_END.to_string()]
        );
    }

    #[test]
    fn unrepresentable_codepoint_always_gets_a_digit_run_regardless_of_option() {
        let options = crate::model::SegmenterOptions::default();
        let factors = FactorTuple::new();
        let tokens = serialize_token("{unk,c}", &factors, Some(0x0041), &options);
        assert_eq!(
            tokens,
            vec!["{unk,c}".to_string(), "6".to_string(), "5".to_string(), TAG_DIGIT_END.to_string()]
        );
    }

    #[test]
    fn unk_types_parses_the_factor_type_list() {
        assert_eq!(unk_types("{unk,c,wb}"), Some(vec!["c".to_string(), "wb".to_string()]));
        assert_eq!(unk_types("{unk,}"), Some(Vec::new()));
        assert_eq!(unk_types("HELLO"), None);
    }
}
