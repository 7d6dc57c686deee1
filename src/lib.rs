//! # factored-segmenter
//!
//! A reversible, factored text tokenizer for NMT: text goes in as a plain
//! string and comes back out as a stream of `<lemma>|<factor>|...` wire
//! tokens that can always be decoded back to the original string.
//! Capitalization, word-boundary, and spacing information travel as
//! orthogonal *factors* on each lemma rather than being baked into the
//! lemma itself, so the downstream NMT model can predict them
//! independently of the word identity.
//!
//! ## Pipeline
//!
//! - `pretokenizer` (C2) splits a line into spans honoring caller-supplied
//!   [`span::AnnotatedSpan`] annotations (phrase-fixes, deletions, inline
//!   fixes) and the usual Unicode word-break rules.
//! - `factorizer` (C4) walks those spans, assigns every factor, and
//!   delegates subword splitting to a [`piece_oracle::PieceOracle`] (C3).
//! - `serializer` (C5) renders factorized tokens to the wire format.
//! - `decoder` (C6) reverses all of it.
//! - `trainer` (C7) derives a [`model::Model`] (oracle, lemma set, factor
//!   spec) from a training corpus.
//!
//! ## Example
//!
//! ```no_run
//! use factored_segmenter::{Segmenter, model::Model};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = Model::load("model.fsm")?;
//! let segmenter = Segmenter::new(model);
//!
//! let encoded = segmenter.encode_line("Hello world!", &[])?;
//! let decoded = segmenter.decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment)?;
//! assert_eq!(decoded.text, "Hello world!");
//! # Ok(())
//! # }
//! ```

pub mod alignment;
pub mod classifier;
pub mod decoder;
pub mod error;
pub mod factor;
pub mod factorizer;
pub mod invariants;
pub mod model;
pub mod piece_oracle;
pub mod pretokenizer;
pub mod serializer;
pub mod span;
pub mod token;
pub mod trainer;

pub use alignment::Alignment;
pub use error::Error;
pub use model::Model;
pub use span::AnnotatedSpan;

use std::collections::HashMap;

use factor::{FactorTypeId, FactorValue, InlineFixRole};
use model::InlineFixMode;
use piece_oracle::{CachedOracle, PieceOracle};

/// Default capacity of the oracle's memoizing cache (spec.md §5:
/// "a bounded cache keyed by word").
const ORACLE_CACHE_CAPACITY: usize = 65_536;

/// The result of encoding one line: the wire token stream, everything the
/// matching `decode_line` call needs ([`decoder::DecoderPackage`]), and
/// the source-to-target alignment over the emitted tokens.
pub struct EncodeResult {
    pub wire_tokens: Vec<String>,
    pub package: decoder::DecoderPackage,
    pub alignment: Alignment,
}

/// Ties a trained [`Model`] to a ready-to-use oracle and exposes the
/// line-level encode/decode surface (spec.md §2 "System overview").
///
/// `Segmenter` is `Send + Sync`: the oracle cache is mutex-guarded and
/// every other field is immutable after construction, so one instance can
/// be shared across threads for batch encoding (spec.md §5).
pub struct Segmenter {
    model: Model,
    oracle: Box<dyn PieceOracle>,
    /// Per-line pretokenizer index-assignment seed (spec.md §4.2). Fixed
    /// rather than derived from wall-clock time so encoding is
    /// deterministic given the same line and span set.
    seed: u64,
}

impl Segmenter {
    /// Wraps `model`'s oracle in a bounded cache (spec.md §5) and seeds
    /// index assignment deterministically.
    #[must_use]
    pub fn new(model: Model) -> Self {
        Self::with_seed(model, 0)
    }

    /// Same as [`Segmenter::new`] but with an explicit pretokenizer seed,
    /// useful for tests that need to pin which indices get assigned.
    #[must_use]
    pub fn with_seed(model: Model, seed: u64) -> Self {
        let oracle: Box<dyn PieceOracle> = match &model.oracle {
            Some(blob) => match blob {
                piece_oracle::OracleBlob::Unigram(o) => {
                    Box::new(CachedOracle::new(o.clone(), ORACLE_CACHE_CAPACITY))
                }
                piece_oracle::OracleBlob::Bpe(o) => {
                    Box::new(CachedOracle::new(o.clone(), ORACLE_CACHE_CAPACITY))
                }
            },
            None => Box::new(NoOracle),
        };
        Segmenter { model, oracle, seed }
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Encodes one line of text into wire tokens (spec.md §4.2-§4.5 run
    /// end to end). `spans` must be non-overlapping and sorted by start
    /// offset, or [`pretokenizer::pretokenize`] reports `InvalidAnnotation`.
    pub fn encode_line(
        &self,
        line: &str,
        spans: &[AnnotatedSpan],
    ) -> Result<EncodeResult, Error> {
        let pre = pretokenizer::pretokenize(line, spans, &self.model.options, self.seed)?;
        let factored =
            factorizer::factorize(&pre.tokens, self.oracle.as_ref(), &self.model.known_lemmas, &self.model.options)?;

        let mut wire_tokens = Vec::new();
        let mut alignment_links = Vec::new();
        let mut source_index_by_class = HashMap::new();
        let use_inline_fix_tags = self.model.options.inline_fixes == InlineFixMode::Tags;

        let mut source_index = 0;
        while source_index < factored.len() {
            let token = &factored[source_index];
            let is_what =
                matches!(token.factors.get(FactorTypeId::InlineFix), Some(FactorValue::InlineFix(InlineFixRole::What)));

            if use_inline_fix_tags && is_what && source_index + 1 < factored.len() {
                let with_token = &factored[source_index + 1];
                let is_with = matches!(
                    with_token.factors.get(FactorTypeId::InlineFix),
                    Some(FactorValue::InlineFix(InlineFixRole::With))
                );
                if is_with {
                    // "use-tags" option (spec.md §4.4): the pair's roles
                    // travel as explicit delimiter tokens on the wire
                    // instead of as `inlineFix` factors on the tokens
                    // themselves, so strip that factor before rendering.
                    let target_index = wire_tokens.len();
                    alignment_links.push(alignment::AlignmentLink { source_index, target_index, confidence: 1.0 });
                    alignment_links.push(alignment::AlignmentLink {
                        source_index: source_index + 1,
                        target_index,
                        confidence: 1.0,
                    });
                    wire_tokens.push(serializer::TAG_IOPEN.to_string());
                    wire_tokens.extend(serializer::serialize_token(
                        &token.lemma,
                        &token.factors.clone_without(FactorTypeId::InlineFix),
                        token.unrepresentable_codepoint,
                        &self.model.options,
                    ));
                    wire_tokens.push(serializer::TAG_IDELIM.to_string());
                    wire_tokens.extend(serializer::serialize_token(
                        &with_token.lemma,
                        &with_token.factors.clone_without(FactorTypeId::InlineFix),
                        with_token.unrepresentable_codepoint,
                        &self.model.options,
                    ));
                    wire_tokens.push(serializer::TAG_ICLOSE.to_string());
                    source_index += 2;
                    continue;
                }
            }

            let target_index = wire_tokens.len();
            alignment_links.push(alignment::AlignmentLink { source_index, target_index, confidence: 1.0 });

            if token.factors.has(FactorTypeId::Class) {
                if let Some(FactorValue::Index(n)) = token.factors.get(FactorTypeId::Index) {
                    source_index_by_class.insert(*n, source_index);
                }
            }

            wire_tokens.extend(serializer::serialize_token(
                &token.lemma,
                &token.factors,
                token.unrepresentable_codepoint,
                &self.model.options,
            ));
            source_index += 1;
        }

        for sla in &self.model.options.sentence_level_annotations {
            wire_tokens.insert(0, serializer::format_sla(sla, ""));
        }

        let package =
            decoder::DecoderPackage { decode_as_by_index: pre.decode_as_by_index, source_index_by_class };

        Ok(EncodeResult { wire_tokens, package, alignment: Alignment::new(alignment_links) })
    }

    /// Decodes a wire token stream back to a surface string (spec.md
    /// §4.6).
    pub fn decode_line(
        &self,
        wire_tokens: &[String],
        package: &decoder::DecoderPackage,
        alignment: &Alignment,
    ) -> Result<decoder::DecodeResult, Error> {
        decoder::decode(wire_tokens, package, alignment)
    }

    /// Batch convenience (SPEC_FULL.md ambient stack, error-handling
    /// section): encodes every line independently, catching per-line
    /// failures rather than aborting the whole batch (spec.md §7's
    /// propagation policy for stream-processing drivers).
    pub fn encode_lines(&self, lines: &[String]) -> Vec<Result<EncodeResult, Error>> {
        lines
            .iter()
            .map(|line| {
                let result = self.encode_line(line, &[]);
                if let Err(ref e) = result {
                    tracing::warn!(error = %e, "failed to encode line, substituting empty result");
                }
                result
            })
            .collect()
    }
}

/// Used when a model has no trained oracle: every word-nature token falls
/// back to unrepresentable handling rather than panicking.
struct NoOracle;

impl PieceOracle for NoOracle {
    fn split(&self, _word: &str) -> Result<Option<Vec<(usize, usize)>>, Error> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmenterOptions;
    use std::collections::BTreeSet;

    fn test_model() -> Model {
        Model {
            options: SegmenterOptions::default(),
            oracle: None,
            known_lemmas: BTreeSet::new(),
            shortlist: Vec::new(),
            factor_spec: model::FactorSpec::default(),
        }
    }

    #[test]
    fn encode_then_decode_round_trips_simple_sentence() {
        let segmenter = Segmenter::new(test_model());
        let encoded = segmenter.encode_line("Hello world", &[]).unwrap();
        let decoded = segmenter.decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment).unwrap();
        assert_eq!(decoded.text, "Hello world");
    }

    #[test]
    fn encode_then_decode_round_trips_punctuation_and_capitalization() {
        let segmenter = Segmenter::new(test_model());
        let encoded = segmenter.encode_line("Also A Test!", &[]).unwrap();
        let decoded = segmenter.decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment).unwrap();
        assert_eq!(decoded.text, "Also A Test!");
    }

    #[test]
    fn phrase_fix_span_round_trips_through_decode_as() {
        let segmenter = Segmenter::new(test_model());
        let spans = vec![AnnotatedSpan {
            start_index: 0,
            length: 5,
            class_type: Some("phrasefix".to_string()),
            instructions: String::new(),
            decode_as: Some("Bonjour".to_string()),
            encode_as_if: None,
        }];
        let encoded = segmenter.encode_line("Hello world", &spans).unwrap();
        let decoded = segmenter.decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment).unwrap();
        assert_eq!(decoded.text, "Bonjour world");
    }

    // "use-tags" inline-fix mode (spec.md §4.4): the pair's roles travel
    // as `<IOPEN>`/`<IDELIM>`/`<ICLOSE>` wire tokens instead of `inlineFix`
    // factors, but decoding still reconstructs the same surface text.
    #[test]
    fn inline_fix_tags_mode_emits_delimiters_and_round_trips() {
        let mut options = SegmenterOptions::default();
        options.inline_fixes = crate::model::InlineFixMode::Tags;
        options.class_span_mode = crate::span::ClassSpanMode::InlineFix;
        let model = Model {
            options,
            oracle: None,
            known_lemmas: BTreeSet::new(),
            shortlist: Vec::new(),
            factor_spec: model::FactorSpec::default(),
        };
        let segmenter = Segmenter::new(model);
        let spans = vec![AnnotatedSpan {
            start_index: 0,
            length: 5,
            class_type: Some("inlinefix".to_string()),
            instructions: String::new(),
            decode_as: Some("Bonjour".to_string()),
            encode_as_if: None,
        }];
        let encoded = segmenter.encode_line("Hello world", &spans).unwrap();
        assert!(encoded.wire_tokens.iter().any(|t| t == "<IOPEN>"));
        assert!(encoded.wire_tokens.iter().any(|t| t == "<IDELIM>"));
        assert!(encoded.wire_tokens.iter().any(|t| t == "<ICLOSE>"));
        assert!(!encoded.wire_tokens.iter().any(|t| t.contains("iwhat") || t.contains("iwith")));

        let decoded = segmenter.decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment).unwrap();
        assert_eq!(decoded.text, "Bonjour world");
    }

    #[test]
    fn encode_lines_catches_per_line_errors_without_aborting_the_batch() {
        let segmenter = Segmenter::new(test_model());
        let lines = vec!["Hello".to_string(), "World".to_string()];
        let results = segmenter.encode_lines(&lines);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
    }
}
