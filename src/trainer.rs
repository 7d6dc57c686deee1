//! Trainer (C7, spec.md §4.7).
//!
//! Drives the pipeline in reverse: bootstrap-encode a corpus without a
//! piece oracle to produce the oracle's own training data, train it,
//! re-encode to size the vocabulary against `min_piece_count`, then run
//! the full pipeline once more over the whole corpus to discover the
//! admissible lemma set and each lemma's factor-type map, before
//! persisting everything as a `Model`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;

use crate::error::Error;
use crate::factor::FactorTypeId;
use crate::factorizer::factorize;
use crate::model::{
    has_trait_name, FactorSpec, InlineFixMode, Model, SegmenterOptions, TrainerOptions, RESERVED_BOS,
    RESERVED_EOS, RESERVED_ICLOSE, RESERVED_IDELIM, RESERVED_IOPEN, RESERVED_UNK,
};
use crate::piece_oracle::{BpeOracle, OracleBackend, OracleBlob, PieceOracle, UnigramOracle};
use crate::pretokenizer::pretokenize;
use crate::token::{
    unrepresentable_lemma, TokenKind, CLASS_LEMMA_CONTINUOUS_SCRIPT, CLASS_LEMMA_PUNCTUATION, CLASS_LEMMA_WORD,
    CLASS_LEMMA_WORD_WO_CASE,
};

/// Longest substring a freshly trained unigram oracle considers as a
/// piece candidate (spec.md §4.7 doesn't name a bound; this mirrors
/// SentencePiece's conventional default).
const MAX_PIECE_LEN: usize = 16;

/// The representative strings spec.md §4.7 step 4 names for seeding the
/// four class-kind lemmas: a cased Latin word, a script with no case
/// distinction, a continuous (no-space) script, and a punctuation mark.
const CLASS_LEMMA_REPRESENTATIVES: [(&str, &str); 4] = [
    (CLASS_LEMMA_WORD, "Hello"),
    (CLASS_LEMMA_WORD_WO_CASE, "\u{0928}\u{092e}\u{0938}\u{094d}\u{0924}\u{0947}"),
    (CLASS_LEMMA_CONTINUOUS_SCRIPT, "\u{4f60}\u{597d}"),
    (CLASS_LEMMA_PUNCTUATION, "!"),
];

/// The representative unrepresentable characters spec.md §4.7 step 4
/// names for pre-registering every `{unk,<types>}` lemma variant a real
/// corpus is likely to need.
const UNREPRESENTABLE_REPRESENTATIVES: [&str; 7] = ["a", "0", ".", "\u{0924}", "\u{8d85}", "\u{24b6}", "\u{263a}"];

/// Trains a model over `corpus` (spec.md §4.7).
pub fn train(
    corpus: &[String],
    segmenter_options: &SegmenterOptions,
    trainer_options: &TrainerOptions,
) -> Result<Model, Error> {
    tracing::debug!(lines = corpus.len(), "bootstrap-encoding corpus for oracle training");
    let word_counts = bootstrap_word_counts(corpus, segmenter_options)?;

    let mut oracle = train_oracle(&word_counts, trainer_options)?;

    let piece_counts = count_pieces(&word_counts, oracle.as_oracle())?;
    let keep = piece_counts
        .iter()
        .filter(|(piece, count)| piece.chars().count() == 1 || **count >= u64::from(trainer_options.min_piece_count))
        .count();
    if keep < trainer_options.vocab_size {
        tracing::debug!(keep, vocab_size = trainer_options.vocab_size, "retraining oracle at reduced vocab size");
        let mut reduced = trainer_options.clone();
        reduced.vocab_size = keep;
        oracle = train_oracle(&word_counts, &reduced)?;
    }

    let (mut lemma_types, lemma_counts, mut value_sets) =
        discover_lemma_factor_types(corpus, oracle.as_oracle(), segmenter_options)?;

    for (class_lemma, types) in class_lemma_factor_types(segmenter_options)? {
        record_class_types(&mut value_sets, &types, segmenter_options);
        lemma_types.insert(class_lemma, types);
    }
    for unk_lemma in unrepresentable_class_lemmas(segmenter_options)? {
        lemma_types.entry(unk_lemma).or_default();
    }

    // Char-count trim (step 5): single-code-point lemmas seen too rarely
    // become unrepresentable at encode time rather than trained lemmas.
    lemma_types.retain(|lemma, _| {
        let is_single_char = lemma.chars().count() == 1;
        !is_single_char || lemma_counts.get(lemma).copied().unwrap_or(0) >= u64::from(trainer_options.min_char_count)
    });

    check_factor_space(&value_sets)?;

    let known_lemmas: BTreeSet<String> = lemma_types.keys().cloned().collect();
    let factor_spec = build_factor_spec(&lemma_types, &value_sets, segmenter_options);
    let shortlist = Model::build_shortlist(segmenter_options, &known_lemmas);

    Ok(Model {
        options: segmenter_options.clone(),
        oracle: Some(oracle),
        known_lemmas,
        shortlist,
        factor_spec,
    })
}

/// Trains then immediately persists, the common case for the CLI.
pub fn train_and_save(
    corpus: &[String],
    segmenter_options: &SegmenterOptions,
    trainer_options: &TrainerOptions,
    path: &std::path::Path,
) -> Result<(), Error> {
    let model = train(corpus, segmenter_options, trainer_options)?;
    model.save(path)
}

/// Step 1: C2 + C4 over one line with no piece oracle, emitting one
/// normalized piece string per non-space token.
fn bootstrap_pieces(line: &str, options: &SegmenterOptions) -> Result<Vec<String>, Error> {
    let pre = pretokenize(line, &[], options, 0)?;
    let mut out = Vec::new();
    for token in &pre.tokens {
        if token.kind == TokenKind::Space {
            continue;
        }
        out.push(crate::token::derive_lemma(
            token.kind,
            token.underlying(),
            true,
            options.distinguish_initial_and_internal_pieces,
        ));
    }
    Ok(out)
}

fn bootstrap_word_counts(corpus: &[String], options: &SegmenterOptions) -> Result<HashMap<String, u64>, Error> {
    let per_line: Vec<Vec<String>> =
        corpus.par_iter().map(|line| bootstrap_pieces(line, options)).collect::<Result<_, Error>>()?;
    let mut counts = HashMap::new();
    for pieces in per_line {
        for piece in pieces {
            *counts.entry(piece).or_insert(0u64) += 1;
        }
    }
    Ok(counts)
}

fn train_oracle(word_counts: &HashMap<String, u64>, options: &TrainerOptions) -> Result<OracleBlob, Error> {
    Ok(match options.oracle_backend {
        OracleBackend::Unigram => OracleBlob::Unigram(UnigramOracle::train(word_counts, options.vocab_size, MAX_PIECE_LEN)),
        OracleBackend::Bpe => OracleBlob::Bpe(BpeOracle::train(word_counts, options.vocab_size)),
    })
}

/// Step 3: re-splits every bootstrap piece through the freshly trained
/// oracle and tallies the resulting sub-pieces.
fn count_pieces(word_counts: &HashMap<String, u64>, oracle: &dyn PieceOracle) -> Result<HashMap<String, u64>, Error> {
    let mut counts = HashMap::new();
    for (word, freq) in word_counts {
        let Some(cuts) = oracle.split(word)? else { continue };
        for (start, len) in cuts {
            let piece = &word[start..start + len];
            *counts.entry(piece.to_string()).or_insert(0) += freq;
        }
    }
    Ok(counts)
}

/// A trivial oracle that never splits, used only to compute the
/// factor-type set a representative string's tokens would carry without
/// depending on the freshly trained oracle's own piece boundaries (step
/// 4's hard-coded registrations care about the per-token factor set, not
/// how the oracle happens to cut that particular string).
struct WholeTokenOracle;

impl PieceOracle for WholeTokenOracle {
    fn split(&self, word: &str) -> Result<Option<Vec<(usize, usize)>>, Error> {
        Ok(Some(vec![(0, word.len())]))
    }
}

fn factor_type_set_for(text: &str, options: &SegmenterOptions) -> Result<BTreeSet<FactorTypeId>, Error> {
    let pre = pretokenize(text, &[], options, 0)?;
    let factored = factorize(&pre.tokens, &WholeTokenOracle, &BTreeSet::new(), options)?;
    let mut types = BTreeSet::new();
    for token in &factored {
        types.extend(token.factors.type_set());
    }
    Ok(types)
}

/// Step 4's hard-coded class-lemma registration: a representative string
/// per class kind, with `class` (and `index` outside digit-serialized
/// index mode) added to the factor-type set it would otherwise carry.
fn class_lemma_factor_types(
    options: &SegmenterOptions,
) -> Result<Vec<(String, BTreeSet<FactorTypeId>)>, Error> {
    let mut out = Vec::new();
    for (class_lemma, representative) in CLASS_LEMMA_REPRESENTATIVES {
        let mut types = factor_type_set_for(representative, options)?;
        types.insert(FactorTypeId::Class);
        if !options.serialize_indices_and_unrepresentables {
            types.insert(FactorTypeId::Index);
        }
        out.push((class_lemma.to_string(), types));
    }
    Ok(out)
}

/// Step 4's unrepresentable-class registration: synthesizes the
/// `{unk,<types>}` lemma name for each representative unrepresentable
/// character, from the factor-type set that character's token would
/// carry.
fn unrepresentable_class_lemmas(options: &SegmenterOptions) -> Result<Vec<String>, Error> {
    let mut out = Vec::new();
    for representative in UNREPRESENTABLE_REPRESENTATIVES {
        let types = factor_type_set_for(representative, options)?;
        let type_list: Vec<FactorTypeId> = types.into_iter().collect();
        out.push(unrepresentable_lemma(&type_list));
    }
    Ok(out)
}

/// Scans the whole corpus once through the trained oracle, recording
/// every lemma's observed factor-type set (failing fast on an I1
/// disagreement), its occurrence count, and the distinct value strings
/// each factor type takes (needed for the word-id space check).
#[allow(clippy::type_complexity)]
fn discover_lemma_factor_types(
    corpus: &[String],
    oracle: &dyn PieceOracle,
    options: &SegmenterOptions,
) -> Result<(BTreeMap<String, BTreeSet<FactorTypeId>>, HashMap<String, u64>, BTreeMap<FactorTypeId, BTreeSet<String>>), Error>
{
    let mut lemma_types: BTreeMap<String, BTreeSet<FactorTypeId>> = BTreeMap::new();
    let mut lemma_counts: HashMap<String, u64> = HashMap::new();
    let mut value_sets: BTreeMap<FactorTypeId, BTreeSet<String>> = BTreeMap::new();
    let empty_known = BTreeSet::new();

    for line in corpus {
        let pre = pretokenize(line, &[], options, 0)?;
        let factored = factorize(&pre.tokens, oracle, &empty_known, options)?;
        for token in &factored {
            let types: BTreeSet<FactorTypeId> = token.factors.type_set().into_iter().collect();
            match lemma_types.get(&token.lemma) {
                Some(existing) if existing != &types => {
                    return Err(Error::MalformedWire(format!(
                        "factor-type set disagreement for lemma `{}`: {:?} vs {:?}",
                        token.lemma, existing, types
                    )));
                }
                Some(_) => {}
                None => {
                    lemma_types.insert(token.lemma.clone(), types);
                }
            }
            *lemma_counts.entry(token.lemma.clone()).or_insert(0) += 1;
            for factor in token.factors.iter() {
                value_sets.entry(factor.factor_type()).or_default().insert(factor.wire());
            }
        }
    }
    Ok((lemma_types, lemma_counts, value_sets))
}

/// Folds the hard-coded class lemmas' synthetic factor values (`class`
/// kind strings, `index` slots) into the corpus-observed value sets so
/// the word-id space check and factor spec see them too.
fn record_class_types(
    value_sets: &mut BTreeMap<FactorTypeId, BTreeSet<String>>,
    types: &BTreeSet<FactorTypeId>,
    options: &SegmenterOptions,
) {
    if types.contains(&FactorTypeId::Class) {
        value_sets.entry(FactorTypeId::Class).or_default().insert("classphrasefix".to_string());
    }
    if types.contains(&FactorTypeId::Index) && !options.serialize_indices_and_unrepresentables {
        for n in 0..crate::factor::MAX_INDEX {
            value_sets.entry(FactorTypeId::Index).or_default().insert(format!("index{n:03}"));
        }
    }
}

/// Step 6: `∏ (|values(t)| + 1) > 2^32` fails training outright.
fn check_factor_space(value_sets: &BTreeMap<FactorTypeId, BTreeSet<String>>) -> Result<(), Error> {
    let mut product: u128 = 1;
    for values in value_sets.values() {
        product *= values.len() as u128 + 1;
        if product > u128::from(u32::MAX) {
            return Err(Error::ResourceExhausted(format!(
                "factor-value product {product} exceeds the 2^32 id-space bound"
            )));
        }
    }
    Ok(())
}

/// Step 7: renders the declarative factor-spec grammar (spec.md §6).
fn build_factor_spec(
    lemma_types: &BTreeMap<String, BTreeSet<FactorTypeId>>,
    value_sets: &BTreeMap<FactorTypeId, BTreeSet<String>>,
    options: &SegmenterOptions,
) -> FactorSpec {
    let factor_types: Vec<(String, Vec<String>)> = value_sets
        .iter()
        .map(|(ty, values)| (ty.prefix().to_string(), values.iter().cloned().collect()))
        .collect();

    // The reserved-prefix lemmas here must match `Model::build_shortlist`
    // token-for-token and in the same order (P4: the factor spec's lemma
    // section equals the persisted shortlist) — the inline-fix delimiter
    // tokens and any configured SLA tokens included.
    let mut lemmas: Vec<(String, Vec<String>)> = vec![
        (RESERVED_UNK.to_string(), Vec::new()),
        (RESERVED_BOS.to_string(), Vec::new()),
        (RESERVED_EOS.to_string(), Vec::new()),
    ];
    if options.inline_fixes == InlineFixMode::Tags {
        lemmas.push((RESERVED_IOPEN.to_string(), Vec::new()));
        lemmas.push((RESERVED_IDELIM.to_string(), Vec::new()));
        lemmas.push((RESERVED_ICLOSE.to_string(), Vec::new()));
    }
    for sla in &options.sentence_level_annotations {
        lemmas.push((format!("<SLA:{sla}>"), Vec::new()));
    }
    // Escape then sort ordinally, matching `Model::build_shortlist` exactly
    // so the factor spec's lemma section equals the persisted shortlist
    // (P4).
    let mut escaped_lemmas: Vec<(String, Vec<String>)> = lemma_types
        .iter()
        .map(|(lemma, types)| {
            let mut traits: Vec<String> = types.iter().map(|t| has_trait_name(*t)).collect();
            traits.sort();
            (crate::serializer::escape_lemma(lemma), traits)
        })
        .collect();
    escaped_lemmas.sort_by(|a, b| a.0.cmp(&b.0));
    lemmas.extend(escaped_lemmas);

    let distributions: Vec<(String, String)> =
        value_sets.keys().map(|ty| (ty.prefix().to_string(), has_trait_name(*ty))).collect();

    FactorSpec { factor_types, lemmas, distributions }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "This is a test text for this module.".to_string(),
            "I think it is not very complex. I think.".to_string(),
            "This is mostly for testing that the thing actually runs, and for manual inspection of the generated vocab file."
                .to_string(),
        ]
    }

    #[test]
    fn trains_a_model_with_a_nonempty_shortlist_and_factor_spec() {
        let options = SegmenterOptions::default();
        let mut trainer_options = TrainerOptions::default();
        trainer_options.vocab_size = 64;
        trainer_options.min_char_count = 2;

        let model = train(&corpus(), &options, &trainer_options).unwrap();
        assert!(model.shortlist.len() > 3);
        assert!(model.oracle.is_some());
        assert!(!model.factor_spec.lemmas.is_empty());
        assert_eq!(model.factor_spec.lemma_names(), model.shortlist);
    }

    // Regression: P4 (shortlist == factor-spec lemma section) must hold
    // even when inline-fix tags and sentence-level annotations are
    // configured, not just under default options.
    #[test]
    fn shortlist_matches_factor_spec_lemmas_with_tags_and_sla_configured() {
        let mut options = SegmenterOptions::default();
        options.inline_fixes = InlineFixMode::Tags;
        options.sentence_level_annotations = vec!["domain".to_string()];
        let mut trainer_options = TrainerOptions::default();
        trainer_options.vocab_size = 64;
        trainer_options.min_char_count = 2;

        let model = train(&corpus(), &options, &trainer_options).unwrap();
        assert_eq!(model.factor_spec.lemma_names(), model.shortlist);
        assert!(model.shortlist.contains(&RESERVED_IOPEN.to_string()));
        assert!(model.shortlist.contains(&"<SLA:domain>".to_string()));
    }

    /// An oracle that always splits `"ununknown"` into three pieces
    /// so the same lemma text ("UN") appears once as a word-initial
    /// piece (no `wordInt`) and once as a word-internal piece (`wordInt`
    /// set) — a direct I1 violation.
    struct RepeatingPieceOracle;

    impl PieceOracle for RepeatingPieceOracle {
        fn split(&self, word: &str) -> Result<Option<Vec<(usize, usize)>>, Error> {
            if word == "ununknown" {
                Ok(Some(vec![(0, 2), (2, 2), (4, 5)]))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn conflicting_factor_type_sets_are_fatal() {
        let options = SegmenterOptions::default();
        let corpus = vec!["ununknown".to_string()];
        let result = discover_lemma_factor_types(&corpus, &RepeatingPieceOracle, &options);
        assert!(matches!(result, Err(Error::MalformedWire(_))));
    }

    #[test]
    fn factor_space_check_rejects_an_enormous_product() {
        let mut value_sets: BTreeMap<FactorTypeId, BTreeSet<String>> = BTreeMap::new();
        let mut huge = BTreeSet::new();
        for i in 0..70_000 {
            huge.insert(format!("v{i}"));
        }
        value_sets.insert(FactorTypeId::Cap, huge.clone());
        value_sets.insert(FactorTypeId::WordBeg, huge);
        assert!(check_factor_space(&value_sets).is_err());
    }
}
