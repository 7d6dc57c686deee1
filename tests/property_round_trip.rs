//! Property tests generated with `proptest`, exercising P1 (round-trip)
//! and the lemma escaping codec over a restricted alphabet of
//! representable characters rather than arbitrary Unicode, so failures
//! point at real defects instead of the already-documented P1 exceptions
//! in `round_trip.rs` (the bare-U+2581 run and tag-stripping scenarios).

use proptest::prelude::*;

use factored_segmenter::model::{Model, SegmenterOptions};
use factored_segmenter::serializer::{escape_lemma, unescape_lemma};
use factored_segmenter::Segmenter;

fn plain_segmenter() -> Segmenter {
    Segmenter::new(Model {
        options: SegmenterOptions::default(),
        oracle: None,
        known_lemmas: Default::default(),
        shortlist: Vec::new(),
        factor_spec: Default::default(),
    })
}

fn word() -> impl Strategy<Value = String> {
    "[A-Za-z]{1,8}"
}

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..6).prop_map(|words| words.join(" "))
}

proptest! {
    // P1: decode(encode(line)) == line, for a model with no trained
    // oracle (character-level fallback is still fully reversible). Covers
    // the capitalization-per-piece fix directly, since generated words mix
    // `Cap::Initial`/`Cap::All`/`Cap::None` across multi-character runs.
    #[test]
    fn p1_round_trips_generated_sentences(line in sentence()) {
        let segmenter = plain_segmenter();
        let encoded = segmenter.encode_line(&line, &[]).unwrap();
        let decoded = segmenter
            .decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment)
            .unwrap();
        prop_assert_eq!(decoded.text, line);
    }

    // The lemma escaping codec (spec.md §4.5) must invert over any string
    // that doesn't match the special-token passthrough pattern, not just
    // the hand-picked samples in serializer.rs's own unit tests. Strings
    // starting with `<`/`{` are excluded here because the spec defines
    // those as verbatim passthrough (no escaping applied at all), so the
    // "no structural characters leak through" guarantee doesn't apply to
    // them — only real pipeline lemmas ever take that shape, never
    // arbitrary text.
    #[test]
    fn lemma_escaping_round_trips_arbitrary_strings(
        s in ".*".prop_filter("not special-token pattern", |s| {
            !factored_segmenter::serializer::is_special_token(s)
        })
    ) {
        let escaped = escape_lemma(&s);
        prop_assert!(!escaped.contains('|'));
        prop_assert_eq!(unescape_lemma(&escaped).unwrap(), s);
    }
}
