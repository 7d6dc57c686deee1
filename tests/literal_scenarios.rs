//! The concrete regression scenarios from spec.md §8 that can be
//! verified without a trained piece oracle (scenarios 1, 2 and the
//! determinism half of P2; scenarios 5/6/7 require a trained model and
//! a live oracle to reproduce their exact segment counts, so they are
//! exercised at the property level elsewhere instead of being pinned
//! to magic numbers here).

use factored_segmenter::model::{Model, SegmenterOptions};
use factored_segmenter::pretokenizer::pretokenize;
use factored_segmenter::{AnnotatedSpan, Segmenter};

fn plain_segmenter() -> Segmenter {
    Segmenter::new(Model {
        options: SegmenterOptions::default(),
        oracle: None,
        known_lemmas: Default::default(),
        shortlist: Vec::new(),
        factor_spec: Default::default(),
    })
}

// Scenario 2 (spec.md §8): "-<<<>>>{{{}}}" splits into exactly 9
// segments before the piece oracle ever runs — every `<` and `{`
// forces a break on both sides, `>>>`/`}}}` each stay fused as one
// segment since nothing forces a further split between them.
#[test]
fn dash_angle_brace_curly_brace_run_splits_into_nine_segments() {
    let line = "-<<<>>>{{{}}}";
    let result = pretokenize(line, &[], &SegmenterOptions::default(), 0).unwrap();
    let segments: Vec<&str> = result.tokens.iter().map(|t| t.underlying()).collect();
    assert_eq!(segments, vec!["-", "<", "<", "<", ">>>", "{", "{", "{", "}}}"]);
}

// P2 (segment count stability): pre-tokenizing the same line twice
// (with two different RNG seeds, since segmentation doesn't depend on
// the seed at all — only class-span index assignment does) always
// yields the same segment count.
#[test]
fn segment_count_is_deterministic_across_seeds() {
    let line = "1\u{b0}C! This is a test, iPods cost    $3.14.";
    let a = pretokenize(line, &[], &SegmenterOptions::default(), 1).unwrap();
    let b = pretokenize(line, &[], &SegmenterOptions::default(), 999).unwrap();
    assert_eq!(a.tokens.len(), b.tokens.len());
}

// Scenario 1 (spec.md §8): two phrase-fix spans with distinct
// decode-as replacements. The decoded text is not byte-equal to the
// input, but it contains exactly the two force-decode surface forms
// P5 requires, each substituting the span it was assigned to.
#[test]
fn two_phrase_fix_spans_produce_two_force_decode_surface_forms() {
    let segmenter = plain_segmenter();
    let line = "They sent a tax to Ayodhya because we had defeated them in that famous 'Ashomedha' to rend it.";
    let spans = vec![
        AnnotatedSpan {
            start_index: 12,
            length: 14,
            class_type: Some("phrasefix".to_string()),
            instructions: String::new(),
            decode_as: Some("First Class".to_string()),
            encode_as_if: None,
        },
        AnnotatedSpan {
            start_index: 27,
            length: 7,
            class_type: Some("phrasefix".to_string()),
            instructions: String::new(),
            decode_as: Some("Economy Class".to_string()),
            encode_as_if: None,
        },
    ];

    let encoded = segmenter.encode_line(line, &spans).unwrap();
    let decoded = segmenter.decode_line(&encoded.wire_tokens, &encoded.package, &encoded.alignment).unwrap();

    assert_ne!(decoded.text, line);
    assert!(decoded.text.contains("First Class"));
    assert!(decoded.text.contains("Economy Class"));
    assert_eq!(
        decoded.text,
        "They sent a First Class Economy Class we had defeated them in that famous 'Ashomedha' to rend it."
    );
}

// Scenario 6 (spec.md §8): every Devanagari digit in a run of them is
// its own segment, never fused with a neighboring digit or with the
// surrounding Devanagari letters.
#[test]
fn every_devanagari_digit_is_its_own_segment() {
    let line = "\u{0930}\u{094b}\u{091c} \u{0968}\u{0966}\u{0967}\u{096a} \u{0915}\u{093e}";
    let result = pretokenize(line, &[], &SegmenterOptions::default(), 0).unwrap();
    let digit_segments: Vec<&str> =
        result.tokens.iter().map(|t| t.underlying()).filter(|s| s.chars().all(|c| c.is_numeric())).collect();
    assert_eq!(digit_segments, vec!["\u{0968}", "\u{0966}", "\u{0967}", "\u{096a}"]);
}
