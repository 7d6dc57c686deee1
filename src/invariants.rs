//! Runtime invariant assertions (spec.md §3, I1-I5).
//!
//! Debug-mode checks that the factorizer and decoder can call inline to
//! catch a broken invariant at the point it was produced rather than as a
//! confusing downstream symptom. Active only when `debug_assertions` is
//! on; no-ops (and their arguments go unused) in release builds, same
//! shape as the rest of this crate's debug-only assertion helpers.
//!
//! I6 (round-trip) is not a per-token property and is instead exercised
//! by the integration and property tests in `tests/`.

use std::collections::{BTreeSet, HashMap};

use crate::factor::{FactorTypeId, FactorValue};
use crate::token::FactorTuple;

/// I5: factors are already in canonical (alphabetic-on-prefix) order.
#[inline]
pub fn assert_canonical_order(factors: &[FactorValue]) {
    #[cfg(debug_assertions)]
    {
        for pair in factors.windows(2) {
            debug_assert!(
                pair[0].factor_type().prefix() <= pair[1].factor_type().prefix(),
                "Invariant violation (I5): factor order not canonical: {} before {}",
                pair[0].factor_type().prefix(),
                pair[1].factor_type().prefix()
            );
        }
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = factors;
    }
}

/// I2: a token carrying `class` also carries `index`.
#[inline]
pub fn assert_class_implies_index(factors: &FactorTuple) {
    #[cfg(debug_assertions)]
    {
        if factors.has(FactorTypeId::Class) {
            debug_assert!(
                factors.has(FactorTypeId::Index),
                "Invariant violation (I2): class factor present without index"
            );
        }
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = factors;
    }
}

/// I3: exactly one of `{glueLeft, wordBeg, wordInt, csBeg}` is present.
#[inline]
pub fn assert_exactly_one_left_context_factor(factors: &FactorTuple) {
    #[cfg(debug_assertions)]
    {
        let count = [
            factors.has(FactorTypeId::GlueLeft),
            factors.has(FactorTypeId::WordBeg),
            factors.has(FactorTypeId::WordInt),
            factors.has(FactorTypeId::CsBeg),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        debug_assert!(
            count == 1,
            "Invariant violation (I3): expected exactly one of glueLeft/wordBeg/wordInt/csBeg, found {count}"
        );
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = factors;
    }
}

/// I4: `glueLeft` and `glueRight` appear together.
#[inline]
pub fn assert_glue_left_implies_glue_right(factors: &FactorTuple) {
    #[cfg(debug_assertions)]
    {
        debug_assert!(
            factors.has(FactorTypeId::GlueLeft) == factors.has(FactorTypeId::GlueRight),
            "Invariant violation (I4): glueLeft and glueRight must appear together"
        );
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = factors;
    }
}

/// I1: the set of factor types for a given lemma is fixed across every
/// token with that lemma. `observed` accumulates lemma -> type-set
/// across a stream of tokens; call once per emitted token.
///
/// # Panics
///
/// Panics in debug builds if `lemma` was seen before with a different
/// factor-type set.
#[inline]
pub fn assert_lemma_factor_types_consistent(
    observed: &mut HashMap<String, BTreeSet<FactorTypeId>>,
    lemma: &str,
    types: &BTreeSet<FactorTypeId>,
) {
    #[cfg(debug_assertions)]
    {
        match observed.get(lemma) {
            Some(existing) => {
                debug_assert!(
                    existing == types,
                    "Invariant violation (I1): lemma `{lemma}` factor-type set changed: {existing:?} vs {types:?}"
                );
            }
            None => {
                observed.insert(lemma.to_string(), types.clone());
            }
        }
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = (observed, lemma, types);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{Cap, Glue, WordBeg};

    #[test]
    fn canonical_order_accepts_sorted_factors() {
        let factors = vec![FactorValue::Cap(Cap::Initial), FactorValue::WordBeg(WordBeg::Beg)];
        assert_canonical_order(&factors);
    }

    #[test]
    #[should_panic(expected = "Invariant violation (I5)")]
    #[cfg(debug_assertions)]
    fn canonical_order_rejects_unsorted_factors() {
        let factors = vec![FactorValue::WordBeg(WordBeg::Beg), FactorValue::Cap(Cap::Initial)];
        assert_canonical_order(&factors);
    }

    #[test]
    fn class_without_index_is_flagged() {
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::Class("phrasefix".to_string()));
        // intentionally no Index set
        let result = std::panic::catch_unwind(|| assert_class_implies_index(&factors));
        #[cfg(debug_assertions)]
        assert!(result.is_err());
        #[cfg(not(debug_assertions))]
        assert!(result.is_ok());
    }

    #[test]
    fn exactly_one_left_context_factor_accepts_word_beg_alone() {
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::WordBeg(WordBeg::Beg));
        assert_exactly_one_left_context_factor(&factors);
    }

    #[test]
    fn glue_left_without_glue_right_is_flagged() {
        let mut factors = FactorTuple::new();
        factors.set(FactorValue::GlueLeft(Glue::Plus));
        let result = std::panic::catch_unwind(|| assert_glue_left_implies_glue_right(&factors));
        #[cfg(debug_assertions)]
        assert!(result.is_err());
        #[cfg(not(debug_assertions))]
        assert!(result.is_ok());
    }

    #[test]
    fn lemma_factor_type_consistency_accepts_repeats_and_flags_conflicts() {
        let mut observed = HashMap::new();
        let types: BTreeSet<FactorTypeId> = [FactorTypeId::Cap].into_iter().collect();
        assert_lemma_factor_types_consistent(&mut observed, "HELLO", &types);
        assert_lemma_factor_types_consistent(&mut observed, "HELLO", &types);

        let other: BTreeSet<FactorTypeId> = [FactorTypeId::WordBeg].into_iter().collect();
        let mut observed2 = observed.clone();
        let result = std::panic::catch_unwind(move || {
            assert_lemma_factor_types_consistent(&mut observed2, "HELLO", &other);
        });
        #[cfg(debug_assertions)]
        assert!(result.is_err());
        #[cfg(not(debug_assertions))]
        assert!(result.is_ok());
    }
}
