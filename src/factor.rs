//! The factor-type/value registry (spec.md §3, §9).
//!
//! The source implementation keeps a process-global *mutable* dictionary of
//! factor types and values, created lazily the first time each one is
//! touched. We instead model factor types and values as plain Rust enums:
//! a finite, compile-time-known set, so "equality is identity" falls out of
//! deriving `PartialEq`/`Eq` on small `Copy` types instead of needing an
//! interning table. The parameterized variants (`Class`, `Index`) still
//! behave as singletons in the sense the spec cares about — two factors
//! compare equal iff they denote the same (type, value) pair.
//!
//! Serialization is centralized here (`FactorValue::wire`/`parse`) so the
//! serializer and decoder share one canonical mapping, which is what makes
//! I5 (stable canonical factor order) and round-tripping straightforward.

use crate::error::Error;

/// A factor type, identified by its wire prefix. Variants are declared in
/// the order spec.md §4.5/I5 requires tokens to serialize their factors:
/// alphabetic on the prefix string. `derive(Ord)` on this enum therefore
/// *is* the canonical factor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactorTypeId {
    Cap,
    CsBeg,
    CsEnd,
    Class,
    GlueLeft,
    GlueRight,
    InlineFix,
    Index,
    SingleCap,
    WordBeg,
    WordEnd,
    WordInt,
}

impl FactorTypeId {
    /// All factor types, already in canonical (alphabetic-on-prefix) order.
    pub const ALL: [FactorTypeId; 12] = [
        FactorTypeId::Cap,
        FactorTypeId::CsBeg,
        FactorTypeId::CsEnd,
        FactorTypeId::Class,
        FactorTypeId::GlueLeft,
        FactorTypeId::GlueRight,
        FactorTypeId::InlineFix,
        FactorTypeId::Index,
        FactorTypeId::SingleCap,
        FactorTypeId::WordBeg,
        FactorTypeId::WordEnd,
        FactorTypeId::WordInt,
    ];

    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            FactorTypeId::Cap => "c",
            FactorTypeId::CsBeg => "cb",
            FactorTypeId::CsEnd => "ce",
            FactorTypeId::Class => "class",
            FactorTypeId::GlueLeft => "gl",
            FactorTypeId::GlueRight => "gr",
            FactorTypeId::InlineFix => "i",
            FactorTypeId::Index => "index",
            FactorTypeId::SingleCap => "sc",
            FactorTypeId::WordBeg => "wb",
            FactorTypeId::WordEnd => "we",
            FactorTypeId::WordInt => "wi",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cap {
    Initial,
    All,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingleCap {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Glue {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordBeg {
    Beg,
    BegNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordEnd {
    End,
    EndNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsBeg {
    Beg,
    BegNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsEnd {
    End,
    EndNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InlineFixRole {
    What,
    With,
}

/// The maximum class/index value (spec.md §4.2: `MaxIndex = 40`, bounded by
/// the downstream factor-id width).
pub const MAX_INDEX: u32 = 40;

/// A bound (type, value) pair, as it would appear serialized on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FactorValue {
    Cap(Cap),
    SingleCap(SingleCap),
    GlueLeft(Glue),
    GlueRight(Glue),
    WordBeg(WordBeg),
    WordEnd(WordEnd),
    WordInt,
    CsBeg(CsBeg),
    CsEnd(CsEnd),
    /// Arbitrary caller-supplied class kind string (spec.md §4.1's
    /// `classType`), lowercased and alphanumeric-only on the wire.
    Class(String),
    Index(u32),
    InlineFix(InlineFixRole),
}

impl FactorValue {
    #[must_use]
    pub fn factor_type(&self) -> FactorTypeId {
        match self {
            FactorValue::Cap(_) => FactorTypeId::Cap,
            FactorValue::SingleCap(_) => FactorTypeId::SingleCap,
            FactorValue::GlueLeft(_) => FactorTypeId::GlueLeft,
            FactorValue::GlueRight(_) => FactorTypeId::GlueRight,
            FactorValue::WordBeg(_) => FactorTypeId::WordBeg,
            FactorValue::WordEnd(_) => FactorTypeId::WordEnd,
            FactorValue::WordInt => FactorTypeId::WordInt,
            FactorValue::CsBeg(_) => FactorTypeId::CsBeg,
            FactorValue::CsEnd(_) => FactorTypeId::CsEnd,
            FactorValue::Class(_) => FactorTypeId::Class,
            FactorValue::Index(_) => FactorTypeId::Index,
            FactorValue::InlineFix(_) => FactorTypeId::InlineFix,
        }
    }

    fn suffix(&self) -> String {
        match self {
            FactorValue::Cap(Cap::Initial) => "i".to_string(),
            FactorValue::Cap(Cap::All) => "a".to_string(),
            FactorValue::Cap(Cap::None) => "n".to_string(),
            FactorValue::SingleCap(SingleCap::Upper) => "u".to_string(),
            FactorValue::SingleCap(SingleCap::Lower) => "l".to_string(),
            FactorValue::GlueLeft(Glue::Plus) | FactorValue::GlueRight(Glue::Plus) => {
                "+".to_string()
            }
            FactorValue::GlueLeft(Glue::Minus) | FactorValue::GlueRight(Glue::Minus) => {
                "-".to_string()
            }
            FactorValue::WordBeg(WordBeg::Beg) => String::new(),
            FactorValue::WordBeg(WordBeg::BegNot) => "n".to_string(),
            FactorValue::WordEnd(WordEnd::End) => String::new(),
            FactorValue::WordEnd(WordEnd::EndNot) => "n".to_string(),
            FactorValue::WordInt => String::new(),
            FactorValue::CsBeg(CsBeg::Beg) => String::new(),
            FactorValue::CsBeg(CsBeg::BegNot) => "n".to_string(),
            FactorValue::CsEnd(CsEnd::End) => String::new(),
            FactorValue::CsEnd(CsEnd::EndNot) => "n".to_string(),
            FactorValue::Class(kind) => kind.to_lowercase(),
            FactorValue::Index(n) => format!("{n:03}"),
            FactorValue::InlineFix(InlineFixRole::What) => "what".to_string(),
            FactorValue::InlineFix(InlineFixRole::With) => "with".to_string(),
        }
    }

    /// Wire form: prefix followed by suffix, e.g. `ci`, `gl+`, `index042`.
    #[must_use]
    pub fn wire(&self) -> String {
        format!("{}{}", self.factor_type().prefix(), self.suffix())
    }

    /// Parses a single factor string back into its (type, value) pair.
    /// Unknown factor strings are `MalformedWire` (spec.md §7).
    pub fn parse(s: &str) -> Result<FactorValue, Error> {
        // Longest-prefix match over the known type prefixes, preferring
        // the longer of overlapping prefixes ("index" before "i").
        let mut prefixes: Vec<FactorTypeId> = FactorTypeId::ALL.to_vec();
        prefixes.sort_by_key(|t| std::cmp::Reverse(t.prefix().len()));

        for ty in prefixes {
            if let Some(suffix) = s.strip_prefix(ty.prefix()) {
                if let Some(value) = Self::from_type_and_suffix(ty, suffix) {
                    return Ok(value);
                }
            }
        }
        Err(Error::MalformedWire(format!("unknown factor `{s}`")))
    }

    fn from_type_and_suffix(ty: FactorTypeId, suffix: &str) -> Option<FactorValue> {
        Some(match (ty, suffix) {
            (FactorTypeId::Cap, "i") => FactorValue::Cap(Cap::Initial),
            (FactorTypeId::Cap, "a") => FactorValue::Cap(Cap::All),
            (FactorTypeId::Cap, "n") => FactorValue::Cap(Cap::None),
            (FactorTypeId::SingleCap, "u") => FactorValue::SingleCap(SingleCap::Upper),
            (FactorTypeId::SingleCap, "l") => FactorValue::SingleCap(SingleCap::Lower),
            (FactorTypeId::GlueLeft, "+") => FactorValue::GlueLeft(Glue::Plus),
            (FactorTypeId::GlueLeft, "-") => FactorValue::GlueLeft(Glue::Minus),
            (FactorTypeId::GlueRight, "+") => FactorValue::GlueRight(Glue::Plus),
            (FactorTypeId::GlueRight, "-") => FactorValue::GlueRight(Glue::Minus),
            (FactorTypeId::WordBeg, "") => FactorValue::WordBeg(WordBeg::Beg),
            (FactorTypeId::WordBeg, "n") => FactorValue::WordBeg(WordBeg::BegNot),
            (FactorTypeId::WordEnd, "") => FactorValue::WordEnd(WordEnd::End),
            (FactorTypeId::WordEnd, "n") => FactorValue::WordEnd(WordEnd::EndNot),
            (FactorTypeId::WordInt, "") => FactorValue::WordInt,
            (FactorTypeId::CsBeg, "") => FactorValue::CsBeg(CsBeg::Beg),
            (FactorTypeId::CsBeg, "n") => FactorValue::CsBeg(CsBeg::BegNot),
            (FactorTypeId::CsEnd, "") => FactorValue::CsEnd(CsEnd::End),
            (FactorTypeId::CsEnd, "n") => FactorValue::CsEnd(CsEnd::EndNot),
            (FactorTypeId::Class, kind) if !kind.is_empty() => {
                FactorValue::Class(kind.to_string())
            }
            (FactorTypeId::Index, digits) if !digits.is_empty() && digits.len() <= 9 => {
                digits.parse::<u32>().ok().map(FactorValue::Index)?
            }
            (FactorTypeId::InlineFix, "what") => FactorValue::InlineFix(InlineFixRole::What),
            (FactorTypeId::InlineFix, "with") => FactorValue::InlineFix(InlineFixRole::With),
            _ => return None,
        })
    }
}

/// Sorts factors into the canonical wire order (I5: alphabetic on
/// factor-type prefix).
pub fn canonicalize_order(factors: &mut [FactorValue]) {
    factors.sort_by_key(FactorValue::factor_type);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trips_for_every_kind() {
        let samples = vec![
            FactorValue::Cap(Cap::Initial),
            FactorValue::Cap(Cap::All),
            FactorValue::Cap(Cap::None),
            FactorValue::SingleCap(SingleCap::Upper),
            FactorValue::GlueLeft(Glue::Plus),
            FactorValue::GlueRight(Glue::Minus),
            FactorValue::WordBeg(WordBeg::Beg),
            FactorValue::WordBeg(WordBeg::BegNot),
            FactorValue::WordEnd(WordEnd::End),
            FactorValue::WordInt,
            FactorValue::CsBeg(CsBeg::Beg),
            FactorValue::CsEnd(CsEnd::EndNot),
            FactorValue::Class("phrasefix".to_string()),
            FactorValue::Index(42),
            FactorValue::InlineFix(InlineFixRole::What),
        ];
        for f in samples {
            let wire = f.wire();
            let parsed = FactorValue::parse(&wire).unwrap_or_else(|e| panic!("{wire}: {e}"));
            assert_eq!(parsed, f, "round trip mismatch for {wire}");
        }
    }

    #[test]
    fn index_is_zero_padded_to_three_digits() {
        assert_eq!(FactorValue::Index(7).wire(), "index007");
        assert_eq!(FactorValue::Index(42).wire(), "index042");
    }

    #[test]
    fn unknown_factor_is_malformed_wire() {
        assert!(FactorValue::parse("bogus").is_err());
    }

    #[test]
    fn canonical_order_matches_example_token() {
        // spec.md §4.5 example: `{word}|classphrasefix|index042|wb|cn`
        let mut factors = vec![
            FactorValue::WordBeg(WordBeg::Beg),
            FactorValue::Cap(Cap::None),
            FactorValue::Class("phrasefix".to_string()),
            FactorValue::Index(42),
        ];
        canonicalize_order(&mut factors);
        let wire: Vec<String> = factors.iter().map(FactorValue::wire).collect();
        assert_eq!(wire, vec!["cn", "classphrasefix", "index042", "wb"]);
    }
}
