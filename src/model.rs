//! The persisted model (spec.md §3 "Model", §6 "Model file", §6 "Factor
//! spec file").
//!
//! Three independent concerns live here:
//! - `SegmenterOptions` / `TrainerOptions`: plain configuration structs
//!   mirroring every model option and CLI flag of spec.md §4/§6.
//! - `FactorSpec`: the declarative factor-grammar text format consumed by
//!   the downstream NMT toolkit, with a parser so it can be round-tripped
//!   (needed for P4).
//! - `Model`: the binary `.fsm` model file — options, the piece-oracle
//!   blob, the known-lemma set, the shortlist vocabulary, and the factor
//!   spec — read and written with the same length-prefixed, magic-tagged
//!   layout the teacher's `gguf.rs` uses for its (read-only) format, here
//!   extended with a writer since training must persist a fresh model.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::Error;
use crate::factor::FactorTypeId;
use crate::piece_oracle::{OracleBackend, OracleBlob};
use crate::serializer::escape_lemma;
use crate::span::ClassSpanMode;

/// How inline-fix spans are realized on the wire (spec.md §4.4, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineFixMode {
    /// Inline-fix spans are not used; class spans always use the
    /// replaced/force-decode form.
    Disabled,
    /// Explicit `<IOPEN>`/`<IDELIM>`/`<ICLOSE>` delimiter tokens.
    Tags,
    /// `inlineFix=WHAT`/`inlineFix=WITH` factors, no delimiter tokens.
    Factors,
}

impl InlineFixMode {
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, InlineFixMode::Disabled)
    }
}

/// Model-wide options, one field per toggle named in spec.md §4/§6.
#[derive(Debug, Clone)]
pub struct SegmenterOptions {
    pub right_word_glue: bool,
    pub distinguish_initial_and_internal_pieces: bool,
    pub split_han: bool,
    pub single_letter_case_factors: bool,
    pub context_dependent_single_letter_capitalization: bool,
    pub serialize_indices_and_unrepresentables: bool,
    pub inline_fixes: InlineFixMode,
    pub class_span_mode: ClassSpanMode,
    pub sentence_level_annotations: Vec<String>,
}

impl Default for SegmenterOptions {
    fn default() -> Self {
        SegmenterOptions {
            right_word_glue: false,
            distinguish_initial_and_internal_pieces: false,
            split_han: false,
            single_letter_case_factors: false,
            context_dependent_single_letter_capitalization: false,
            serialize_indices_and_unrepresentables: false,
            inline_fixes: InlineFixMode::Disabled,
            class_span_mode: ClassSpanMode::Replaced,
            sentence_level_annotations: Vec::new(),
        }
    }
}

/// Training-time configuration (spec.md §4.7, §6).
#[derive(Debug, Clone)]
pub struct TrainerOptions {
    pub vocab_size: usize,
    pub min_piece_count: u32,
    pub min_char_count: u32,
    pub character_coverage: f64,
    pub training_sentence_size: usize,
    pub oracle_backend: OracleBackend,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        TrainerOptions {
            vocab_size: 8000,
            min_piece_count: 1,
            min_char_count: 1,
            character_coverage: 1.0,
            training_sentence_size: 10_000_000,
            oracle_backend: OracleBackend::Unigram,
        }
    }
}

/// Reserved lemma/shortlist entries that always occupy the first slots of
/// the shortlist vocabulary, in this fixed order (spec.md §4.7 step 8,
/// §6).
pub const RESERVED_UNK: &str = "<unk>";
pub const RESERVED_BOS: &str = "<s>";
pub const RESERVED_EOS: &str = "</s>";
pub const RESERVED_IOPEN: &str = "<IOPEN>";
pub const RESERVED_IDELIM: &str = "<IDELIM>";
pub const RESERVED_ICLOSE: &str = "<ICLOSE>";

/// The declarative factor-spec grammar (spec.md §6): factor types and
/// values, the lemma vocabulary (with their `_has_X` trait lines), and the
/// factor-distribution declarations, in that canonical section order.
#[derive(Debug, Clone, Default)]
pub struct FactorSpec {
    /// `(type_name, values)` in declaration order.
    pub factor_types: Vec<(String, Vec<String>)>,
    /// Lemmas in shortlist order, each with the sorted `_has_X` trait list
    /// it declares.
    pub lemmas: Vec<(String, Vec<String>)>,
    /// `(type_name, has_type_name)` distribution declarations.
    pub distributions: Vec<(String, String)>,
}

impl FactorSpec {
    /// Renders the declarative grammar text (spec.md §6 productions:
    /// `NAME`, `VALUE : TYPE`, `TYPE <-> [HAS_TYPE]`).
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# factors\n");
        for (ty, values) in &self.factor_types {
            out.push_str(ty);
            out.push('\n');
            for v in values {
                out.push_str(v);
                out.push_str(" : ");
                out.push_str(ty);
                out.push('\n');
            }
        }
        out.push_str("\n# lemmas\n");
        for (lemma, traits) in &self.lemmas {
            out.push_str(lemma);
            for t in traits {
                out.push(' ');
                out.push_str(t);
            }
            out.push('\n');
        }
        out.push_str("\n# factor-distributions\n");
        for (ty, has) in &self.distributions {
            out.push_str(ty);
            out.push_str(" <-> ");
            out.push_str(has);
            out.push('\n');
        }
        out
    }

    /// Parses the declarative grammar text back into a `FactorSpec`.
    /// Used by P4 to check that the persisted shortlist vocabulary equals
    /// the lemma section of the factor spec.
    pub fn parse(text: &str) -> Result<FactorSpec, Error> {
        let distribution_re = regex::Regex::new(r"^(\S+)\s*<->\s*(\S+)$").unwrap();
        let value_re = regex::Regex::new(r"^(\S+)\s*:\s*(\S+)$").unwrap();

        let mut factor_types: Vec<(String, Vec<String>)> = Vec::new();
        let mut lemmas: Vec<(String, Vec<String>)> = Vec::new();
        let mut distributions: Vec<(String, String)> = Vec::new();

        #[derive(PartialEq)]
        enum Section {
            Factors,
            Lemmas,
            Distributions,
        }
        let mut section = Section::Factors;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(stripped) = line.strip_prefix('#') {
                let marker = stripped.trim();
                match marker {
                    "factors" => section = Section::Factors,
                    "lemmas" => section = Section::Lemmas,
                    "factor-distributions" => section = Section::Distributions,
                    _ => {}
                }
                continue;
            }

            match section {
                Section::Factors => {
                    if let Some(caps) = value_re.captures(line) {
                        let value = caps[1].to_string();
                        let ty = caps[2].to_string();
                        if let Some(entry) = factor_types.iter_mut().find(|(n, _)| n == &ty) {
                            entry.1.push(value);
                        } else {
                            factor_types.push((ty, vec![value]));
                        }
                    } else {
                        factor_types.push((line.to_string(), Vec::new()));
                    }
                }
                Section::Lemmas => {
                    let mut parts = line.split_whitespace();
                    let lemma = parts.next().unwrap_or_default().to_string();
                    let traits = parts.map(str::to_string).collect();
                    lemmas.push((lemma, traits));
                }
                Section::Distributions => {
                    if let Some(caps) = distribution_re.captures(line) {
                        distributions.push((caps[1].to_string(), caps[2].to_string()));
                    } else {
                        return Err(Error::MalformedWire(format!(
                            "malformed factor-distribution line: `{line}`"
                        )));
                    }
                }
            }
        }

        Ok(FactorSpec {
            factor_types,
            lemmas,
            distributions,
        })
    }

    /// The lemma section only, in shortlist order — what P4 compares
    /// against the persisted shortlist vocabulary.
    #[must_use]
    pub fn lemma_names(&self) -> Vec<String> {
        self.lemmas.iter().map(|(l, _)| l.clone()).collect()
    }
}

/// `_has_X` trait name for a factor type, used on lemma lines in the
/// factor spec (spec.md §6: "Types starting with `_has_X` are traits").
#[must_use]
pub fn has_trait_name(ty: FactorTypeId) -> String {
    format!("_has_{}", ty.prefix())
}

/// The persisted model (spec.md §3 "Model").
pub struct Model {
    pub options: SegmenterOptions,
    pub oracle: Option<OracleBlob>,
    pub known_lemmas: BTreeSet<String>,
    /// Escaped, canonically ordered shortlist vocabulary (spec.md §4.7
    /// step 8: reserved tokens first, then lemmas sorted by ordinal
    /// string comparison).
    pub shortlist: Vec<String>,
    pub factor_spec: FactorSpec,
}

const MAGIC: &[u8; 4] = b"FSEG";
const FORMAT_VERSION: u32 = 1;

impl Model {
    /// Builds the canonical shortlist order: reserved tokens, then any
    /// configured `<SLA:...>` tokens, then lemmas sorted by ordinal
    /// (byte-wise) string comparison (spec.md §4.7 step 8).
    #[must_use]
    pub fn build_shortlist(options: &SegmenterOptions, lemmas: &BTreeSet<String>) -> Vec<String> {
        let mut shortlist = vec![
            RESERVED_UNK.to_string(),
            RESERVED_BOS.to_string(),
            RESERVED_EOS.to_string(),
        ];
        if options.inline_fixes == InlineFixMode::Tags {
            shortlist.push(RESERVED_IOPEN.to_string());
            shortlist.push(RESERVED_IDELIM.to_string());
            shortlist.push(RESERVED_ICLOSE.to_string());
        }
        for sla in &options.sentence_level_annotations {
            shortlist.push(format!("<SLA:{sla}>"));
        }
        let mut sorted_lemmas: Vec<String> = lemmas.iter().map(|l| escape_lemma(l)).collect();
        sorted_lemmas.sort();
        shortlist.extend(sorted_lemmas);
        shortlist
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut file = std::fs::File::create(path)?;
        write_bytes(&mut file, MAGIC)?;
        write_u32(&mut file, FORMAT_VERSION)?;

        write_options(&mut file, &self.options)?;

        match &self.oracle {
            Some(blob) => {
                write_u32(&mut file, 1)?;
                blob.write(&mut file)?;
            }
            None => write_u32(&mut file, 0)?,
        }

        write_string_list(&mut file, self.known_lemmas.iter().map(String::as_str))?;
        write_string_list(&mut file, self.shortlist.iter().map(String::as_str))?;
        write_string(&mut file, &self.factor_spec.to_text())?;

        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut file = std::fs::File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::MalformedWire("not a factored-segmenter model file".into()));
        }
        let version = read_u32(&mut file)?;
        if version != FORMAT_VERSION {
            return Err(Error::MalformedWire(format!(
                "unsupported model file version {version}"
            )));
        }

        let options = read_options(&mut file)?;

        let oracle = if read_u32(&mut file)? == 1 {
            Some(OracleBlob::read(&mut file)?)
        } else {
            None
        };

        let known_lemmas: BTreeSet<String> = read_string_list(&mut file)?.into_iter().collect();
        let shortlist = read_string_list(&mut file)?;
        let factor_spec = FactorSpec::parse(&read_string(&mut file)?)?;

        Ok(Model {
            options,
            oracle,
            known_lemmas,
            shortlist,
            factor_spec,
        })
    }

    /// Forms the temporary oracle-training-artefact path by substituting
    /// the `.fsm` extension, as spec.md §6 requires ("Extension `.fsm` is
    /// required so that derived paths... can be formed by extension
    /// substitution").
    #[must_use]
    pub fn sibling_path(model_path: &Path, new_extension: &str) -> std::path::PathBuf {
        model_path.with_extension(new_extension)
    }
}

fn write_options(w: &mut impl Write, options: &SegmenterOptions) -> Result<(), Error> {
    let mut flags: u32 = 0;
    if options.right_word_glue {
        flags |= 1 << 0;
    }
    if options.distinguish_initial_and_internal_pieces {
        flags |= 1 << 1;
    }
    if options.split_han {
        flags |= 1 << 2;
    }
    if options.single_letter_case_factors {
        flags |= 1 << 3;
    }
    if options.context_dependent_single_letter_capitalization {
        flags |= 1 << 4;
    }
    if options.serialize_indices_and_unrepresentables {
        flags |= 1 << 5;
    }
    if options.class_span_mode == ClassSpanMode::InlineFix {
        flags |= 1 << 6;
    }
    write_u32(w, flags)?;
    let inline_fix_mode: u32 = match options.inline_fixes {
        InlineFixMode::Disabled => 0,
        InlineFixMode::Tags => 1,
        InlineFixMode::Factors => 2,
    };
    write_u32(w, inline_fix_mode)?;
    write_string_list(w, options.sentence_level_annotations.iter().map(String::as_str))?;
    Ok(())
}

fn read_options(r: &mut impl Read) -> Result<SegmenterOptions, Error> {
    let flags = read_u32(r)?;
    let inline_fix_mode = read_u32(r)?;
    let sentence_level_annotations = read_string_list(r)?;
    Ok(SegmenterOptions {
        right_word_glue: flags & (1 << 0) != 0,
        distinguish_initial_and_internal_pieces: flags & (1 << 1) != 0,
        split_han: flags & (1 << 2) != 0,
        single_letter_case_factors: flags & (1 << 3) != 0,
        context_dependent_single_letter_capitalization: flags & (1 << 4) != 0,
        serialize_indices_and_unrepresentables: flags & (1 << 5) != 0,
        inline_fixes: match inline_fix_mode {
            1 => InlineFixMode::Tags,
            2 => InlineFixMode::Factors,
            _ => InlineFixMode::Disabled,
        },
        class_span_mode: if flags & (1 << 6) != 0 {
            ClassSpanMode::InlineFix
        } else {
            ClassSpanMode::Replaced
        },
        sentence_level_annotations,
    })
}

pub(crate) fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn write_f32(w: &mut impl Write, v: f32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn read_f32(r: &mut impl Read) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn write_bytes(w: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    w.write_all(bytes)
}

pub(crate) fn write_string(w: &mut impl Write, s: &str) -> std::io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub(crate) fn read_string(r: &mut impl Read) -> std::io::Result<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub(crate) fn write_string_list<'a>(
    w: &mut impl Write,
    items: impl ExactSizeIterator<Item = &'a str>,
) -> std::io::Result<()> {
    write_u32(w, items.len() as u32)?;
    for item in items {
        write_string(w, item)?;
    }
    Ok(())
}

pub(crate) fn read_string_list(r: &mut impl Read) -> std::io::Result<Vec<String>> {
    let count = read_u32(r)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_string(r)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_spec_round_trips_through_text() {
        let spec = FactorSpec {
            factor_types: vec![("c".to_string(), vec!["ci".to_string(), "ca".to_string()])],
            lemmas: vec![
                (RESERVED_UNK.to_string(), vec![]),
                ("HELLO".to_string(), vec!["_has_c".to_string()]),
            ],
            distributions: vec![("c".to_string(), "_has_c".to_string())],
        };
        let text = spec.to_text();
        let parsed = FactorSpec::parse(&text).unwrap();
        assert_eq!(parsed.lemma_names(), spec.lemma_names());
        assert_eq!(parsed.distributions, spec.distributions);
    }

    #[test]
    fn shortlist_puts_reserved_tokens_first_then_sorted_lemmas() {
        let options = SegmenterOptions::default();
        let mut lemmas = BTreeSet::new();
        lemmas.insert("ZEBRA".to_string());
        lemmas.insert("APPLE".to_string());
        let shortlist = Model::build_shortlist(&options, &lemmas);
        assert_eq!(shortlist[0], RESERVED_UNK);
        assert_eq!(shortlist[1], RESERVED_BOS);
        assert_eq!(shortlist[2], RESERVED_EOS);
        assert_eq!(&shortlist[3..], &["APPLE".to_string(), "ZEBRA".to_string()]);
    }

    #[test]
    fn model_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fsm");

        let mut lemmas = BTreeSet::new();
        lemmas.insert("HELLO".to_string());
        let options = SegmenterOptions::default();
        let shortlist = Model::build_shortlist(&options, &lemmas);
        let model = Model {
            options,
            oracle: None,
            known_lemmas: lemmas,
            shortlist,
            factor_spec: FactorSpec::default(),
        };
        model.save(&path).unwrap();
        let loaded = Model::load(&path).unwrap();
        assert_eq!(loaded.shortlist, model.shortlist);
        assert!(loaded.oracle.is_none());
    }

    #[test]
    fn sibling_path_substitutes_extension() {
        let p = Path::new("/tmp/model.fsm");
        assert_eq!(
            Model::sibling_path(p, "oracle.tmp"),
            Path::new("/tmp/model.oracle.tmp")
        );
    }
}
