//! `fseg` — thin CLI wrapper over the library (spec.md §6 "CLI surface").
//! No tokenization logic lives here: every subcommand just parses
//! arguments, builds a [`SegmenterOptions`]/[`TrainerOptions`], and calls
//! straight into `factored_segmenter`.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use factored_segmenter::model::{InlineFixMode, Model, SegmenterOptions, TrainerOptions};
use factored_segmenter::piece_oracle::OracleBackend;
use factored_segmenter::span::ClassSpanMode;
use factored_segmenter::{trainer, Segmenter};

#[derive(Parser)]
#[command(name = "fseg", version, about = "Reversible, factored text tokenizer for NMT")]
struct Cli {
    /// Suppress per-line diagnostics.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a corpus read on stdin.
    Train {
        #[arg(long)]
        model: PathBuf,
        /// Unused placeholder for compatibility with the external
        /// collaborator's vocab export step; this crate persists its own
        /// `.fsm` model instead.
        #[arg(long = "marian-vocab")]
        marian_vocab: Option<PathBuf>,
        #[command(flatten)]
        options: ModelOptionArgs,
        #[arg(long, default_value_t = 8000)]
        vocab_size: usize,
        #[arg(long = "character_coverage", default_value_t = 1.0)]
        character_coverage: f64,
        #[arg(long, default_value_t = 10_000_000)]
        training_sentence_size: usize,
        #[arg(long, default_value_t = 1)]
        min_piece_count: u32,
        #[arg(long, default_value_t = 1)]
        min_char_count: u32,
        /// Train a BPE oracle instead of the default unigram-LM oracle.
        #[arg(long = "no-sentence-piece")]
        no_sentence_piece: bool,
    },
    /// Encode lines read on stdin to wire tokens on stdout.
    Encode {
        #[arg(long)]
        model: PathBuf,
        #[arg(short = 'o')]
        output: Option<PathBuf>,
        #[arg(short = 'F', default_value = "\t")]
        field_separator: String,
    },
    /// Decode wire tokens read on stdin back to surface text on stdout.
    Decode {
        #[arg(long)]
        model: PathBuf,
        #[arg(short = 'o')]
        output: Option<PathBuf>,
        #[arg(short = 'F', default_value = "\t")]
        field_separator: String,
    },
}

#[derive(clap::Args)]
struct ModelOptionArgs {
    #[arg(long)]
    right_word_glue: bool,
    #[arg(long)]
    distinguish_initial_and_internal_pieces: bool,
    #[arg(long)]
    split_han: bool,
    #[arg(long)]
    single_letter_case_factors: bool,
    #[arg(long)]
    serialize_indices_and_unrepresentables: bool,
    #[arg(long)]
    inline_fixes: bool,
    #[arg(long)]
    inline_fix_use_tags: bool,
}

impl ModelOptionArgs {
    fn into_options(self) -> SegmenterOptions {
        let mut options = SegmenterOptions::default();
        options.right_word_glue = self.right_word_glue;
        options.distinguish_initial_and_internal_pieces = self.distinguish_initial_and_internal_pieces;
        options.split_han = self.split_han;
        options.single_letter_case_factors = self.single_letter_case_factors;
        options.serialize_indices_and_unrepresentables = self.serialize_indices_and_unrepresentables;
        if self.inline_fixes {
            options.inline_fixes = if self.inline_fix_use_tags { InlineFixMode::Tags } else { InlineFixMode::Factors };
            options.class_span_mode = ClassSpanMode::InlineFix;
        }
        options
    }
}

fn main() {
    let cli = Cli::parse();
    if !cli.quiet {
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    }

    let result = match cli.command {
        Commands::Train { model, marian_vocab, options, vocab_size, character_coverage, training_sentence_size, min_piece_count, min_char_count, no_sentence_piece } => {
            if marian_vocab.is_some() {
                tracing::warn!("--marian-vocab is accepted for compatibility but not written");
            }
            let trainer_options = TrainerOptions {
                vocab_size,
                min_piece_count,
                min_char_count,
                character_coverage,
                training_sentence_size,
                oracle_backend: if no_sentence_piece { OracleBackend::Bpe } else { OracleBackend::Unigram },
            };
            cmd_train(&model, options.into_options(), trainer_options)
        }
        Commands::Encode { model, output, field_separator } => cmd_encode(&model, output, &field_separator),
        Commands::Decode { model, output, field_separator } => cmd_decode(&model, output, &field_separator),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn cmd_train(
    model_path: &PathBuf,
    segmenter_options: SegmenterOptions,
    trainer_options: TrainerOptions,
) -> Result<(), String> {
    let stdin = io::stdin();
    let corpus: Vec<String> = stdin.lock().lines().collect::<Result<_, _>>().map_err(|e| e.to_string())?;
    tracing::debug!(lines = corpus.len(), "read training corpus from stdin");
    trainer::train_and_save(&corpus, &segmenter_options, &trainer_options, model_path).map_err(|e| e.to_string())
}

fn cmd_encode(model_path: &PathBuf, output: Option<PathBuf>, field_separator: &str) -> Result<(), String> {
    let model = Model::load(model_path).map_err(|e| e.to_string())?;
    let segmenter = Segmenter::new(model);
    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(fs::File::create(path).map_err(|e| e.to_string())?),
        None => Box::new(io::stdout()),
    };

    for line in io::stdin().lock().lines() {
        let line = line.map_err(|e| e.to_string())?;
        match segmenter.encode_line(&line, &[]) {
            Ok(encoded) => writeln!(out, "{}", encoded.wire_tokens.join(" ")).map_err(|e| e.to_string())?,
            Err(e) => {
                tracing::warn!(error = %e, line, "failed to encode line, emitting empty line");
                writeln!(out).map_err(|e| e.to_string())?;
            }
        }
        let _ = field_separator; // reserved for TSV-aligned output, spec.md §6
    }
    Ok(())
}

fn cmd_decode(model_path: &PathBuf, output: Option<PathBuf>, field_separator: &str) -> Result<(), String> {
    let model = Model::load(model_path).map_err(|e| e.to_string())?;
    let segmenter = Segmenter::new(model);
    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(fs::File::create(path).map_err(|e| e.to_string())?),
        None => Box::new(io::stdout()),
    };

    for line in io::stdin().lock().lines() {
        let line = line.map_err(|e| e.to_string())?;
        let wire_tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let package = factored_segmenter::decoder::DecoderPackage::new();
        let alignment = factored_segmenter::Alignment::default();
        match segmenter.decode_line(&wire_tokens, &package, &alignment) {
            Ok(decoded) => writeln!(out, "{}", decoded.text).map_err(|e| e.to_string())?,
            Err(e) => {
                tracing::warn!(error = %e, line, "failed to decode line, emitting empty line");
                writeln!(out).map_err(|e| e.to_string())?;
            }
        }
        let _ = field_separator;
    }
    Ok(())
}
