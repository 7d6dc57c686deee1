//! Piece-oracle adapter (C3, spec.md §4.3).
//!
//! A piece oracle turns one word-nature token's underlying string into an
//! ordered cutlist of byte ranges. Both backends here repurpose a teacher
//! tokenizer engine that was built to produce token ids directly into one
//! that stops one step short and returns the cut points instead, which is
//! all the factorizer needs — it derives lemmas and factors from the
//! pieces itself.

mod bpe;
mod unigram;

pub use bpe::BpeOracle;
pub use unigram::UnigramOracle;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::Error;
use crate::model::{read_f32, read_string_list, read_u32, write_f32, write_string_list, write_u32};

/// Which training/inference engine backs a model's piece oracle (spec.md
/// §4.7, §6 `oracle_backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleBackend {
    Unigram,
    Bpe,
}

/// Splits a word's underlying string into piece byte ranges (spec.md
/// §4.3's "cutlist" contract).
pub trait PieceOracle: Send + Sync {
    /// Byte-offset `(start, len)` pairs covering `word` left to right, or
    /// `Ok(None)` if the oracle cannot confidently cover every byte — the
    /// caller then falls back to per-character unrepresentable handling.
    fn split(&self, word: &str) -> Result<Option<Vec<(usize, usize)>>, Error>;
}

/// The persisted form of a trained oracle (spec.md §6 model file, oracle
/// section).
pub enum OracleBlob {
    Unigram(UnigramOracle),
    Bpe(BpeOracle),
}

impl OracleBlob {
    #[must_use]
    pub fn backend(&self) -> OracleBackend {
        match self {
            OracleBlob::Unigram(_) => OracleBackend::Unigram,
            OracleBlob::Bpe(_) => OracleBackend::Bpe,
        }
    }

    #[must_use]
    pub fn as_oracle(&self) -> &dyn PieceOracle {
        match self {
            OracleBlob::Unigram(o) => o,
            OracleBlob::Bpe(o) => o,
        }
    }

    pub fn write(&self, w: &mut impl Write) -> std::io::Result<()> {
        match self {
            OracleBlob::Unigram(o) => {
                write_u32(w, 0)?;
                let pieces: Vec<&str> = o.pieces.iter().map(|(p, _)| p.as_str()).collect();
                write_string_list(w, pieces.into_iter())?;
                for (_, score) in &o.pieces {
                    write_f32(w, *score)?;
                }
                Ok(())
            }
            OracleBlob::Bpe(o) => {
                write_u32(w, 1)?;
                write_u32(w, o.merges.len() as u32)?;
                for (l, r) in &o.merges {
                    crate::model::write_string(w, l)?;
                    crate::model::write_string(w, r)?;
                }
                Ok(())
            }
        }
    }

    pub fn read(r: &mut impl Read) -> Result<OracleBlob, Error> {
        let tag = read_u32(r)?;
        match tag {
            0 => {
                let names = read_string_list(r)?;
                let mut pieces = Vec::with_capacity(names.len());
                for name in names {
                    let score = read_f32(r)?;
                    pieces.push((name, score));
                }
                Ok(OracleBlob::Unigram(UnigramOracle::from_pieces(pieces)))
            }
            1 => {
                let count = read_u32(r)? as usize;
                let mut merges = Vec::with_capacity(count);
                for _ in 0..count {
                    let l = crate::model::read_string(r)?;
                    let rhs = crate::model::read_string(r)?;
                    merges.push((l, rhs));
                }
                Ok(OracleBlob::Bpe(BpeOracle::from_merges(merges)))
            }
            other => Err(Error::MalformedWire(format!("unknown oracle backend tag {other}"))),
        }
    }
}

/// Bounded memoizing wrapper around a `PieceOracle`. Training corpora and
/// live traffic both repeat the same handful of words constantly; caching
/// their cutlist avoids re-running Viterbi/BPE merges for every
/// occurrence. Grounded on the teacher's `regex_cache` pattern in
/// `bpe.rs` (a mutex-guarded map), widened with the size bound and
/// read-only degradation spec.md §4.3/§5 require: at most `capacity`
/// entries; once that's reached, the cache stops accepting inserts and
/// `full` (checked lock-free via an atomic) gates every later call onto
/// the read-lock-only path, so no caller ever blocks behind a writer
/// again for the lifetime of this oracle.
pub struct CachedOracle<O: PieceOracle> {
    inner: O,
    cache: RwLock<HashMap<String, Option<Vec<(usize, usize)>>>>,
    capacity: usize,
    full: AtomicBool,
}

impl<O: PieceOracle> CachedOracle<O> {
    #[must_use]
    pub fn new(inner: O, capacity: usize) -> Self {
        CachedOracle {
            inner,
            cache: RwLock::new(HashMap::new()),
            capacity,
            full: AtomicBool::new(capacity == 0),
        }
    }
}

impl<O: PieceOracle> PieceOracle for CachedOracle<O> {
    fn split(&self, word: &str) -> Result<Option<Vec<(usize, usize)>>, Error> {
        if let Some(hit) = self.cache.read().unwrap().get(word) {
            return Ok(hit.clone());
        }
        if self.full.load(Ordering::Acquire) {
            // Degraded state (spec.md §5): never take the write lock
            // again, so a miss here just falls through to the oracle
            // uncached rather than growing the map further.
            return self.inner.split(word);
        }

        let result = self.inner.split(word)?;
        let mut cache = self.cache.write().unwrap();
        if cache.len() < self.capacity {
            cache.insert(word.to_string(), result.clone());
        }
        if cache.len() >= self.capacity {
            self.full.store(true, Ordering::Release);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingOracle {
        calls: Mutex<u32>,
    }

    impl PieceOracle for CountingOracle {
        fn split(&self, word: &str) -> Result<Option<Vec<(usize, usize)>>, Error> {
            *self.calls.lock().unwrap() += 1;
            Ok(Some(vec![(0, word.len())]))
        }
    }

    #[test]
    fn cached_oracle_only_calls_inner_once_per_word() {
        let cached = CachedOracle::new(CountingOracle { calls: Mutex::new(0) }, 16);
        cached.split("hello").unwrap();
        cached.split("hello").unwrap();
        cached.split("world").unwrap();
        assert_eq!(*cached.inner.calls.lock().unwrap(), 2);
    }

    #[test]
    fn cache_degrades_to_read_only_once_at_capacity() {
        let cached = CachedOracle::new(CountingOracle { calls: Mutex::new(0) }, 2);
        cached.split("a").unwrap();
        cached.split("b").unwrap();
        assert!(cached.full.load(Ordering::Relaxed));
        // Every further word is a miss against the now-frozen cache, so
        // each of these calls the inner oracle again rather than growing
        // the map past capacity.
        cached.split("c").unwrap();
        cached.split("c").unwrap();
        assert_eq!(*cached.inner.calls.lock().unwrap(), 4);
        assert_eq!(cached.cache.read().unwrap().len(), 2);
    }

    #[test]
    fn zero_capacity_cache_starts_already_full() {
        let cached = CachedOracle::new(CountingOracle { calls: Mutex::new(0) }, 0);
        assert!(cached.full.load(Ordering::Relaxed));
        cached.split("x").unwrap();
        cached.split("x").unwrap();
        assert_eq!(*cached.inner.calls.lock().unwrap(), 2);
    }
}
