//! BPE piece oracle, adapted from the teacher's merge-queue algorithm in
//! `bpe.rs` (`BPETokenizer::bpe_fragment`/`try_add_bigram`): the same
//! `Symbol` linked list plus a rank-ordered `BinaryHeap<Bigram>` work
//! queue, but merging stops at byte ranges rather than vocabulary token
//! ids, since the factorizer derives lemmas from the pieces itself.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::error::Error;
use super::PieceOracle;

#[derive(Debug, Clone)]
struct Symbol {
    start: usize,
    len: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Bigram {
    left: usize,
    right: usize,
    rank: usize,
}

impl Ord for Bigram {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank.cmp(&self.rank).then_with(|| other.left.cmp(&self.left))
    }
}

impl PartialOrd for Bigram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A trained BPE oracle: ranked merge rules (spec.md §4.7's trained
/// "ordered list of pairwise merges").
#[derive(Clone)]
pub struct BpeOracle {
    pub(super) merges: Vec<(String, String)>,
    ranks: HashMap<(String, String), usize>,
}

impl BpeOracle {
    #[must_use]
    pub fn from_merges(merges: Vec<(String, String)>) -> Self {
        let ranks = merges
            .iter()
            .enumerate()
            .map(|(rank, (l, r))| ((l.clone(), r.clone()), rank))
            .collect();
        BpeOracle { merges, ranks }
    }

    /// Trains merge rules by the standard BPE loop: start from individual
    /// characters, repeatedly merge the most frequent adjacent pair across
    /// the corpus, until `vocab_size` merges have been learned or no pair
    /// repeats.
    #[must_use]
    pub fn train(word_counts: &HashMap<String, u64>, vocab_size: usize) -> Self {
        let mut words: Vec<(Vec<String>, u64)> = word_counts
            .iter()
            .map(|(w, c)| (w.chars().map(|c| c.to_string()).collect(), *c))
            .collect();

        let mut merges = Vec::new();
        while merges.len() < vocab_size {
            let mut pair_counts: HashMap<(String, String), u64> = HashMap::new();
            for (symbols, count) in &words {
                for pair in symbols.windows(2) {
                    *pair_counts.entry((pair[0].clone(), pair[1].clone())).or_insert(0) += count;
                }
            }
            let Some(((left, right), _)) = pair_counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            else {
                break;
            };

            for (symbols, _) in &mut words {
                let mut i = 0;
                while i + 1 < symbols.len() {
                    if symbols[i] == left && symbols[i + 1] == right {
                        symbols[i] = format!("{left}{right}");
                        symbols.remove(i + 1);
                    }
                    i += 1;
                }
            }
            merges.push((left, right));
        }

        BpeOracle::from_merges(merges)
    }
}

impl PieceOracle for BpeOracle {
    fn split(&self, word: &str) -> Result<Option<Vec<(usize, usize)>>, Error> {
        let char_indices: Vec<(usize, char)> = word.char_indices().collect();
        if char_indices.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut symbols: Vec<Symbol> = Vec::with_capacity(char_indices.len());
        for (i, (byte_pos, _)) in char_indices.iter().enumerate() {
            let next = if i + 1 < char_indices.len() { char_indices[i + 1].0 } else { word.len() };
            symbols.push(Symbol {
                start: *byte_pos,
                len: next - byte_pos,
                prev: if i == 0 { None } else { Some(i - 1) },
                next: if i + 1 < char_indices.len() { Some(i + 1) } else { None },
            });
        }

        let mut queue = BinaryHeap::new();
        for i in 0..symbols.len().saturating_sub(1) {
            if let Some(next) = symbols[i].next {
                self.try_add(i, next, word, &symbols, &mut queue);
            }
        }

        while let Some(bigram) = queue.pop() {
            let (left, right) = (bigram.left, bigram.right);
            if symbols[left].len == 0 || symbols[right].len == 0 || symbols[left].next != Some(right) {
                continue;
            }
            let left_text = &word[symbols[left].start..symbols[left].start + symbols[left].len];
            let right_text = &word[symbols[right].start..symbols[right].start + symbols[right].len];
            match self.ranks.get(&(left_text.to_string(), right_text.to_string())) {
                Some(&rank) if rank == bigram.rank => {}
                _ => continue,
            }

            symbols[left].len += symbols[right].len;
            symbols[right].len = 0;
            symbols[left].next = symbols[right].next;
            if let Some(next) = symbols[right].next {
                symbols[next].prev = Some(left);
            }

            if let Some(prev) = symbols[left].prev {
                self.try_add(prev, left, word, &symbols, &mut queue);
            }
            if let Some(next) = symbols[left].next {
                self.try_add(left, next, word, &symbols, &mut queue);
            }
        }

        Ok(Some(
            symbols.iter().filter(|s| s.len > 0).map(|s| (s.start, s.len)).collect(),
        ))
    }
}

impl BpeOracle {
    fn try_add(
        &self,
        left: usize,
        right: usize,
        text: &str,
        symbols: &[Symbol],
        queue: &mut BinaryHeap<Bigram>,
    ) {
        let left_text = &text[symbols[left].start..symbols[left].start + symbols[left].len];
        let right_text = &text[symbols[right].start..symbols[right].start + symbols[right].len];
        if let Some(&rank) = self.ranks.get(&(left_text.to_string(), right_text.to_string())) {
            queue.push(Bigram { left, right, rank });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_apply_in_rank_order() {
        let oracle = BpeOracle::from_merges(vec![
            ("l".to_string(), "o".to_string()),
            ("lo".to_string(), "w".to_string()),
        ]);
        let cuts = oracle.split("low").unwrap().unwrap();
        assert_eq!(cuts, vec![(0, 3)]);
    }

    #[test]
    fn unmerged_word_splits_into_individual_characters() {
        let oracle = BpeOracle::from_merges(vec![("a".to_string(), "b".to_string())]);
        let cuts = oracle.split("xyz").unwrap().unwrap();
        assert_eq!(cuts, vec![(0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn training_learns_the_most_frequent_pair_first() {
        let mut counts = HashMap::new();
        counts.insert("aa".to_string(), 10u64);
        counts.insert("ab".to_string(), 1u64);
        let trained = BpeOracle::train(&counts, 1);
        assert_eq!(trained.merges, vec![("a".to_string(), "a".to_string())]);
    }
}
