//! Alignment input/output (spec.md §6).
//!
//! A set of source-to-target token links, consumed by the decoder to
//! insert missing force-decode tokens at the right position (§4.6 step 4)
//! and to project indices across the insertion/compaction it performs
//! (§4.6 step 5).

/// One source-to-target link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentLink {
    pub source_index: usize,
    pub target_index: usize,
    pub confidence: f32,
}

/// A set of alignment links between one source and one target token
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct Alignment {
    links: Vec<AlignmentLink>,
}

impl Alignment {
    #[must_use]
    pub fn new(links: Vec<AlignmentLink>) -> Self {
        Alignment { links }
    }

    #[must_use]
    pub fn links(&self) -> &[AlignmentLink] {
        &self.links
    }

    /// The best target index aligned to `source_index`, by confidence,
    /// or `None` if nothing aligns to it.
    #[must_use]
    pub fn target_for_source(&self, source_index: usize) -> Option<usize> {
        self.links
            .iter()
            .filter(|l| l.source_index == source_index)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|l| l.target_index)
    }

    /// Inserts a new link, used when the decoder force-inserts a missing
    /// phrase-fix token at a suggested target index (§4.6 step 4).
    pub fn insert_link(&mut self, link: AlignmentLink) {
        self.links.push(link);
    }

    /// Rewrites target indices through `remap` (old index -> new index, or
    /// `None` if the token at that index was dropped), and drops links
    /// that no longer have both endpoints (§4.6 step 5, compaction).
    #[must_use]
    pub fn project_targets(&self, remap: &[Option<usize>]) -> Alignment {
        let links = self
            .links
            .iter()
            .filter_map(|l| {
                let new_target = *remap.get(l.target_index)?;
                new_target.map(|t| AlignmentLink {
                    source_index: l.source_index,
                    target_index: t,
                    confidence: l.confidence,
                })
            })
            .collect();
        Alignment { links }
    }

    /// Shifts every target index `>= at` up by one, used right before
    /// inserting a token at position `at` so existing links keep pointing
    /// at the same logical token.
    pub fn shift_targets_from(&mut self, at: usize) {
        for link in &mut self.links {
            if link.target_index >= at {
                link.target_index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_for_source_picks_highest_confidence() {
        let a = Alignment::new(vec![
            AlignmentLink { source_index: 0, target_index: 1, confidence: 0.4 },
            AlignmentLink { source_index: 0, target_index: 2, confidence: 0.9 },
        ]);
        assert_eq!(a.target_for_source(0), Some(2));
        assert_eq!(a.target_for_source(5), None);
    }

    #[test]
    fn project_targets_drops_removed_links() {
        let a = Alignment::new(vec![
            AlignmentLink { source_index: 0, target_index: 0, confidence: 1.0 },
            AlignmentLink { source_index: 1, target_index: 1, confidence: 1.0 },
        ]);
        let remap = vec![Some(0), None];
        let projected = a.project_targets(&remap);
        assert_eq!(projected.links().len(), 1);
        assert_eq!(projected.links()[0].target_index, 0);
    }

    #[test]
    fn shift_targets_from_bumps_later_links_only() {
        let mut a = Alignment::new(vec![
            AlignmentLink { source_index: 0, target_index: 0, confidence: 1.0 },
            AlignmentLink { source_index: 1, target_index: 2, confidence: 1.0 },
        ]);
        a.shift_targets_from(1);
        assert_eq!(a.links()[0].target_index, 0);
        assert_eq!(a.links()[1].target_index, 3);
    }
}
