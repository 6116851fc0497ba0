//! Maintains the top-k document scores with a relative-threshold cutoff
//! (spec.md §4.8).

use crate::types::{DocId, ScoredDoc};
use std::collections::HashMap;

pub struct TopHitsCollector {
    max_results: usize,
    top_score_percent: u32,
    scores: HashMap<DocId, u32>,
}

impl TopHitsCollector {
    pub fn new(max_results: usize, top_score_percent: u32) -> Self {
        Self {
            max_results,
            top_score_percent: top_score_percent.min(100),
            scores: HashMap::new(),
        }
    }

    /// Record that `doc_id` accumulates `weight` additional score.
    pub fn add(&mut self, doc_id: DocId, weight: u32) {
        *self.scores.entry(doc_id).or_insert(0) += weight;
    }

    /// Finalise per spec.md §4.8: compute the best score, derive a
    /// `ceil(best * p / 100)` threshold, keep doc ids at or above it, sort by
    /// score descending then doc id ascending, and truncate to `k`.
    pub fn top_results(self) -> Vec<ScoredDoc> {
        if self.max_results == 0 || self.scores.is_empty() {
            return Vec::new();
        }

        let best = self.scores.values().copied().max().unwrap_or(0);
        let threshold = (best as u64 * self.top_score_percent as u64).div_ceil(100) as u32;

        let mut hits: Vec<ScoredDoc> = self
            .scores
            .into_iter()
            .filter(|&(_, score)| score >= threshold)
            .map(|(doc_id, score)| ScoredDoc { doc_id, score })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        hits.truncate(self.max_results);
        hits
    }
}
