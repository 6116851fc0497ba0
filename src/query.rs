//! Given a query hash bag, walks segments and feeds candidate doc ids to a
//! collector (spec.md §4.7).

use crate::collector::TopHitsCollector;
use crate::index::Snapshot;
use crate::types::{Hash, ScoredDoc};
use std::collections::HashSet;

/// Evaluate `hashes` against `snapshot` and return the collector's top hits.
///
/// Per spec.md §9's resolution of the multiplicity open question, each
/// unique query hash contributes a flat weight of 1 to a matching doc id —
/// multiplicity within the query or within the stored document does not
/// compound the score.
pub fn search(
    snapshot: &Snapshot,
    hashes: &[Hash],
    max_results: usize,
    top_score_percent: u32,
) -> Vec<ScoredDoc> {
    let mut collector = TopHitsCollector::new(max_results, top_score_percent);
    let unique_hashes: HashSet<Hash> = hashes.iter().copied().collect();
    let segment_ids = snapshot.segment_ids_newest_first();

    for hash in unique_hashes {
        let mut matched_this_hash = HashSet::new();
        for &segment_id in &segment_ids {
            let Some(reader) = snapshot.reader(segment_id) else {
                continue;
            };
            let deleted = snapshot.deleted_doc_ids(segment_id);
            for doc_id in reader.postings_for(hash, &deleted) {
                if matched_this_hash.insert(doc_id) {
                    collector.add(doc_id, 1);
                }
            }
        }
    }

    collector.top_results()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;
    use crate::types::IndexOptions;
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("acoustidx_test_fixtures")
            .join(format!("{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_query_yields_empty_result() {
        let dir = temp_dir("query_empty");
        let index = Index::open(&dir, IndexOptions::default()).unwrap();
        let snapshot = index.snapshot();
        assert!(search(&snapshot, &[], 10, 0).is_empty());
    }

    #[test]
    fn query_against_empty_index_yields_empty_result() {
        let dir = temp_dir("query_empty_index");
        let index = Index::open(&dir, IndexOptions::default()).unwrap();
        let snapshot = index.snapshot();
        assert!(search(&snapshot, &[100, 200], 10, 0).is_empty());
    }
}
