//! The transactional writer surface a client session drives: `begin`,
//! `insert`, `commit`, `rollback`, `optimize`, `cleanup`, and the attribute
//! accessors (spec.md §4.6, §6).

use crate::error::{IndexError, Result};
use crate::index::Index;
use crate::query;
use crate::types::{DocId, Hash, IndexOptions, Posting, ScoredDoc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_MAX_RESULTS: u32 = 500;
const DEFAULT_TOP_SCORE_PERCENT: u32 = 10;

/// The in-memory buffer and pending attribute edits of one active writer.
/// Exists only between `begin()` and `commit()`/`rollback()`.
#[derive(Default)]
struct Transaction {
    buffer: Vec<Posting>,
    pending_attributes: BTreeMap<String, String>,
}

/// A client's handle onto an index: issues searches at any time, and at
/// most one writer transaction at a time (spec.md §5).
pub struct Session {
    index: Arc<Index>,
    transaction: Option<Transaction>,
    max_results: u32,
    top_score_percent: u32,
}

/// Open the index at `path`, creating it if absent (spec.md §6
/// `open_index(path) → Index`).
pub fn open_index(path: impl AsRef<Path>, options: IndexOptions) -> Result<Arc<Index>> {
    Index::open(path, options)
}

impl Session {
    /// Create a session over an already-opened index (spec.md §6
    /// `Index.begin_session() → Session`; also usable directly by callers
    /// holding an `Arc<Index>` from [`open_index`]).
    pub fn new(index: Arc<Index>) -> Self {
        Self {
            index,
            transaction: None,
            max_results: DEFAULT_MAX_RESULTS,
            top_score_percent: DEFAULT_TOP_SCORE_PERCENT,
        }
    }

    /// Create a writer for this session. Only one writer may exist per index
    /// at a time; a second `begin()` (on this or any other session) fails
    /// with `AlreadyInTransaction`.
    pub fn begin(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(IndexError::AlreadyInTransaction);
        }
        self.index.acquire_writer()?;
        self.transaction = Some(Transaction::default());
        Ok(())
    }

    /// Buffer `(hash, doc_id)` postings for every hash in `hashes`. Duplicate
    /// hashes within one document are preserved as a multiset.
    pub fn insert(&mut self, doc_id: DocId, hashes: &[Hash]) -> Result<()> {
        let txn = self.transaction.as_mut().ok_or(IndexError::NotInTransaction)?;
        txn.buffer.extend(hashes.iter().map(|&h| Posting::new(h, doc_id)));
        Ok(())
    }

    /// Search the currently published snapshot, independent of any writer
    /// state on this session (spec.md §5: readers take no writer lock).
    pub fn search(&self, hashes: &[Hash]) -> Vec<ScoredDoc> {
        let snapshot = self.index.snapshot();
        query::search(&snapshot, hashes, self.max_results as usize, self.top_score_percent)
    }

    /// Flush the buffered postings into a new segment and publish a new
    /// manifest generation. On failure the transaction is left intact so the
    /// caller may retry (spec.md §7).
    pub fn commit(&mut self) -> Result<()> {
        let txn = self.transaction.as_ref().ok_or(IndexError::NotInTransaction)?;
        self.index.commit_transaction(&txn.buffer, &txn.pending_attributes)?;
        self.transaction = None;
        self.index.release_writer();
        Ok(())
    }

    /// Discard the buffer and any pending attribute edits; no manifest
    /// change.
    pub fn rollback(&mut self) -> Result<()> {
        if self.transaction.take().is_none() {
            return Err(IndexError::NotInTransaction);
        }
        self.index.release_writer();
        Ok(())
    }

    /// Force-merge all live segments into one (spec.md §4.6). A maintenance
    /// operation, not a write transaction: it has no `begin()` precondition.
    /// Called inside an active transaction it rides that transaction's
    /// writer lock; called standalone it takes and releases the writer lock
    /// itself, so it still serialises against any other writer.
    pub fn optimize(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return self.index.optimize();
        }
        self.index.acquire_writer()?;
        let result = self.index.optimize();
        self.index.release_writer();
        result
    }

    /// Unlink segment/manifest files no longer referenced by the current
    /// manifest. Same no-precondition, self-serialising behaviour as
    /// [`Self::optimize`].
    pub fn cleanup(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return self.index.cleanup();
        }
        self.index.acquire_writer()?;
        let result = self.index.cleanup();
        self.index.release_writer();
        result
    }

    /// `get_attribute`: recognised session-local attributes read from this
    /// session's state; anything else reads the active transaction's
    /// pending edit if present, else the published manifest.
    pub fn get_attribute(&self, name: &str) -> Result<String> {
        match name {
            "max_results" => Ok(self.max_results.to_string()),
            "top_score_percent" => Ok(self.top_score_percent.to_string()),
            _ => {
                if let Some(txn) = &self.transaction {
                    if let Some(value) = txn.pending_attributes.get(name) {
                        return Ok(value.clone());
                    }
                }
                self.index
                    .current_manifest()
                    .attributes
                    .get(name)
                    .cloned()
                    .ok_or_else(|| IndexError::invalid_attribute(name, "not set"))
            }
        }
    }

    /// `set_attribute`: recognised session-local attributes may be set with
    /// no active transaction (spec.md §9's resolution of that open
    /// question); any other name requires one and is staged for the next
    /// commit.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "max_results" => {
                self.max_results = value
                    .parse()
                    .map_err(|_| IndexError::invalid_attribute(name, "not an integer"))?;
                Ok(())
            }
            "top_score_percent" => {
                let parsed: u32 = value
                    .parse()
                    .map_err(|_| IndexError::invalid_attribute(name, "not an integer"))?;
                if parsed > 100 {
                    return Err(IndexError::invalid_attribute(name, "must be 0-100"));
                }
                self.top_score_percent = parsed;
                Ok(())
            }
            _ => {
                let txn = self.transaction.as_mut().ok_or(IndexError::NotInTransaction)?;
                txn.pending_attributes.insert(name.to_string(), value.to_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn session(dir: &Path) -> Session {
        let index = open_index(dir, IndexOptions::default()).unwrap();
        Session::new(index)
    }

    #[test]
    fn scenario_1_insert_commit_search() {
        let dir = temp_dir("session_scenario1");
        let mut session = session(&dir);
        session.begin().unwrap();
        session.insert(1, &[100, 200, 300]).unwrap();
        session.commit().unwrap();

        let results = session.search(&[100]);
        assert_eq!(results, vec![ScoredDoc { doc_id: 1, score: 1 }]);
    }

    #[test]
    fn scenario_2_equal_scores_tie_break_by_doc_id() {
        let dir = temp_dir("session_scenario2");
        let mut session = session(&dir);
        session.set_attribute("max_results", "10").unwrap();
        session.set_attribute("top_score_percent", "0").unwrap();

        session.begin().unwrap();
        session.insert(1, &[100, 200]).unwrap();
        session.commit().unwrap();

        session.begin().unwrap();
        session.insert(2, &[200, 300]).unwrap();
        session.commit().unwrap();

        let results = session.search(&[100, 200, 300]);
        assert_eq!(
            results,
            vec![
                ScoredDoc { doc_id: 1, score: 2 },
                ScoredDoc { doc_id: 2, score: 2 },
            ]
        );
    }

    #[test]
    fn scenario_3_multiplicity_collapses_at_doc_level() {
        let dir = temp_dir("session_scenario3");
        let mut session = session(&dir);
        session.begin().unwrap();
        session.insert(1, &[100, 100, 200]).unwrap();
        session.commit().unwrap();

        let results = session.search(&[100]);
        assert_eq!(results, vec![ScoredDoc { doc_id: 1, score: 1 }]);
    }

    #[test]
    fn scenario_4_overwrite_semantics() {
        let dir = temp_dir("session_scenario4");
        let mut session = session(&dir);
        session.begin().unwrap();
        session.insert(1, &[100]).unwrap();
        session.commit().unwrap();

        session.begin().unwrap();
        session.insert(1, &[200]).unwrap();
        session.commit().unwrap();

        assert!(session.search(&[100]).is_empty());
        assert_eq!(session.search(&[200]), vec![ScoredDoc { doc_id: 1, score: 1 }]);
    }

    #[test]
    fn scenario_6_rollback_leaves_no_trace() {
        let dir = temp_dir("session_scenario6");
        let mut session = session(&dir);
        session.begin().unwrap();
        session.insert(1, &[100]).unwrap();
        session.rollback().unwrap();

        session.begin().unwrap();
        assert!(session.search(&[100]).is_empty());
        session.rollback().unwrap();
    }

    #[test]
    fn second_begin_fails_with_already_in_transaction() {
        let dir = temp_dir("session_already_in_transaction");
        let index = open_index(&dir, IndexOptions::default()).unwrap();
        let mut session_a = Session::new(Arc::clone(&index));
        let mut session_b = Session::new(index);

        session_a.begin().unwrap();
        let err = session_b.begin().unwrap_err();
        assert!(matches!(err, IndexError::AlreadyInTransaction));
    }

    #[test]
    fn insert_without_begin_fails() {
        let dir = temp_dir("session_not_in_transaction");
        let mut session = session(&dir);
        let err = session.insert(1, &[1]).unwrap_err();
        assert!(matches!(err, IndexError::NotInTransaction));
    }

    #[test]
    fn optimize_and_cleanup_need_no_active_transaction() {
        let dir = temp_dir("session_optimize_cleanup_no_txn");
        let mut session = session(&dir);

        session.begin().unwrap();
        session.insert(1, &[100]).unwrap();
        session.commit().unwrap();

        // Neither call is preceded by begin() here.
        session.optimize().unwrap();
        session.cleanup().unwrap();

        assert_eq!(session.search(&[100]), vec![ScoredDoc { doc_id: 1, score: 1 }]);
    }

    #[test]
    fn max_results_zero_returns_empty() {
        let dir = temp_dir("session_max_results_zero");
        let mut session = session(&dir);
        session.set_attribute("max_results", "0").unwrap();
        session.begin().unwrap();
        session.insert(1, &[100]).unwrap();
        session.commit().unwrap();

        assert!(session.search(&[100]).is_empty());
    }
}
