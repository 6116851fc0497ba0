//! Core data types shared across the index: hashes, document and segment
//! identifiers, postings, and the build-time knobs a new index is opened
//! with.

/// A 32-bit audio-fingerprint hash. No interpretation beyond equality.
pub type Hash = u32;

/// Caller-assigned document identifier.
pub type DocId = u32;

/// Monotonically increasing identifier assigned to a segment at creation.
pub type SegmentId = u64;

/// A single occurrence of `hash` in `doc_id` within a segment.
///
/// Postings are ordered `(hash, doc_id)` ascending within a segment; a given
/// pair may repeat if the source document contained that hash more than
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Posting {
    pub hash: Hash,
    pub doc_id: DocId,
}

impl Posting {
    pub fn new(hash: Hash, doc_id: DocId) -> Self {
        Self { hash, doc_id }
    }
}

/// Build-time knobs for an index. These are not manifest attributes (§6 of
/// SPEC_FULL draws that line): they govern how segments are laid out and
/// merged, not runtime session behavior.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Number of postings per block in a segment's posting stream, and the
    /// stride of the skip table (`B` in spec.md §3).
    pub block_size: u32,
    /// Target false-positive rate for each segment's doc-id Bloom filter.
    pub bloom_fp_rate: f64,
    /// Geometric size ratio between merge levels (`r` in §4.6).
    pub merge_ratio: u32,
    /// Segments accumulated at a level before they're scheduled for merge
    /// into the next band (`k` in §4.6).
    pub merge_fan_in: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            block_size: 1024,
            bloom_fp_rate: 0.01,
            merge_ratio: 4,
            merge_fan_in: 4,
        }
    }
}

/// A `(doc_id, score)` pair returned by a search, per §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: u32,
}
