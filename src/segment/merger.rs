//! Produces a new segment from the union of N inputs, dropping deleted doc
//! ids (spec.md §4.3). A k-way streaming merge over each segment's decoded
//! posting stream; block boundaries and the skip table are rebuilt by the
//! segment writer as the merged stream is written out.

use crate::error::Result;
use crate::segment::reader::SegmentReader;
use crate::segment::writer::write_segment;
use crate::types::{DocId, Posting, SegmentId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Cursor<'a> {
    postings: Vec<Posting>,
    pos: usize,
    deleted: &'a HashSet<DocId>,
}

impl<'a> Cursor<'a> {
    fn new(reader: &SegmentReader, deleted: &'a HashSet<DocId>) -> Self {
        let mut postings = reader.decode_all();
        postings.retain(|p| !deleted.contains(&p.doc_id));
        Self {
            postings,
            pos: 0,
            deleted,
        }
    }

    fn peek(&self) -> Option<Posting> {
        self.postings.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

/// Merge `inputs` (each paired with its *effective* deleted-doc-id set —
/// its own manifest deletions, plus any doc id owned by a later segment
/// outside the merge set) into one new segment whose id is
/// `max(input.segment_id)`.
pub fn merge_segments(
    dir: &Path,
    inputs: &[(Arc<SegmentReader>, HashSet<DocId>)],
    block_size: u32,
) -> Result<(SegmentId, PathBuf)> {
    let new_segment_id = inputs
        .iter()
        .map(|(r, _)| r.segment_id())
        .max()
        .unwrap_or(0);

    let mut cursors: Vec<Cursor> = inputs
        .iter()
        .map(|(reader, deleted)| Cursor::new(reader, deleted))
        .collect();

    let mut heap: BinaryHeap<Reverse<(Posting, usize)>> = BinaryHeap::new();
    for (i, cursor) in cursors.iter().enumerate() {
        if let Some(posting) = cursor.peek() {
            heap.push(Reverse((posting, i)));
        }
    }

    let mut merged = Vec::new();
    while let Some(Reverse((posting, i))) = heap.pop() {
        merged.push(posting);
        cursors[i].advance();
        if let Some(next) = cursors[i].peek() {
            heap.push(Reverse((next, i)));
        }
    }

    let path = write_segment(dir, new_segment_id, &merged, block_size)?;
    tracing::info!(
        new_segment_id,
        inputs = inputs.len(),
        postings = merged.len(),
        "merged segments"
    );
    Ok((new_segment_id, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::writer::write_segment as build_segment;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("acoustidx_test_fixtures")
            .join(format!("{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn merge_drops_deleted_and_preserves_order() {
        let dir = temp_dir("segment_merger_basic");

        let s1 = vec![Posting::new(10, 1), Posting::new(20, 2)];
        let s2 = vec![Posting::new(10, 3), Posting::new(15, 1)];

        let p1 = build_segment(&dir, 1, &s1, 1024).unwrap();
        let p2 = build_segment(&dir, 2, &s2, 1024).unwrap();

        let r1 = Arc::new(SegmentReader::open(&p1, 0.01).unwrap());
        let r2 = Arc::new(SegmentReader::open(&p2, 0.01).unwrap());

        let mut deleted1 = HashSet::new();
        deleted1.insert(2u32); // doc 2 superseded by a later segment
        let deleted2 = HashSet::new();

        let (new_id, path) =
            merge_segments(&dir, &[(r1, deleted1), (r2, deleted2)], 1024).unwrap();
        assert_eq!(new_id, 2);

        let merged = SegmentReader::open(&path, 0.01).unwrap();
        let empty = HashSet::new();
        assert_eq!(merged.postings_for(10, &empty), vec![1, 3]);
        assert_eq!(merged.postings_for(15, &empty), vec![1]);
        assert_eq!(merged.postings_for(20, &empty), Vec::<u32>::new());
    }
}
