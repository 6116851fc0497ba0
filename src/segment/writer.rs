//! Builds a segment file from a sorted `Vec<Posting>` (spec.md §4.1, §4.6
//! step 2). Blocks are independent once split — each starts with its first
//! posting in cleartext — so they're encoded in parallel with `rayon`
//! before being concatenated and written out.

use crate::encoding::encode_varint;
use crate::error::Result;
use crate::segment::header::{SegmentHeader, HEADER_SIZE};
use crate::types::{Posting, SegmentId};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Encode one block of postings (the first in cleartext, the rest as
/// `(hash_delta, doc_id_delta_or_reset)` varints). Returns the block's bytes
/// and its first hash, for the skip table.
fn encode_block(postings: &[Posting]) -> (Vec<u8>, u32) {
    debug_assert!(!postings.is_empty());
    let first = postings[0];
    let mut buf = Vec::with_capacity(postings.len() * 3);
    buf.extend_from_slice(&first.hash.to_le_bytes());
    buf.extend_from_slice(&first.doc_id.to_le_bytes());

    let mut prev = first;
    for &posting in &postings[1..] {
        let hash_delta = posting.hash - prev.hash;
        encode_varint(hash_delta, &mut buf);
        let doc_delta = if hash_delta == 0 {
            posting.doc_id - prev.doc_id
        } else {
            posting.doc_id
        };
        encode_varint(doc_delta, &mut buf);
        prev = posting;
    }

    (buf, first.hash)
}

/// Serialise `postings` (already sorted by `(hash, doc_id)`) into
/// `dir/segment_<segment_id>.dat`, using the standard temp-file-then-rename
/// discipline. Returns the path of the finished file.
pub fn write_segment(
    dir: &Path,
    segment_id: SegmentId,
    postings: &[Posting],
    block_size: u32,
) -> Result<PathBuf> {
    let block_size = block_size.max(1) as usize;
    let doc_count = postings.iter().map(|p| p.doc_id).collect::<std::collections::HashSet<_>>().len() as u32;
    let min_hash = postings.first().map(|p| p.hash).unwrap_or(0);
    let max_hash = postings.last().map(|p| p.hash).unwrap_or(0);

    let blocks: Vec<(Vec<u8>, u32)> = postings
        .par_chunks(block_size)
        .map(encode_block)
        .collect();

    let mut body = Vec::new();
    let mut skip_table = Vec::with_capacity(blocks.len() * 12);
    let mut offset = HEADER_SIZE as u64;
    for (bytes, first_hash) in &blocks {
        skip_table.extend_from_slice(&first_hash.to_le_bytes());
        skip_table.extend_from_slice(&offset.to_le_bytes());
        offset += bytes.len() as u64;
        body.extend_from_slice(bytes);
    }
    let skip_table_offset = offset;

    let header = SegmentHeader {
        segment_id,
        doc_count,
        posting_count: postings.len() as u64,
        min_hash,
        max_hash,
        block_size: block_size as u32,
        postings_offset: HEADER_SIZE as u64,
        skip_table_offset,
        skip_count: blocks.len() as u64,
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len() + skip_table.len());
    header.write_to(&mut out);
    out.extend_from_slice(&body);
    out.extend_from_slice(&skip_table);

    let final_path = dir.join(format!("segment_{segment_id}.dat"));
    let tmp_path = dir.join(format!("segment_{segment_id}.dat.tmp"));

    let mut file = File::create(&tmp_path)?;
    file.write_all(&out)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, &final_path)?;
    if let Some(parent) = final_path.parent() {
        if let Ok(dir_file) = File::open(parent) {
            let _ = dir_file.sync_all();
        }
    }

    tracing::debug!(segment_id, postings = postings.len(), "wrote segment");
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::reader::SegmentReader;
    use std::collections::HashSet;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("acoustidx_test_fixtures")
            .join(format!("{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn writes_and_reads_back_postings() {
        let dir = temp_dir("segment_writer_roundtrip");
        let mut postings = vec![
            Posting::new(100, 1),
            Posting::new(100, 2),
            Posting::new(200, 1),
            Posting::new(300, 3),
        ];
        postings.sort();

        let path = write_segment(&dir, 1, &postings, 2).unwrap();
        let reader = SegmentReader::open(&path, 0.01).unwrap();

        let empty: HashSet<u32> = HashSet::new();
        assert_eq!(reader.postings_for(100, &empty), vec![1, 2]);
        assert_eq!(reader.postings_for(200, &empty), vec![1]);
        assert_eq!(reader.postings_for(300, &empty), vec![3]);
        assert_eq!(reader.postings_for(999, &empty), Vec::<u32>::new());
    }
}
