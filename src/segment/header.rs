//! Fixed-size segment header (spec.md §4.1): magic, format version,
//! identity, counts, and the byte offsets of the two variable-length
//! regions that follow it in the file.

use crate::error::{IndexError, Result};
use crate::types::SegmentId;
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"ASG1";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct SegmentHeader {
    pub segment_id: SegmentId,
    pub doc_count: u32,
    pub posting_count: u64,
    pub min_hash: u32,
    pub max_hash: u32,
    pub block_size: u32,
    /// Byte offset of the first posting block. Always [`HEADER_SIZE`].
    pub postings_offset: u64,
    /// Byte offset of the skip table.
    pub skip_table_offset: u64,
    pub skip_count: u64,
}

impl SegmentHeader {
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.segment_id.to_le_bytes());
        buf.extend_from_slice(&self.doc_count.to_le_bytes());
        buf.extend_from_slice(&self.posting_count.to_le_bytes());
        buf.extend_from_slice(&self.min_hash.to_le_bytes());
        buf.extend_from_slice(&self.max_hash.to_le_bytes());
        buf.extend_from_slice(&self.block_size.to_le_bytes());
        buf.extend_from_slice(&self.postings_offset.to_le_bytes());
        buf.extend_from_slice(&self.skip_table_offset.to_le_bytes());
        buf.extend_from_slice(&self.skip_count.to_le_bytes());
        debug_assert_eq!(buf.len(), HEADER_SIZE);
    }

    pub fn read_from(buf: &[u8], path: &Path) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IndexError::corrupt_segment(path, "truncated header"));
        }
        if buf[0..4] != MAGIC {
            return Err(IndexError::corrupt_segment(path, "bad magic"));
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(IndexError::corrupt_segment(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        Ok(Self {
            segment_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            doc_count: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            posting_count: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
            min_hash: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
            max_hash: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            block_size: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            postings_offset: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            skip_table_offset: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
            skip_count: u64::from_le_bytes(buf[56..64].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn header_roundtrip() {
        let header = SegmentHeader {
            segment_id: 7,
            doc_count: 3,
            posting_count: 10,
            min_hash: 5,
            max_hash: 500,
            block_size: 1024,
            postings_offset: HEADER_SIZE as u64,
            skip_table_offset: 999,
            skip_count: 1,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = SegmentHeader::read_from(&buf, &PathBuf::from("test")).unwrap();
        assert_eq!(decoded.segment_id, 7);
        assert_eq!(decoded.doc_count, 3);
        assert_eq!(decoded.posting_count, 10);
        assert_eq!(decoded.min_hash, 5);
        assert_eq!(decoded.max_hash, 500);
        assert_eq!(decoded.block_size, 1024);
        assert_eq!(decoded.skip_table_offset, 999);
        assert_eq!(decoded.skip_count, 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; HEADER_SIZE];
        let err = SegmentHeader::read_from(&buf, &PathBuf::from("test")).unwrap_err();
        assert!(matches!(err, IndexError::CorruptSegment { .. }));
    }
}
