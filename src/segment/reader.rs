//! Memory-mapped random access to a segment's posting lists (spec.md §4.2).

use crate::bloom::BloomFilter;
use crate::encoding::decode_varint;
use crate::error::{IndexError, Result};
use crate::segment::header::{SegmentHeader, HEADER_SIZE};
use crate::types::{DocId, Hash, Posting, SegmentId};
use memmap2::Mmap;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug)]
pub struct SegmentReader {
    path: PathBuf,
    mmap: Mmap,
    header: SegmentHeader,
    bloom_fp_rate: f64,
    doc_ids: OnceLock<Vec<DocId>>,
    bloom: OnceLock<BloomFilter>,
}

impl SegmentReader {
    /// Open `path` for reading. `bloom_fp_rate` sizes the per-segment Bloom
    /// filter lazily built by [`Self::bloom`] (`IndexOptions::bloom_fp_rate`).
    pub fn open(path: impl Into<PathBuf>, bloom_fp_rate: f64) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = SegmentHeader::read_from(&mmap, &path)?;

        Ok(Self {
            path,
            mmap,
            header,
            bloom_fp_rate,
            doc_ids: OnceLock::new(),
            bloom: OnceLock::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn segment_id(&self) -> SegmentId {
        self.header.segment_id
    }

    pub fn doc_count(&self) -> u32 {
        self.header.doc_count
    }

    pub fn posting_count(&self) -> u64 {
        self.header.posting_count
    }

    pub fn min_hash(&self) -> u32 {
        self.header.min_hash
    }

    pub fn max_hash(&self) -> u32 {
        self.header.max_hash
    }

    fn skip_table_entry(&self, index: usize) -> (u32, u64) {
        let base = self.header.skip_table_offset as usize + index * 12;
        let hash = u32::from_le_bytes(self.mmap[base..base + 4].try_into().unwrap());
        let offset = u64::from_le_bytes(self.mmap[base + 4..base + 12].try_into().unwrap());
        (hash, offset)
    }

    /// Byte range `[start, end)` of the block at `index` within the posting
    /// region.
    fn block_range(&self, index: usize) -> (usize, usize) {
        let (_, start) = self.skip_table_entry(index);
        let end = if index + 1 < self.header.skip_count as usize {
            self.skip_table_entry(index + 1).1
        } else {
            self.header.skip_table_offset
        };
        (start as usize, end as usize)
    }

    /// Binary-search the skip table for the block that could contain `hash`.
    fn find_block(&self, hash: Hash) -> Option<usize> {
        let count = self.header.skip_count as usize;
        if count == 0 {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let (first_hash, _) = self.skip_table_entry(mid);
            if first_hash <= hash {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            None
        } else {
            Some(lo - 1)
        }
    }

    /// Decode every posting in a block into `(hash, doc_id)` pairs.
    fn decode_block(&self, start: usize, end: usize) -> Vec<Posting> {
        let block = &self.mmap[start..end];
        if block.len() < 8 {
            return Vec::new();
        }
        let mut out = Vec::new();
        let first_hash = u32::from_le_bytes(block[0..4].try_into().unwrap());
        let first_doc = u32::from_le_bytes(block[4..8].try_into().unwrap());
        out.push(Posting::new(first_hash, first_doc));

        let mut pos = 8;
        let mut prev = Posting::new(first_hash, first_doc);
        while pos < block.len() {
            let (hash_delta, consumed) = match decode_varint(&block[pos..]) {
                Some(v) => v,
                None => break,
            };
            pos += consumed;
            let (doc_delta, consumed) = match decode_varint(&block[pos..]) {
                Some(v) => v,
                None => break,
            };
            pos += consumed;

            let hash = prev.hash.wrapping_add(hash_delta);
            let doc_id = if hash_delta == 0 {
                prev.doc_id.wrapping_add(doc_delta)
            } else {
                doc_delta
            };
            let posting = Posting::new(hash, doc_id);
            out.push(posting);
            prev = posting;
        }
        out
    }

    /// All `doc_id`s for `hash`, ascending, excluding anything in `deleted`.
    ///
    /// `find_block` returns the unique block guaranteed to hold the *last*
    /// occurrence of `hash` (its successor's first posting already exceeds
    /// it). The run's first occurrence can still sit in an earlier block
    /// when a block boundary happens to fall in the middle of the run, so
    /// this walks backward over any earlier blocks that are entirely `hash`
    /// before scanning forward.
    pub fn postings_for(&self, hash: Hash, deleted: &HashSet<DocId>) -> Vec<DocId> {
        let Some(anchor) = self.find_block(hash) else {
            return Vec::new();
        };

        let mut first_block = anchor;
        while first_block > 0 {
            let (first_hash_of_block, _) = self.skip_table_entry(first_block);
            if first_hash_of_block != hash {
                break;
            }
            first_block -= 1;
        }

        let mut result = Vec::new();
        for block_index in first_block..=anchor {
            let (start, end) = self.block_range(block_index);
            for posting in self.decode_block(start, end) {
                if posting.hash == hash && !deleted.contains(&posting.doc_id) {
                    result.push(posting.doc_id);
                }
            }
        }
        result
    }

    /// Decode the entire posting stream. Used by the merger and by the
    /// lazily materialised doc-id inventory.
    pub fn decode_all(&self) -> Vec<Posting> {
        let count = self.header.skip_count as usize;
        let mut out = Vec::with_capacity(self.header.posting_count as usize);
        for i in 0..count {
            let (start, end) = self.block_range(i);
            out.extend(self.decode_block(start, end));
        }
        out
    }

    /// Sorted, deduplicated doc ids contained in this segment, materialised
    /// on first use and cached for the reader's lifetime (spec.md §9, §11).
    pub fn doc_ids(&self) -> &[DocId] {
        self.doc_ids.get_or_init(|| {
            let mut ids: Vec<DocId> = self.decode_all().into_iter().map(|p| p.doc_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        })
    }

    /// Bloom filter over this segment's doc ids, built lazily from
    /// [`doc_ids`] the first time deletion propagation probes it.
    pub fn bloom(&self) -> &BloomFilter {
        self.bloom.get_or_init(|| {
            let ids = self.doc_ids();
            let mut filter = BloomFilter::new(ids.len().max(1), self.bloom_fp_rate);
            for &id in ids {
                filter.insert(id);
            }
            filter
        })
    }

    /// Whether `doc_id` is present in this segment. Consults the Bloom
    /// filter first; a positive falls through to a scan of the cached doc-id
    /// inventory (false positives only cost work).
    pub fn might_contain_doc(&self, doc_id: DocId) -> bool {
        if !self.bloom().might_contain(doc_id) {
            return false;
        }
        self.doc_ids().binary_search(&doc_id).is_ok()
    }

    pub fn verify(&self) -> Result<()> {
        let expected_end = self.header.skip_table_offset as usize
            + self.header.skip_count as usize * 12;
        if expected_end > self.mmap.len() {
            return Err(IndexError::corrupt_segment(
                &self.path,
                "skip table extends past end of file",
            ));
        }
        Ok(())
    }
}
