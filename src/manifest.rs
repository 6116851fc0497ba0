//! The atomic listing of live segments plus index-level attributes and
//! generation number (spec.md §3, §4.4, §6).

use crate::encoding::{read_u16_le, read_u32_le, read_u64_le, write_u16_le, write_u32_le, write_u64_le};
use crate::error::{IndexError, Result};
use crate::types::{DocId, SegmentId};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"AIDX";
const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub segment_id: SegmentId,
    pub doc_count: u32,
    pub posting_count: u32,
    pub min_hash: u32,
    pub max_hash: u32,
    pub deleted_doc_ids: Vec<DocId>,
}

impl SegmentDescriptor {
    pub fn file_name(&self) -> String {
        format!("segment_{}.dat", self.segment_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub generation: u64,
    pub next_segment_id: u64,
    pub attributes: BTreeMap<String, String>,
    /// Ordered list of live segment descriptors, oldest first.
    pub segments: Vec<SegmentDescriptor>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            next_segment_id: 0,
            attributes: BTreeMap::new(),
            segments: Vec::new(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("info_{}", self.generation)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.generation.to_le_bytes());
        buf.extend_from_slice(&self.next_segment_id.to_le_bytes());

        write_u32_le(&mut buf, self.attributes.len() as u32).unwrap();
        for (name, value) in &self.attributes {
            write_u16_le(&mut buf, name.len() as u16).unwrap();
            buf.extend_from_slice(name.as_bytes());
            write_u32_le(&mut buf, value.len() as u32).unwrap();
            buf.extend_from_slice(value.as_bytes());
        }

        write_u32_le(&mut buf, self.segments.len() as u32).unwrap();
        for seg in &self.segments {
            buf.extend_from_slice(&seg.segment_id.to_le_bytes());
            buf.extend_from_slice(&seg.doc_count.to_le_bytes());
            buf.extend_from_slice(&seg.posting_count.to_le_bytes());
            buf.extend_from_slice(&seg.min_hash.to_le_bytes());
            buf.extend_from_slice(&seg.max_hash.to_le_bytes());
            write_u32_le(&mut buf, seg.deleted_doc_ids.len() as u32).unwrap();
            for &doc_id in &seg.deleted_doc_ids {
                buf.extend_from_slice(&doc_id.to_le_bytes());
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        cursor
            .read_exact(&mut magic)
            .map_err(|_| IndexError::corrupt_manifest(path, "truncated header"))?;
        if magic != MAGIC {
            return Err(IndexError::corrupt_manifest(path, "bad magic"));
        }

        let version = read_u32_le(&mut cursor)
            .map_err(|_| IndexError::corrupt_manifest(path, "truncated version"))?;
        if version != FORMAT_VERSION {
            return Err(IndexError::corrupt_manifest(
                path,
                format!("unsupported format version {version}"),
            ));
        }

        let generation = read_u64_le(&mut cursor)
            .map_err(|_| IndexError::corrupt_manifest(path, "truncated generation"))?;
        let next_segment_id = read_u64_le(&mut cursor)
            .map_err(|_| IndexError::corrupt_manifest(path, "truncated next_segment_id"))?;

        let attr_count = read_u32_le(&mut cursor)
            .map_err(|_| IndexError::corrupt_manifest(path, "truncated attribute count"))?;
        let mut attributes = BTreeMap::new();
        for _ in 0..attr_count {
            let name_len = read_u16_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated attribute name len"))?;
            let mut name_buf = vec![0u8; name_len as usize];
            cursor
                .read_exact(&mut name_buf)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated attribute name"))?;
            let name = String::from_utf8(name_buf)
                .map_err(|_| IndexError::corrupt_manifest(path, "invalid utf8 attribute name"))?;

            let value_len = read_u32_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated attribute value len"))?;
            let mut value_buf = vec![0u8; value_len as usize];
            cursor
                .read_exact(&mut value_buf)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated attribute value"))?;
            let value = String::from_utf8(value_buf)
                .map_err(|_| IndexError::corrupt_manifest(path, "invalid utf8 attribute value"))?;

            attributes.insert(name, value);
        }

        let segment_count = read_u32_le(&mut cursor)
            .map_err(|_| IndexError::corrupt_manifest(path, "truncated segment count"))?;
        let mut segments = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            let segment_id = read_u64_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated segment_id"))?;
            let doc_count = read_u32_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated doc_count"))?;
            let posting_count = read_u32_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated posting_count"))?;
            let min_hash = read_u32_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated min_hash"))?;
            let max_hash = read_u32_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated max_hash"))?;
            let deleted_count = read_u32_le(&mut cursor)
                .map_err(|_| IndexError::corrupt_manifest(path, "truncated deleted_count"))?;
            let mut deleted_doc_ids = Vec::with_capacity(deleted_count as usize);
            for _ in 0..deleted_count {
                deleted_doc_ids.push(
                    read_u32_le(&mut cursor)
                        .map_err(|_| IndexError::corrupt_manifest(path, "truncated deleted doc id"))?,
                );
            }
            segments.push(SegmentDescriptor {
                segment_id,
                doc_count,
                posting_count,
                min_hash,
                max_hash,
                deleted_doc_ids,
            });
        }

        Ok(Self {
            generation,
            next_segment_id,
            attributes,
            segments,
        })
    }

    /// Apply the commit procedure of spec.md §4.4 steps 1–4: write the temp
    /// file, fsync it, atomically rename, then fsync the containing
    /// directory. Returns the path of the new manifest file.
    pub fn commit(&self, dir: &Path) -> Result<PathBuf> {
        let final_path = dir.join(self.file_name());
        let tmp_path = dir.join(format!("{}.tmp", self.file_name()));

        let mut file = File::create(&tmp_path)?;
        file.write_all(&self.encode())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }

        tracing::info!(generation = self.generation, "committed manifest");
        Ok(final_path)
    }

    /// Scan `dir` for `info_*` files and load the one with the highest
    /// generation number. Returns `None` if the index is brand new.
    pub fn open_latest(dir: &Path) -> Result<Option<Self>> {
        let mut best: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix("info_") else {
                continue;
            };
            if rest.ends_with(".tmp") {
                continue;
            }
            let Ok(generation) = rest.parse::<u64>() else {
                continue;
            };
            if best.as_ref().is_none_or(|(g, _)| generation > *g) {
                best = Some((generation, entry.path()));
            }
        }

        let Some((_, path)) = best else {
            return Ok(None);
        };
        let bytes = fs::read(&path)?;
        Ok(Some(Self::decode(&bytes, &path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("acoustidx_test_fixtures")
            .join(format!("{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut manifest = Manifest::empty();
        manifest.generation = 3;
        manifest.next_segment_id = 7;
        manifest.attributes.insert("max_results".to_string(), "500".to_string());
        manifest.segments.push(SegmentDescriptor {
            segment_id: 1,
            doc_count: 2,
            posting_count: 5,
            min_hash: 10,
            max_hash: 400,
            deleted_doc_ids: vec![3, 9],
        });

        let bytes = manifest.encode();
        let decoded = Manifest::decode(&bytes, &PathBuf::from("test")).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn open_latest_picks_highest_generation() {
        let dir = temp_dir("manifest_open_latest");
        let mut m1 = Manifest::empty();
        m1.generation = 1;
        m1.commit(&dir).unwrap();

        let mut m2 = Manifest::empty();
        m2.generation = 2;
        m2.next_segment_id = 1;
        m2.commit(&dir).unwrap();

        let loaded = Manifest::open_latest(&dir).unwrap().unwrap();
        assert_eq!(loaded.generation, 2);
    }

    #[test]
    fn open_latest_none_when_empty() {
        let dir = temp_dir("manifest_open_latest_empty");
        assert!(Manifest::open_latest(&dir).unwrap().is_none());
    }
}
