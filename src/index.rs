//! Publishes the current immutable manifest+segment set to readers, and
//! drives writer-side commits and merges (spec.md §4.4–§4.6, §4.9 — i.e.
//! §4.5/§4.6, and the snapshot-isolation rules of §5).

use crate::error::{IndexError, Result};
use crate::manifest::{Manifest, SegmentDescriptor};
use crate::segment::{merge_segments, write_segment, SegmentReader};
use crate::types::{DocId, IndexOptions, Posting, SegmentId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// A reader's stable view of a manifest and the segment readers it names.
/// Holding a `Snapshot` keeps its segment files alive even across later
/// commits (spec.md §4.5, §5).
pub struct Snapshot {
    pub manifest: Arc<Manifest>,
    pub segments: HashMap<SegmentId, Arc<SegmentReader>>,
}

impl Snapshot {
    /// Live segment ids, newest first — the order the query evaluator
    /// consults them in (spec.md §4.7).
    pub fn segment_ids_newest_first(&self) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self.manifest.segments.iter().map(|d| d.segment_id).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }

    pub fn deleted_doc_ids(&self, segment_id: SegmentId) -> HashSet<DocId> {
        self.manifest
            .segments
            .iter()
            .find(|d| d.segment_id == segment_id)
            .map(|d| d.deleted_doc_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn reader(&self, segment_id: SegmentId) -> Option<&Arc<SegmentReader>> {
        self.segments.get(&segment_id)
    }
}

/// The manifest and its segment readers, published as one unit so a
/// [`Snapshot`] can never observe one updated without the other (spec.md
/// §5) — a merge that reuses an input's `segment_id` would otherwise let a
/// reader pair a stale manifest descriptor with the new reader, or vice
/// versa, for that id.
struct Published {
    manifest: Arc<Manifest>,
    segments: HashMap<SegmentId, Arc<SegmentReader>>,
}

pub struct Index {
    dir: PathBuf,
    options: IndexOptions,
    published: RwLock<Published>,
    writer_active: Mutex<bool>,
}

impl Index {
    /// Open (or create) the index at `dir`: scan for the highest `info_*`
    /// generation, load it, and verify every referenced segment exists and
    /// passes its header check (spec.md §4.4 "On open").
    pub fn open(dir: impl AsRef<Path>, options: IndexOptions) -> Result<Arc<Self>> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let manifest = Manifest::open_latest(&dir)?.unwrap_or_else(Manifest::empty);

        let mut cache = HashMap::new();
        for desc in &manifest.segments {
            let path = dir.join(desc.file_name());
            let reader = SegmentReader::open(&path, options.bloom_fp_rate).map_err(|e| {
                tracing::error!(segment_id = desc.segment_id, error = %e, "failed to open segment referenced by manifest");
                e
            })?;
            reader.verify()?;
            cache.insert(desc.segment_id, Arc::new(reader));
        }

        tracing::info!(
            generation = manifest.generation,
            segments = manifest.segments.len(),
            "opened index"
        );

        Ok(Arc::new(Self {
            dir,
            options,
            published: RwLock::new(Published {
                manifest: Arc::new(manifest),
                segments: cache,
            }),
            writer_active: Mutex::new(false),
        }))
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Create a writer/reader session over this index (spec.md §6
    /// `Index.begin_session() → Session`).
    pub fn begin_session(self: &Arc<Self>) -> crate::session::Session {
        crate::session::Session::new(Arc::clone(self))
    }

    pub fn current_manifest(&self) -> Arc<Manifest> {
        Arc::clone(&self.published.read().unwrap().manifest)
    }

    /// Reference-counted view of the manifest and its live segment readers,
    /// stable for the lifetime of the returned [`Snapshot`] regardless of
    /// subsequent commits. Manifest and segments are read under one lock, so
    /// a concurrent commit or merge can never be observed half-applied.
    pub fn snapshot(&self) -> Snapshot {
        let published = self.published.read().unwrap();
        let manifest = Arc::clone(&published.manifest);
        let mut segments = HashMap::with_capacity(manifest.segments.len());
        for desc in &manifest.segments {
            if let Some(reader) = published.segments.get(&desc.segment_id) {
                segments.insert(desc.segment_id, Arc::clone(reader));
            }
        }
        Snapshot { manifest, segments }
    }

    pub(crate) fn acquire_writer(&self) -> Result<()> {
        let mut guard = self.writer_active.lock().unwrap();
        if *guard {
            return Err(IndexError::AlreadyInTransaction);
        }
        *guard = true;
        Ok(())
    }

    pub(crate) fn release_writer(&self) {
        *self.writer_active.lock().unwrap() = false;
    }

    fn cached_reader(&self, segment_id: SegmentId) -> Option<Arc<SegmentReader>> {
        self.published.read().unwrap().segments.get(&segment_id).cloned()
    }

    /// Flush a writer's in-memory buffer to disk and publish a new manifest
    /// generation (spec.md §4.6 `commit()` steps 1–4).
    pub(crate) fn commit_transaction(
        &self,
        postings: &[Posting],
        attribute_updates: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut sorted = postings.to_vec();
        sorted.sort_unstable();

        let current = self.current_manifest();
        let new_segment_id = current.next_segment_id;

        let new_doc_ids: HashSet<DocId> = sorted.iter().map(|p| p.doc_id).collect();

        let mut new_segments = Vec::with_capacity(current.segments.len() + 1);
        for mut desc in current.segments.clone() {
            if !new_doc_ids.is_empty() {
                if let Some(reader) = self.cached_reader(desc.segment_id) {
                    let mut deleted: HashSet<DocId> =
                        desc.deleted_doc_ids.iter().copied().collect();
                    for &doc_id in &new_doc_ids {
                        if !deleted.contains(&doc_id) && reader.might_contain_doc(doc_id) {
                            deleted.insert(doc_id);
                        }
                    }
                    let mut deleted: Vec<DocId> = deleted.into_iter().collect();
                    deleted.sort_unstable();
                    desc.deleted_doc_ids = deleted;
                }
            }
            new_segments.push(desc);
        }

        let new_reader = if !sorted.is_empty() {
            let path = write_segment(&self.dir, new_segment_id, &sorted, self.options.block_size)?;
            let reader = Arc::new(SegmentReader::open(&path, self.options.bloom_fp_rate)?);

            new_segments.push(SegmentDescriptor {
                segment_id: new_segment_id,
                doc_count: new_doc_ids.len() as u32,
                posting_count: sorted.len() as u32,
                min_hash: sorted.first().map(|p| p.hash).unwrap_or(0),
                max_hash: sorted.last().map(|p| p.hash).unwrap_or(0),
                deleted_doc_ids: Vec::new(),
            });
            Some(reader)
        } else {
            None
        };

        let mut attributes = current.attributes.clone();
        for (name, value) in attribute_updates {
            attributes.insert(name.clone(), value.clone());
        }

        let next_segment_id = if sorted.is_empty() {
            current.next_segment_id
        } else {
            new_segment_id + 1
        };

        let new_manifest = Manifest {
            generation: current.generation + 1,
            next_segment_id,
            attributes,
            segments: new_segments,
        };

        new_manifest.commit(&self.dir)?;

        // Publish the new segment and the manifest that references it as one
        // atomic step, so no reader's `snapshot()` can observe the new
        // reader paired with the old manifest or vice versa.
        {
            let mut published = self.published.write().unwrap();
            if let Some(reader) = new_reader {
                published.segments.insert(new_segment_id, reader);
            }
            published.manifest = Arc::new(new_manifest);
        }

        self.maybe_merge()?;
        Ok(())
    }

    /// Merge exactly `segment_ids` into one new segment and publish the
    /// resulting manifest. The merged segment reuses the highest input's
    /// `segment_id` (spec.md §4.3); the atomic rename in [`write_segment`]
    /// means any reader still holding the old file keeps seeing its old
    /// content, so this never disturbs an outstanding snapshot.
    fn do_merge(&self, segment_ids: &[SegmentId]) -> Result<()> {
        let current = self.current_manifest();
        let mut inputs = Vec::with_capacity(segment_ids.len());
        for &id in segment_ids {
            let desc = current
                .segments
                .iter()
                .find(|d| d.segment_id == id)
                .cloned()
                .ok_or_else(|| IndexError::corrupt_manifest(&self.dir, "merge input missing from manifest"))?;
            let reader = self.cached_reader(id).ok_or_else(|| {
                IndexError::corrupt_manifest(&self.dir, "merge input missing from segment cache")
            })?;
            let deleted: HashSet<DocId> = desc.deleted_doc_ids.iter().copied().collect();
            inputs.push((reader, deleted));
        }

        let (new_segment_id, path) = merge_segments(&self.dir, &inputs, self.options.block_size)?;
        let new_reader = Arc::new(SegmentReader::open(&path, self.options.bloom_fp_rate)?);

        let mut new_segments: Vec<SegmentDescriptor> = current
            .segments
            .iter()
            .filter(|d| !segment_ids.contains(&d.segment_id))
            .cloned()
            .collect();
        new_segments.push(SegmentDescriptor {
            segment_id: new_segment_id,
            doc_count: new_reader.doc_count(),
            posting_count: new_reader.posting_count() as u32,
            min_hash: new_reader.min_hash(),
            max_hash: new_reader.max_hash(),
            deleted_doc_ids: Vec::new(),
        });
        new_segments.sort_by_key(|d| d.segment_id);

        let new_manifest = Manifest {
            generation: current.generation + 1,
            next_segment_id: current.next_segment_id.max(new_segment_id + 1),
            attributes: current.attributes.clone(),
            segments: new_segments,
        };
        new_manifest.commit(&self.dir)?;

        // Same reasoning as `commit_transaction`: publish the merged reader
        // and the manifest that names it under one write-lock, so a reader
        // can never pair the old descriptor for this (reused) segment_id
        // with the new reader, or the new descriptor with the old reader.
        {
            let mut published = self.published.write().unwrap();
            published.segments.insert(new_segment_id, new_reader);
            published.manifest = Arc::new(new_manifest);
        }
        Ok(())
    }

    /// `optimize()`: force-merge every live segment into one (spec.md §4.6).
    pub(crate) fn optimize(&self) -> Result<()> {
        let current = self.current_manifest();
        if current.segments.len() <= 1 {
            return Ok(());
        }
        let ids: Vec<SegmentId> = current.segments.iter().map(|d| d.segment_id).collect();
        self.do_merge(&ids)
    }

    /// Geometric merge policy (spec.md §4.6): group segments into levels by
    /// `log_r(posting_count)` and merge the first level that has
    /// accumulated `fan_in` segments.
    fn maybe_merge(&self) -> Result<()> {
        let current = self.current_manifest();
        let mut levels: BTreeMap<u32, Vec<SegmentId>> = BTreeMap::new();
        for desc in &current.segments {
            let level = merge_level(desc.posting_count as u64, self.options.merge_ratio);
            levels.entry(level).or_default().push(desc.segment_id);
        }
        for ids in levels.into_values() {
            if ids.len() >= self.options.merge_fan_in {
                return self.do_merge(&ids);
            }
        }
        Ok(())
    }

    /// `cleanup()`: unlink segment/manifest files not referenced by the
    /// current manifest, and any stale `*.tmp` files. Never touches files an
    /// outstanding snapshot still holds open (spec.md §4.6).
    pub(crate) fn cleanup(&self) -> Result<()> {
        let current = self.current_manifest();
        let live_ids: HashSet<SegmentId> = current.segments.iter().map(|d| d.segment_id).collect();
        let live_names: HashSet<String> = current.segments.iter().map(|d| d.file_name()).collect();

        {
            let mut published = self.published.write().unwrap();
            published
                .segments
                .retain(|id, reader| live_ids.contains(id) || Arc::strong_count(reader) > 1);
        }

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            if name.ends_with(".tmp") {
                let _ = fs::remove_file(entry.path());
                continue;
            }

            if name.starts_with("segment_") && name.ends_with(".dat") && !live_names.contains(name) {
                let still_cached = parse_segment_id(name)
                    .map(|id| self.published.read().unwrap().segments.contains_key(&id))
                    .unwrap_or(false);
                if !still_cached {
                    let _ = fs::remove_file(entry.path());
                }
            }

            if name.starts_with("info_") && name != current.file_name() {
                let _ = fs::remove_file(entry.path());
            }
        }

        tracing::debug!(generation = current.generation, "cleanup complete");
        Ok(())
    }
}

fn merge_level(posting_count: u64, ratio: u32) -> u32 {
    if posting_count == 0 {
        return 0;
    }
    let ratio = (ratio.max(2)) as f64;
    ((posting_count as f64).ln() / ratio.ln()).floor().max(0.0) as u32
}

fn parse_segment_id(file_name: &str) -> Option<SegmentId> {
    file_name
        .strip_prefix("segment_")?
        .strip_suffix(".dat")?
        .parse()
        .ok()
}
