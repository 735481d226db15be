//! Segment Store
//!
//! Owns the set of immutable on-disk segments and the manifest describing
//! them. The manifest is the sole source of truth; the in-memory snapshot
//! (a copy-on-write list of refcounted segment handles) always mirrors the
//! last persisted manifest.
//!
//! ## Concurrency
//! - Readers grab a snapshot: one short read-lock to clone an `Arc`, then
//!   operate entirely on immutable data — no read ever sees a half-swapped
//!   manifest or a half-written segment
//! - `install_flush` and `retire` are the only manifest mutators, and both
//!   persist write-new-then-rename before swapping the snapshot
//! - Retired segment files are unlinked only once the last snapshot
//!   referencing them is dropped (refcount via `Arc` + retired flag)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::entry::Entry;
use crate::error::{EngineError, Result};

use super::manifest::{ManifestData, ManifestFile, SegmentMeta};
use super::segment::{
    parse_segment_id, segment_path, SegmentBuilder, SegmentReader,
};

/// Manifest file name under the data directory
pub const MANIFEST_FILENAME: &str = "MANIFEST";

/// Subdirectory holding segment files
pub const SEGMENT_DIR: &str = "segments";

/// A live segment: metadata plus an open, validated reader.
///
/// Dropping the last reference to a retired handle unlinks the file.
#[derive(Debug)]
pub struct SegmentHandle {
    pub meta: SegmentMeta,
    pub reader: SegmentReader,
    retired: AtomicBool,
}

impl SegmentHandle {
    fn new(meta: SegmentMeta, reader: SegmentReader) -> Self {
        Self {
            meta,
            reader,
            retired: AtomicBool::new(false),
        }
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

impl Drop for SegmentHandle {
    fn drop(&mut self) {
        if self.retired.load(Ordering::Acquire) {
            if let Err(e) = fs::remove_file(self.reader.path()) {
                tracing::warn!(
                    segment_id = self.meta.id,
                    error = %e,
                    "failed to unlink retired segment file"
                );
            }
        }
    }
}

/// Immutable view of the live segment list, in read order
pub type SegmentSnapshot = Arc<Vec<Arc<SegmentHandle>>>;

/// Manages immutable segments and the manifest
#[derive(Debug)]
pub struct SegmentStore {
    /// Directory where segment files are stored
    segments_dir: PathBuf,

    /// Persistent manifest; the lock serializes the two mutators
    manifest: Mutex<ManifestFile>,

    /// Copy-on-write list mirroring the manifest's segment order
    snapshot: RwLock<SegmentSnapshot>,

    /// Sparse index sampling for newly built segments
    sparse_index_interval: usize,
}

impl SegmentStore {
    /// Open the store: load the manifest, open and validate every
    /// referenced segment, and clean up orphan files from interrupted
    /// flushes or compactions.
    pub fn open(data_dir: &Path, sparse_index_interval: usize) -> Result<Self> {
        let segments_dir = data_dir.join(SEGMENT_DIR);
        fs::create_dir_all(&segments_dir)?;

        let manifest = ManifestFile::load_or_default(&data_dir.join(MANIFEST_FILENAME))?;

        let mut handles = Vec::with_capacity(manifest.data().segments.len());
        for meta in &manifest.data().segments {
            let path = segment_path(&segments_dir, meta.id);
            let reader = SegmentReader::open(&path)?;
            handles.push(Arc::new(SegmentHandle::new(meta.clone(), reader)));
        }

        // Segment files not referenced by the manifest are leftovers from
        // a crash between create_segment and the manifest swap
        let live_ids: Vec<u64> = manifest.data().segments.iter().map(|m| m.id).collect();
        for dirent in fs::read_dir(&segments_dir)? {
            let path = dirent?.path();
            if let Some(id) = parse_segment_id(&path) {
                if !live_ids.contains(&id) {
                    tracing::warn!(segment_id = id, "removing orphan segment file");
                    let _ = fs::remove_file(&path);
                }
            }
        }

        Ok(Self {
            segments_dir,
            manifest: Mutex::new(manifest),
            snapshot: RwLock::new(Arc::new(handles)),
            sparse_index_interval,
        })
    }

    /// Reserve the next segment id. Ids are never reused, even if the
    /// file they were reserved for is never built.
    pub fn allocate_segment_id(&self) -> u64 {
        let mut manifest = self.manifest.lock();
        let data = manifest.data_mut();
        let id = data.next_segment_id;
        data.next_segment_id += 1;
        id
    }

    /// Open a builder writing the segment file for a reserved id.
    ///
    /// Lets compaction stream merge output to disk entry by entry instead
    /// of buffering it. The file is not visible to readers until
    /// `install_flush` or `retire` registers it in the manifest; abandoned
    /// files are orphan-cleaned on the next open.
    pub fn new_segment_builder(&self, id: u64) -> Result<SegmentBuilder> {
        SegmentBuilder::new(
            &segment_path(&self.segments_dir, id),
            self.sparse_index_interval,
        )
    }

    /// Write sorted entries to a new immutable segment file.
    ///
    /// The segment is not visible to readers until `install_flush` or
    /// `retire` registers it in the manifest.
    pub fn create_segment(&self, entries: &[Entry], level: u32) -> Result<SegmentMeta> {
        let id = self.allocate_segment_id();
        let mut builder = self.new_segment_builder(id)?;
        for entry in entries {
            builder.add(entry)?;
        }
        let info = builder.finish()?;
        Ok(SegmentMeta::for_new_file(id, level, &info))
    }

    /// Register a fresh flush output at the front of the read order and
    /// advance the durable flush checkpoint. Atomic: manifest rename
    /// first, snapshot swap second.
    pub fn install_flush(&self, meta: SegmentMeta, last_flushed_sequence: u64) -> Result<()> {
        let reader = SegmentReader::open(&segment_path(&self.segments_dir, meta.id))?;
        let handle = Arc::new(SegmentHandle::new(meta.clone(), reader));

        let mut manifest = self.manifest.lock();
        let data = manifest.data_mut();
        data.segments.insert(0, meta);
        data.last_flushed_sequence = last_flushed_sequence;
        manifest.persist()?;

        let mut snapshot = self.snapshot.write();
        let mut segments = Vec::with_capacity(snapshot.len() + 1);
        segments.push(handle);
        segments.extend(snapshot.iter().cloned());
        *snapshot = Arc::new(segments);

        Ok(())
    }

    /// Atomically replace a set of segments with their compaction output.
    ///
    /// The new segments take the list position of the first retired one,
    /// preserving read-order recency. Old files are unlinked only after
    /// the manifest swap is durable and the last snapshot holding them is
    /// released.
    pub fn retire(&self, old_ids: &[u64], new_metas: Vec<SegmentMeta>) -> Result<()> {
        let mut new_handles = Vec::with_capacity(new_metas.len());
        for meta in &new_metas {
            let reader = SegmentReader::open(&segment_path(&self.segments_dir, meta.id))?;
            new_handles.push(Arc::new(SegmentHandle::new(meta.clone(), reader)));
        }

        let mut manifest = self.manifest.lock();
        let data = manifest.data_mut();

        for id in old_ids {
            if !data.segments.iter().any(|m| m.id == *id) {
                return Err(EngineError::Corruption(format!(
                    "retire of unknown segment id {}",
                    id
                )));
            }
        }

        let mut rebuilt = Vec::with_capacity(data.segments.len());
        let mut spliced = false;
        for meta in data.segments.drain(..) {
            if old_ids.contains(&meta.id) {
                if !spliced {
                    rebuilt.extend(new_metas.iter().cloned());
                    spliced = true;
                }
            } else {
                rebuilt.push(meta);
            }
        }
        if !spliced {
            rebuilt.extend(new_metas.iter().cloned());
        }
        data.segments = rebuilt;
        manifest.persist()?;

        let mut snapshot = self.snapshot.write();
        let mut segments = Vec::with_capacity(snapshot.len());
        let mut spliced = false;
        for handle in snapshot.iter() {
            if old_ids.contains(&handle.meta.id) {
                if !spliced {
                    segments.extend(new_handles.iter().cloned());
                    spliced = true;
                }
                handle.retire();
            } else {
                segments.push(handle.clone());
            }
        }
        if !spliced {
            segments.extend(new_handles.iter().cloned());
        }
        *snapshot = Arc::new(segments);

        Ok(())
    }

    /// Grab the current read-order snapshot (one Arc clone)
    pub fn snapshot(&self) -> SegmentSnapshot {
        self.snapshot.read().clone()
    }

    /// Highest sequence number durably captured in a segment
    pub fn last_flushed_sequence(&self) -> u64 {
        self.manifest.lock().data().last_flushed_sequence
    }

    /// Copy of the current manifest contents (planning, inspection)
    pub fn manifest_data(&self) -> ManifestData {
        self.manifest.lock().data().clone()
    }

    /// Number of live segments
    pub fn segment_count(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Directory where segment files live
    pub fn segments_dir(&self) -> &Path {
        &self.segments_dir
    }
}
