//! Manifest
//!
//! The sole source of truth for "what exists on disk": the ordered list of
//! live segments plus the last durably-flushed sequence number. Every
//! update is written to a temporary file and atomically renamed over the
//! previous manifest, so a crash mid-update leaves either the old or the
//! new manifest intact, never a torn one.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::now_millis;
use crate::error::{EngineError, Result};

use super::segment::SegmentFileInfo;

/// Manifest format version
const MANIFEST_VERSION: u32 = 1;

/// Suffix for the temporary file used during atomic replacement
const TMP_SUFFIX: &str = ".tmp";

/// Metadata describing one immutable segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Unique id; also determines the file name
    pub id: u64,

    /// Level/tier assigned by the compaction strategy (0 = fresh flush)
    pub level: u32,

    /// Number of entries in the segment
    pub entry_count: u64,

    /// File size in bytes
    pub file_size: u64,

    /// Smallest key present
    pub min_key: Vec<u8>,

    /// Largest key present
    pub max_key: Vec<u8>,

    /// Smallest sequence number present
    pub min_seq: u64,

    /// Largest sequence number present
    pub max_seq: u64,

    /// Unix millis when the segment was created (drives time-window
    /// compaction)
    pub created_at_ms: u64,
}

impl SegmentMeta {
    /// Metadata for a freshly written segment file
    pub fn for_new_file(id: u64, level: u32, info: &SegmentFileInfo) -> Self {
        Self {
            id,
            level,
            entry_count: info.entry_count,
            file_size: info.file_size,
            min_key: info.min_key.clone(),
            max_key: info.max_key.clone(),
            min_seq: info.min_seq,
            max_seq: info.max_seq,
            created_at_ms: now_millis(),
        }
    }

    /// Whether this segment's key range could contain `key`
    pub fn covers(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }

    /// Whether this segment's key range overlaps [start, end] (inclusive)
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        self.min_key.as_slice() <= end && self.max_key.as_slice() >= start
    }
}

/// Persistent manifest contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestData {
    /// Format version for forward compatibility
    pub format_version: u32,

    /// Highest sequence number durably captured in a segment; WAL records
    /// at or below this are redundant
    pub last_flushed_sequence: u64,

    /// Next segment id to allocate
    pub next_segment_id: u64,

    /// Live segments in read order: level-0 newest-first, then deeper
    /// levels
    pub segments: Vec<SegmentMeta>,
}

impl Default for ManifestData {
    fn default() -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            last_flushed_sequence: 0,
            next_segment_id: 1,
            segments: Vec::new(),
        }
    }
}

/// Manifest file handle: in-memory copy + atomic persistence
#[derive(Debug)]
pub struct ManifestFile {
    path: PathBuf,
    data: ManifestData,
}

impl ManifestFile {
    /// Load the manifest, or start empty if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let mut file = File::open(path)?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;

            let data: ManifestData = bincode::deserialize(&bytes)
                .map_err(|e| EngineError::Corruption(format!("manifest unreadable: {}", e)))?;

            if data.format_version != MANIFEST_VERSION {
                return Err(EngineError::Corruption(format!(
                    "unsupported manifest version: {}",
                    data.format_version
                )));
            }
            data
        } else {
            ManifestData::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Current manifest contents
    pub fn data(&self) -> &ManifestData {
        &self.data
    }

    /// Mutable access; callers must `persist` before the change is real
    pub fn data_mut(&mut self) -> &mut ManifestData {
        &mut self.data
    }

    /// Write-new-then-rename persistence.
    ///
    /// The temp file is fsynced before the rename so the swapped-in
    /// manifest is complete on disk, and the parent directory is fsynced
    /// after so the rename itself survives a crash.
    pub fn persist(&self) -> Result<()> {
        let bytes = bincode::serialize(&self.data)
            .map_err(|e| EngineError::Serialization(format!("manifest encode failed: {}", e)))?;

        let tmp_path = self.path.with_extension(TMP_SUFFIX.trim_start_matches('.'));

        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}
