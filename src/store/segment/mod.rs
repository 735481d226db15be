//! Segment Module
//!
//! Immutable, disk-resident, key-sorted run of entries produced by a write
//! buffer flush or by compaction. Never mutated after creation; unlinked
//! only after a replacement is in the manifest and the last reader snapshot
//! referencing it has been released.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                            │
//! │   Magic "LSEG" (4) | Version u16 (2) | Pad (2) | Count u64   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                        │
//! │   Entry records in ascending key order (entry codec layout)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Sparse Index Block (variable)                                │
//! │   [KeyLen u32][Offset u64][Key] — one sample per N entries   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Footer (40 bytes)                                            │
//! │   IndexOffset u64 | Count u64 | MinSeq u64 | MaxSeq u64 |    │
//! │   DataCRC u32 | Pad u32                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Point lookups binary-search the in-memory sparse index for the greatest
//! sampled key ≤ the target, then scan one index interval of the data
//! block. The CRC covers the data block and is validated when the segment
//! is opened.

mod builder;
mod iterator;
mod reader;

use std::path::{Path, PathBuf};

pub use builder::{SegmentBuilder, SegmentFileInfo};
pub use iterator::SegmentIterator;
pub use reader::SegmentReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a LedgerKV segment file
pub(crate) const MAGIC: &[u8; 4] = b"LSEG";

/// Current segment format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Pad (2) + EntryCount (8)
pub(crate) const HEADER_SIZE: u64 = 16;

/// Footer size: IndexOffset (8) + Count (8) + MinSeq (8) + MaxSeq (8) +
/// DataCRC (4) + Pad (4)
pub(crate) const FOOTER_SIZE: u64 = 40;

/// File name for a segment with the given id
pub fn segment_file_name(id: u64) -> String {
    format!("segment_{:06}.seg", id)
}

/// Full path for a segment file under `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(segment_file_name(id))
}

/// Parse a segment id from a file path
/// "segment_000042.seg" → Some(42)
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_stem()?.to_string_lossy();
    let id_str = name.strip_prefix("segment_")?;
    id_str.parse().ok()
}
