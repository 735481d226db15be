//! Write-Ahead Log (WAL) Module
//!
//! Provides durability through append-only logging: every accepted write is
//! recorded here, as part of a group-committed batch, before it is
//! acknowledged to the caller.
//!
//! ## Responsibilities
//! - Append entry batches sequentially, never seeking backward
//! - Durability barrier (fsync) per the configured durability mode
//! - CRC32 checksums for corruption detection on replay
//! - Rotation: a new file is started only after a write buffer flush, so
//!   recovery never needs a WAL file whose data isn't otherwise necessary
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Entry bytes     │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```
//! CRC covers the entry bytes. A record with a bad length, bad CRC, or a
//! truncated body is treated as the tail of an incomplete write: replay
//! stops there and discards the rest of the file.

mod reader;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use reader::{WalReadOutcome, WalReader};
pub use writer::WalWriter;

/// Per-record framing overhead: length (4) + crc (4)
pub const RECORD_HEADER_SIZE: usize = 8;

/// Sanity bound on a single record body; anything larger is corruption
pub const MAX_RECORD_LEN: u32 = 256 * 1024 * 1024;

/// File name for a WAL file with the given id
pub fn wal_file_name(id: u64) -> String {
    format!("wal_{:010}.log", id)
}

/// Parse a WAL id from a file path
/// "wal_0000000042.log" → Some(42)
pub fn parse_wal_id(path: &Path) -> Option<u64> {
    let name = path.file_stem()?.to_string_lossy();
    let id_str = name.strip_prefix("wal_")?;
    id_str.parse().ok()
}

/// Discover WAL files in a directory, sorted by id ascending
pub fn list_wal_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();

    if !dir.exists() {
        return Ok(files);
    }

    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let path = dirent.path();
        if path.is_file() {
            if let Some(id) = parse_wal_id(&path) {
                files.push((id, path));
            }
        }
    }

    files.sort_by_key(|(id, _)| *id);
    Ok(files)
}
