//! Segment Reader
//!
//! Opens segment files, validates the footer checksum, and serves point
//! lookups through the in-memory sparse index. Lookups take `&self`: the
//! file handle lives behind a mutex so any number of snapshot holders can
//! share one reader.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::entry::Entry;
use crate::error::{EngineError, Result};

use super::iterator::read_entry;
use super::{SegmentIterator, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for immutable segment files
#[derive(Debug)]
pub struct SegmentReader {
    path: PathBuf,

    /// Shared lookup handle; iterators open their own
    file: Mutex<BufReader<File>>,

    /// Sparse index: sampled key → data block offset, ascending
    index: Vec<(Vec<u8>, u64)>,

    /// Start of the index block == end of the data block
    index_offset: u64,

    entry_count: u64,
    min_seq: u64,
    max_seq: u64,
}

impl SegmentReader {
    /// Open a segment, validating header, footer, and data checksum.
    ///
    /// A checksum mismatch means the segment is corrupt; the caller
    /// (recovery) decides whether that is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(EngineError::Corruption(format!(
                "segment {} too short: {} bytes",
                path.display(),
                file_size
            )));
        }

        // Header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(EngineError::Corruption(format!(
                "segment {}: bad magic {:?}",
                path.display(),
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes(header[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(EngineError::Corruption(format!(
                "segment {}: unsupported version {}",
                path.display(),
                version
            )));
        }
        let header_count = u64::from_le_bytes(header[8..16].try_into().unwrap());

        // Footer
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = u64::from_le_bytes(footer[0..8].try_into().unwrap());
        let entry_count = u64::from_le_bytes(footer[8..16].try_into().unwrap());
        let min_seq = u64::from_le_bytes(footer[16..24].try_into().unwrap());
        let max_seq = u64::from_le_bytes(footer[24..32].try_into().unwrap());
        let expected_crc = u32::from_le_bytes(footer[32..36].try_into().unwrap());

        if header_count != entry_count {
            return Err(EngineError::Corruption(format!(
                "segment {}: header count {} != footer count {}",
                path.display(),
                header_count,
                entry_count
            )));
        }
        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(EngineError::Corruption(format!(
                "segment {}: index offset {} out of bounds",
                path.display(),
                index_offset
            )));
        }

        // Validate the data block checksum with one sequential pass
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = [0u8; 64 * 1024];
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..want])?;
            hasher.update(&chunk[..want]);
            remaining -= want as u64;
        }
        if hasher.finalize() != expected_crc {
            return Err(EngineError::Corruption(format!(
                "segment {}: data checksum mismatch",
                path.display()
            )));
        }

        // Load the sparse index
        let index_block_size = (file_size - FOOTER_SIZE - index_offset) as usize;
        let mut index_data = vec![0u8; index_block_size];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;

        let mut index = Vec::new();
        let mut pos = 0;
        while pos + 12 <= index_data.len() {
            let key_len =
                u32::from_le_bytes(index_data[pos..pos + 4].try_into().unwrap()) as usize;
            let offset = u64::from_le_bytes(index_data[pos + 4..pos + 12].try_into().unwrap());
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(EngineError::Corruption(format!(
                    "segment {}: truncated index entry",
                    path.display()
                )));
            }
            index.push((index_data[pos..pos + key_len].to_vec(), offset));
            pos += key_len;
        }
        if pos != index_data.len() {
            return Err(EngineError::Corruption(format!(
                "segment {}: trailing bytes in index block",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(File::open(path)?)),
            index,
            index_offset,
            entry_count,
            min_seq,
            max_seq,
        })
    }

    /// Point lookup.
    ///
    /// Returns:
    /// - `Ok(Some(entry))` — key present (entry may be a tombstone)
    /// - `Ok(None)` — key not in this segment
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        // Greatest sampled key <= target; the first entry is always
        // sampled, so a miss here means the key sorts before everything
        let slot = match self.index.partition_point(|(k, _)| k.as_slice() <= key) {
            0 => return Ok(None),
            n => n - 1,
        };
        let start_offset = self.index[slot].1;

        // Scan one index interval; keys are sorted so we can stop early
        let end_offset = self
            .index
            .get(slot + 1)
            .map(|(_, off)| *off)
            .unwrap_or(self.index_offset);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start_offset))?;

        let mut offset = start_offset;
        while offset < end_offset {
            let (entry, consumed) = read_entry(&mut *file)?;
            offset += consumed;

            match entry.key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(entry)),
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => continue,
            }
        }

        Ok(None)
    }

    /// Iterate all entries (opens a dedicated file handle)
    pub fn iter(&self) -> Result<SegmentIterator> {
        SegmentIterator::new(&self.path, HEADER_SIZE, self.index_offset)
    }

    /// Iterate entries starting from the sparse-index interval containing
    /// `start_key` (entries before `start_key` within that interval may
    /// still be yielded; callers filter)
    pub fn iter_from(&self, start_key: &[u8]) -> Result<SegmentIterator> {
        let start_offset = match self
            .index
            .partition_point(|(k, _)| k.as_slice() <= start_key)
        {
            0 => HEADER_SIZE,
            n => self.index[n - 1].1,
        };
        SegmentIterator::new(&self.path, start_offset, self.index_offset)
    }

    /// Number of entries in this segment
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Smallest sequence number present
    pub fn min_seq(&self) -> u64 {
        self.min_seq
    }

    /// Largest sequence number present
    pub fn max_seq(&self) -> u64 {
        self.max_seq
    }

    /// Path to the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
