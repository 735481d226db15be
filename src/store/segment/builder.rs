//! Segment Builder
//!
//! Writes sorted entries to a new immutable segment file. Pure sequential
//! write: data block, then sparse index, then footer, then one seek back to
//! patch the header entry count.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::entry::Entry;
use crate::error::{EngineError, Result};

use super::{HEADER_SIZE, MAGIC, VERSION};

/// Everything the store needs to know about a freshly built segment file
#[derive(Debug, Clone)]
pub struct SegmentFileInfo {
    pub path: PathBuf,
    pub entry_count: u64,
    pub file_size: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub min_seq: u64,
    pub max_seq: u64,
}

/// Builder for creating new segment files from sorted entries
pub struct SegmentBuilder {
    path: PathBuf,
    writer: BufWriter<File>,

    /// One index sample per this many entries
    sparse_interval: usize,

    entry_count: u64,
    current_offset: u64,

    /// Sparse index: sampled key → data block offset
    index: Vec<(Vec<u8>, u64)>,

    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    min_seq: u64,
    max_seq: u64,

    /// Running CRC over the data block
    data_hasher: crc32fast::Hasher,

    /// Reused encode buffer
    scratch: BytesMut,
}

impl SegmentBuilder {
    /// Create a new segment builder.
    ///
    /// Writes the header immediately; call `add()` in ascending key order,
    /// then `finish()` to write the index and footer.
    pub fn new(path: &Path, sparse_interval: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Header: entry_count is a placeholder, patched in finish()
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&[0u8; 2])?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            sparse_interval: sparse_interval.max(1),
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            min_key: None,
            max_key: None,
            min_seq: u64::MAX,
            max_seq: 0,
            data_hasher: crc32fast::Hasher::new(),
            scratch: BytesMut::new(),
        })
    }

    /// Add an entry (must be called in ascending key order)
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        if let Some(max) = &self.max_key {
            if entry.key.as_slice() <= max.as_slice() {
                return Err(EngineError::Corruption(format!(
                    "segment entries out of order: {:?} after {:?}",
                    entry.key, max
                )));
            }
        }

        // Sample the sparse index; the first entry is always sampled so
        // every key falls inside some index interval
        if self.entry_count as usize % self.sparse_interval == 0 {
            self.index.push((entry.key.clone(), self.current_offset));
        }

        if self.min_key.is_none() {
            self.min_key = Some(entry.key.clone());
        }
        self.max_key = Some(entry.key.clone());
        self.min_seq = self.min_seq.min(entry.sequence);
        self.max_seq = self.max_seq.max(entry.sequence);

        self.scratch.clear();
        entry.encode(&mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.data_hasher.update(&self.scratch);
        self.current_offset += self.scratch.len() as u64;
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: write index block and footer, patch the header,
    /// sync, and return the file metadata
    pub fn finish(mut self) -> Result<SegmentFileInfo> {
        if self.entry_count == 0 {
            return Err(EngineError::Corruption(
                "refusing to build an empty segment".to_string(),
            ));
        }

        let index_offset = self.current_offset;

        // Index block: [key_len(4)][offset(8)][key] per sample
        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        let data_crc = self.data_hasher.finalize();

        // Footer
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&self.entry_count.to_le_bytes())?;
        self.writer.write_all(&self.min_seq.to_le_bytes())?;
        self.writer.write_all(&self.max_seq.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;

        self.writer.flush()?;

        // Patch entry count in the header, then make the file durable
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| EngineError::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(8))?; // after magic + version + pad
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SegmentFileInfo {
            path: self.path,
            entry_count: self.entry_count,
            file_size,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            min_seq: self.min_seq,
            max_seq: self.max_seq,
        })
    }
}
