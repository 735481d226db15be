//! Segment Iterator
//!
//! Sequential iteration over a segment's data block in ascending key order.
//! Each iterator opens its own file handle so scans and compactions never
//! contend with point lookups on the shared reader handle.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::entry::{Entry, ENTRY_HEADER_SIZE, TOMBSTONE_LEN};
use crate::error::{EngineError, Result};

/// Iterator over segment entries in sorted key order
pub struct SegmentIterator {
    file: BufReader<File>,

    /// Stop when this offset is reached (start of the index block)
    end_offset: u64,

    /// Current position in the data block
    current_offset: u64,
}

impl SegmentIterator {
    /// Iterate the data block from `start_offset` up to `end_offset`
    pub(super) fn new(path: &Path, start_offset: u64, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(start_offset))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: start_offset,
        })
    }
}

impl Iterator for SegmentIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_offset >= self.end_offset {
            return None;
        }

        match read_entry(&mut self.file) {
            Ok((entry, consumed)) => {
                self.current_offset += consumed;
                Some(Ok(entry))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Decode one entry from a positioned reader, returning it and the number
/// of bytes consumed
pub(super) fn read_entry(reader: &mut impl Read) -> Result<(Entry, u64)> {
    let mut header = [0u8; ENTRY_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let key_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let val_len = u32::from_le_bytes(header[4..8].try_into().unwrap());
    let sequence = u64::from_le_bytes(header[8..16].try_into().unwrap());
    let timestamp = u64::from_le_bytes(header[16..24].try_into().unwrap());

    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;

    let mut consumed = (ENTRY_HEADER_SIZE + key_len) as u64;

    let value = if val_len == TOMBSTONE_LEN {
        None
    } else {
        let val_len = val_len as usize;
        let mut value = vec![0u8; val_len];
        reader.read_exact(&mut value)?;
        consumed += val_len as u64;
        Some(value)
    };

    if key_len == 0 {
        return Err(EngineError::Corruption(
            "segment entry with empty key".to_string(),
        ));
    }

    Ok((
        Entry {
            key,
            value,
            sequence,
            timestamp,
        },
        consumed,
    ))
}
