//! WAL Reader
//!
//! Sequential replay of a WAL file with checksum validation. A record that
//! fails its length check, its CRC, or is cut short is treated as the tail
//! of an incomplete write: iteration stops and the remainder of the file is
//! discarded. That boundary is the expected crash point, not an error.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::entry::Entry;
use crate::error::{EngineError, Result};

use super::MAX_RECORD_LEN;

/// Why replay of a file stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalReadOutcome {
    /// Clean end of file
    EndOfFile,

    /// A truncated record was found at the tail and discarded
    TruncatedTail,

    /// A record failed its CRC check; it and everything after it discarded
    CorruptTail,
}

/// Reads entries back out of a single WAL file
pub struct WalReader {
    file: BufReader<File>,

    /// Set once iteration has stopped
    outcome: Option<WalReadOutcome>,

    /// Records successfully read so far
    records_read: u64,
}

impl WalReader {
    /// Open a WAL file for replay
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            outcome: None,
            records_read: 0,
        })
    }

    /// Read the next valid entry, or None once the file is exhausted.
    ///
    /// After None is returned, `outcome()` says whether the file ended
    /// cleanly or a corrupt/truncated tail was discarded.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.outcome.is_some() {
            return Ok(None);
        }

        // Record length: clean EOF is the normal stop
        let mut len_buf = [0u8; 4];
        match read_exact_or_eof(&mut self.file, &mut len_buf)? {
            ReadStatus::Eof => {
                self.outcome = Some(WalReadOutcome::EndOfFile);
                return Ok(None);
            }
            ReadStatus::Partial => {
                self.outcome = Some(WalReadOutcome::TruncatedTail);
                return Ok(None);
            }
            ReadStatus::Full => {}
        }

        let len = u32::from_le_bytes(len_buf);
        if len == 0 || len > MAX_RECORD_LEN {
            self.outcome = Some(WalReadOutcome::CorruptTail);
            return Ok(None);
        }

        let mut crc_buf = [0u8; 4];
        if read_exact_or_eof(&mut self.file, &mut crc_buf)? != ReadStatus::Full {
            self.outcome = Some(WalReadOutcome::TruncatedTail);
            return Ok(None);
        }
        let expected_crc = u32::from_le_bytes(crc_buf);

        let mut body = vec![0u8; len as usize];
        if read_exact_or_eof(&mut self.file, &mut body)? != ReadStatus::Full {
            self.outcome = Some(WalReadOutcome::TruncatedTail);
            return Ok(None);
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        if hasher.finalize() != expected_crc {
            self.outcome = Some(WalReadOutcome::CorruptTail);
            return Ok(None);
        }

        let mut cursor = &body[..];
        let entry = Entry::decode(&mut cursor).map_err(|e| {
            // A checksummed record that fails to decode is real corruption,
            // not a crash tail
            EngineError::Corruption(format!("WAL record decode failed: {}", e))
        })?;

        self.records_read += 1;
        Ok(Some(entry))
    }

    /// How iteration ended, if it has
    pub fn outcome(&self) -> Option<WalReadOutcome> {
        self.outcome
    }

    /// Records successfully read
    pub fn records_read(&self) -> u64 {
        self.records_read
    }
}

#[derive(PartialEq, Eq)]
enum ReadStatus {
    Full,
    Partial,
    Eof,
}

/// read_exact that distinguishes clean EOF from a mid-record cut
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<ReadStatus> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadStatus::Eof
                } else {
                    ReadStatus::Partial
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ReadStatus::Full)
}
