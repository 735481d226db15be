//! WAL Writer
//!
//! Appends entry batches to the current WAL file and applies the durability
//! barrier. Purely sequential: never seeks backward, never rewrites bytes.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;

use crate::config::DurabilityMode;
use crate::entry::Entry;
use crate::error::Result;

use super::wal_file_name;

/// Appends batches of entries to the write-ahead log
pub struct WalWriter {
    /// Directory holding all WAL files
    dir: PathBuf,

    /// Current WAL file (opened append-only)
    file: File,

    /// Id of the current WAL file
    wal_id: u64,

    /// Bytes written to the current file
    offset: u64,

    /// Durability barrier policy
    durability: DurabilityMode,

    /// When the last barrier completed (drives SyncInterval)
    last_sync: Instant,

    /// Total barriers performed (shared with the engine for introspection)
    sync_count: Arc<AtomicU64>,

    /// Reused encode buffer
    scratch: BytesMut,
}

impl WalWriter {
    /// Open (or create) the WAL file with the given id
    pub fn open(
        dir: &Path,
        wal_id: u64,
        durability: DurabilityMode,
        sync_count: Arc<AtomicU64>,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(wal_file_name(wal_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            wal_id,
            offset,
            durability,
            last_sync: Instant::now(),
            sync_count,
            scratch: BytesMut::new(),
        })
    }

    /// Append a batch of entries, then apply the durability barrier.
    ///
    /// Returns the file offset at which the batch starts. If the barrier
    /// fails the batch is NOT durable and the caller must not acknowledge
    /// the writes it contains.
    pub fn append_batch(&mut self, entries: &[Entry]) -> Result<u64> {
        let batch_offset = self.offset;

        self.scratch.clear();
        for entry in entries {
            let header_at = self.scratch.len();
            // Placeholder header, patched once the body is encoded
            self.scratch.extend_from_slice(&[0u8; 8]);
            let body_at = self.scratch.len();
            entry.encode(&mut self.scratch);

            let body_len = (self.scratch.len() - body_at) as u32;
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&self.scratch[body_at..]);
            let crc = hasher.finalize();

            self.scratch[header_at..header_at + 4].copy_from_slice(&body_len.to_le_bytes());
            self.scratch[header_at + 4..header_at + 8].copy_from_slice(&crc.to_le_bytes());
        }

        self.file.write_all(&self.scratch)?;
        self.offset += self.scratch.len() as u64;

        self.barrier()?;

        Ok(batch_offset)
    }

    /// Durability barrier per the configured mode
    fn barrier(&mut self) -> Result<()> {
        match self.durability {
            DurabilityMode::SyncEveryBatch => self.sync()?,
            DurabilityMode::SyncInterval { interval } => {
                if self.last_sync.elapsed() >= interval {
                    self.sync()?;
                }
            }
            DurabilityMode::NoSync => {}
        }
        Ok(())
    }

    /// Force a flush to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.last_sync = Instant::now();
        self.sync_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Rotate to a fresh WAL file and unlink all older ones.
    ///
    /// Called only after the corresponding write buffer flush has been
    /// registered in the manifest: every record in the retired files is
    /// already durable in a segment.
    pub fn rotate(&mut self) -> Result<()> {
        self.sync()?;

        let retired_id = self.wal_id;
        let next_id = retired_id + 1;
        let path = self.dir.join(wal_file_name(next_id));
        self.file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.wal_id = next_id;
        self.offset = 0;

        for (id, old_path) in super::list_wal_files(&self.dir)? {
            if id <= retired_id {
                if let Err(e) = std::fs::remove_file(&old_path) {
                    tracing::warn!(wal_id = id, error = %e, "failed to unlink retired WAL file");
                }
            }
        }

        Ok(())
    }

    /// Id of the current WAL file
    pub fn wal_id(&self) -> u64 {
        self.wal_id
    }

    /// Bytes written to the current WAL file
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
