//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route writes through the serialized batcher/WAL path
//! - Serve reads from a buffer + manifest snapshot, never blocking on
//!   writers or compaction
//! - Run crash recovery on open; shut the background threads down cleanly
//!   on close
//!
//! ## Concurrency Model
//! - **Writes** (put/delete/flush): any number of callers, serialized into
//!   one append order by the bounded write queue; each caller suspends
//!   until its batch's durability barrier completes
//! - **Reads** (get/scan): never block on writers; they operate against
//!   the write buffer and a copy-on-write segment snapshot
//! - **Compaction**: one background task, fed by channel notifications;
//!   installs output only via the atomic manifest swap

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;

use crate::batch::{await_reply, Batcher, WriteRequest, WriteStats};
use crate::buffer::WriteBuffer;
use crate::compaction::{CompactionEvent, CompactionScheduler, CompactionStats};
use crate::config::Config;
use crate::entry::{Entry, ENTRY_HEADER_SIZE};
use crate::error::{EngineError, Result};
use crate::merge::{EntrySource, MergeIterator};
use crate::recovery::{RecoveryManager, RecoveryReport, WAL_DIR};
use crate::store::{SegmentSnapshot, SegmentStore};
use crate::wal::{WalWriter, MAX_RECORD_LEN, RECORD_HEADER_SIZE};

/// Engine lifecycle states
const STATE_READY: u8 = 0;
const STATE_CLOSED: u8 = 1;

/// The main storage engine
#[derive(Debug)]
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// In-memory buffer of recent writes (shared with the batcher)
    buffer: Arc<WriteBuffer>,

    /// Immutable segments + manifest (shared with the compactor)
    store: Arc<SegmentStore>,

    /// Bounded queue into the batcher thread
    write_tx: Sender<WriteRequest>,

    /// Mailbox of the compaction scheduler
    compaction_tx: Sender<CompactionEvent>,

    /// Cooperative cancellation for in-flight compaction
    cancel: Arc<AtomicBool>,

    /// Ready/Closed flag guarding every operation
    state: AtomicU8,

    /// Write-path counters
    write_stats: Arc<WriteStats>,

    /// Compaction counters
    compaction_stats: Arc<CompactionStats>,

    /// Background thread handles, taken by close()
    threads: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,

    /// Summary of the recovery run that produced this instance
    recovery_report: RecoveryReport,
}

impl Engine {
    /// Open or create an engine with the given config.
    ///
    /// Runs recovery to completion before returning: the manifest is
    /// validated, the WAL replayed, and both background threads started.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        // Recovery: manifest + segment validation + WAL replay
        let recovered = RecoveryManager::run(&config)?;
        let store = recovered.store;

        let buffer = Arc::new(WriteBuffer::new());
        if !recovered.buffer_entries.is_empty() {
            buffer.apply(recovered.buffer_entries);
        }

        let write_stats = Arc::new(WriteStats::default());
        let compaction_stats = Arc::new(CompactionStats::default());
        let cancel = Arc::new(AtomicBool::new(false));

        let wal = WalWriter::open(
            &config.data_dir.join(WAL_DIR),
            recovered.report.next_wal_id,
            config.durability_mode,
            write_stats.wal_syncs.clone(),
        )?;

        let (write_tx, write_rx) = bounded(config.write_queue_capacity);
        let (compaction_tx, compaction_rx) = bounded(16);

        let batcher = Batcher::new(
            config.clone(),
            wal,
            buffer.clone(),
            store.clone(),
            write_rx,
            compaction_tx.clone(),
            write_stats.clone(),
            recovered.report.next_sequence,
        );
        let batcher_handle = std::thread::Builder::new()
            .name("ledgerkv-batcher".to_string())
            .spawn(move || batcher.run())?;

        let scheduler = CompactionScheduler::new(
            config.clone(),
            store.clone(),
            compaction_rx,
            cancel.clone(),
            compaction_stats.clone(),
        );
        let compactor_handle = std::thread::Builder::new()
            .name("ledgerkv-compactor".to_string())
            .spawn(move || scheduler.run())?;

        Ok(Self {
            config,
            buffer,
            store,
            write_tx,
            compaction_tx,
            cancel,
            state: AtomicU8::new(STATE_READY),
            write_stats,
            compaction_stats,
            threads: Mutex::new(Some((batcher_handle, compactor_handle))),
            recovery_report: recovered.report,
        })
    }

    /// Open with default config rooted at `path`
    pub fn open_path(path: &std::path::Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Put a key-value pair. Returns the assigned sequence number once the
    /// write is durable per the configured durability mode.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        self.write(key, Some(value.to_vec()))
    }

    /// Delete a key (writes a tombstone). Returns the assigned sequence
    /// number once the tombstone is durable.
    pub fn delete(&self, key: &[u8]) -> Result<u64> {
        self.write(key, None)
    }

    fn write(&self, key: &[u8], value: Option<Vec<u8>>) -> Result<u64> {
        self.ensure_ready()?;
        if key.is_empty() {
            return Err(EngineError::Config("key must be non-empty".to_string()));
        }

        // Anything larger would be unreadable on replay: the WAL reader
        // treats a record length above MAX_RECORD_LEN as a corrupt tail
        let record_len = RECORD_HEADER_SIZE
            + ENTRY_HEADER_SIZE
            + key.len()
            + value.as_ref().map_or(0, |v| v.len());
        if record_len > MAX_RECORD_LEN as usize {
            return Err(EngineError::Capacity(format!(
                "write of {} bytes exceeds the {} byte record limit",
                record_len, MAX_RECORD_LEN
            )));
        }

        let (reply_tx, reply_rx) = bounded(1);
        let request = WriteRequest::Write {
            key: key.to_vec(),
            value,
            reply: reply_tx,
        };

        match self.write_tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(EngineError::Capacity(format!(
                    "write queue at capacity ({})",
                    self.config.write_queue_capacity
                )));
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(EngineError::NotReady("write path is down".to_string()));
            }
        }

        await_reply(reply_rx)
    }

    /// Get a value by key.
    ///
    /// Search order: write buffer (most recent data), then segments newest
    /// to oldest against one consistent snapshot. A tombstone anywhere in
    /// that order means "not found".
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_ready()?;

        if let Some(entry) = self.buffer.get(key) {
            return Ok(entry.value);
        }

        let snapshot = self.store.snapshot();
        for handle in snapshot.iter() {
            if !handle.meta.covers(key) {
                continue;
            }
            if let Some(entry) = handle.reader.get(key)? {
                return Ok(entry.value);
            }
        }

        Ok(None)
    }

    /// Iterate live key-value pairs in `[start, end]` (inclusive), in
    /// ascending key order.
    ///
    /// The iterator runs against the buffer contents and manifest snapshot
    /// taken here; writes and compactions that land later are not
    /// observed.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Scan> {
        self.ensure_ready()?;

        if start > end {
            return Ok(Scan {
                inner: MergeIterator::new(Vec::new())?,
                start: start.to_vec(),
                end: end.to_vec(),
                done: true,
                _snapshot: self.store.snapshot(),
            });
        }

        // Buffer before store, same as get(): a flush landing between the
        // two reads then shows its batch in both sources (the merge
        // de-duplicates) instead of neither
        let buffered = self.buffer.snapshot_range(start, end);
        let snapshot = self.store.snapshot();

        let mut sources: Vec<EntrySource> = Vec::new();
        sources.push(Box::new(buffered.into_iter().map(Ok)));

        for handle in snapshot.iter() {
            if handle.meta.overlaps(start, end) {
                sources.push(Box::new(handle.reader.iter_from(start)?));
            }
        }

        Ok(Scan {
            inner: MergeIterator::new(sources)?,
            start: start.to_vec(),
            end: end.to_vec(),
            done: false,
            _snapshot: snapshot,
        })
    }

    /// Force a write buffer → segment flush (committing any pending batch
    /// first)
    pub fn flush(&self) -> Result<()> {
        self.ensure_ready()?;

        let (reply_tx, reply_rx) = bounded(1);
        self.write_tx
            .send(WriteRequest::Flush { reply: reply_tx })
            .map_err(|_| EngineError::NotReady("write path is down".to_string()))?;
        await_reply(reply_rx)
    }

    /// Run compaction passes until the strategy finds nothing left to
    /// merge (maintenance/test hook; the scheduler also runs on its own)
    pub fn compact(&self) -> Result<()> {
        self.ensure_ready()?;

        let (reply_tx, reply_rx) = bounded(1);
        self.compaction_tx
            .send(CompactionEvent::Force(reply_tx))
            .map_err(|_| EngineError::NotReady("compaction scheduler is down".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::NotReady("compaction scheduler is down".to_string()))?
            .map(|_| ())
    }

    /// Close the engine gracefully: commit pending writes, flush the
    /// buffer, sync the WAL, and stop both background threads.
    ///
    /// Idempotent; operations after close return NotReady.
    pub fn close(&self) -> Result<()> {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
            return Ok(());
        }

        let threads = self.threads.lock().take();
        let (batcher_handle, compactor_handle) = match threads {
            Some(handles) => handles,
            None => return Ok(()),
        };

        // Drain the write path first so the final flush captures
        // everything acknowledged so far
        let mut result = Ok(());
        let (reply_tx, reply_rx) = bounded(1);
        if self
            .write_tx
            .send(WriteRequest::Shutdown { reply: reply_tx })
            .is_ok()
        {
            result = await_reply(reply_rx);
        }

        // Then stop compaction, cancelling any in-flight merge between
        // steps
        self.cancel.store(true, Ordering::Release);
        let (reply_tx, reply_rx) = bounded(1);
        if self
            .compaction_tx
            .send(CompactionEvent::Shutdown(reply_tx))
            .is_ok()
        {
            let _ = reply_rx.recv();
        }

        if batcher_handle.join().is_err() {
            tracing::error!("batcher thread panicked during close");
        }
        if compactor_handle.join().is_err() {
            tracing::error!("compactor thread panicked during close");
        }

        result
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_READY => Ok(()),
            _ => Err(EngineError::NotReady("engine is closed".to_string())),
        }
    }

    // =========================================================================
    // Accessors (for testing, inspection, and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &std::path::Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Summary of the recovery run that opened this instance
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery_report
    }

    /// Number of live segments
    pub fn segment_count(&self) -> usize {
        self.store.segment_count()
    }

    /// Approximate write buffer size in bytes
    pub fn buffer_size(&self) -> usize {
        self.buffer.size()
    }

    /// Number of distinct keys in the write buffer
    pub fn buffer_entry_count(&self) -> usize {
        self.buffer.entry_count()
    }

    /// WAL durability barriers performed so far
    pub fn wal_sync_count(&self) -> u64 {
        self.write_stats
            .wal_syncs
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Batches committed through the WAL
    pub fn batches_committed(&self) -> u64 {
        self.write_stats
            .batches_committed
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Compaction merges completed
    pub fn compaction_count(&self) -> u64 {
        self.compaction_stats
            .compactions
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Highest sequence number durably captured in a segment
    pub fn last_flushed_sequence(&self) -> u64 {
        self.store.last_flushed_sequence()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best-effort graceful shutdown; errors already went to the log
        let _ = self.close();
    }
}

/// Range scan iterator: merged view over the write buffer and all
/// overlapping segments, highest sequence wins, tombstones filtered
#[derive(Debug)]
pub struct Scan {
    inner: MergeIterator,
    start: Vec<u8>,
    end: Vec<u8>,
    done: bool,

    /// Keeps retired segment files alive until the scan finishes
    _snapshot: SegmentSnapshot,
}

impl Iterator for Scan {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let entry: Entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            // iter_from starts at a sparse index boundary, which may sit
            // before the requested range
            if entry.key.as_slice() < self.start.as_slice() {
                continue;
            }
            if entry.key.as_slice() > self.end.as_slice() {
                self.done = true;
                return None;
            }
            match entry.value {
                Some(value) => return Some(Ok((entry.key, value))),
                None => continue, // tombstone
            }
        }
    }
}
