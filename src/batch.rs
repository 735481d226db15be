//! Write queue and group-commit batcher
//!
//! All writers are serialized into a single append order through a bounded
//! queue draining into one batcher thread. The thread owns the WAL writer
//! and the sequence counter, and commits pending writes as a group when
//! either the accumulated bytes reach `batch_flush_bytes` or
//! `batch_flush_interval` has elapsed since the first pending request —
//! whichever comes first. Size-only batching has unbounded worst-case
//! latency under low load; time-only batching under-batches under high
//! load; the hybrid bounds both.
//!
//! A caller's `put`/`delete` suspends until the WAL durability barrier for
//! its batch completes. A full queue is backpressure (`Capacity`), never a
//! silent drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use crate::buffer::WriteBuffer;
use crate::compaction::CompactionEvent;
use crate::config::Config;
use crate::entry::{now_millis, Entry};
use crate::error::{EngineError, Result};
use crate::store::SegmentStore;
use crate::wal::WalWriter;

/// Counters maintained by the batcher, shared with the engine facade
#[derive(Debug, Default)]
pub struct WriteStats {
    /// WAL durability barriers performed (owned by the WAL writer)
    pub wal_syncs: Arc<AtomicU64>,

    /// Batches committed through the WAL
    pub batches_committed: AtomicU64,

    /// Write buffer flushes materialized as segments
    pub segment_flushes: AtomicU64,
}

/// Requests accepted by the batcher thread
pub enum WriteRequest {
    /// Apply one entry; `value: None` is a delete
    Write {
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        reply: Sender<Result<u64>>,
    },

    /// Commit pending writes and force a buffer → segment flush
    Flush { reply: Sender<Result<()>> },

    /// Commit, flush, sync, and exit the thread
    Shutdown { reply: Sender<Result<()>> },
}

/// One write waiting for its batch's durability barrier
struct PendingWrite {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    reply: Sender<Result<u64>>,
}

/// The single writer-path thread body
pub struct Batcher {
    config: Config,
    wal: WalWriter,
    buffer: Arc<WriteBuffer>,
    store: Arc<SegmentStore>,
    rx: Receiver<WriteRequest>,
    compaction_tx: Sender<CompactionEvent>,
    stats: Arc<WriteStats>,

    /// Next sequence number to assign; never reused, even for writes
    /// whose barrier failed
    next_sequence: u64,

    pending: Vec<PendingWrite>,
    pending_bytes: usize,
    deadline: Option<Instant>,
}

impl Batcher {
    pub fn new(
        config: Config,
        wal: WalWriter,
        buffer: Arc<WriteBuffer>,
        store: Arc<SegmentStore>,
        rx: Receiver<WriteRequest>,
        compaction_tx: Sender<CompactionEvent>,
        stats: Arc<WriteStats>,
        next_sequence: u64,
    ) -> Self {
        Self {
            config,
            wal,
            buffer,
            store,
            rx,
            compaction_tx,
            stats,
            next_sequence,
            pending: Vec::new(),
            pending_bytes: 0,
            deadline: None,
        }
    }

    /// Thread main loop; exits on Shutdown or when every sender is gone
    pub fn run(mut self) {
        loop {
            let request = match self.deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(wait) {
                        Ok(request) => Some(request),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => {
                            self.commit();
                            return;
                        }
                    }
                }
                None => match self.rx.recv() {
                    Ok(request) => Some(request),
                    Err(_) => return,
                },
            };

            match request {
                Some(WriteRequest::Write { key, value, reply }) => {
                    self.pending_bytes += key.len() + value.as_ref().map_or(0, |v| v.len());
                    self.pending.push(PendingWrite { key, value, reply });

                    if self.deadline.is_none() {
                        self.deadline = Some(Instant::now() + self.config.batch_flush_interval);
                    }
                    if self.pending_bytes >= self.config.batch_flush_bytes {
                        self.commit();
                    }
                }
                Some(WriteRequest::Flush { reply }) => {
                    self.commit();
                    let result = self.flush_to_segment();
                    let _ = reply.send(result);
                }
                Some(WriteRequest::Shutdown { reply }) => {
                    self.commit();
                    let mut result = self.flush_to_segment();
                    if result.is_ok() {
                        result = self.wal.sync();
                    }
                    let _ = reply.send(result);
                    return;
                }
                // Batch timer fired
                None => self.commit(),
            }
        }
    }

    /// Commit the pending batch: assign sequences, append to the WAL,
    /// apply the durability barrier, make the writes visible, and wake
    /// the waiters.
    fn commit(&mut self) {
        self.deadline = None;
        if self.pending.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;

        let timestamp = now_millis();
        let mut entries = Vec::with_capacity(pending.len());
        let mut replies = Vec::with_capacity(pending.len());
        for write in pending {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            entries.push(Entry {
                key: write.key,
                value: write.value,
                sequence,
                timestamp,
            });
            replies.push((sequence, write.reply));
        }

        match self.wal.append_batch(&entries) {
            Ok(_) => {
                self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);

                // Durable: now make the batch visible, then acknowledge
                self.buffer.apply(entries);
                for (sequence, reply) in replies {
                    let _ = reply.send(Ok(sequence));
                }
            }
            Err(e) => {
                // Not durable: nothing reaches the buffer, every caller
                // sees the failure and must treat its write as not-applied
                tracing::error!(error = %e, "WAL batch append failed");
                let msg = e.to_string();
                for (_, reply) in replies {
                    let _ = reply.send(Err(EngineError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        msg.clone(),
                    ))));
                }
                return;
            }
        }

        if self.buffer.size() >= self.config.segment_flush_bytes {
            if let Err(e) = self.flush_to_segment() {
                tracing::error!(error = %e, "write buffer flush failed; will retry on next batch");
            }
        }
    }

    /// Materialize the write buffer as a new level-0 segment.
    ///
    /// The buffer is cleared only after the segment is registered in the
    /// manifest, so no write is ever visible in neither the buffer nor a
    /// segment. The WAL rotates afterwards; its retired files cover only
    /// data that is now segment-durable.
    fn flush_to_segment(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let entries = self.buffer.snapshot_sorted();
        let last_flushed = self.next_sequence - 1;

        let meta = self.store.create_segment(&entries, 0)?;
        let segment_id = meta.id;
        let entry_count = meta.entry_count;
        self.store.install_flush(meta, last_flushed)?;

        self.buffer.clear();
        self.wal.rotate()?;
        self.stats.segment_flushes.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            segment_id,
            entry_count,
            last_flushed_sequence = last_flushed,
            "flushed write buffer to segment"
        );

        // Nudge the compaction scheduler; a full mailbox just means it
        // already has work queued
        let _ = self.compaction_tx.try_send(CompactionEvent::SegmentCreated);

        Ok(())
    }
}

/// Helper for callers: wait for the batcher's reply, mapping a vanished
/// batcher (engine closed mid-request) to NotReady
pub fn await_reply<T>(rx: Receiver<Result<T>>) -> Result<T> {
    match rx.recv() {
        Ok(result) => result,
        Err(_) => Err(EngineError::NotReady(
            "write path shut down before the request completed".to_string(),
        )),
    }
}
