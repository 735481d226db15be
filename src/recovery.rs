//! Recovery Manager
//!
//! On startup, restores a consistent engine state: load the manifest,
//! validate every referenced segment's checksum, then replay WAL records
//! newer than the durable flush checkpoint to rebuild the write buffer.
//!
//! ## State Machine
//! ```text
//! Start ──manifest read──▶ ManifestLoaded ──WAL replayed──▶ BufferRestored
//!                │                                               │
//!                └──────────▶ Failed ◀── segment checksum ───────┘
//!                                          mismatch              ▼
//!                                                              Ready
//! ```
//! A WAL record with a failed checksum or a truncated trailing record is
//! the expected crash boundary: it is discarded with a warning and
//! recovery proceeds. A corrupt segment that the manifest still references
//! has no other copy — that is Failed, and the operator must restore from
//! backup.

use std::sync::Arc;

use crate::config::Config;
use crate::entry::Entry;
use crate::error::Result;
use crate::store::SegmentStore;
use crate::wal::{self, WalReadOutcome, WalReader};

/// Subdirectory holding WAL files
pub const WAL_DIR: &str = "wal";

/// Recovery progress states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Start,
    ManifestLoaded,
    BufferRestored,
    Ready,
    Failed,
}

/// Outcome summary of a recovery run
#[derive(Debug)]
pub struct RecoveryReport {
    /// Terminal state (Ready unless recovery returned an error)
    pub state: RecoveryState,

    /// WAL records replayed into the write buffer
    pub records_replayed: u64,

    /// WAL records skipped because a segment already holds them
    pub records_skipped: u64,

    /// WAL files whose tail was truncated or corrupt
    pub tails_discarded: u64,

    /// Number of segments whose checksums were validated
    pub segments_validated: usize,

    /// First sequence number the engine may assign
    pub next_sequence: u64,

    /// WAL file id the engine should append to next
    pub next_wal_id: u64,
}

/// Everything `Engine::open` needs from a completed recovery
pub struct Recovered {
    pub store: Arc<SegmentStore>,
    pub buffer_entries: Vec<Entry>,
    pub report: RecoveryReport,
}

/// Runs the startup state machine
pub struct RecoveryManager;

impl RecoveryManager {
    /// Recover engine state from the data directory.
    ///
    /// Errors out (state Failed) only on unrecoverable corruption: a
    /// manifest-referenced segment whose checksum does not match.
    pub fn run(config: &Config) -> Result<Recovered> {
        let mut state = RecoveryState::Start;
        tracing::debug!(?state, "recovery starting");

        // Opening the store loads the manifest (absent = empty engine) and
        // validates every referenced segment's footer checksum
        let store = match SegmentStore::open(&config.data_dir, config.sparse_index_interval) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                state = RecoveryState::Failed;
                tracing::error!(?state, error = %e, "recovery failed");
                return Err(e);
            }
        };
        state = RecoveryState::ManifestLoaded;
        let segments_validated = store.segment_count();
        let last_flushed = store.last_flushed_sequence();
        tracing::debug!(
            ?state,
            segments = segments_validated,
            last_flushed_sequence = last_flushed,
            "manifest loaded, segments validated"
        );

        // Replay WAL files in id order, trusting only fully-checksummed
        // records newer than the flush checkpoint
        let wal_dir = config.data_dir.join(WAL_DIR);
        let wal_files = wal::list_wal_files(&wal_dir)?;

        let mut buffer_entries: Vec<Entry> = Vec::new();
        let mut records_replayed = 0u64;
        let mut records_skipped = 0u64;
        let mut tails_discarded = 0u64;
        let mut max_sequence = last_flushed;
        let mut next_wal_id = 1u64;

        for (wal_id, path) in &wal_files {
            next_wal_id = wal_id + 1;

            let mut reader = WalReader::open(path)?;
            while let Some(entry) = reader.next_entry()? {
                max_sequence = max_sequence.max(entry.sequence);
                if entry.sequence > last_flushed {
                    records_replayed += 1;
                    buffer_entries.push(entry);
                } else {
                    records_skipped += 1;
                }
            }

            match reader.outcome() {
                Some(WalReadOutcome::EndOfFile) | None => {}
                Some(outcome) => {
                    tails_discarded += 1;
                    tracing::warn!(
                        wal_id = *wal_id,
                        ?outcome,
                        records_read = reader.records_read(),
                        "discarded WAL tail at the crash boundary"
                    );
                    // Anything in later files was written after the torn
                    // record; don't replay past the durability boundary
                    break;
                }
            }
        }

        state = RecoveryState::BufferRestored;
        tracing::debug!(?state, records_replayed, records_skipped, "WAL replayed");

        state = RecoveryState::Ready;
        let report = RecoveryReport {
            state,
            records_replayed,
            records_skipped,
            tails_discarded,
            segments_validated,
            next_sequence: max_sequence + 1,
            next_wal_id,
        };

        if records_replayed > 0 || tails_discarded > 0 {
            tracing::info!(
                records_replayed,
                tails_discarded,
                next_sequence = report.next_sequence,
                "recovery complete"
            );
        }

        Ok(Recovered {
            store,
            buffer_entries,
            report,
        })
    }
}
