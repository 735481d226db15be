//! Compaction Scheduler Module
//!
//! Background merging of segments: removes superseded versions and expired
//! tombstones, and bounds read amplification. Exactly one compaction runs
//! at a time — the scheduler is a single thread fed by a message channel,
//! so there is no shared scheduling state to lock.
//!
//! ## Responsibilities
//! - React to "segment created" notifications from the write path, plus a
//!   periodic re-evaluation tick
//! - Plan merges per the configured strategy (size-tiered, leveled,
//!   time-window)
//! - Execute the shared k-way merge and install output atomically through
//!   the manifest swap; readers never observe a partial compaction
//! - Honor the tombstone grace period: a deletion marker is dropped only
//!   when it is old enough AND no segment outside the merge could still
//!   hold an older version of its key

mod strategy;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::{CompactionStrategy, Config};
use crate::entry::now_millis;
use crate::error::Result;
use crate::merge::{EntrySource, MergeIterator};
use crate::store::segment::{segment_path, SegmentBuilder};
use crate::store::{SegmentMeta, SegmentSnapshot, SegmentStore};

pub use strategy::{plan, CompactionJob};

/// Messages accepted by the scheduler thread
pub enum CompactionEvent {
    /// A flush produced a new segment; re-evaluate
    SegmentCreated,

    /// Run one full compaction pass now and report whether work was done
    Force(Sender<Result<bool>>),

    /// Exit the thread
    Shutdown(Sender<()>),
}

/// Counters shared with the engine facade
#[derive(Debug, Default)]
pub struct CompactionStats {
    /// Merges completed
    pub compactions: AtomicU64,

    /// Tombstones physically dropped
    pub tombstones_dropped: AtomicU64,
}

/// The background compaction thread body
pub struct CompactionScheduler {
    config: Config,
    store: Arc<SegmentStore>,
    rx: Receiver<CompactionEvent>,

    /// Coarse-grained cancellation, checked between merge steps
    cancel: Arc<AtomicBool>,

    stats: Arc<CompactionStats>,
}

impl CompactionScheduler {
    pub fn new(
        config: Config,
        store: Arc<SegmentStore>,
        rx: Receiver<CompactionEvent>,
        cancel: Arc<AtomicBool>,
        stats: Arc<CompactionStats>,
    ) -> Self {
        Self {
            config,
            store,
            rx,
            cancel,
            stats,
        }
    }

    /// Thread main loop
    pub fn run(self) {
        loop {
            match self.rx.recv_timeout(self.config.compaction_tick) {
                Ok(CompactionEvent::SegmentCreated) | Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = self.maybe_compact() {
                        tracing::error!(error = %e, "compaction pass failed");
                    }
                }
                Ok(CompactionEvent::Force(reply)) => {
                    let _ = reply.send(self.run_to_quiescence());
                }
                Ok(CompactionEvent::Shutdown(reply)) => {
                    let _ = reply.send(());
                    return;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Repeat single passes until the strategy finds nothing to merge
    fn run_to_quiescence(&self) -> Result<bool> {
        let mut did_work = false;
        while self.maybe_compact()? {
            did_work = true;
            if self.cancel.load(Ordering::Acquire) {
                break;
            }
        }
        Ok(did_work)
    }

    /// Evaluate the strategy against a manifest snapshot and run at most
    /// one merge. Returns whether a merge completed.
    pub fn maybe_compact(&self) -> Result<bool> {
        if self.cancel.load(Ordering::Acquire) {
            return Ok(false);
        }

        let manifest = self.store.manifest_data();
        let job = match plan(&self.config.compaction_strategy, &manifest.segments) {
            Some(job) => job,
            None => return Ok(false),
        };

        self.execute(job)
    }

    /// Run one planned merge against the current snapshot
    fn execute(&self, job: CompactionJob) -> Result<bool> {
        let snapshot: SegmentSnapshot = self.store.snapshot();

        // Resolve inputs in read order; a concurrent retire may have
        // invalidated the plan, in which case we just skip this pass
        let mut inputs = Vec::with_capacity(job.input_ids.len());
        for handle in snapshot.iter() {
            if job.input_ids.contains(&handle.meta.id) {
                inputs.push(handle.clone());
            }
        }
        if inputs.len() != job.input_ids.len() {
            return Ok(false);
        }

        let merged_min = inputs.iter().map(|h| h.meta.min_key.clone()).min();
        let merged_max = inputs.iter().map(|h| h.meta.max_key.clone()).max();
        let (merged_min, merged_max) = match (merged_min, merged_max) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Ok(false),
        };

        // Conservative tombstone rule: only drop when no segment outside
        // the merge set overlaps the merged key range, so no older,
        // now-shadowed version can resurface
        let outside_overlap = snapshot
            .iter()
            .filter(|h| !job.input_ids.contains(&h.meta.id))
            .any(|h| h.meta.overlaps(&merged_min, &merged_max));
        let may_drop_tombstones = !outside_overlap;
        let grace_cutoff =
            now_millis().saturating_sub(self.config.tombstone_grace.as_millis() as u64);

        tracing::info!(
            inputs = ?job.input_ids,
            target_level = job.target_level,
            may_drop_tombstones,
            "starting compaction"
        );

        let mut sources: Vec<EntrySource> = Vec::with_capacity(inputs.len());
        for handle in &inputs {
            sources.push(Box::new(handle.reader.iter()?));
        }

        // Stream surviving entries straight into the output file; the
        // merged data never has to fit in memory
        let output_id = self.store.allocate_segment_id();
        let mut builder: Option<SegmentBuilder> = None;
        let mut dropped = 0u64;
        let mut scanned = 0u64;
        for item in MergeIterator::new(sources)? {
            let entry = item?;
            scanned += 1;

            // Coarse cancellation point; no partial output ever becomes
            // visible because the manifest swap happens only at the end
            if scanned % 1024 == 0 && self.cancel.load(Ordering::Acquire) {
                if builder.is_some() {
                    drop(builder);
                    let _ = std::fs::remove_file(segment_path(
                        self.store.segments_dir(),
                        output_id,
                    ));
                }
                tracing::info!("compaction cancelled");
                return Ok(false);
            }

            if entry.is_tombstone() && may_drop_tombstones && entry.timestamp <= grace_cutoff {
                dropped += 1;
                continue;
            }
            if builder.is_none() {
                builder = Some(self.store.new_segment_builder(output_id)?);
            }
            if let Some(builder) = builder.as_mut() {
                builder.add(&entry)?;
            }
        }

        let input_created = inputs
            .iter()
            .map(|h| h.meta.created_at_ms)
            .min()
            .unwrap_or_else(now_millis);

        let new_metas = match builder {
            // Everything merged away (expired tombstones only); no output
            // file was ever created
            None => Vec::new(),
            Some(builder) => {
                let info = builder.finish()?;
                let mut meta = SegmentMeta::for_new_file(output_id, job.target_level, &info);
                // Time-window compaction needs the output to stay in its
                // inputs' bucket
                if matches!(
                    self.config.compaction_strategy,
                    CompactionStrategy::TimeWindow { .. }
                ) {
                    meta.created_at_ms = input_created;
                }
                vec![meta]
            }
        };

        let output_ids: Vec<u64> = new_metas.iter().map(|m| m.id).collect();
        self.store.retire(&job.input_ids, new_metas)?;

        self.stats.compactions.fetch_add(1, Ordering::Relaxed);
        self.stats
            .tombstones_dropped
            .fetch_add(dropped, Ordering::Relaxed);

        tracing::info!(
            inputs = ?job.input_ids,
            outputs = ?output_ids,
            entries = scanned,
            tombstones_dropped = dropped,
            "compaction complete"
        );

        Ok(true)
    }
}
