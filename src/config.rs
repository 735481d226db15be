//! Configuration for LedgerKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a LedgerKV engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST         (live segment list + checkpoint)
    ///     ├── wal/             (write-ahead log files)
    ///     └── segments/        (immutable segment files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Write Batching Configuration
    // -------------------------------------------------------------------------
    /// Byte threshold that releases a pending batch to the WAL.
    pub batch_flush_bytes: usize,

    /// Max time a pending batch may wait before it is released to the WAL.
    /// Hybrid size/time policy: whichever of the two triggers fires first.
    pub batch_flush_interval: Duration,

    /// Max number of queued write requests before callers see backpressure.
    pub write_queue_capacity: usize,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// How often the WAL performs its durability barrier (fsync).
    pub durability_mode: DurabilityMode,

    // -------------------------------------------------------------------------
    // Write Buffer / Segment Configuration
    // -------------------------------------------------------------------------
    /// Logical size of the write buffer that triggers a flush to a segment.
    pub segment_flush_bytes: usize,

    /// One sparse index sample per this many entries in a segment file.
    pub sparse_index_interval: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Which segments get merged, and when.
    pub compaction_strategy: CompactionStrategy,

    /// How often the scheduler re-evaluates even without a new segment.
    pub compaction_tick: Duration,

    /// Wall-clock age a tombstone must reach before compaction may drop it.
    pub tombstone_grace: Duration,
}

/// WAL durability barrier policy
///
/// Trades acknowledgment latency against crash-window size.
#[derive(Debug, Clone, Copy)]
pub enum DurabilityMode {
    /// fsync after every committed batch (safest)
    SyncEveryBatch,

    /// fsync at most once per interval; batches in between are
    /// acknowledged from the OS page cache
    SyncInterval { interval: Duration },

    /// never fsync; durability limited to what the OS flushes on its own
    NoSync,
}

/// Segment merge strategy for the compaction scheduler
#[derive(Debug, Clone, Copy)]
pub enum CompactionStrategy {
    /// Merge runs of similarly-sized adjacent segments. Favors write
    /// throughput; read amplification grows until compaction catches up.
    SizeTiered {
        /// Minimum number of adjacent, similarly-sized segments to merge
        min_merge_width: usize,
        /// Two segments are "similar" when the larger is at most this
        /// multiple of the smaller
        size_ratio: f64,
    },

    /// Organize segments into levels where each level holds roughly
    /// `level_fanout` times the previous one. Favors read/space efficiency
    /// at the cost of rewriting the same bytes across levels.
    Leveled {
        /// Capacity of level 1 in bytes
        level_base_bytes: u64,
        /// Capacity multiplier between consecutive levels
        level_fanout: u64,
        /// Number of level-0 segments that triggers an L0 -> L1 merge
        level0_trigger: usize,
    },

    /// Group segments by creation-time bucket and merge closed buckets.
    /// Appropriate when keys are rarely updated after their window closes.
    TimeWindow { window: Duration },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ledgerkv_data"),
            batch_flush_bytes: 256 * 1024,
            batch_flush_interval: Duration::from_millis(5),
            write_queue_capacity: 1024,
            durability_mode: DurabilityMode::SyncEveryBatch,
            segment_flush_bytes: 16 * 1024 * 1024,
            sparse_index_interval: 16,
            compaction_strategy: CompactionStrategy::SizeTiered {
                min_merge_width: 4,
                size_ratio: 2.0,
            },
            compaction_tick: Duration::from_secs(1),
            tombstone_grace: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate option combinations that cannot work
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_flush_bytes == 0 {
            return Err(crate::EngineError::Config(
                "batch_flush_bytes must be non-zero".to_string(),
            ));
        }
        if self.segment_flush_bytes == 0 {
            return Err(crate::EngineError::Config(
                "segment_flush_bytes must be non-zero".to_string(),
            ));
        }
        if self.sparse_index_interval == 0 {
            return Err(crate::EngineError::Config(
                "sparse_index_interval must be non-zero".to_string(),
            ));
        }
        if self.write_queue_capacity == 0 {
            return Err(crate::EngineError::Config(
                "write_queue_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the batch release byte threshold
    pub fn batch_flush_bytes(mut self, bytes: usize) -> Self {
        self.config.batch_flush_bytes = bytes;
        self
    }

    /// Set the batch release time threshold
    pub fn batch_flush_interval(mut self, interval: Duration) -> Self {
        self.config.batch_flush_interval = interval;
        self
    }

    /// Set the write queue bound (backpressure point)
    pub fn write_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.write_queue_capacity = capacity;
        self
    }

    /// Set the WAL durability mode
    pub fn durability_mode(mut self, mode: DurabilityMode) -> Self {
        self.config.durability_mode = mode;
        self
    }

    /// Set the write buffer size that triggers a segment flush
    pub fn segment_flush_bytes(mut self, bytes: usize) -> Self {
        self.config.segment_flush_bytes = bytes;
        self
    }

    /// Set the sparse index sampling interval
    pub fn sparse_index_interval(mut self, interval: usize) -> Self {
        self.config.sparse_index_interval = interval;
        self
    }

    /// Set the compaction strategy
    pub fn compaction_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.config.compaction_strategy = strategy;
        self
    }

    /// Set the compaction re-evaluation interval
    pub fn compaction_tick(mut self, tick: Duration) -> Self {
        self.config.compaction_tick = tick;
        self
    }

    /// Set the tombstone grace period (wall-clock)
    pub fn tombstone_grace(mut self, grace: Duration) -> Self {
        self.config.tombstone_grace = grace;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
