//! Write Buffer Module
//!
//! In-memory, key-sorted accumulator of recent writes. Holds the latest
//! entry seen for each key since the last segment flush.
//!
//! ## Responsibilities
//! - Fast point lookups and range snapshots for the read path
//! - Track logical size for the segment flush trigger
//! - Sorted iteration so a flush is a pure sequential segment write
//!
//! ## Concurrency
//! Mutated only by the single batcher thread, after the batch's WAL
//! barrier; read concurrently by any number of `get`/`scan` callers.
//! BTreeMap behind a `parking_lot::RwLock` — ordered keys are required for
//! segment generation, and the single-writer model keeps contention low.

mod table;

pub use table::WriteBuffer;
