//! Storage Module
//!
//! Persistent storage layer: immutable sorted segments plus the manifest
//! that names them.
//!
//! ## Responsibilities
//! - Materialize write buffer flushes and compaction outputs as segments
//! - Serve point lookups through sparse indexes
//! - Atomic manifest updates (write-new-then-rename)
//! - Refcounted segment lifetime: files outlive every snapshot that can
//!   still read them

mod manager;
mod manifest;
pub mod segment;

pub use manager::{SegmentHandle, SegmentSnapshot, SegmentStore, MANIFEST_FILENAME, SEGMENT_DIR};
pub use manifest::{ManifestData, ManifestFile, SegmentMeta};
pub use segment::{SegmentBuilder, SegmentIterator, SegmentReader};
