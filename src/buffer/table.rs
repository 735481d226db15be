//! WriteBuffer implementation
//!
//! BTreeMap-based buffer with RwLock for single-writer/multi-reader access.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::entry::{Entry, ENTRY_HEADER_SIZE};

/// In-memory table of the latest entry per key since the last flush
#[derive(Debug)]
pub struct WriteBuffer {
    /// key → latest entry (highest sequence always wins on insert order,
    /// which the batcher guarantees)
    data: RwLock<BTreeMap<Vec<u8>, Entry>>,

    /// Approximate logical size in bytes (lock-free reads for the flush
    /// trigger)
    size: AtomicUsize,
}

impl WriteBuffer {
    /// Create a new empty buffer
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the latest entry for a key, if any (read lock)
    ///
    /// A returned tombstone means "deleted", which shadows anything in
    /// older segments.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.read().get(key).cloned()
    }

    /// Apply a committed batch (write lock, batcher thread only).
    ///
    /// Entries must already be durable in the WAL; applying here is what
    /// makes them visible to readers.
    pub fn apply(&self, entries: Vec<Entry>) {
        let mut data = self.data.write();
        let mut delta = 0isize;

        for entry in entries {
            let added = Self::entry_size(&entry) as isize;
            let removed = data
                .insert(entry.key.clone(), entry)
                .map_or(0, |old| Self::entry_size(&old) as isize);
            delta += added - removed;
        }

        if delta >= 0 {
            self.size.fetch_add(delta as usize, Ordering::Relaxed);
        } else {
            self.size.fetch_sub((-delta) as usize, Ordering::Relaxed);
        }
    }

    /// Snapshot all entries in ascending key order (for segment flush)
    pub fn snapshot_sorted(&self) -> Vec<Entry> {
        self.data.read().values().cloned().collect()
    }

    /// Snapshot entries within an inclusive key range (for scan)
    pub fn snapshot_range(&self, start: &[u8], end: &[u8]) -> Vec<Entry> {
        self.data
            .read()
            .range::<[u8], _>((
                std::ops::Bound::Included(start),
                std::ops::Bound::Included(end),
            ))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Clear all entries (after the flushed segment is in the manifest)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }

    /// Approximate logical size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Number of distinct keys held
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the buffer holds no entries
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn entry_size(entry: &Entry) -> usize {
        ENTRY_HEADER_SIZE + entry.key.len() + entry.value.as_ref().map_or(0, |v| v.len())
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}
