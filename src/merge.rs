//! K-way merge over sorted entry sources
//!
//! Shared by the read path (`scan`) and by compaction: merges any number
//! of key-sorted sources into one key-sorted stream, emitting only the
//! highest-sequence entry for each key. Tombstones are emitted like any
//! other entry; the consumer decides whether to surface or drop them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::entry::Entry;
use crate::error::Result;

/// A boxed, key-sorted entry source
pub type EntrySource = Box<dyn Iterator<Item = Result<Entry>> + Send>;

struct HeapItem {
    entry: Entry,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.entry.key == other.entry.key && self.entry.sequence == other.entry.sequence
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    /// BinaryHeap is a max-heap; invert the key ordering so the smallest
    /// key pops first, and for equal keys the highest sequence pops first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .key
            .cmp(&self.entry.key)
            .then(self.entry.sequence.cmp(&other.entry.sequence))
    }
}

/// Merged iterator yielding one entry per key, highest sequence wins
pub struct MergeIterator {
    sources: Vec<EntrySource>,
    heap: BinaryHeap<HeapItem>,
    failed: bool,
}

impl std::fmt::Debug for MergeIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeIterator")
            .field("sources", &self.sources.len())
            .field("heap_len", &self.heap.len())
            .field("failed", &self.failed)
            .finish()
    }
}

impl MergeIterator {
    /// Build a merge over the given sources. Each source must yield
    /// entries in strictly ascending key order.
    pub fn new(sources: Vec<EntrySource>) -> Result<Self> {
        let mut merge = Self {
            sources,
            heap: BinaryHeap::new(),
            failed: false,
        };
        for idx in 0..merge.sources.len() {
            merge.advance(idx)?;
        }
        Ok(merge)
    }

    /// Pull the next entry from source `idx` into the heap
    fn advance(&mut self, idx: usize) -> Result<()> {
        if let Some(item) = self.sources[idx].next() {
            let entry = item?;
            self.heap.push(HeapItem { entry, source: idx });
        }
        Ok(())
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let winner = self.heap.pop()?;
        if let Err(e) = self.advance(winner.source) {
            self.failed = true;
            return Some(Err(e));
        }

        // Discard superseded versions of the same key from other sources
        while self
            .heap
            .peek()
            .is_some_and(|top| top.entry.key == winner.entry.key)
        {
            if let Some(shadowed) = self.heap.pop() {
                if let Err(e) = self.advance(shadowed.source) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        Some(Ok(winner.entry))
    }
}
