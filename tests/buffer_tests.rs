//! Tests for the write buffer
//!
//! These tests verify:
//! - Latest-entry-per-key semantics
//! - Size accounting across inserts, overwrites, and clear
//! - Sorted and ranged snapshots

use ledgerkv::buffer::WriteBuffer;
use ledgerkv::entry::Entry;

// =============================================================================
// Test Helpers
// =============================================================================

fn put(key: &[u8], value: &[u8], seq: u64) -> Entry {
    Entry::put(key.to_vec(), value.to_vec(), seq, 0)
}

// =============================================================================
// Basic Semantics
// =============================================================================

#[test]
fn test_get_returns_latest() {
    let buffer = WriteBuffer::new();
    buffer.apply(vec![put(b"k", b"v1", 1)]);
    buffer.apply(vec![put(b"k", b"v2", 2)]);

    let entry = buffer.get(b"k").unwrap();
    assert_eq!(entry.value.as_deref(), Some(b"v2".as_slice()));
    assert_eq!(entry.sequence, 2);
    assert_eq!(buffer.entry_count(), 1);
}

#[test]
fn test_tombstone_is_held_not_removed() {
    let buffer = WriteBuffer::new();
    buffer.apply(vec![put(b"k", b"v", 1)]);
    buffer.apply(vec![Entry::tombstone(b"k".to_vec(), 2, 0)]);

    // The tombstone must stay visible so it can shadow segment data
    let entry = buffer.get(b"k").unwrap();
    assert!(entry.is_tombstone());
    assert_eq!(buffer.entry_count(), 1);
}

#[test]
fn test_get_missing() {
    let buffer = WriteBuffer::new();
    assert!(buffer.get(b"nope").is_none());
    assert!(buffer.is_empty());
}

// =============================================================================
// Size Accounting
// =============================================================================

#[test]
fn test_size_tracks_inserts_and_overwrites() {
    let buffer = WriteBuffer::new();
    assert_eq!(buffer.size(), 0);

    buffer.apply(vec![put(b"key", b"0123456789", 1)]);
    let after_insert = buffer.size();
    assert!(after_insert > 0);

    // Overwriting with a shorter value shrinks the logical size
    buffer.apply(vec![put(b"key", b"x", 2)]);
    assert!(buffer.size() < after_insert);

    buffer.clear();
    assert_eq!(buffer.size(), 0);
    assert!(buffer.is_empty());
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn test_snapshot_sorted_orders_by_key() {
    let buffer = WriteBuffer::new();
    buffer.apply(vec![
        put(b"c", b"3", 1),
        put(b"a", b"1", 2),
        put(b"b", b"2", 3),
    ]);

    let keys: Vec<Vec<u8>> = buffer
        .snapshot_sorted()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_snapshot_range_is_inclusive() {
    let buffer = WriteBuffer::new();
    buffer.apply(vec![
        put(b"a", b"1", 1),
        put(b"b", b"2", 2),
        put(b"c", b"3", 3),
        put(b"d", b"4", 4),
    ]);

    let keys: Vec<Vec<u8>> = buffer
        .snapshot_range(b"b", b"c")
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
}
