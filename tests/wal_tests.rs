//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Batch append and full replay
//! - Durability barrier counting per mode
//! - Truncated and corrupt tail handling on replay
//! - File rotation and retired file pruning

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use ledgerkv::config::DurabilityMode;
use ledgerkv::entry::Entry;
use ledgerkv::wal::{self, WalReadOutcome, WalReader, WalWriter};

// =============================================================================
// Test Helpers
// =============================================================================

fn setup_writer(dir: &TempDir, mode: DurabilityMode) -> (WalWriter, Arc<AtomicU64>) {
    let syncs = Arc::new(AtomicU64::new(0));
    let writer = WalWriter::open(dir.path(), 1, mode, syncs.clone()).unwrap();
    (writer, syncs)
}

fn sample_entries(count: usize, first_seq: u64) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            Entry::put(
                format!("key_{:04}", i).into_bytes(),
                format!("value_{}", i).into_bytes(),
                first_seq + i as u64,
                1000 + i as u64,
            )
        })
        .collect()
}

fn replay_all(path: &std::path::Path) -> (Vec<Entry>, WalReadOutcome) {
    let mut reader = WalReader::open(path).unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        entries.push(entry);
    }
    (entries, reader.outcome().unwrap())
}

// =============================================================================
// Append / Replay Tests
// =============================================================================

#[test]
fn test_append_and_replay() {
    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);

    let entries = sample_entries(10, 1);
    writer.append_batch(&entries[..5]).unwrap();
    writer.append_batch(&entries[5..]).unwrap();
    drop(writer);

    let path = dir.path().join(wal::wal_file_name(1));
    let (replayed, outcome) = replay_all(&path);

    assert_eq!(outcome, WalReadOutcome::EndOfFile);
    assert_eq!(replayed, entries);
}

#[test]
fn test_replay_preserves_tombstones() {
    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::NoSync);

    let batch = vec![
        Entry::put(b"a".to_vec(), b"1".to_vec(), 1, 10),
        Entry::tombstone(b"b".to_vec(), 2, 11),
    ];
    writer.append_batch(&batch).unwrap();
    drop(writer);

    let (replayed, _) = replay_all(&dir.path().join(wal::wal_file_name(1)));
    assert_eq!(replayed.len(), 2);
    assert!(replayed[1].is_tombstone());
}

#[test]
fn test_empty_file_is_clean_eof() {
    let dir = TempDir::new().unwrap();
    let (writer, _) = setup_writer(&dir, DurabilityMode::NoSync);
    drop(writer);

    let (replayed, outcome) = replay_all(&dir.path().join(wal::wal_file_name(1)));
    assert!(replayed.is_empty());
    assert_eq!(outcome, WalReadOutcome::EndOfFile);
}

// =============================================================================
// Durability Barrier Tests
// =============================================================================

#[test]
fn test_sync_every_batch_counts_barriers() {
    let dir = TempDir::new().unwrap();
    let (mut writer, syncs) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);

    writer.append_batch(&sample_entries(3, 1)).unwrap();
    writer.append_batch(&sample_entries(3, 4)).unwrap();

    assert_eq!(syncs.load(Ordering::Relaxed), 2);
}

#[test]
fn test_no_sync_never_barriers() {
    let dir = TempDir::new().unwrap();
    let (mut writer, syncs) = setup_writer(&dir, DurabilityMode::NoSync);

    writer.append_batch(&sample_entries(3, 1)).unwrap();
    writer.append_batch(&sample_entries(3, 4)).unwrap();

    assert_eq!(syncs.load(Ordering::Relaxed), 0);
}

#[test]
fn test_sync_interval_amortizes_barriers() {
    let dir = TempDir::new().unwrap();
    let (mut writer, syncs) = setup_writer(
        &dir,
        DurabilityMode::SyncInterval {
            interval: Duration::from_millis(200),
        },
    );

    // The interval clock starts at open, so an immediate append stays
    // inside it
    writer.append_batch(&sample_entries(2, 1)).unwrap();
    assert_eq!(syncs.load(Ordering::Relaxed), 0);

    std::thread::sleep(Duration::from_millis(250));
    writer.append_batch(&sample_entries(2, 3)).unwrap();
    assert_eq!(syncs.load(Ordering::Relaxed), 1);

    // The barrier reset the clock; the next append is inside it again
    writer.append_batch(&sample_entries(2, 5)).unwrap();
    assert_eq!(syncs.load(Ordering::Relaxed), 1);
}

// =============================================================================
// Tail Corruption Tests
// =============================================================================

#[test]
fn test_truncated_tail_discards_last_record() {
    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);
    writer.append_batch(&sample_entries(3, 1)).unwrap();
    drop(writer);

    // Cut into the middle of the last record's body
    let path = dir.path().join(wal::wal_file_name(1));
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();

    let (replayed, outcome) = replay_all(&path);
    assert_eq!(replayed.len(), 2);
    assert_eq!(outcome, WalReadOutcome::TruncatedTail);
}

#[test]
fn test_corrupt_record_stops_replay() {
    use std::io::{Seek, SeekFrom, Write};

    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);
    writer.append_batch(&sample_entries(3, 1)).unwrap();
    drop(writer);

    // Flip a byte in the second record's body. Records are identically
    // sized here, so the second starts at one third of the file.
    let path = dir.path().join(wal::wal_file_name(1));
    let len = std::fs::metadata(&path).unwrap().len();
    let record_len = len / 3;
    let mut file = std::fs::OpenOptions::new().write(true).read(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(record_len + 10)).unwrap();
    file.write_all(&[0xFF]).unwrap();

    let (replayed, outcome) = replay_all(&path);
    assert_eq!(replayed.len(), 1);
    assert_eq!(outcome, WalReadOutcome::CorruptTail);
}

#[test]
fn test_garbage_after_valid_records() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);
    writer.append_batch(&sample_entries(2, 1)).unwrap();
    drop(writer);

    let path = dir.path().join(wal::wal_file_name(1));
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB, 0xCD]).unwrap();

    // A torn length prefix at the tail; both complete records survive
    let (replayed, outcome) = replay_all(&path);
    assert_eq!(replayed.len(), 2);
    assert_eq!(outcome, WalReadOutcome::TruncatedTail);
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotate_unlinks_retired_files() {
    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);
    writer.append_batch(&sample_entries(4, 1)).unwrap();

    writer.rotate().unwrap();
    assert_eq!(writer.wal_id(), 2);
    assert_eq!(writer.offset(), 0);

    let files = wal::list_wal_files(dir.path()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, 2);
}

#[test]
fn test_append_continues_after_rotate() {
    let dir = TempDir::new().unwrap();
    let (mut writer, _) = setup_writer(&dir, DurabilityMode::SyncEveryBatch);
    writer.append_batch(&sample_entries(2, 1)).unwrap();
    writer.rotate().unwrap();

    let later = sample_entries(2, 3);
    writer.append_batch(&later).unwrap();
    drop(writer);

    let (replayed, outcome) = replay_all(&dir.path().join(wal::wal_file_name(2)));
    assert_eq!(outcome, WalReadOutcome::EndOfFile);
    assert_eq!(replayed, later);
}

// =============================================================================
// File Naming Tests
// =============================================================================

#[test]
fn test_wal_file_name_round_trip() {
    let name = wal::wal_file_name(42);
    assert_eq!(name, "wal_0000000042.log");
    assert_eq!(
        wal::parse_wal_id(std::path::Path::new(&name)),
        Some(42)
    );
    assert_eq!(
        wal::parse_wal_id(std::path::Path::new("MANIFEST")),
        None
    );
}
