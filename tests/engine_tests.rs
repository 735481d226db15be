//! Integration tests for the engine facade
//!
//! These tests verify:
//! - Read-after-write for puts, overwrites, and deletes
//! - Flush behavior and reads across buffer/segment boundaries
//! - Snapshot-consistent range scans with shadowing and tombstone filtering
//! - Group-commit batching under concurrent writers
//! - Lifecycle: clean close, idempotency, NotReady after close

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use ledgerkv::{CompactionStrategy, Config, Engine, EngineError};

// =============================================================================
// Test Helpers
// =============================================================================

/// Low-latency test config: every write commits immediately and automatic
/// compaction never finds enough segments to merge.
fn test_config(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .batch_flush_bytes(1)
        .batch_flush_interval(Duration::from_millis(1))
        .compaction_strategy(CompactionStrategy::SizeTiered {
            min_merge_width: 64,
            size_ratio: 2.0,
        })
        .build()
}

fn open_engine(dir: &TempDir) -> Engine {
    Engine::open(test_config(dir.path())).unwrap()
}

fn collect_scan(engine: &Engine, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    engine
        .scan(start, end)
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let seq = engine.put(b"hello", b"world").unwrap();
    assert_eq!(seq, 1);
    assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));

    engine.close().unwrap();
}

#[test]
fn test_sequences_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let s1 = engine.put(b"a", b"1").unwrap();
    let s2 = engine.put(b"b", b"2").unwrap();
    let s3 = engine.delete(b"a").unwrap();
    assert!(s1 < s2 && s2 < s3);

    engine.close().unwrap();
}

#[test]
fn test_overwrite_latest_wins() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"k", b"old").unwrap();
    engine.put(b"k", b"new").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"new".to_vec()));

    engine.close().unwrap();
}

#[test]
fn test_get_missing_key() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    assert_eq!(engine.get(b"ghost").unwrap(), None);
    engine.close().unwrap();
}

#[test]
fn test_delete_hides_key() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"k", b"v").unwrap();
    engine.delete(b"k").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), None);

    // Deleting a key that never existed is still a write, not an error
    engine.delete(b"never-was").unwrap();
    assert_eq!(engine.get(b"never-was").unwrap(), None);

    engine.close().unwrap();
}

#[test]
fn test_empty_key_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let err = engine.put(b"", b"v").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));

    engine.close().unwrap();
}

// =============================================================================
// Flush and Cross-Segment Reads
// =============================================================================

#[test]
fn test_flush_moves_buffer_to_segment() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    for i in 0..20 {
        engine
            .put(format!("key_{:02}", i).as_bytes(), b"value")
            .unwrap();
    }
    assert!(engine.buffer_entry_count() > 0);
    assert_eq!(engine.segment_count(), 0);

    engine.flush().unwrap();
    assert_eq!(engine.buffer_entry_count(), 0);
    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.last_flushed_sequence(), 20);

    // Reads now come from the segment
    assert_eq!(engine.get(b"key_07").unwrap(), Some(b"value".to_vec()));
    engine.close().unwrap();
}

#[test]
fn test_flush_empty_buffer_is_noop() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.flush().unwrap();
    assert_eq!(engine.segment_count(), 0);

    engine.close().unwrap();
}

#[test]
fn test_newest_segment_shadows_older() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"k", b"v1").unwrap();
    engine.flush().unwrap();
    engine.put(b"k", b"v2").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.segment_count(), 2);
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));

    engine.close().unwrap();
}

#[test]
fn test_tombstone_shadows_flushed_value() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"k", b"v").unwrap();
    engine.flush().unwrap();

    // Tombstone in the buffer shadows the segment...
    engine.delete(b"k").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), None);

    // ...and keeps shadowing it once flushed to its own segment
    engine.flush().unwrap();
    assert_eq!(engine.get(b"k").unwrap(), None);

    engine.close().unwrap();
}

#[test]
fn test_overwrite_then_flush_then_delete() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"a", b"1").unwrap();
    engine.put(b"a", b"2").unwrap();
    engine.flush().unwrap();
    engine.delete(b"a").unwrap();

    assert_eq!(engine.get(b"a").unwrap(), None);
    engine.close().unwrap();
}

#[test]
fn test_size_triggered_flush() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .batch_flush_bytes(1)
        .batch_flush_interval(Duration::from_millis(1))
        .segment_flush_bytes(512)
        .compaction_strategy(CompactionStrategy::SizeTiered {
            min_merge_width: 64,
            size_ratio: 2.0,
        })
        .build();
    let engine = Engine::open(config).unwrap();

    // Enough data to cross the 512-byte buffer threshold several times
    for i in 0..50 {
        engine
            .put(format!("key_{:03}", i).as_bytes(), &[0u8; 64])
            .unwrap();
    }

    assert!(engine.segment_count() >= 1);
    for i in 0..50 {
        assert_eq!(
            engine.get(format!("key_{:03}", i).as_bytes()).unwrap(),
            Some(vec![0u8; 64])
        );
    }

    engine.close().unwrap();
}

// =============================================================================
// Scans
// =============================================================================

#[test]
fn test_scan_inclusive_bounds() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    for key in [b"a", b"b", b"c", b"d", b"e"] {
        engine.put(key, b"v").unwrap();
    }

    let found = collect_scan(&engine, b"b", b"d");
    let keys: Vec<&[u8]> = found.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![b"b", b"c", b"d"]);

    engine.close().unwrap();
}

#[test]
fn test_scan_merges_buffer_and_segments() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    // Older segment holds a, b, c
    engine.put(b"a", b"old-a").unwrap();
    engine.put(b"b", b"old-b").unwrap();
    engine.put(b"c", b"old-c").unwrap();
    engine.flush().unwrap();

    // Buffer overwrites b and deletes c
    engine.put(b"b", b"new-b").unwrap();
    engine.delete(b"c").unwrap();

    let found = collect_scan(&engine, b"a", b"z");
    assert_eq!(
        found,
        vec![
            (b"a".to_vec(), b"old-a".to_vec()),
            (b"b".to_vec(), b"new-b".to_vec()),
        ]
    );

    engine.close().unwrap();
}

#[test]
fn test_scan_across_multiple_segments() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    for i in 0..30 {
        engine
            .put(
                format!("key_{:03}", i).as_bytes(),
                format!("v{}", i).as_bytes(),
            )
            .unwrap();
        if i % 10 == 9 {
            engine.flush().unwrap();
        }
    }
    assert_eq!(engine.segment_count(), 3);

    let found = collect_scan(&engine, b"key_005", b"key_024");
    assert_eq!(found.len(), 20);
    assert_eq!(found[0].0, b"key_005".to_vec());
    assert_eq!(found[19].0, b"key_024".to_vec());

    engine.close().unwrap();
}

#[test]
fn test_scan_empty_when_start_after_end() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"k", b"v").unwrap();
    assert!(collect_scan(&engine, b"z", b"a").is_empty());

    engine.close().unwrap();
}

#[test]
fn test_scan_does_not_observe_later_writes() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"a", b"1").unwrap();
    let scan = engine.scan(b"a", b"z").unwrap();

    // Lands after the scan captured its view
    engine.put(b"b", b"2").unwrap();

    let found: Vec<_> = scan.map(|r| r.unwrap()).collect();
    assert_eq!(found, vec![(b"a".to_vec(), b"1".to_vec())]);

    engine.close().unwrap();
}

#[test]
fn test_scan_sees_write_during_concurrent_flush() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(&dir));

    let stop = Arc::new(AtomicBool::new(false));
    let flusher = {
        let engine = engine.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                engine.flush().unwrap();
            }
        })
    };

    // Every acknowledged write must be scannable exactly once, no matter
    // where the flusher is between clearing the buffer and installing the
    // segment
    for i in 0..300u32 {
        let key = format!("key_{:05}", i).into_bytes();
        engine.put(&key, b"v").unwrap();
        let found = collect_scan(&engine, &key, &key);
        assert_eq!(
            found,
            vec![(key.clone(), b"v".to_vec())],
            "write {} vanished mid-flush",
            i
        );
    }

    stop.store(true, Ordering::Relaxed);
    flusher.join().unwrap();
    engine.close().unwrap();
}

// =============================================================================
// Write Limits and Backpressure
// =============================================================================

#[test]
fn test_oversized_write_is_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    // With framing and entry headers on top, this value pushes the WAL
    // record past what replay will accept
    let value = vec![0u8; ledgerkv::wal::MAX_RECORD_LEN as usize];
    let err = engine.put(b"big", &value).unwrap_err();
    assert!(matches!(err, EngineError::Capacity(_)));
    assert_eq!(engine.get(b"big").unwrap(), None);

    // Rejection leaves the engine usable
    engine.put(b"small", b"v").unwrap();
    assert_eq!(engine.get(b"small").unwrap(), Some(b"v".to_vec()));

    engine.close().unwrap();
}

#[test]
fn test_full_write_queue_signals_backpressure() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .batch_flush_bytes(64 * 1024)
        .batch_flush_interval(Duration::from_millis(1))
        .write_queue_capacity(1)
        .compaction_strategy(CompactionStrategy::SizeTiered {
            min_merge_width: 64,
            size_ratio: 2.0,
        })
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());

    let rejections = Arc::new(AtomicU64::new(0));
    let writers = 4;
    let writes_per_thread = 200;
    let handles: Vec<_> = (0..writers)
        .map(|t| {
            let engine = engine.clone();
            let rejections = rejections.clone();
            std::thread::spawn(move || {
                for i in 0..writes_per_thread {
                    let key = format!("t{}_k{:04}", t, i);
                    loop {
                        match engine.put(key.as_bytes(), &[9u8; 256]) {
                            Ok(_) => break,
                            Err(EngineError::Capacity(_)) => {
                                rejections.fetch_add(1, Ordering::Relaxed);
                                std::thread::yield_now();
                            }
                            Err(e) => panic!("unexpected write error: {}", e),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // A one-slot queue under four writers has to push back at some point
    assert!(rejections.load(Ordering::Relaxed) > 0);

    // Backpressure never loses a write that was eventually acknowledged
    for t in 0..writers {
        for i in 0..writes_per_thread {
            assert_eq!(
                engine.get(format!("t{}_k{:04}", t, i).as_bytes()).unwrap(),
                Some(vec![9u8; 256])
            );
        }
    }

    engine.close().unwrap();
}

// =============================================================================
// Group Commit
// =============================================================================

#[test]
fn test_concurrent_writers_share_barriers() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .batch_flush_bytes(4096)
        .batch_flush_interval(Duration::from_millis(5))
        .compaction_strategy(CompactionStrategy::SizeTiered {
            min_merge_width: 64,
            size_ratio: 2.0,
        })
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());

    let writers = 8;
    let writes_per_thread = 125;
    let handles: Vec<_> = (0..writers)
        .map(|t| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..writes_per_thread {
                    engine
                        .put(format!("t{}_k{:04}", t, i).as_bytes(), &[7u8; 64])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total_writes = (writers * writes_per_thread) as u64;
    assert!(engine.wal_sync_count() > 0);
    assert!(
        engine.wal_sync_count() < total_writes,
        "expected group commit to amortize barriers: {} syncs for {} writes",
        engine.wal_sync_count(),
        total_writes
    );
    assert!(engine.batches_committed() < total_writes);

    // Every acknowledged write is readable
    for t in 0..writers {
        for i in 0..writes_per_thread {
            assert_eq!(
                engine
                    .get(format!("t{}_k{:04}", t, i).as_bytes())
                    .unwrap(),
                Some(vec![7u8; 64])
            );
        }
    }

    engine.close().unwrap();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_close_is_idempotent_and_gates_operations() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    engine.put(b"k", b"v").unwrap();
    engine.close().unwrap();
    engine.close().unwrap();

    assert!(matches!(
        engine.put(b"k", b"v2").unwrap_err(),
        EngineError::NotReady(_)
    ));
    assert!(matches!(
        engine.get(b"k").unwrap_err(),
        EngineError::NotReady(_)
    ));
    assert!(matches!(
        engine.scan(b"a", b"z").unwrap_err(),
        EngineError::NotReady(_)
    ));
    assert!(matches!(
        engine.flush().unwrap_err(),
        EngineError::NotReady(_)
    ));
}

#[test]
fn test_data_survives_close_and_reopen() {
    let dir = TempDir::new().unwrap();

    let engine = open_engine(&dir);
    engine.put(b"persist", b"me").unwrap();
    engine.delete(b"persist-not").unwrap();
    engine.close().unwrap();
    drop(engine);

    let engine = open_engine(&dir);
    assert_eq!(engine.get(b"persist").unwrap(), Some(b"me".to_vec()));
    assert_eq!(engine.get(b"persist-not").unwrap(), None);

    // Sequence numbering resumes past what was assigned before
    let seq = engine.put(b"next", b"write").unwrap();
    assert!(seq >= 3);

    engine.close().unwrap();
}
