//! Tests for the Entry codec
//!
//! These tests verify:
//! - Round-trip encoding of values and tombstones
//! - Encoded length accounting
//! - Corruption detection on truncated input

use bytes::BytesMut;
use ledgerkv::entry::{Entry, ENTRY_HEADER_SIZE};
use ledgerkv::EngineError;

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_encode_decode_value() {
    let entry = Entry::put(b"key".to_vec(), b"value".to_vec(), 7, 1234);

    let mut buf = BytesMut::new();
    entry.encode(&mut buf);
    assert_eq!(buf.len(), entry.encoded_len());

    let decoded = Entry::decode(&mut buf.freeze()).unwrap();
    assert_eq!(decoded, entry);
    assert!(!decoded.is_tombstone());
}

#[test]
fn test_encode_decode_tombstone() {
    let entry = Entry::tombstone(b"gone".to_vec(), 42, 99);

    let mut buf = BytesMut::new();
    entry.encode(&mut buf);
    assert_eq!(buf.len(), ENTRY_HEADER_SIZE + 4);

    let decoded = Entry::decode(&mut buf.freeze()).unwrap();
    assert_eq!(decoded, entry);
    assert!(decoded.is_tombstone());
    assert_eq!(decoded.value, None);
}

#[test]
fn test_encode_decode_empty_value() {
    let entry = Entry::put(b"k".to_vec(), Vec::new(), 1, 0);

    let mut buf = BytesMut::new();
    entry.encode(&mut buf);

    let decoded = Entry::decode(&mut buf.freeze()).unwrap();
    // An empty value is a value, not a tombstone
    assert_eq!(decoded.value, Some(Vec::new()));
    assert!(!decoded.is_tombstone());
}

#[test]
fn test_decode_multiple_from_one_buffer() {
    let a = Entry::put(b"a".to_vec(), b"1".to_vec(), 1, 10);
    let b = Entry::tombstone(b"b".to_vec(), 2, 11);

    let mut buf = BytesMut::new();
    a.encode(&mut buf);
    b.encode(&mut buf);

    let mut bytes = buf.freeze();
    assert_eq!(Entry::decode(&mut bytes).unwrap(), a);
    assert_eq!(Entry::decode(&mut bytes).unwrap(), b);
    assert_eq!(bytes.len(), 0);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_decode_truncated_header() {
    let mut bytes: &[u8] = &[1, 2, 3];
    let err = Entry::decode(&mut bytes).unwrap_err();
    assert!(matches!(err, EngineError::Corruption(_)));
}

#[test]
fn test_decode_truncated_value() {
    let entry = Entry::put(b"key".to_vec(), b"value".to_vec(), 1, 1);
    let mut buf = BytesMut::new();
    entry.encode(&mut buf);

    // Drop the last byte of the value
    let bytes = buf.freeze();
    let mut short = &bytes[..bytes.len() - 1];
    let err = Entry::decode(&mut short).unwrap_err();
    assert!(matches!(err, EngineError::Corruption(_)));
}
