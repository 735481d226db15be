//! Entry Codec
//!
//! Serializes a single record (key, value, sequence number, tombstone flag)
//! to and from a fixed binary layout. This layout is shared by the WAL
//! (wrapped in a checksummed record) and by segment data blocks.
//!
//! ## Wire Format (little-endian)
//! ```text
//! ┌─────────────┬─────────────┬──────────┬───────────────┬─────┬───────┐
//! │ KeyLen: u32 │ ValLen: u32 │ Seq: u64 │ Timestamp: u64│ Key │ Value │
//! └─────────────┴─────────────┴──────────┴───────────────┴─────┴───────┘
//! ```
//! `ValLen == u32::MAX` marks a tombstone; no value bytes follow.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{EngineError, Result};

/// Fixed portion of an encoded entry: key_len + val_len + seq + timestamp
pub const ENTRY_HEADER_SIZE: usize = 4 + 4 + 8 + 8;

/// Sentinel value length marking a tombstone (deleted key)
pub const TOMBSTONE_LEN: u32 = u32::MAX;

/// A single versioned record.
///
/// `value == None` is a tombstone: a deletion marker that shadows older
/// versions of the key until compaction removes both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// User key
    pub key: Vec<u8>,

    /// User value, or None for a tombstone
    pub value: Option<Vec<u8>>,

    /// Monotonically increasing write order; the highest sequence for a
    /// given key is authoritative
    pub sequence: u64,

    /// Unix millis when the write was accepted (drives tombstone grace)
    pub timestamp: u64,
}

impl Entry {
    /// Create a value entry
    pub fn put(key: Vec<u8>, value: Vec<u8>, sequence: u64, timestamp: u64) -> Self {
        Self {
            key,
            value: Some(value),
            sequence,
            timestamp,
        }
    }

    /// Create a tombstone entry
    pub fn tombstone(key: Vec<u8>, sequence: u64, timestamp: u64) -> Self {
        Self {
            key,
            value: None,
            sequence,
            timestamp,
        }
    }

    /// Whether this entry is a deletion marker
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Size of this entry once encoded
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }

    /// Append the encoded form of this entry to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32_le(self.key.len() as u32);
        match &self.value {
            Some(v) => buf.put_u32_le(v.len() as u32),
            None => buf.put_u32_le(TOMBSTONE_LEN),
        }
        buf.put_u64_le(self.sequence);
        buf.put_u64_le(self.timestamp);
        buf.put_slice(&self.key);
        if let Some(v) = &self.value {
            buf.put_slice(v);
        }
    }

    /// Decode one entry from the front of `buf`, consuming its bytes
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < ENTRY_HEADER_SIZE {
            return Err(EngineError::Corruption(format!(
                "entry header truncated: {} bytes remaining",
                buf.remaining()
            )));
        }

        let key_len = buf.get_u32_le() as usize;
        let val_len = buf.get_u32_le();
        let sequence = buf.get_u64_le();
        let timestamp = buf.get_u64_le();

        if buf.remaining() < key_len {
            return Err(EngineError::Corruption(format!(
                "entry key truncated: want {} bytes, have {}",
                key_len,
                buf.remaining()
            )));
        }
        let mut key = vec![0u8; key_len];
        buf.copy_to_slice(&mut key);

        let value = if val_len == TOMBSTONE_LEN {
            None
        } else {
            let val_len = val_len as usize;
            if buf.remaining() < val_len {
                return Err(EngineError::Corruption(format!(
                    "entry value truncated: want {} bytes, have {}",
                    val_len,
                    buf.remaining()
                )));
            }
            let mut value = vec![0u8; val_len];
            buf.copy_to_slice(&mut value);
            Some(value)
        };

        Ok(Self {
            key,
            value,
            sequence,
            timestamp,
        })
    }
}

/// Current wall-clock time in unix millis (entry timestamps)
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
