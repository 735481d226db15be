//! Error types for LedgerKV
//!
//! Provides a unified error type for all engine operations. Errors never
//! cross the engine boundary as panics; every public operation returns
//! `Result<T, EngineError>`.

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for LedgerKV operations
#[derive(Debug, Error)]
pub enum EngineError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Disk read/write/fsync failure. Fatal to the in-flight operation,
    /// not to the engine; the operation must be treated as not-applied.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    /// Checksum mismatch on WAL replay or segment footer. Recoverable when
    /// it affects a WAL tail; fatal when it affects an acknowledged segment.
    #[error("corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    /// Write rejected because the write queue is over its configured bound.
    /// Backpressure signal; the caller may retry.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    /// Operation attempted before recovery reached Ready, or after close.
    #[error("engine not ready: {0}")]
    NotReady(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}
