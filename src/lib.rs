//! # LedgerKV
//!
//! A log-structured, append-only key-value storage engine with:
//! - Write-Ahead Logging (WAL) with group-commit batching
//! - Immutable sorted segments with sparse indexes
//! - Background compaction (size-tiered, leveled, or time-window)
//! - Crash recovery with partial write handling
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     put / delete                             │
//! │            (bounded queue → one batcher thread)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ group commit
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │     WAL     │          │ Write Buffer │◀──── get / scan
//!   │  (Append)   │          │   (RwLock)   │
//!   └─────────────┘          └──────┬───────┘
//!                                   │ flush
//!                                   ▼
//!                           ┌──────────────┐      ┌────────────┐
//!                           │   Segments   │◀────▶│  Manifest  │
//!                           │ (immutable)  │      │ (atomic)   │
//!                           └──────┬───────┘      └────────────┘
//!                                  │
//!                                  ▼
//!                           ┌──────────────┐
//!                           │  Compaction  │
//!                           │ (background) │
//!                           └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod entry;
pub mod wal;
pub mod buffer;
pub mod store;
pub mod merge;
pub mod batch;
pub mod compaction;
pub mod recovery;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EngineError, Result};
pub use config::{CompactionStrategy, Config, DurabilityMode};
pub use engine::{Engine, Scan};
pub use entry::Entry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LedgerKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
