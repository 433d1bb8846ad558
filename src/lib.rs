//! # segkv
//!
//! A log-structured, segment-based key-value store with:
//! - Append-only segment files with per-record SHA-1 checksums
//! - In-memory hash indexes rebuilt by replaying segments on open
//! - Single writer thread per segment, concurrent readers
//! - Size-based rollover and merge of read-only segments
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │        (segment list behind RwLock, newest-first reads)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴─────────────┬──────────────────┐
//!          │                          │                  │
//!          ▼                          ▼                  ▼
//!   ┌─────────────┐           ┌─────────────┐    ┌─────────────┐
//!   │  Segment 1  │    ...    │  Segment N  │    │    Merge    │
//!   │ (read-only) │           │  (active)   │    │ (compactor) │
//!   └──────┬──────┘           └──────┬──────┘    └─────────────┘
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐           ┌─────────────┐
//!   │ Hash index  │           │ Writer      │
//!   │ + log file  │           │ thread      │
//!   └─────────────┘           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use segkv::Engine;
//!
//! let engine = Engine::open_path(std::path::Path::new("./data")).unwrap();
//! engine.put("a", "1").unwrap();
//! assert_eq!(engine.get("a").unwrap(), "1");
//! engine.close().unwrap();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod entry;
pub mod segment;
pub mod merge;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SegKvError, Result};
pub use config::Config;
pub use engine::Engine;
pub use entry::Entry;
pub use merge::MergeStats;
pub use segment::{RecoveryResult, Segment};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of segkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
