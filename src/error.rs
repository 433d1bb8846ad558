//! Error types for segkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using SegKvError
pub type Result<T> = std::result::Result<T, SegKvError>;

/// Unified error type for segkv operations
#[derive(Debug, Error)]
pub enum SegKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    /// A record on disk is truncated, malformed, or fails its checksum
    #[error("Segment corruption detected: {0}")]
    Corruption(String),

    #[error("Key not found")]
    KeyNotFound,

    /// The segment's writer has been stopped (closed or sealed by merge)
    #[error("Segment is closed")]
    SegmentClosed,

    // -------------------------------------------------------------------------
    // Directory Errors
    // -------------------------------------------------------------------------
    /// A file in the data directory does not follow `<prefix><number>`
    #[error("Unexpected file in data directory: {0}")]
    Naming(String),
}

impl SegKvError {
    /// True for the "keep looking in older segments" case
    pub fn is_not_found(&self) -> bool {
        matches!(self, SegKvError::KeyNotFound)
    }

    /// True when the error reports on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, SegKvError::Corruption(_))
    }
}
