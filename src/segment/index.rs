//! Segment hash index
//!
//! Key → record offset map plus the append cursor, shared between a segment
//! and its writer thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// In-memory index for one segment file
///
/// ## Concurrency:
/// - `offsets`: RwLock (lookups share it, the writer thread takes it briefly
///   after each append)
/// - `cursor`: only ever advanced by the writer thread
pub(crate) struct SegmentIndex {
    /// Key → offset of the record's first byte
    offsets: RwLock<HashMap<String, u64>>,

    /// Next append offset
    cursor: AtomicU64,
}

impl SegmentIndex {
    pub(crate) fn new(offsets: HashMap<String, u64>, cursor: u64) -> Self {
        Self {
            offsets: RwLock::new(offsets),
            cursor: AtomicU64::new(cursor),
        }
    }

    pub(crate) fn lookup(&self, key: &str) -> Option<u64> {
        self.offsets.read().get(key).copied()
    }

    /// Point `key` at a freshly appended record and advance the cursor past it
    pub(crate) fn record(&self, key: String, offset: u64, written: u64) {
        let mut offsets = self.offsets.write();
        offsets.insert(key, offset);
        self.cursor.store(offset + written, Ordering::Release);
    }

    pub(crate) fn set_cursor(&self, cursor: u64) {
        self.cursor.store(cursor, Ordering::Release);
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.offsets.read().contains_key(key)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.offsets.read().keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.read().len()
    }
}
