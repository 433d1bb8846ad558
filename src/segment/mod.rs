//! Segment Module
//!
//! One append-only log file plus its in-memory hash index.
//!
//! ## Responsibilities
//! - Rebuild the index by replaying the file on open
//! - Append records through a single dedicated writer thread
//! - Serve point lookups by offset, verifying each record's checksum
//! - Report file size for rollover decisions
//!
//! ## Concurrency Model
//! ```text
//!   put() ──┐                       ┌──────────────────────┐
//!   put() ──┼── channel ──────────▶ │ writer thread        │── append ──▶ file
//!   put() ──┘   (blocks for ack)    │ (owns append handle) │
//!                                   └──────────┬───────────┘
//!                                              │ index.record()
//!   get() ── index.lookup() ──▶ offset ──▶ positional read (shared read handle)
//! ```

mod index;
mod reader;
mod recovery;
mod writer;

use std::fs::{self, File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::entry::{self, Entry};
use crate::error::{Result, SegKvError};

use self::index::SegmentIndex;
use self::reader::PositionalReader;
use self::writer::SegmentWriter;

pub use recovery::RecoveryResult;

/// An append-only segment file with its key → offset index
pub struct Segment {
    /// Current location of the file (changes once if merge renames it)
    path: PathBuf,

    /// Read-only handle opened alongside the writer; serves every lookup.
    /// `None` once the segment is closed.
    reader: RwLock<Option<File>>,

    /// Shared with the writer thread
    index: Arc<SegmentIndex>,

    writer: SegmentWriter,

    recovery: RecoveryResult,
}

impl Segment {
    /// Open (or create) a segment file and replay it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, false)
    }

    /// Open a segment, optionally syncing after every append
    pub fn open_with(path: impl AsRef<Path>, sync_writes: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let append_handle = OpenOptions::new().create(true).append(true).open(&path)?;
        let (offsets, recovery) = recovery::replay(&path)?;
        let reader = File::open(&path)?;

        let index = Arc::new(SegmentIndex::new(offsets, recovery.bytes_scanned));
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let writer = SegmentWriter::spawn(append_handle, Arc::clone(&index), sync_writes, &name)?;

        debug!(
            segment = %path.display(),
            entries = recovery.entries_recovered,
            keys = index.len(),
            bytes = recovery.bytes_scanned,
            "segment opened"
        );

        Ok(Self {
            path,
            reader: RwLock::new(Some(reader)),
            index,
            writer,
            recovery,
        })
    }

    /// Append a key/value record
    ///
    /// Blocks until the writer thread has appended and indexed the record.
    /// On failure the index is left untouched.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        entry::ensure_encodable(key.len(), value.len())?;
        let entry = Entry::new(key, value);
        self.writer.submit(key.to_owned(), entry.encode())?;
        Ok(())
    }

    /// Look up the latest value for `key` in this segment
    ///
    /// Returns:
    /// - `Ok(value)` — record found and its checksum matches
    /// - `Err(KeyNotFound)` — key not indexed here
    /// - `Err(Corruption)` — record truncated or checksum mismatch
    /// - `Err(SegmentClosed)` — the segment has been closed
    pub fn get(&self, key: &str) -> Result<String> {
        let handle = self.reader.read();
        let file = handle.as_ref().ok_or(SegKvError::SegmentClosed)?;
        let offset = self.index.lookup(key).ok_or(SegKvError::KeyNotFound)?;

        let mut reader = BufReader::new(PositionalReader::new(file, offset));
        let (value, stored) = entry::read_value(&mut reader)?;

        if entry::checksum(key.as_bytes(), &value) != stored {
            return Err(SegKvError::Corruption(format!(
                "checksum mismatch for key {:?} at offset {} in {}",
                key,
                offset,
                self.path.display()
            )));
        }

        String::from_utf8(value).map_err(|_| {
            SegKvError::Corruption(format!(
                "value for key {:?} at offset {} is not valid UTF-8",
                key, offset
            ))
        })
    }

    /// Current length of the file on disk
    pub fn size(&self) -> Result<u64> {
        let handle = self.reader.read();
        let file = handle.as_ref().ok_or(SegKvError::SegmentClosed)?;
        Ok(file.metadata()?.len())
    }

    /// Stop the writer and release the append handle
    ///
    /// Writes already queued complete first. Lookups keep working.
    pub fn seal(&self) {
        self.writer.shutdown();
    }

    /// Seal the segment and release its read handle too
    ///
    /// Afterwards both `put` and `get` fail with `SegmentClosed`.
    pub fn close(&self) -> Result<()> {
        self.seal();
        self.reader.write().take();
        Ok(())
    }

    /// Remove the segment's file from disk
    pub fn delete(&self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }

    /// Move the file to `to`, replacing anything already there
    pub(crate) fn relocate(&mut self, to: &Path) -> Result<()> {
        fs::rename(&self.path, to)?;
        self.path = to.to_path_buf();
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct keys indexed
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Snapshot of the indexed keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.index.keys()
    }

    /// Offset the next append will land at
    pub fn write_offset(&self) -> u64 {
        self.index.cursor()
    }

    /// What replaying the file found at open time
    pub fn recovery(&self) -> RecoveryResult {
        self.recovery
    }

    /// Whether writes are no longer accepted
    pub fn is_sealed(&self) -> bool {
        self.writer.is_closed()
    }

    /// Whether every file handle has been released
    pub fn is_closed(&self) -> bool {
        self.reader.read().is_none()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        self.writer.shutdown();
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("keys", &self.len())
            .field("write_offset", &self.write_offset())
            .field("sealed", &self.is_sealed())
            .field("closed", &self.is_closed())
            .finish()
    }
}
