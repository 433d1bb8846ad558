//! Engine Module
//!
//! The storage engine that coordinates segments.
//!
//! ## Responsibilities
//! - Discover and replay segment files on startup
//! - Route puts to the active segment, rolling over past the size limit
//! - Search segments newest → oldest for reads
//! - Compact read-only segments once more than two exist

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, SegKvError};
use crate::merge::{self, MergeStats};
use crate::segment::Segment;

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Segment list**: `RwLock<Vec<Arc<Segment>>>`, held only long enough to
///   clone a snapshot or to push/swap entries. No I/O happens under it.
/// - **Writes**: each segment has its own writer thread; puts on the active
///   segment do not take any engine-wide lock.
/// - **Rollover / merge**: serialized by `last_segment_number`. A merge runs
///   inline in the put that triggered it.
/// - **Reads**: lock-free apart from the snapshot clone.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Open segments, oldest → newest; the last one is active
    segments: RwLock<Vec<Arc<Segment>>>,

    /// Highest segment number in use; the lock also serializes rollover and merge
    last_segment_number: Mutex<u64>,
}

impl Engine {
    /// Suffix of the temporary file a merge writes into
    pub const MERGE_SUFFIX: &'static str = ".merge";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if needed
    /// 2. Drop leftovers of an interrupted merge
    /// 3. Validate every file name as `<prefix><number>`
    /// 4. Replay segments in name order, or create segment 1 if none exist
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Collect file names, removing stale merge output
        let mut names = Vec::new();
        for entry in fs::read_dir(&config.data_dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().map_err(|raw| {
                SegKvError::Naming(format!("{:?} is not a valid UTF-8 file name", raw))
            })?;

            if Self::is_merge_leftover(&config.segment_prefix, &name) {
                warn!(file = %name, "removing output of an interrupted merge");
                fs::remove_file(entry.path())?;
                continue;
            }
            names.push(name);
        }

        // Step 3/4: Recover existing segments or start fresh
        let (segments, last_number) = if names.is_empty() {
            let first = Segment::open_with(Self::segment_path_in(&config, 1), config.sync_writes)?;
            (vec![Arc::new(first)], 1)
        } else {
            Self::recover(&config, names)?
        };

        info!(
            data_dir = %config.data_dir.display(),
            segments = segments.len(),
            last_segment = last_number,
            "engine opened"
        );

        Ok(Self {
            config,
            segments: RwLock::new(segments),
            last_segment_number: Mutex::new(last_number),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Get the latest value for `key`
    ///
    /// Search order: newest → oldest segment. A segment that does not hold the
    /// key (or holds an empty value) passes to the next; any other error stops
    /// the search and is returned as-is.
    pub fn get(&self, key: &str) -> Result<String> {
        let segments = self.snapshot();

        for segment in segments.iter().rev() {
            match segment.get(key) {
                Ok(value) if value.is_empty() => continue,
                Ok(value) => return Ok(value),
                Err(SegKvError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(SegKvError::KeyNotFound)
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Check the active segment's size against the limit
    /// 2. Append there if it still fits
    /// 3. Otherwise roll over to a new segment, append, and merge if more
    ///    than two segments now exist
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        loop {
            let active = self.active_segment();

            let result = if active.size()? <= self.config.segment_size_limit {
                active.put(key, value)
            } else {
                self.rollover_and_put(&active, key, value)
            };

            match result {
                // A merge sealed the segment under us; retry on the new active one.
                Err(SegKvError::SegmentClosed) if !Arc::ptr_eq(&active, &self.active_segment()) => {
                    continue
                }
                other => return other,
            }
        }
    }

    /// Compact every segment except the active one
    ///
    /// Leaves the engine with the merged segment followed by the active one.
    /// A no-op when only the active segment exists.
    pub fn merge(&self) -> Result<MergeStats> {
        let _guard = self.last_segment_number.lock();
        self.merge_locked()
    }

    /// Stop every segment writer and release all file handles
    ///
    /// Gets and puts fail with `SegmentClosed` afterwards.
    pub fn close(&self) -> Result<()> {
        for segment in self.snapshot() {
            segment.close()?;
        }
        info!(data_dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the number of open segments
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Segment file paths, oldest → newest
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments
            .read()
            .iter()
            .map(|segment| segment.path().to_path_buf())
            .collect()
    }

    /// Highest segment number handed out so far
    pub fn last_segment_number(&self) -> u64 {
        *self.last_segment_number.lock()
    }

    /// Parse the number out of a segment file name
    /// ("segment-data-", "segment-data-42") → Some(42)
    pub fn parse_segment_number(prefix: &str, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(prefix)?;
        // Positive and canonical: no "0", no leading zeros
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        digits.parse().ok()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn snapshot(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    fn active_segment(&self) -> Arc<Segment> {
        let segments = self.segments.read();
        // open() always leaves at least one segment and nothing removes the last
        Arc::clone(&segments[segments.len() - 1])
    }

    fn recover(config: &Config, mut names: Vec<String>) -> Result<(Vec<Arc<Segment>>, u64)> {
        // Lexicographic, not numeric: "segment-data-10" sorts before "segment-data-9".
        names.sort();

        let mut numbers = Vec::with_capacity(names.len());
        for name in &names {
            let number = Self::parse_segment_number(&config.segment_prefix, name).ok_or_else(|| {
                SegKvError::Naming(format!(
                    "{} (expected {}<number>)",
                    name, config.segment_prefix
                ))
            })?;
            numbers.push(number);
        }

        let mut segments = Vec::with_capacity(names.len());
        for name in &names {
            let segment = Segment::open_with(config.data_dir.join(name), config.sync_writes)?;
            segments.push(Arc::new(segment));
        }

        let last_number = numbers.into_iter().max().unwrap_or(0);
        Ok((segments, last_number))
    }

    /// Called with the active segment observed as full
    fn rollover_and_put(&self, full: &Arc<Segment>, key: &str, value: &str) -> Result<()> {
        let mut last_number = self.last_segment_number.lock();

        // Another caller may have rolled over while we waited for the lock
        let current = self.active_segment();
        if !Arc::ptr_eq(&current, full) && current.size()? <= self.config.segment_size_limit {
            return current.put(key, value);
        }

        let number = *last_number + 1;
        let segment = Arc::new(Segment::open_with(
            self.segment_path(number),
            self.config.sync_writes,
        )?);
        *last_number = number;
        self.segments.write().push(Arc::clone(&segment));
        info!(segment = number, "rolled over to new segment");

        segment.put(key, value)?;

        if self.segment_count() > 2 {
            self.merge_locked()?;
        }
        Ok(())
    }

    /// Merge implementation (called with `last_segment_number` held)
    ///
    /// Order on disk: build `<oldest>.merge`, rename it over the oldest
    /// merged file, then remove the rest. A crash before the rename leaves
    /// the original segments intact.
    fn merge_locked(&self) -> Result<MergeStats> {
        let sources: Vec<Arc<Segment>> = {
            let segments = self.segments.read();
            segments[..segments.len() - 1].to_vec()
        };
        let Some(oldest) = sources.first() else {
            return Ok(MergeStats::default());
        };

        let slot = oldest.path().to_path_buf();
        let temp = Self::merge_temp_path(&slot);

        // Step 1: Seal sources; queued writes land before the walk starts
        // (sealed, not closed: lookups holding an older snapshot still read them)
        for segment in &sources {
            segment.seal();
        }

        // Step 2: Copy latest values into the temporary segment
        let (mut merged, stats) = merge::merge_segments(&sources, &temp, self.config.sync_writes)?;
        merged.seal();

        // Step 3: Move it into the oldest slot
        merged.relocate(&slot)?;

        // Step 4: Swap the in-memory list (rollover only appends, and we hold
        // its lock, so the sources are still the list's prefix)
        {
            let mut segments = self.segments.write();
            let retained = segments.split_off(sources.len());
            *segments = std::iter::once(Arc::new(merged)).chain(retained).collect();
        }

        // Step 5: Remove the now-redundant files
        for segment in &sources[1..] {
            segment.delete()?;
        }

        info!(
            merged = stats.segments_merged,
            keys = stats.keys_written,
            dropped = stats.corrupt_records_dropped,
            into = %slot.display(),
            "merged segments"
        );
        Ok(stats)
    }

    fn segment_path(&self, number: u64) -> PathBuf {
        Self::segment_path_in(&self.config, number)
    }

    fn segment_path_in(config: &Config, number: u64) -> PathBuf {
        config
            .data_dir
            .join(format!("{}{}", config.segment_prefix, number))
    }

    fn merge_temp_path(slot: &Path) -> PathBuf {
        let mut name = slot.as_os_str().to_owned();
        name.push(Self::MERGE_SUFFIX);
        PathBuf::from(name)
    }

    fn is_merge_leftover(prefix: &str, name: &str) -> bool {
        name.strip_suffix(Self::MERGE_SUFFIX)
            .map_or(false, |stem| Self::parse_segment_number(prefix, stem).is_some())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.config.data_dir)
            .field("segments", &self.segment_paths())
            .field("last_segment_number", &self.last_segment_number.try_lock().map(|n| *n))
            .finish()
    }
}
