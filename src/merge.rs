//! Merge / Compaction
//!
//! Folds a run of read-only segments into one segment holding only the latest
//! value of every key.
//!
//! Sources are walked newest → oldest, so the first value copied for a key is
//! its latest one and every later sighting of that key is skipped.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Result, SegKvError};
use crate::segment::Segment;

/// What a merge did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub segments_merged: usize,

    /// Distinct keys copied into the merged segment
    pub keys_written: usize,

    /// Records that failed checksum validation and were left behind
    pub corrupt_records_dropped: usize,
}

/// Merge `sources` (ordered oldest → newest) into a new segment at `target`
///
/// A file already at `target` is replaced. On failure the partially written
/// target is removed and the sources are untouched.
pub fn merge_segments(
    sources: &[Arc<Segment>],
    target: &Path,
    sync_writes: bool,
) -> Result<(Segment, MergeStats)> {
    if target.exists() {
        fs::remove_file(target)?;
    }

    let merged = Segment::open_with(target, sync_writes)?;
    match copy_latest(sources, &merged) {
        Ok(stats) => Ok((merged, stats)),
        Err(e) => {
            merged.close()?;
            if let Err(cleanup) = merged.delete() {
                warn!(
                    target = %target.display(),
                    error = %cleanup,
                    "failed to remove partial merge output"
                );
            }
            Err(e)
        }
    }
}

fn copy_latest(sources: &[Arc<Segment>], merged: &Segment) -> Result<MergeStats> {
    let mut stats = MergeStats {
        segments_merged: sources.len(),
        ..MergeStats::default()
    };
    let mut seen = HashSet::new();

    for source in sources.iter().rev() {
        for key in source.keys() {
            // Also marks corrupt keys, so an older value is never resurrected.
            if !seen.insert(key.clone()) {
                continue;
            }

            match source.get(&key) {
                Ok(value) => {
                    merged.put(&key, &value)?;
                    stats.keys_written += 1;
                }
                Err(SegKvError::Corruption(reason)) => {
                    warn!(
                        segment = %source.path().display(),
                        key = %key,
                        %reason,
                        "dropping corrupt record during merge"
                    );
                    stats.corrupt_records_dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(stats)
}
