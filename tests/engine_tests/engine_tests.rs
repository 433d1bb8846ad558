//! Tests for Engine
//!
//! These tests verify:
//! - Opening fresh and existing directories
//! - Basic get/put and last-write-wins across segments
//! - Rollover once the active segment passes the size limit
//! - Recovery after close/reopen, and close releasing file handles
//! - Directory validation (naming errors, stale merge files)
//! - Error propagation from segments
//! - Concurrent access patterns

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use segkv::config::Config;
use segkv::engine::Engine;
use segkv::SegKvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();
    (temp_dir, engine)
}

fn open_with_limit(path: &Path, limit: u64) -> Engine {
    let config = Config::builder()
        .data_dir(path)
        .segment_size_limit(limit)
        .build();
    Engine::open(config).unwrap()
}

/// File descriptors of this process currently pointing at `path`
#[cfg(target_os = "linux")]
fn open_handles_to(path: &Path) -> usize {
    let target = fs::canonicalize(path).unwrap();
    fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|fd| fd.ok())
        .filter_map(|fd| fs::read_link(fd.path()).ok())
        .filter(|link| *link == target)
        .count()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_directory_creates_first_segment() {
    let (temp, engine) = setup_temp_engine();

    assert_eq!(file_names(temp.path()), vec!["segment-data-1"]);
    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.last_segment_number(), 1);
}

#[test]
fn test_open_creates_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("db");

    let _engine = Engine::open_path(&data_dir).unwrap();

    assert!(data_dir.join("segment-data-1").exists());
}

#[test]
fn test_open_custom_prefix() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_prefix("log-")
        .build();

    let engine = Engine::open(config).unwrap();
    engine.put("k", "v").unwrap();

    assert_eq!(file_names(temp_dir.path()), vec!["log-1"]);
}

#[test]
fn test_open_rejects_unexpected_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("segment-data-1"), b"").unwrap();
    fs::write(temp_dir.path().join("notes.txt"), b"hello").unwrap();

    let err = Engine::open_path(temp_dir.path()).unwrap_err();

    assert!(matches!(err, SegKvError::Naming(_)), "got {:?}", err);
}

#[test]
fn test_open_rejects_prefix_without_number() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("segment-data-"), b"").unwrap();

    assert!(matches!(
        Engine::open_path(temp_dir.path()).unwrap_err(),
        SegKvError::Naming(_)
    ));
}

#[test]
fn test_open_removes_stale_merge_file() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open_path(temp_dir.path()).unwrap();
        engine.put("a", "1").unwrap();
        engine.close().unwrap();
    }
    fs::write(temp_dir.path().join("segment-data-1.merge"), b"partial").unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(file_names(temp_dir.path()), vec!["segment-data-1"]);
    assert_eq!(engine.get("a").unwrap(), "1");
}

#[test]
fn test_open_tracks_highest_segment_number() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("segment-data-3"), b"").unwrap();
    fs::write(temp_dir.path().join("segment-data-7"), b"").unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.segment_count(), 2);
    assert_eq!(engine.last_segment_number(), 7);
}

#[test]
fn test_open_orders_segments_lexicographically() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("segment-data-9"), b"").unwrap();
    fs::write(temp_dir.path().join("segment-data-10"), b"").unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();
    let paths = engine.segment_paths();

    // String order, so "10" comes before "9"
    assert!(paths[0].ends_with("segment-data-10"));
    assert!(paths[1].ends_with("segment-data-9"));
    assert_eq!(engine.last_segment_number(), 10);
}

#[test]
fn test_parse_segment_number() {
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-42"), Some(42));
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-"), None);
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-4x"), None);
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-+4"), None);
    assert_eq!(Engine::parse_segment_number("segment-data-", "other-4"), None);
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-10"), Some(10));
}

#[test]
fn test_parse_segment_number_requires_positive_canonical_number() {
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-0"), None);
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-01"), None);
    assert_eq!(Engine::parse_segment_number("segment-data-", "segment-data-007"), None);
}

#[test]
fn test_open_rejects_zero_and_padded_numbers() {
    for name in ["segment-data-0", "segment-data-01"] {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(name), b"").unwrap();

        assert!(
            matches!(Engine::open_path(temp_dir.path()).unwrap_err(), SegKvError::Naming(_)),
            "{} was accepted",
            name
        );
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_put_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.put("a", "1").unwrap();
    engine.put("b", "2").unwrap();

    assert_eq!(engine.get("a").unwrap(), "1");
    assert_eq!(engine.get("b").unwrap(), "2");
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    let err = engine.get("nonexistent").unwrap_err();

    assert!(err.is_not_found());
}

#[test]
fn test_engine_put_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.put("x", "1").unwrap();
    engine.put("x", "2").unwrap();

    assert_eq!(engine.get("x").unwrap(), "2");
}

#[test]
fn test_engine_empty_value_reads_as_absent() {
    let (_temp, engine) = setup_temp_engine();

    engine.put("blank", "").unwrap();

    assert!(engine.get("blank").unwrap_err().is_not_found());
}

#[test]
fn test_engine_put_get_distinct_keys() {
    let (_temp, engine) = setup_temp_engine();

    for i in 0..100 {
        engine.put(&format!("key{}", i), &format!("value{}", i)).unwrap();
    }
    for i in 0..100 {
        assert_eq!(engine.get(&format!("key{}", i)).unwrap(), format!("value{}", i));
    }
}

// =============================================================================
// Rollover Tests
// =============================================================================

#[test]
fn test_rollover_creates_new_segment() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with_limit(temp_dir.path(), 100);

    // Each record is 12 + 2 + 2 + 40 = 56 bytes
    engine.put("k1", "v1").unwrap(); // seg 1: 0 → 56
    engine.put("k2", "v2").unwrap(); // seg 1: 56 → 112
    assert_eq!(engine.segment_count(), 1);

    engine.put("k3", "v3").unwrap(); // seg 1 is over the limit → seg 2

    assert_eq!(engine.segment_count(), 2);
    assert_eq!(file_names(temp_dir.path()), vec!["segment-data-1", "segment-data-2"]);
    assert_eq!(engine.get("k1").unwrap(), "v1");
    assert_eq!(engine.get("k3").unwrap(), "v3");
}

#[test]
fn test_size_at_limit_does_not_roll_over() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with_limit(temp_dir.path(), 112);

    engine.put("k1", "v1").unwrap();
    engine.put("k2", "v2").unwrap();
    engine.put("k3", "v3").unwrap(); // size == limit, still fits

    assert_eq!(engine.segment_count(), 1);

    engine.put("k4", "v4").unwrap();
    assert_eq!(engine.segment_count(), 2);
}

#[test]
fn test_last_write_wins_across_segments() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with_limit(temp_dir.path(), 60);

    engine.put("x", "1").unwrap();
    engine.put("y", "filler").unwrap();
    engine.put("x", "2").unwrap(); // lands in segment 2

    assert_eq!(engine.segment_count(), 2);
    assert_eq!(engine.get("x").unwrap(), "2");
    assert_eq!(engine.get("y").unwrap(), "filler");
}

#[test]
fn test_rollover_with_default_limit() {
    let (temp, engine) = setup_temp_engine();
    let big = "v".repeat(99_000);

    engine.put("a", "1").unwrap();
    // 100 records of ~99 KB stay under 10,000,000 bytes; the 101st crosses it
    for i in 0..101 {
        engine.put(&format!("big{}", i), &big).unwrap();
    }
    assert_eq!(engine.segment_count(), 1);

    engine.put("trigger", "x").unwrap();

    assert!(temp.path().join("segment-data-2").exists());
    assert_eq!(engine.get("a").unwrap(), "1");
    assert_eq!(engine.get("trigger").unwrap(), "x");
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_reopen_preserves_values() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open_path(temp_dir.path()).unwrap();
        engine.put("key1", "value1").unwrap();
        engine.put("key2", "value2").unwrap();
        engine.put("key1", "value1b").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.get("key1").unwrap(), "value1b");
    assert_eq!(engine.get("key2").unwrap(), "value2");
}

#[test]
fn test_reopen_across_rollover() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_with_limit(temp_dir.path(), 100);
        engine.put("k1", "v1").unwrap();
        engine.put("k2", "v2").unwrap();
        engine.put("k1", "new").unwrap(); // segment 2
        engine.close().unwrap();
    }

    let engine = open_with_limit(temp_dir.path(), 100);

    assert_eq!(engine.segment_count(), 2);
    assert_eq!(engine.last_segment_number(), 2);
    assert_eq!(engine.get("k1").unwrap(), "new");
    assert_eq!(engine.get("k2").unwrap(), "v2");

    // Writes continue in the recovered active segment
    engine.put("k3", "v3").unwrap();
    assert_eq!(engine.get("k3").unwrap(), "v3");
}

#[test]
fn test_reopen_with_corrupted_tail_fails() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open_path(temp_dir.path()).unwrap();
        engine.put("key", "value").unwrap();
        engine.close().unwrap();
    }
    let path = temp_dir.path().join("segment-data-1");
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 1).unwrap();

    assert!(Engine::open_path(temp_dir.path()).unwrap_err().is_corruption());
}

// =============================================================================
// Error Propagation Tests
// =============================================================================

#[test]
fn test_corruption_surfaces_through_engine() {
    let (temp, engine) = setup_temp_engine();
    engine.put("key", "value").unwrap();

    let mut file = OpenOptions::new()
        .write(true)
        .open(temp.path().join("segment-data-1"))
        .unwrap();
    file.seek(SeekFrom::Start(15)).unwrap();
    file.write_all(b"w").unwrap();
    file.sync_all().unwrap();

    let err = engine.get("key").unwrap_err();
    assert!(err.is_corruption(), "got {:?}", err);
}

#[test]
fn test_corruption_in_newer_segment_stops_the_scan() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with_limit(temp_dir.path(), 60);

    engine.put("x", "old").unwrap(); // segment 1
    engine.put("y", "fill").unwrap(); // segment 1, now over the limit
    engine.put("x", "new").unwrap(); // segment 2

    // Damage "new" in segment 2 (value at 4 + 4 + 1 + 4 = 13)
    let mut file = OpenOptions::new()
        .write(true)
        .open(temp_dir.path().join("segment-data-2"))
        .unwrap();
    file.seek(SeekFrom::Start(13)).unwrap();
    file.write_all(b"N").unwrap();
    file.sync_all().unwrap();

    // No fallback to the older value
    assert!(engine.get("x").unwrap_err().is_corruption());
}

#[test]
fn test_put_after_close_fails() {
    let (_temp, engine) = setup_temp_engine();
    engine.put("a", "1").unwrap();

    engine.close().unwrap();

    assert!(matches!(
        engine.put("b", "2").unwrap_err(),
        SegKvError::SegmentClosed
    ));
    assert!(matches!(engine.get("a").unwrap_err(), SegKvError::SegmentClosed));
}

#[cfg(target_os = "linux")]
#[test]
fn test_close_releases_all_file_handles() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with_limit(temp_dir.path(), 100);
    engine.put("k1", &"x".repeat(100)).unwrap();
    engine.put("k2", "v2").unwrap();
    let paths = engine.segment_paths();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|path| open_handles_to(path) >= 1));

    engine.close().unwrap();

    for path in &paths {
        assert_eq!(open_handles_to(path), 0, "{} still open", path.display());
    }
}

#[test]
fn test_engine_debug_lists_segments() {
    let (_temp, engine) = setup_temp_engine();

    let debug = format!("{:?}", engine);
    assert!(debug.contains("segment-data-1"), "got {}", debug);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_puts_and_gets() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("t{}-{}", t, i);
                    engine.put(&key, &format!("v{}", i)).unwrap();
                    assert_eq!(engine.get(&key).unwrap(), format!("v{}", i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.get("t7-49").unwrap(), "v49");
}

#[test]
fn test_concurrent_puts_with_rollover_and_merge() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(open_with_limit(temp_dir.path(), 500));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..100 {
                    engine.put(&format!("t{}-{}", t, i), &format!("v{}", i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.segment_count(), 2);
    for t in 0..4 {
        for i in 0..100 {
            assert_eq!(engine.get(&format!("t{}-{}", t, i)).unwrap(), format!("v{}", i));
        }
    }
}
