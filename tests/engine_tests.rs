//! Tests for Engine
//!
//! These tests verify:
//! - Basic set/get/list_keys operations
//! - Last-write-wins across restarts
//! - Crash recovery from a truncated active segment
//! - Concurrent readers and writers
//! - Engine lifecycle (open/close, directory lock, config)

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use segkv::config::{Config, SyncStrategy};
use segkv::engine::Engine;
use segkv::segment::SegmentId;
use segkv::SegKvError;
use serde::{Deserialize, Serialize, Serializer};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_engine(dir: &Path) -> Engine {
    init_tracing();
    let config = Config::builder()
        .data_dir(dir)
        .sync_strategy(SyncStrategy::EveryWrite)
        .build();
    Engine::open(config).unwrap()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path());
    (temp_dir, engine)
}

/// Segment files currently in `dir`, excluding the lock file
fn segment_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name != "LOCK")
        .collect();
    names.sort();
    names
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
    tags: Vec<String>,
}

/// A value whose serialization always fails
struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("unserializable"))
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let engine = open_engine(&data_dir);

    assert!(data_dir.exists());
    assert!(data_dir.join("LOCK").exists());
    assert!(engine.active_segment_path().exists());
    assert_eq!(engine.data_dir(), data_dir.as_path());
    assert!(engine.is_empty());
}

#[test]
fn test_engine_set_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("foo", "bar").unwrap();
    let value: String = engine.get("foo").unwrap();

    assert_eq!(value, "bar");
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();

    let result = engine.get::<String>("nope");

    assert!(matches!(result, Err(SegKvError::NotFound)));
    assert!(matches!(engine.metadata("nope"), Err(SegKvError::NotFound)));
}

#[test]
fn test_engine_structured_values() {
    let (_temp, engine) = setup_temp_engine();
    let user = User {
        name: "ada".to_string(),
        age: 36,
        tags: vec!["math".to_string(), "engines".to_string()],
    };

    engine.set("user:1", &user).unwrap();
    engine.set("count", &42u64).unwrap();
    engine.set("bytes", &vec![0u8, 1, 2, 255]).unwrap();

    assert_eq!(engine.get::<User>("user:1").unwrap(), user);
    assert_eq!(engine.get::<u64>("count").unwrap(), 42);
    assert_eq!(engine.get::<Vec<u8>>("bytes").unwrap(), vec![0, 1, 2, 255]);
}

#[test]
fn test_engine_empty_and_long_keys() {
    let (_temp, engine) = setup_temp_engine();
    let long_key = "k".repeat(4096);

    engine.set("", "empty key").unwrap();
    engine.set(&long_key, "long key").unwrap();

    assert_eq!(engine.get::<String>("").unwrap(), "empty key");
    assert_eq!(engine.get::<String>(&long_key).unwrap(), "long key");
}

#[test]
fn test_engine_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "v1").unwrap();
    engine.set("k", "v2").unwrap();

    assert_eq!(engine.get::<String>("k").unwrap(), "v2");
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_engine_list_keys_sorted() {
    let (_temp, engine) = setup_temp_engine();

    for key in ["b", "a", "c"] {
        engine.set(key, key).unwrap();
    }

    assert_eq!(engine.list_keys(true), vec!["a", "b", "c"]);

    let mut unsorted = engine.list_keys(false);
    unsorted.sort();
    assert_eq!(unsorted, vec!["a", "b", "c"]);
    assert!(engine.contains_key("a"));
    assert!(!engine.contains_key("d"));
}

#[test]
fn test_engine_metadata_points_into_active_segment() {
    let (_temp, engine) = setup_temp_engine();

    engine.set("k", "value").unwrap();
    let pointer = engine.metadata("k").unwrap();

    assert_eq!(pointer.segment, engine.active_segment_path());
    assert_eq!(
        pointer.value_offset + pointer.value_length,
        fs::metadata(&pointer.segment).unwrap().len()
    );
}

#[test]
fn test_engine_set_unserializable_value() {
    let (_temp, engine) = setup_temp_engine();
    let active = engine.active_segment_path();

    let result = engine.set("k", &Unserializable);

    assert!(matches!(result, Err(SegKvError::Encoding(_))), "got {:?}", result);
    assert!(!engine.contains_key("k"));
    assert!(engine.is_empty());
    assert_eq!(fs::metadata(&active).unwrap().len(), 0);

    // the engine keeps working
    engine.set("k", "v").unwrap();
    assert_eq!(engine.get::<String>("k").unwrap(), "v");
}

// =============================================================================
// Restart / Recovery Tests
// =============================================================================

#[test]
fn test_engine_last_write_wins_across_restarts() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("k", "v1").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<String>("k").unwrap(), "v1");
    engine.set("k", "v2").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<String>("k").unwrap(), "v2");
    assert_eq!(engine.replay_stats().segments_scanned, 2);
    assert_eq!(engine.replay_stats().records_recovered, 2);
}

#[test]
fn test_engine_recovers_union_of_segments() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("a", "1").unwrap();
    engine.set("b", "1").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("a", "2").unwrap();
    engine.set("c", "2").unwrap();
    engine.close().unwrap();

    assert_eq!(segment_files(temp_dir.path()).len(), 2);

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.list_keys(true), vec!["a", "b", "c"]);
    assert_eq!(engine.get::<String>("a").unwrap(), "2");
    assert_eq!(engine.get::<String>("b").unwrap(), "1");
    assert_eq!(engine.get::<String>("c").unwrap(), "2");
}

#[test]
fn test_engine_segments_created_in_order() {
    let temp_dir = TempDir::new().unwrap();

    let mut actives = Vec::new();
    for i in 0..3 {
        let engine = open_engine(temp_dir.path());
        engine.set("k", &i).unwrap();
        actives.push(engine.active_segment_path());
        engine.close().unwrap();
    }

    // names sort in creation order even within the same second
    let mut sorted = actives.clone();
    sorted.sort();
    assert_eq!(actives, sorted);

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<i32>("k").unwrap(), 2);
}

#[test]
fn test_engine_close_removes_unused_segment() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    let active = engine.active_segment_path();
    engine.close().unwrap();

    assert!(!active.exists());
    assert!(segment_files(temp_dir.path()).is_empty());
}

#[test]
fn test_engine_drop_removes_unused_segment() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    let active = engine.active_segment_path();
    drop(engine);

    assert!(!active.exists());
    assert!(segment_files(temp_dir.path()).is_empty());

    // a written segment survives the drop
    let engine = open_engine(temp_dir.path());
    engine.set("k", "v").unwrap();
    drop(engine);

    assert_eq!(segment_files(temp_dir.path()).len(), 1);
    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<String>("k").unwrap(), "v");
}

#[test]
fn test_engine_open_after_exhausted_sequence() {
    let temp_dir = TempDir::new().unwrap();
    let newest = SegmentId::new(9_999_999_999, u32::MAX);
    fs::write(temp_dir.path().join(newest.file_name()), b"").unwrap();

    let engine = open_engine(temp_dir.path());

    let active = SegmentId::from_path(&engine.active_segment_path()).unwrap();
    assert!(active > newest, "{} is not newer than {}", active, newest);

    engine.set("k", "v").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<String>("k").unwrap(), "v");
}

#[test]
fn test_engine_recovers_from_truncated_tail() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("a", "alpha").unwrap();
    engine.set("b", "bravo").unwrap();
    let b = engine.metadata("b").unwrap();
    engine.set("c", "charlie").unwrap();
    let segment_path = engine.active_segment_path();
    engine.close().unwrap();

    // chop the last record in half
    let good_len = b.value_offset + b.value_length;
    let full_len = fs::metadata(&segment_path).unwrap().len();
    let cut = good_len + (full_len - good_len) / 2;
    OpenOptions::new()
        .write(true)
        .open(&segment_path)
        .unwrap()
        .set_len(cut)
        .unwrap();

    let engine = open_engine(temp_dir.path());

    assert_eq!(engine.get::<String>("a").unwrap(), "alpha");
    assert_eq!(engine.get::<String>("b").unwrap(), "bravo");
    assert!(matches!(engine.get::<String>("c"), Err(SegKvError::NotFound)));
    assert_eq!(engine.replay_stats().truncated_segments, 1);
    assert_eq!(engine.replay_stats().bytes_discarded, cut - good_len);

    // new writes land in a fresh segment and survive another restart
    engine.set("c", "again").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<String>("c").unwrap(), "again");
}

#[test]
fn test_engine_get_reports_corrupt_value() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("foo", "bar").unwrap();
    let pointer = engine.metadata("foo").unwrap();
    engine.close().unwrap();

    // overwrite the string length prefix inside the value payload
    let mut bytes = fs::read(&pointer.segment).unwrap();
    let start = pointer.value_offset as usize;
    bytes[start..start + 8].copy_from_slice(&[0xFF; 8]);
    fs::write(&pointer.segment, &bytes).unwrap();

    let engine = open_engine(temp_dir.path());
    let err = engine.get::<String>("foo").unwrap_err();
    assert!(err.is_corrupt(), "got {:?}", err);
}

#[test]
fn test_engine_ignores_foreign_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("README"), b"hello").unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("k", "v").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.replay_stats().segments_scanned, 1);
    assert_eq!(engine.get::<String>("k").unwrap(), "v");
}

// =============================================================================
// Lifecycle / Config Tests
// =============================================================================

#[test]
fn test_engine_directory_lock() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    let second = Engine::open_path(temp_dir.path());
    assert!(matches!(second, Err(SegKvError::DirectoryLocked(_))));

    engine.close().unwrap();
    let reopened = Engine::open_path(temp_dir.path());
    assert!(reopened.is_ok());
}

#[test]
fn test_engine_missing_directory_without_create() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path().join("missing"))
        .create_if_missing(false)
        .build();

    let result = Engine::open(config);

    assert!(matches!(result, Err(SegKvError::Io(_))));
}

#[test]
fn test_engine_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sync_strategy(SyncStrategy::EveryNEntries { count: 0 })
        .build();

    assert!(matches!(Engine::open(config), Err(SegKvError::Config(_))));
}

#[test]
fn test_engine_sync_strategies() {
    for strategy in [
        SyncStrategy::EveryWrite,
        SyncStrategy::EveryNEntries { count: 3 },
        SyncStrategy::Manual,
    ] {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::builder()
            .data_dir(temp_dir.path())
            .sync_strategy(strategy)
            .build();

        let engine = Engine::open(config).unwrap();
        for i in 0..10 {
            engine.set(&format!("key{}", i), &i).unwrap();
        }
        engine.sync().unwrap();
        engine.close().unwrap();

        let engine = open_engine(temp_dir.path());
        assert_eq!(engine.len(), 10, "{:?}", strategy);
        assert_eq!(engine.get::<i32>("key7").unwrap(), 7);
    }
}

#[test]
fn test_engine_lazily_opens_sealed_segments() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("k", "v").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.open_segment_count(), 1);

    assert_eq!(engine.get::<String>("k").unwrap(), "v");
    assert_eq!(engine.open_segment_count(), 2);

    assert_eq!(engine.get::<String>("k").unwrap(), "v");
    assert_eq!(engine.open_segment_count(), 2);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_engine_concurrent_readers_and_writers() {
    let (_temp, engine) = setup_temp_engine();
    let stable = "stable value ".repeat(32);
    engine.set("stable", &stable).unwrap();

    const READERS: usize = 4;
    const WRITERS: usize = 4;
    const WRITES_PER_THREAD: usize = 50;

    crossbeam::scope(|s| {
        for _ in 0..READERS {
            s.spawn(|_| {
                for _ in 0..200 {
                    let value: String = engine.get("stable").unwrap();
                    assert_eq!(value, stable);
                }
            });
        }

        for w in 0..WRITERS {
            let engine = &engine;
            s.spawn(move |_| {
                for i in 0..WRITES_PER_THREAD {
                    engine.set(&format!("w{}-{}", w, i), &(w * 1000 + i)).unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(engine.len(), 1 + WRITERS * WRITES_PER_THREAD);

    let mut expected = HashMap::new();
    for w in 0..WRITERS {
        for i in 0..WRITES_PER_THREAD {
            expected.insert(format!("w{}-{}", w, i), w * 1000 + i);
        }
    }
    for (key, value) in expected {
        assert_eq!(engine.get::<usize>(&key).unwrap(), value);
    }
}

#[test]
fn test_engine_readers_see_complete_values_during_overwrites() {
    let (_temp, engine) = setup_temp_engine();
    engine.set("hot", &vec![0u8; 256]).unwrap();

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..200 {
                    let value: Vec<u8> = engine.get("hot").unwrap();
                    assert_eq!(value.len(), 256);
                    assert!(value.iter().all(|b| *b == value[0]));
                }
            });
        }

        s.spawn(|_| {
            for i in 1..=100u8 {
                engine.set("hot", &vec![i; 256]).unwrap();
            }
        });
    })
    .unwrap();

    assert_eq!(engine.get::<Vec<u8>>("hot").unwrap(), vec![100u8; 256]);
}

#[test]
fn test_engine_writes_after_manual_garbage_are_recovered() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.set("a", "1").unwrap();
    let segment_path = engine.active_segment_path();
    engine.close().unwrap();

    // simulate a torn write at the end of the old segment
    let mut file = OpenOptions::new().append(true).open(&segment_path).unwrap();
    file.write_all(&[0x05, 0x01]).unwrap();
    drop(file);

    let engine = open_engine(temp_dir.path());
    engine.set("b", "2").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get::<String>("a").unwrap(), "1");
    assert_eq!(engine.get::<String>("b").unwrap(), "2");
    assert!(engine.replay_stats().was_truncated());
}
