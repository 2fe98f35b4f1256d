//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Replay segments into the index on startup
//! - Own the active segment and the write lock
//! - Serve point lookups through the index and cached segment handles
//! - Hold the directory lock for the engine's lifetime

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Config, SyncStrategy};
use crate::error::{Result, SegKvError};
use crate::index::{Index, Pointer};
use crate::record::{self, Metadata};
use crate::replay::{self, ReplayStats};
use crate::segment::{Segment, SegmentCache, SegmentId};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/sync): Serialized by the `active` mutex
///   - Only ONE write at a time
///   - Offset reservation, the write itself and the index publish all happen
///     under the lock, so readers never see a pointer to unwritten bytes
///
/// - **Reads** (get/list_keys): No write lock needed
///   - Index uses an internal RwLock
///   - Segments use positioned reads on shared handles
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Latest pointer per key (internal RwLock)
    index: Index,

    /// Open segment handles, active included (internal RwLock)
    segments: SegmentCache,

    /// The segment receiving appends; its mutex is the write lock
    active: Mutex<ActiveSegment>,

    /// What replay found when the engine was opened
    replay_stats: ReplayStats,

    /// Exclusive advisory lock on the data directory, released on drop
    _lock_file: File,
}

struct ActiveSegment {
    segment: Arc<Segment>,

    /// Appends since the last fsync
    unsynced: usize,
}

impl ActiveSegment {
    /// Count an append and fsync if the strategy says so
    fn after_append(&mut self, strategy: SyncStrategy) -> Result<()> {
        self.unsynced += 1;

        let due = match strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
            SyncStrategy::Manual => false,
        };

        if due {
            self.sync()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.segment.sync()?;
        self.unsynced = 0;
        Ok(())
    }
}

impl Engine {
    // =========================================================================
    // Internal Constants
    // =========================================================================
    const LOCK_FILENAME: &'static str = "LOCK";

    /// Attempts at picking a fresh segment name before giving up
    const MAX_CREATE_ATTEMPTS: usize = 16;

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create the data directory and lock it
    /// 2. Replay all segments into the index
    /// 3. Create a new active segment, newer than every existing one
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Directory and lock
        let dir = config.data_dir.clone();
        if !dir.exists() {
            if config.create_if_missing {
                fs::create_dir_all(&dir)?;
            } else {
                return Err(SegKvError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("data directory does not exist: {}", dir.display()),
                )));
            }
        }
        if !dir.is_dir() {
            return Err(SegKvError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("data path is not a directory: {}", dir.display()),
            )));
        }
        let lock_file = Self::lock_directory(&dir)?;

        // Step 2: Replay
        let index = Index::new();
        let replay_stats = replay::replay(&dir, &index)?;

        tracing::info!(
            dir = %dir.display(),
            segments = replay_stats.segments_scanned,
            records = replay_stats.records_recovered,
            keys = index.len(),
            truncated = replay_stats.truncated_segments,
            "replay complete"
        );

        // Step 3: Active segment
        let segment = Arc::new(Self::create_segment(&dir, replay_stats.last_segment)?);
        let segments = SegmentCache::new();
        segments.insert(Arc::clone(&segment));

        Ok(Self {
            config,
            index,
            segments,
            active: Mutex::new(ActiveSegment {
                segment,
                unsynced: 0,
            }),
            replay_stats,
            _lock_file: lock_file,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Get the value stored under `key`
    ///
    /// Fails with `NotFound` if the key was never written, and with
    /// `CorruptRecord` if the stored bytes no longer read or decode.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<V> {
        let pointer = self.index.lookup(key).ok_or(SegKvError::NotFound)?;
        let segment = self.segments.get_or_open(&pointer.segment)?;

        let bytes = record::read_value(&segment, &pointer)?;
        record::decode_value(&bytes, &pointer)
    }

    /// Store `value` under `key`
    ///
    /// Steps:
    /// 1. Encode the value (outside the lock)
    /// 2. Acquire write lock
    /// 3. Append the record to the active segment, fsync per strategy
    /// 4. Publish the new pointer to the index
    ///
    /// If any step fails the index is left untouched.
    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        let payload = record::encode_value(value)?;

        let mut active = self.active.lock();
        let segment = Arc::clone(&active.segment);

        let record_offset = segment.size();
        let metadata =
            Metadata::for_append(key, segment.path(), record_offset, payload.len() as u64)?;
        let bytes = record::encode(&metadata, &payload)?;

        let offset = segment.append(&bytes)?;
        debug_assert_eq!(offset, record_offset);

        if let Err(e) = active.after_append(self.config.sync_strategy) {
            active.unsynced = active.unsynced.saturating_sub(1);
            if let Err(trunc) = segment.truncate(offset) {
                tracing::warn!(
                    segment = %segment.path().display(),
                    offset,
                    error = %trunc,
                    "failed to roll back unsynced record"
                );
            }
            return Err(e);
        }

        self.index
            .upsert(key.to_string(), metadata.pointer(segment.path()));
        Ok(())
    }

    /// All known keys, lexicographically sorted if `sorted`
    pub fn list_keys(&self, sorted: bool) -> Vec<String> {
        self.index.keys(sorted)
    }

    /// Whether `key` has a value
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Location of the latest value for `key`
    pub fn metadata(&self, key: &str) -> Result<Pointer> {
        self.index.lookup(key).ok_or(SegKvError::NotFound)
    }

    /// Force an fsync of the active segment
    pub fn sync(&self) -> Result<()> {
        self.active.lock().sync()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the active segment, removes it if nothing was written to it,
    /// then releases all handles and the directory lock. Dropping the engine
    /// without calling `close` still removes an unused active segment, but
    /// skips the final sync and swallows errors.
    pub fn close(self) -> Result<()> {
        let segment = {
            let mut active = self.active.lock();
            active.sync()?;
            Arc::clone(&active.segment)
        };

        if segment.is_empty() {
            self.segments.remove(segment.path());
            fs::remove_file(segment.path())?;
            tracing::debug!(segment = %segment.path().display(), "removed empty active segment");
        }

        self.segments.clear();
        tracing::info!(dir = %self.config.data_dir.display(), keys = self.index.len(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of keys in the index
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the segment currently receiving appends
    pub fn active_segment_path(&self) -> PathBuf {
        self.active.lock().segment.path().to_path_buf()
    }

    /// Number of cached segment handles, active included
    pub fn open_segment_count(&self) -> usize {
        self.segments.len()
    }

    /// What replay found when the engine was opened
    pub fn replay_stats(&self) -> &ReplayStats {
        &self.replay_stats
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn lock_directory(dir: &Path) -> Result<File> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(Self::LOCK_FILENAME))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| SegKvError::DirectoryLocked(dir.to_path_buf()))?;

        Ok(lock_file)
    }

    /// Create a segment named after every existing one
    fn create_segment(dir: &Path, latest: Option<SegmentId>) -> Result<Segment> {
        let mut id = SegmentId::now_after(latest);

        for _ in 0..Self::MAX_CREATE_ATTEMPTS {
            let path = dir.join(id.file_name());
            match Segment::create(&path) {
                Ok(segment) => {
                    sync_dir(dir)?;
                    tracing::debug!(segment = %path.display(), "created active segment");
                    return Ok(segment);
                }
                Err(SegKvError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                    id = id.bump();
                }
                Err(e) => return Err(e),
            }
        }

        Err(SegKvError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free segment name after {}", id),
        )))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let active = self.active.get_mut();
        if !active.segment.is_empty() {
            return;
        }

        // already gone if close() ran
        match fs::remove_file(active.segment.path()) {
            Ok(()) => {
                tracing::debug!(segment = %active.segment.path().display(), "removed empty active segment");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    segment = %active.segment.path().display(),
                    error = %e,
                    "failed to remove empty active segment"
                );
            }
        }
    }
}

/// Persist the directory entry of a newly created file
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
