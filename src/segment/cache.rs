//! Segment handle cache
//!
//! Maps segment paths to open handles. Sealed segments are opened lazily on
//! first lookup and kept for the engine's lifetime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

use super::Segment;

/// Open segment handles, keyed by path
#[derive(Debug, Default)]
pub struct SegmentCache {
    handles: RwLock<HashMap<PathBuf, Arc<Segment>>>,
}

impl SegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already open segment (the active one)
    pub fn insert(&self, segment: Arc<Segment>) {
        self.handles
            .write()
            .insert(segment.path().to_path_buf(), segment);
    }

    /// Get a cached handle, opening the segment read-only if needed
    pub fn get_or_open(&self, path: &Path) -> Result<Arc<Segment>> {
        if let Some(segment) = self.handles.read().get(path) {
            return Ok(Arc::clone(segment));
        }

        let mut handles = self.handles.write();
        // another reader may have opened it while we waited
        if let Some(segment) = handles.get(path) {
            return Ok(Arc::clone(segment));
        }

        tracing::debug!(segment = %path.display(), "opening sealed segment");
        let segment = Arc::new(Segment::open_readonly(path)?);
        handles.insert(path.to_path_buf(), Arc::clone(&segment));
        Ok(segment)
    }

    pub fn remove(&self, path: &Path) -> Option<Arc<Segment>> {
        self.handles.write().remove(path)
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }

    /// Drop every cached handle
    pub fn clear(&self) {
        self.handles.write().clear();
    }
}
