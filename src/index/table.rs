//! Index implementation
//!
//! HashMap-based index with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::Pointer;

/// Key → pointer map
#[derive(Debug, Default)]
pub struct Index {
    entries: RwLock<HashMap<String, Pointer>>,
}

impl Index {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the pointer for `key`
    ///
    /// Returns the pointer it replaced, if any.
    pub fn upsert(&self, key: String, pointer: Pointer) -> Option<Pointer> {
        self.entries.write().insert(key, pointer)
    }

    /// Look up the latest pointer for `key`
    pub fn lookup(&self, key: &str) -> Option<Pointer> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// All known keys, lexicographically sorted if `sorted`
    pub fn keys(&self, sorted: bool) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        if sorted {
            keys.sort_unstable();
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
