//! Index Module
//!
//! In-memory map from key to the location of its latest value.
//!
//! ## Responsibilities
//! - One entry per key, replaced on every write (last-write-wins)
//! - Concurrent lookups from reader threads
//! - Key listing, optionally sorted
//!
//! ## Data Structure Choice
//! HashMap wrapped in RwLock:
//! - Point lookups only, no range scans needed
//! - Sorting is done on demand by `keys(true)`

mod table;

pub use table::Index;

use std::path::PathBuf;

/// Location of a value payload on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    /// Segment holding the value
    pub segment: PathBuf,

    /// Byte offset of the value payload within the segment
    pub value_offset: u64,

    /// Number of value bytes
    pub value_length: u64,
}
