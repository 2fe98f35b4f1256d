//! Record metadata
//!
//! Describes one record: which key it belongs to, when it was written and
//! where its value payload lives.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegKvError};
use crate::index::Pointer;

use super::varint;

/// Metadata block of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Key this record writes
    pub key: String,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,

    /// Path of the segment the record was appended to
    ///
    /// Informational only: non-UTF-8 paths are stored lossily, and replay
    /// points at the file it actually scanned.
    pub segment_path: String,

    /// Absolute offset of the value payload within the segment
    pub value_offset: u64,

    /// Number of value bytes following the metadata block
    pub value_length: u64,
}

impl Metadata {
    /// Build metadata for a record that will start at `record_offset`
    ///
    /// bincode encodes integers at fixed width, so the metadata size is known
    /// before `value_offset` is filled in.
    pub fn for_append(
        key: &str,
        segment_path: &Path,
        record_offset: u64,
        value_length: u64,
    ) -> Result<Self> {
        let mut metadata = Self {
            key: key.to_string(),
            timestamp: now_millis(),
            segment_path: segment_path.to_string_lossy().into_owned(),
            value_offset: 0,
            value_length,
        };

        let meta_len = metadata.encoded_len()?;
        metadata.value_offset = record_offset + varint::encoded_len(meta_len) as u64 + meta_len;
        Ok(metadata)
    }

    /// Size of the encoded metadata block, without its length prefix
    pub fn encoded_len(&self) -> Result<u64> {
        bincode::serialized_size(self).map_err(|e| SegKvError::Encoding(e.to_string()))
    }

    /// Pointer to this record's value inside `segment`
    pub fn pointer(&self, segment: &Path) -> Pointer {
        Pointer {
            segment: segment.to_path_buf(),
            value_offset: self.value_offset,
            value_length: self.value_length,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
