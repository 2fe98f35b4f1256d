//! Error types for SegKV
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using SegKvError
pub type Result<T> = std::result::Result<T, SegKvError>;

/// Unified error type for SegKV operations
#[derive(Debug, Error)]
pub enum SegKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record in {} at offset {offset}: {reason}", .segment.display())]
    CorruptRecord {
        segment: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Clean end of data. Consumed by replay, never returned from the engine.
    #[error("End of segment at offset {offset}")]
    EndOfSegment { offset: u64 },

    // -------------------------------------------------------------------------
    // Directory Errors
    // -------------------------------------------------------------------------
    #[error("Directory is locked by another process: {}", .0.display())]
    DirectoryLocked(PathBuf),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SegKvError {
    pub(crate) fn corrupt(segment: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        SegKvError::CorruptRecord {
            segment: segment.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Whether this error is a framing/decoding inconsistency
    pub fn is_corrupt(&self) -> bool {
        matches!(self, SegKvError::CorruptRecord { .. })
    }
}
