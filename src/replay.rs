//! Segment Replay
//!
//! Rebuilds the index on startup by scanning every segment in creation order.
//!
//! ## Rules
//! - Segments are scanned oldest → newest, records front → back, so the
//!   latest write of a key overwrites earlier index entries
//! - A record that fails to decode ends the scan of its segment: the tail is
//!   the signature of a crash mid-append and is discarded without error
//! - Any other I/O failure aborts startup

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SegKvError};
use crate::index::{Index, Pointer};
use crate::record;
use crate::segment::{Segment, SegmentId};

/// Result of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of segment files scanned
    pub segments_scanned: u64,

    /// Number of complete records applied to the index
    pub records_recovered: u64,

    /// Number of segments whose tail was discarded
    pub truncated_segments: u64,

    /// Total bytes discarded across all truncated tails
    pub bytes_discarded: u64,

    /// Newest segment found in the directory
    pub last_segment: Option<SegmentId>,
}

impl ReplayStats {
    pub fn was_truncated(&self) -> bool {
        self.truncated_segments > 0
    }
}

/// Replay every segment in `dir` into `index`
pub fn replay(dir: &Path, index: &Index) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (id, path) in list_segments(dir)? {
        let segment = Segment::open_readonly(&path)?;
        scan_segment(&segment, index, &mut stats)?;
        stats.segments_scanned += 1;
        stats.last_segment = Some(id);
    }

    Ok(stats)
}

/// Scan a directory without keeping the index
///
/// Reports what a replay would recover and discard.
pub fn verify(dir: &Path) -> Result<ReplayStats> {
    replay(dir, &Index::new())
}

/// Segment files in `dir`, oldest first
///
/// Entries whose names are not segment ids are skipped.
pub fn list_segments(dir: &Path) -> Result<Vec<(SegmentId, PathBuf)>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if !entry.file_type()?.is_file() {
            continue;
        }

        match SegmentId::from_path(&path) {
            Some(id) => segments.push((id, path)),
            None => tracing::debug!(file = %path.display(), "skipping non-segment file"),
        }
    }

    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

/// Apply every complete record of `segment` to `index`
fn scan_segment(segment: &Segment, index: &Index, stats: &mut ReplayStats) -> Result<()> {
    let size = segment.size();
    let mut cursor = 0u64;

    loop {
        match next_record(segment, cursor) {
            Ok((key, pointer, next)) => {
                index.upsert(key, pointer);
                stats.records_recovered += 1;
                cursor = next;
            }
            Err(SegKvError::EndOfSegment { .. }) => return Ok(()),
            Err(e) if e.is_corrupt() => {
                let discarded = size - cursor;
                tracing::warn!(
                    segment = %segment.path().display(),
                    offset = cursor,
                    bytes = discarded,
                    error = %e,
                    "discarding unreadable segment tail"
                );
                stats.truncated_segments += 1;
                stats.bytes_discarded += discarded;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decode the record at `cursor` and check that its value is fully present
fn next_record(segment: &Segment, cursor: u64) -> Result<(String, Pointer, u64)> {
    let (metadata, value_start) = record::decode_at(segment, cursor)?;

    if metadata.value_offset != value_start {
        return Err(SegKvError::corrupt(
            segment.path(),
            cursor,
            format!(
                "value offset {} does not follow metadata ending at {}",
                metadata.value_offset, value_start
            ),
        ));
    }

    let value_end = value_start
        .checked_add(metadata.value_length)
        .filter(|end| *end <= segment.size())
        .ok_or_else(|| {
            SegKvError::corrupt(
                segment.path(),
                cursor,
                format!("value of {} bytes runs past end of segment", metadata.value_length),
            )
        })?;

    let pointer = metadata.pointer(segment.path());
    Ok((metadata.key, pointer, value_end))
}
