//! Segment identifiers
//!
//! A segment is named by the unix second it was created in plus a sequence
//! number that breaks ties within the same second:
//! `1700000000-000000`, `1700000000-000001`, `1700000001-000000`.
//! Bare timestamps (`1700000000`) are read as sequence 0.

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Chronological identity of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId {
    pub timestamp: u64,
    pub sequence: u32,
}

impl SegmentId {
    pub fn new(timestamp: u64, sequence: u32) -> Self {
        Self { timestamp, sequence }
    }

    /// Smallest id strictly newer than `latest` at wall-clock second `now`
    pub fn next_after(latest: Option<SegmentId>, now: u64) -> Self {
        match latest {
            Some(latest) if latest.timestamp >= now => latest.bump(),
            _ => Self::new(now, 0),
        }
    }

    /// Id for a segment created right now
    pub fn now_after(latest: Option<SegmentId>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::next_after(latest, now)
    }

    /// The smallest id newer than this one
    ///
    /// Moves to the next second once the sequence is exhausted.
    pub fn bump(self) -> Self {
        match self.sequence.checked_add(1) {
            Some(sequence) => Self::new(self.timestamp, sequence),
            None => Self::new(self.timestamp.saturating_add(1), 0),
        }
    }

    /// "1700000000-000003" → Some(SegmentId { 1700000000, 3 })
    pub fn parse(name: &str) -> Option<Self> {
        let (ts, seq) = match name.split_once('-') {
            Some((ts, seq)) => (ts, Some(seq)),
            None => (name, None),
        };

        if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let timestamp = ts.parse().ok()?;

        let sequence = match seq {
            Some(seq) if !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()) => {
                seq.parse().ok()?
            }
            Some(_) => return None,
            None => 0,
        };

        Some(Self::new(timestamp, sequence))
    }

    /// Parse the id from a segment file path
    pub fn from_path(path: &Path) -> Option<Self> {
        Self::parse(path.file_name()?.to_str()?)
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}-{:06}", self.timestamp, self.sequence)
    }
}
