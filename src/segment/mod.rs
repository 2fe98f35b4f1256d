//! Segment Module
//!
//! Append-only files holding sequential runs of records.
//!
//! ## Responsibilities
//! - Append records at the end of the active segment
//! - Positioned reads from active and sealed segments
//! - Chronological naming so directory order matches creation order
//! - Lazy, cached read-only handles for sealed segments
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── LOCK
//!   ├── 1700000000-000000    sealed
//!   ├── 1700000000-000001    sealed (same second, next sequence)
//!   └── 1700000042-000000    active
//! ```

mod cache;
mod file;
mod id;

pub use cache::SegmentCache;
pub use file::Segment;
pub use id::SegmentId;
