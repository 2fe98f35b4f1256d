//! # SegKV
//!
//! An embedded, append-only, log-structured key-value store with:
//! - Sequential on-disk segments, one active segment per process lifetime
//! - An in-memory index rebuilt from the segments at startup
//! - Crash recovery that tolerates a truncated trailing record
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │            set / get / list_keys  (write lock)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Record    │          │    Index    │
//!   │   Codec     │          │  (RwLock)   │
//!   └──────┬──────┘          └──────▲──────┘
//!          │                        │ replay
//!          ▼                        │
//!   ┌─────────────┐          ┌──────┴──────┐
//!   │  Segments   │─────────▶│   Replay    │
//!   │  (append)   │          │  (startup)  │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use segkv::Engine;
//!
//! let engine = Engine::open_path(std::path::Path::new("./data"))?;
//! engine.set("foo", "bar")?;
//! let value: String = engine.get("foo")?;
//! assert_eq!(value, "bar");
//! engine.close()?;
//! # Ok::<(), segkv::SegKvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod segment;
pub mod index;
pub mod replay;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{SegKvError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;
pub use index::Pointer;
pub use replay::ReplayStats;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SegKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
