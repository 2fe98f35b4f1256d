//! Record Module
//!
//! The atomic unit persisted to a segment.
//!
//! ## Responsibilities
//! - Frame metadata with a varint length prefix
//! - Compute the value offset before the record is written
//! - Decode records back out of a segment for replay and lookups
//!
//! ## Record Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Record                                                  │
//! │ ┌──────────────┬───────────────────┬──────────────────┐ │
//! │ │ Varint (1-10)│ Metadata (N)      │ Value (val_len)  │ │
//! │ │ N            │ key, ts, path,    │ bincode payload  │ │
//! │ │              │ val_off, val_len  │                  │ │
//! │ └──────────────┴───────────────────┴──────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod metadata;
pub mod varint;

pub use codec::{decode_at, decode_value, encode, encode_value, read_value};
pub use metadata::Metadata;
