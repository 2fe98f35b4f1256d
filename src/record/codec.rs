//! Record codec
//!
//! Frames a (metadata, value) pair as
//! `[varint meta_len][meta_len bytes metadata][value bytes]` and reads it back
//! out of a segment.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SegKvError};
use crate::index::Pointer;
use crate::segment::Segment;

use super::varint::{self, MAX_VARINT_LEN};
use super::Metadata;

/// Encode a record for appending
pub fn encode(metadata: &Metadata, value: &[u8]) -> Result<Bytes> {
    let meta = bincode::serialize(metadata).map_err(|e| SegKvError::Encoding(e.to_string()))?;

    let mut buf = BytesMut::with_capacity(MAX_VARINT_LEN + meta.len() + value.len());
    varint::encode_u64(&mut buf, meta.len() as u64);
    buf.put_slice(&meta);
    buf.put_slice(value);

    Ok(buf.freeze())
}

/// Decode the metadata block of the record starting at `offset`
///
/// Returns the metadata and the offset right after the metadata block, where
/// the value payload begins.
///
/// - `EndOfSegment` if `offset` is at or past the end of the segment
/// - `CorruptRecord` if the prefix is malformed, the claimed length runs past
///   the end of the segment, or the metadata does not decode
pub fn decode_at(segment: &Segment, offset: u64) -> Result<(Metadata, u64)> {
    let size = segment.size();
    if offset >= size {
        return Err(SegKvError::EndOfSegment { offset });
    }

    let available = size - offset;
    let head = segment.read_at(offset, available.min(MAX_VARINT_LEN as u64) as usize)?;

    let mut cursor = head.as_slice();
    let meta_len = varint::decode_u64(&mut cursor)
        .ok_or_else(|| SegKvError::corrupt(segment.path(), offset, "malformed length prefix"))?;
    let prefix_len = (head.len() - cursor.len()) as u64;

    let meta_start = offset + prefix_len;
    if meta_len == 0 || meta_len > size - meta_start {
        return Err(SegKvError::corrupt(
            segment.path(),
            offset,
            format!(
                "metadata length {} exceeds {} available bytes",
                meta_len,
                size - meta_start
            ),
        ));
    }

    let raw = segment.read_at(meta_start, meta_len as usize)?;
    let metadata: Metadata = bincode::deserialize(&raw).map_err(|e| {
        SegKvError::corrupt(segment.path(), offset, format!("undecodable metadata: {}", e))
    })?;

    Ok((metadata, meta_start + meta_len))
}

/// Read exactly the value bytes a pointer describes
pub fn read_value(segment: &Segment, pointer: &Pointer) -> Result<Vec<u8>> {
    segment.read_at(pointer.value_offset, pointer.value_length as usize)
}

/// Serialize a value payload
pub fn encode_value<V: Serialize + ?Sized>(value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| SegKvError::Encoding(e.to_string()))
}

/// Deserialize a value payload read from `pointer`
///
/// Bytes that do not decode are reported as a corrupt record.
pub fn decode_value<V: DeserializeOwned>(bytes: &[u8], pointer: &Pointer) -> Result<V> {
    bincode::deserialize(bytes).map_err(|e| {
        SegKvError::corrupt(
            &pointer.segment,
            pointer.value_offset,
            format!("undecodable value: {}", e),
        )
    })
}
