//! Unsigned LEB128 varints
//!
//! Each byte carries 7 data bits; the high bit marks continuation.
//! A u64 takes at most 10 bytes.

use bytes::{Buf, BufMut};

/// Longest encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Encode an unsigned integer as a varint
pub fn encode_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `encode_u64` writes for `value`
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Decode a varint from the front of `buf`
///
/// Returns `None` if the buffer ends before the terminating byte or the
/// encoding overflows 64 bits.
pub fn decode_u64(buf: &mut impl Buf) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;

    loop {
        if !buf.has_remaining() {
            return None;
        }
        let byte = buf.get_u8();
        let bits = (byte & 0x7F) as u64;

        // tenth byte may only carry the top bit of a u64
        if shift == 63 && bits > 1 {
            return None;
        }
        value |= bits << shift;

        if byte & 0x80 == 0 {
            return Some(value);
        }

        shift += 7;
        if shift > 63 {
            return None;
        }
    }
}
