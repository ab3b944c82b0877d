//! LEB128 unsigned variable-length integers used for record framing.

use crate::error::VarintError;

/// Longest encoding of a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

/// Encode an unsigned 64-bit integer as LEB128 into `buf`.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a LEB128 unsigned integer from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(VarintError::Overflow);
        }
        if byte & 0x80 == 0 {
            // Tenth byte may only carry the top bit of the value
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(VarintError::Overflow);
            }
            return Ok((result | (byte as u64) << shift, i + 1));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
    }
    Err(VarintError::Truncated)
}
