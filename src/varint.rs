//! Base-128 variable-length integers.
//!
//! Two flavours are used by the format:
//!
//! - **Unsigned** (`put_uvarint` / `get_uvarint`): block length headers and
//!   the end-of-stream total.
//! - **Signed zig-zag** (`put_varint` / `get_varint`): every field of the seek
//!   index, whose deltas may be negative.
//!
//! Each byte carries 7 value bits; the high bit (0x80) flags continuation.
//! Decimal 300 encodes as `[0xAC, 0x02]`.

/// Longest encoding of a 64-bit value.
pub const MAX_VARINT_LEN64: usize = 10;

/// Appends `value` as an unsigned varint.
pub fn put_uvarint(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Number of bytes `put_uvarint` writes for `value`.
pub fn uvarint_len(mut value: u64) -> usize {
    let mut n = 1;
    while value >= 0x80 {
        value >>= 7;
        n += 1;
    }
    n
}

/// Reads an unsigned varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// input ends mid-value or the value overflows 64 bits.
pub fn get_uvarint(src: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &b) in src.iter().enumerate() {
        if i == MAX_VARINT_LEN64 {
            return None;
        }
        if b < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                return None;
            }
            return Some((value | (u64::from(b) << shift), i + 1));
        }
        value |= u64::from(b & 0x7f) << shift;
        shift += 7;
    }
    None
}

/// Appends `value` as a zig-zag signed varint.
pub fn put_varint(dst: &mut Vec<u8>, value: i64) {
    let zz = ((value << 1) ^ (value >> 63)) as u64;
    put_uvarint(dst, zz);
}

/// Reads a zig-zag signed varint from the front of `src`.
pub fn get_varint(src: &[u8]) -> Option<(i64, usize)> {
    let (zz, n) = get_uvarint(src)?;
    let value = ((zz >> 1) as i64) ^ -((zz & 1) as i64);
    Some((value, n))
}
