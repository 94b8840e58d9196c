//! Thin wrapper around the `crc32c` crate providing the masked CRC-32C used
//! by every checksummed stream chunk.
//!
//! The raw Castagnoli CRC is rotated right by 15 bits and offset by a fixed
//! constant before it is stored, so a checksum is never trivially equal to
//! the plain CRC of attacker-chosen bytes.

/// Constant added after rotation.
const MASK_DELTA: u32 = 0xa282_ead8;

/// Masked CRC-32C of `data`.
///
/// # Parity vectors
/// * `checksum(b"abcd")` == `0xb6e6_1068`
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    mask(crc32c::crc32c(data))
}

/// Applies the rotate-and-add mask to a raw CRC-32C value.
#[inline]
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}
