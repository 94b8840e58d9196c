//! Block decoder.
//!
//! # Security boundary
//!
//! This is the path that consumes untrusted bytes.  Every length and offset is
//! checked against the remaining input, the remaining output and the bytes
//! already produced before anything is copied.  Malformed input returns
//! [`BlockError::Corrupt`]; it never panics and never touches memory outside
//! the destination slice.

use super::tag::{decode_tag, Tag};
use super::types::{BlockError, BLOCK_MARKER};
use crate::config::MAX_BLOCK_SIZE;
use crate::varint::get_uvarint;

/// Parsed block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    /// Declared decoded size.
    want: usize,
    /// Bytes consumed by the marker and the length varint.
    len: usize,
    /// Payload is stored raw after the header.
    raw: bool,
}

fn read_header(src: &[u8]) -> Result<Header, BlockError> {
    match src.first() {
        None => return Err(BlockError::Corrupt),
        Some(&b) if b != BLOCK_MARKER => return Err(BlockError::Corrupt),
        Some(_) => {}
    }
    if src.len() == 1 {
        return Ok(Header { want: 0, len: 1, raw: true });
    }
    let (want, n) = get_uvarint(&src[1..]).ok_or(BlockError::Corrupt)?;
    if want > MAX_BLOCK_SIZE as u64 {
        return Err(BlockError::TooLarge);
    }
    let len = 1 + n;
    let rest = src.len() - len;
    if want == 0 {
        if rest > MAX_BLOCK_SIZE {
            return Err(BlockError::TooLarge);
        }
        return Ok(Header { want: rest, len, raw: true });
    }
    let want = want as usize;
    if want < rest {
        return Err(BlockError::Corrupt);
    }
    Ok(Header { want, len, raw: false })
}

/// Decoded size of the block in `src`, read from its header only.
pub fn decoded_len(src: &[u8]) -> Result<usize, BlockError> {
    read_header(src).map(|h| h.want)
}

/// Decodes the block in `src` into a new buffer.
pub fn decode(src: &[u8]) -> Result<Vec<u8>, BlockError> {
    let header = read_header(src)?;
    let mut dst = vec![0u8; header.want];
    decode_body(&mut dst, &src[header.len..], header)?;
    Ok(dst)
}

/// Decodes the block in `src` into the front of `dst`.
///
/// Returns the number of bytes written.  `dst` shorter than the declared size
/// is reported as [`BlockError::TooLarge`].
pub fn decode_into(dst: &mut [u8], src: &[u8]) -> Result<usize, BlockError> {
    let header = read_header(src)?;
    let out = dst.get_mut(..header.want).ok_or(BlockError::TooLarge)?;
    decode_body(out, &src[header.len..], header)?;
    Ok(header.want)
}

fn decode_body(dst: &mut [u8], body: &[u8], header: Header) -> Result<(), BlockError> {
    if header.raw {
        dst.copy_from_slice(body);
        Ok(())
    } else {
        decode_tags(dst, body)
    }
}

/// Runs the tag stream in `src`, filling exactly `dst.len()` bytes.
///
/// The repeat offset starts at 1 and is replaced by every copy, so a repeat
/// before any output fails the `offset > d` check.
pub(crate) fn decode_tags(dst: &mut [u8], src: &[u8]) -> Result<(), BlockError> {
    let want = dst.len();
    let mut s = 0usize;
    let mut d = 0usize;
    let mut offset = 1usize;

    while s < src.len() {
        let (tag, used) = decode_tag(&src[s..])?;
        s += used;

        let (lits, copy_len) = match tag {
            Tag::Literal { len } => (len, 0),
            Tag::Repeat { len } => (0, len),
            Tag::Copy1 { offset: o, len } => {
                offset = o;
                (0, len)
            }
            Tag::Copy2 { offset: o, len, lits } | Tag::Copy3 { offset: o, len, lits } => {
                offset = o;
                (lits, len)
            }
        };

        if lits > 0 {
            if lits > want - d || lits > src.len() - s {
                return Err(BlockError::Corrupt);
            }
            dst[d..d + lits].copy_from_slice(&src[s..s + lits]);
            d += lits;
            s += lits;
        }

        if copy_len > 0 {
            if copy_len > want - d || offset > d {
                return Err(BlockError::Corrupt);
            }
            forward_copy(dst, d, offset, copy_len);
            d += copy_len;
        }
    }

    if d != want {
        return Err(BlockError::Corrupt);
    }
    Ok(())
}

/// Copies `len` bytes from `d - offset` to `d`, with the result of a forward
/// byte-at-a-time copy even when the ranges overlap.
///
/// Each step copies a whole number of periods, so the source span can double
/// every iteration.  Callers have checked `offset <= d` and
/// `d + len <= dst.len()`.
#[inline]
pub(crate) fn forward_copy(dst: &mut [u8], d: usize, offset: usize, len: usize) {
    let start = d - offset;
    if offset >= len {
        dst.copy_within(start..start + len, d);
        return;
    }
    let mut copied = 0;
    while copied < len {
        let n = (len - copied).min(offset + copied);
        dst.copy_within(start..start + n, d + copied);
        copied += n;
    }
}
