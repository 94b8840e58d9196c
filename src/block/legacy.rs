//! Legacy block decode mode: Snappy blocks and their S2 extension.
//!
//! A legacy block has no marker byte: it is `uvarint(decoded_len)` followed by
//! Snappy tags.  S2 adds a repeat form of copy1 (offset field zero) that reuses
//! the previous offset.  This mode is never selected by inspecting bytes; the
//! stream reader uses it only for chunk type `0x00` when fallback is enabled.

use super::decode::forward_copy;
use super::types::BlockError;
use crate::config::MAX_BLOCK_SIZE;
use crate::varint::get_uvarint;

const TAG_LITERAL: u8 = 0x00;
const TAG_COPY1: u8 = 0x01;
const TAG_COPY2: u8 = 0x02;

fn read_le(src: &[u8], pos: usize, n: usize) -> Result<usize, BlockError> {
    let bytes = src.get(pos..pos + n).ok_or(BlockError::Corrupt)?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b)))
}

fn read_header(src: &[u8]) -> Result<(usize, usize), BlockError> {
    let (want, n) = get_uvarint(src).ok_or(BlockError::Corrupt)?;
    if want > MAX_BLOCK_SIZE as u64 {
        return Err(BlockError::TooLarge);
    }
    Ok((want as usize, n))
}

/// Decoded size of the legacy block in `src`.
pub fn decoded_len(src: &[u8]) -> Result<usize, BlockError> {
    read_header(src).map(|(want, _)| want)
}

/// Decodes a Snappy/S2 block.
pub fn decode(src: &[u8]) -> Result<Vec<u8>, BlockError> {
    let (want, n) = read_header(src)?;
    let mut dst = vec![0u8; want];
    decode_tags(&mut dst, &src[n..])?;
    Ok(dst)
}

fn decode_tags(dst: &mut [u8], src: &[u8]) -> Result<(), BlockError> {
    let want = dst.len();
    let mut s = 0usize;
    let mut d = 0usize;
    let mut offset = 0usize;

    while s < src.len() {
        let tag = src[s];
        let len = match tag & 3 {
            TAG_LITERAL => {
                let x = usize::from(tag >> 2);
                let len = if x < 60 {
                    s += 1;
                    x + 1
                } else {
                    let extra = x - 59;
                    let len = read_le(src, s + 1, extra)? + 1;
                    s += 1 + extra;
                    len
                };
                if len > want - d || len > src.len() - s {
                    return Err(BlockError::Corrupt);
                }
                dst[d..d + len].copy_from_slice(&src[s..s + len]);
                d += len;
                s += len;
                continue;
            }
            TAG_COPY1 => {
                let low = read_le(src, s + 1, 1)?;
                s += 2;
                let field = usize::from(tag >> 2) & 7;
                let this_offset = usize::from(tag & 0xe0) << 3 | low;
                if this_offset == 0 {
                    let len = match field {
                        5 => {
                            let v = read_le(src, s, 1)? + 4;
                            s += 1;
                            v
                        }
                        6 => {
                            let v = read_le(src, s, 2)? + (1 << 8);
                            s += 2;
                            v
                        }
                        7 => {
                            let v = read_le(src, s, 3)? + (1 << 16);
                            s += 3;
                            v
                        }
                        f => f,
                    };
                    len + 4
                } else {
                    offset = this_offset;
                    field + 4
                }
            }
            TAG_COPY2 => {
                offset = read_le(src, s + 1, 2)?;
                s += 3;
                1 + usize::from(tag >> 2)
            }
            _ => {
                offset = read_le(src, s + 1, 4)?;
                s += 5;
                1 + usize::from(tag >> 2)
            }
        };

        if offset == 0 || offset > d || len > want - d {
            return Err(BlockError::Corrupt);
        }
        forward_copy(dst, d, offset, len);
        d += len;
    }

    if d != want {
        return Err(BlockError::Corrupt);
    }
    Ok(())
}
