//! Tag codec: emitters for every instruction kind and the single-tag decoder.
//!
//! Tag byte layout, low bits first:
//!
//! | low bits | kind                         | extra bytes                        |
//! |----------|------------------------------|------------------------------------|
//! | `00`     | literal (bit 2 clear)        | 0–3 length bytes, then the payload |
//! | `00`     | repeat (bit 2 set)           | 0–3 length bytes                   |
//! | `01`     | copy1, 10-bit offset         | 1 offset byte, 0–1 length byte     |
//! | `10`     | copy2, 16-bit offset         | 2 offset bytes, 0–3 length bytes   |
//! | `011`    | copy2 fused with 1–4 literals| 2 offset bytes, then literals      |
//! | `111`    | copy3, 21-bit offset, 0–3 lit| 3 more word bytes, 0–3 length bytes, then literals |
//!
//! Every emitter picks the tightest legal encoding for its arguments.  The
//! emitters assume the caller respects the documented ranges; the decoder
//! trusts nothing.

use super::types::{
    BlockError, COPY1_INLINE_MAX_LEN, COPY1_MAX_LEN, COPY1_MAX_OFFSET, COPY2_MAX_OFFSET,
    COPY2_MIN_OFFSET, COPY3_MAX_LITS, COPY3_MIN_OFFSET, COPY_EXT_BASE, COPY_TIER_BYTES,
    FUSED_COPY2_MAX_LEN, FUSED_COPY2_MAX_LITS, LITERAL_EXT_BASE, LITERAL_TIER_BYTES, MIN_MATCH,
};

const TAG_LITERAL: u8 = 0b00;
const TAG_REPEAT: u8 = 0b100;
const TAG_COPY1: u8 = 0b01;
const TAG_COPY2: u8 = 0b10;
const TAG_COPY2_FUSED: u8 = 0b011;
const TAG_COPY3: u8 = 0b111;

// ─────────────────────────────────────────────────────────────────────────────
// Decoded tag
// ─────────────────────────────────────────────────────────────────────────────

/// One decoded instruction.
///
/// `lits` on the copy variants counts literal bytes that follow the tag in
/// the input and are appended *before* the copy executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `len` raw bytes follow the tag.
    Literal { len: usize },
    /// Copy `len` bytes from the last used offset.
    Repeat { len: usize },
    /// Copy with an offset in `1..=1024`.
    Copy1 { offset: usize, len: usize },
    /// Copy with an offset in `64..=65_599`, optionally preceded by 1–4 literals.
    Copy2 { offset: usize, len: usize, lits: usize },
    /// Copy with an offset in `65_536..=2_162_687`, optionally preceded by 0–3 literals.
    Copy3 { offset: usize, len: usize, lits: usize },
}

impl Tag {
    /// Bytes appended to the output by this tag.
    pub fn produced(&self) -> usize {
        match *self {
            Tag::Literal { len } | Tag::Repeat { len } | Tag::Copy1 { len, .. } => len,
            Tag::Copy2 { len, lits, .. } | Tag::Copy3 { len, lits, .. } => len + lits,
        }
    }

    /// Literal payload bytes that follow the tag header in the input.
    pub fn literal_bytes(&self) -> usize {
        match *self {
            Tag::Literal { len } => len,
            Tag::Copy2 { lits, .. } | Tag::Copy3 { lits, .. } => lits,
            Tag::Repeat { .. } | Tag::Copy1 { .. } => 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
fn read_le(src: &[u8], pos: usize, n: usize) -> Result<usize, BlockError> {
    let bytes = src.get(pos..pos + n).ok_or(BlockError::Corrupt)?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b)))
}

/// Resolves a copy2/copy3 length code, reading extra bytes at `pos`.
/// Returns the length and the number of extra bytes consumed.
#[inline(always)]
fn copy_length(src: &[u8], pos: usize, code: usize) -> Result<(usize, usize), BlockError> {
    match code {
        0..=60 => Ok((code + MIN_MATCH, 0)),
        _ => {
            let n = COPY_TIER_BYTES[code - 61];
            Ok((read_le(src, pos, n)? + COPY_EXT_BASE, n))
        }
    }
}

/// Decodes the tag at the front of `src`.
///
/// Returns the tag and the number of header bytes consumed.  Literal payload
/// bytes are *not* included in the count; see [`Tag::literal_bytes`].  A tag
/// whose extra bytes run past the end of `src` is `Corrupt`.
pub fn decode_tag(src: &[u8]) -> Result<(Tag, usize), BlockError> {
    let first = *src.first().ok_or(BlockError::Corrupt)?;
    let value = usize::from(first >> 2);
    match first & 3 {
        0 => {
            let is_repeat = value & 1 != 0;
            let sel = value >> 1;
            let (len, used) = if sel < 29 {
                (sel + 1, 1)
            } else {
                let n = LITERAL_TIER_BYTES[sel - 29];
                (read_le(src, 1, n)? + LITERAL_EXT_BASE, 1 + n)
            };
            let tag = if is_repeat { Tag::Repeat { len } } else { Tag::Literal { len } };
            Ok((tag, used))
        }
        1 => {
            let low = read_le(src, 1, 1)?;
            let offset = (low << 2 | value >> 4) + 1;
            let code = value & 15;
            if code == 15 {
                let len = read_le(src, 2, 1)? + COPY1_INLINE_MAX_LEN;
                Ok((Tag::Copy1 { offset, len }, 3))
            } else {
                Ok((Tag::Copy1 { offset, len: code + MIN_MATCH }, 2))
            }
        }
        2 => {
            let offset = read_le(src, 1, 2)? + COPY2_MIN_OFFSET;
            let (len, extra) = copy_length(src, 3, value)?;
            Ok((Tag::Copy2 { offset, len, lits: 0 }, 3 + extra))
        }
        _ => {
            let lits = (value >> 1) & 3;
            if value & 1 == 0 {
                let offset = read_le(src, 1, 2)? + COPY2_MIN_OFFSET;
                let len = (value >> 3) + MIN_MATCH;
                Ok((Tag::Copy2 { offset, len, lits: lits + 1 }, 3))
            } else {
                let word = value | read_le(src, 1, 3)? << 6;
                let offset = (word >> 9) + COPY3_MIN_OFFSET;
                let (len, extra) = copy_length(src, 4, (word >> 3) & 63)?;
                Ok((Tag::Copy3 { offset, len, lits }, 4 + extra))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emitters
// ─────────────────────────────────────────────────────────────────────────────

/// Appends a 0–3 byte length extension for a literal or repeat selector
/// already shifted into `tag`.  `n` is the length minus the extension base.
#[inline(always)]
fn push_ext(dst: &mut Vec<u8>, tag: u8, n: usize) {
    if n < 1 << 8 {
        dst.extend_from_slice(&[(29 << 3) | tag, n as u8]);
    } else if n < 1 << 16 {
        dst.push((30 << 3) | tag);
        dst.extend_from_slice(&(n as u16).to_le_bytes());
    } else {
        dst.push((31 << 3) | tag);
        dst.extend_from_slice(&(n as u32).to_le_bytes()[..3]);
    }
}

/// Appends `lits` as a literal run.  Does nothing for an empty slice.
pub fn emit_literal(dst: &mut Vec<u8>, lits: &[u8]) {
    if lits.is_empty() {
        return;
    }
    let n = lits.len();
    if n < LITERAL_EXT_BASE {
        dst.push(TAG_LITERAL | ((n - 1) as u8) << 3);
    } else {
        push_ext(dst, TAG_LITERAL, n - LITERAL_EXT_BASE);
    }
    dst.extend_from_slice(lits);
}

/// Appends a repeat of `len` bytes (`len >= 1`) using the last offset.
pub fn emit_repeat(dst: &mut Vec<u8>, len: usize) {
    debug_assert!(len >= 1);
    if len < LITERAL_EXT_BASE {
        dst.push(TAG_REPEAT | ((len - 1) as u8) << 3);
    } else {
        push_ext(dst, TAG_REPEAT, len - LITERAL_EXT_BASE);
    }
}

/// Copy1: `offset` in `1..=1024`, `len >= 4`.  Lengths above 273 continue
/// as a repeat.
pub fn emit_copy1(dst: &mut Vec<u8>, offset: usize, len: usize) {
    debug_assert!((1..=COPY1_MAX_OFFSET).contains(&offset) && len >= MIN_MATCH);
    let off = (offset - 1) << 6;
    if len <= COPY1_INLINE_MAX_LEN {
        let x = (off | (len - MIN_MATCH) << 2 | usize::from(TAG_COPY1)) as u16;
        dst.extend_from_slice(&x.to_le_bytes());
    } else if len <= COPY1_MAX_LEN {
        let x = (off | 15 << 2 | usize::from(TAG_COPY1)) as u16;
        dst.extend_from_slice(&x.to_le_bytes());
        dst.push((len - COPY1_INLINE_MAX_LEN) as u8);
    } else {
        let x = (off | 14 << 2 | usize::from(TAG_COPY1)) as u16;
        dst.extend_from_slice(&x.to_le_bytes());
        emit_repeat(dst, len - COPY1_INLINE_MAX_LEN);
    }
}

/// Copy2: `offset` in `64..=65_599`, `len >= 4`.
pub fn emit_copy2(dst: &mut Vec<u8>, offset: usize, len: usize) {
    debug_assert!((COPY2_MIN_OFFSET..=COPY2_MAX_OFFSET).contains(&offset) && len >= MIN_MATCH);
    let off = ((offset - COPY2_MIN_OFFSET) as u16).to_le_bytes();
    if len < COPY_EXT_BASE + 1 {
        dst.push(TAG_COPY2 | ((len - MIN_MATCH) as u8) << 2);
        dst.extend_from_slice(&off);
        return;
    }
    let n = len - COPY_EXT_BASE;
    if n < 1 << 8 {
        dst.push(TAG_COPY2 | 61 << 2);
        dst.extend_from_slice(&off);
        dst.push(n as u8);
    } else if n < 1 << 16 {
        dst.push(TAG_COPY2 | 62 << 2);
        dst.extend_from_slice(&off);
        dst.extend_from_slice(&(n as u16).to_le_bytes());
    } else {
        dst.push(TAG_COPY2 | 63 << 2);
        dst.extend_from_slice(&off);
        dst.extend_from_slice(&(n as u32).to_le_bytes()[..3]);
    }
}

/// Copy3: `offset` in `65_536..=2_162_687`, `len >= 4`, with 0–3 fused
/// literals written after the tag.
pub fn emit_copy3(dst: &mut Vec<u8>, offset: usize, len: usize, lits: &[u8]) {
    debug_assert!(offset >= COPY3_MIN_OFFSET && len >= MIN_MATCH && lits.len() <= COPY3_MAX_LITS);
    let mut word = u32::from(TAG_COPY3)
        | (lits.len() as u32) << 3
        | ((offset - COPY3_MIN_OFFSET) as u32) << 11;
    if len < COPY_EXT_BASE + 1 {
        word |= ((len - MIN_MATCH) as u32) << 5;
        dst.extend_from_slice(&word.to_le_bytes());
    } else {
        let n = len - COPY_EXT_BASE;
        if n < 1 << 8 {
            dst.extend_from_slice(&(word | 61 << 5).to_le_bytes());
            dst.push(n as u8);
        } else if n < 1 << 16 {
            dst.extend_from_slice(&(word | 62 << 5).to_le_bytes());
            dst.extend_from_slice(&(n as u16).to_le_bytes());
        } else {
            dst.extend_from_slice(&(word | 63 << 5).to_le_bytes());
            dst.extend_from_slice(&(n as u32).to_le_bytes()[..3]);
        }
    }
    dst.extend_from_slice(lits);
}

/// Fused copy2: 1–4 literals, `offset` in `64..=65_599`, `len >= 4`.
/// Lengths above 11 continue as a repeat.
pub fn emit_copy_lits2(dst: &mut Vec<u8>, lits: &[u8], offset: usize, len: usize) {
    debug_assert!((1..=FUSED_COPY2_MAX_LITS).contains(&lits.len()));
    debug_assert!((COPY2_MIN_OFFSET..=COPY2_MAX_OFFSET).contains(&offset) && len >= MIN_MATCH);
    let inline = len.min(FUSED_COPY2_MAX_LEN);
    dst.push(TAG_COPY2_FUSED | ((inline - MIN_MATCH) as u8) << 5 | ((lits.len() - 1) as u8) << 3);
    dst.extend_from_slice(&((offset - COPY2_MIN_OFFSET) as u16).to_le_bytes());
    dst.extend_from_slice(lits);
    if len > FUSED_COPY2_MAX_LEN {
        emit_repeat(dst, len - FUSED_COPY2_MAX_LEN);
    }
}

/// Emits a copy with the narrowest tag kind covering `offset`.
pub fn emit_copy(dst: &mut Vec<u8>, offset: usize, len: usize) {
    if offset <= COPY1_MAX_OFFSET {
        emit_copy1(dst, offset, len);
    } else if offset <= COPY2_MAX_OFFSET {
        emit_copy2(dst, offset, len);
    } else {
        emit_copy3(dst, offset, len, &[]);
    }
}

/// `true` when `lits` pending literals may be fused into a copy at `offset`.
#[inline]
pub fn can_fuse(lits: usize, offset: usize) -> bool {
    offset >= COPY2_MIN_OFFSET
        && (lits <= COPY3_MAX_LITS || (offset <= COPY2_MAX_OFFSET && lits <= FUSED_COPY2_MAX_LITS))
}

/// Emits pending literals followed by a copy, fusing them into the copy tag
/// when the format allows it.  `lits` must be non-empty.
pub fn emit_copy_lits(dst: &mut Vec<u8>, lits: &[u8], offset: usize, len: usize) {
    if can_fuse(lits.len(), offset) {
        if offset <= COPY2_MAX_OFFSET {
            emit_copy_lits2(dst, lits, offset, len);
        } else {
            emit_copy3(dst, offset, len, lits);
        }
    } else {
        emit_literal(dst, lits);
        emit_copy(dst, offset, len);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Costs (tag bytes only, excluding literal payload)
// ─────────────────────────────────────────────────────────────────────────────

#[inline]
fn ext_cost(n: usize) -> usize {
    if n < 1 << 8 {
        1
    } else if n < 1 << 16 {
        2
    } else {
        3
    }
}

/// Header bytes of a literal run of `n` bytes.
#[inline]
pub fn literal_cost(n: usize) -> usize {
    match n {
        0 => 0,
        n if n < LITERAL_EXT_BASE => 1,
        n => 1 + ext_cost(n - LITERAL_EXT_BASE),
    }
}

/// Bytes of a repeat of `len` bytes.
#[inline]
pub fn repeat_cost(len: usize) -> usize {
    if len < LITERAL_EXT_BASE {
        1
    } else {
        1 + ext_cost(len - LITERAL_EXT_BASE)
    }
}

/// Bytes of a plain copy as chosen by [`emit_copy`].
#[inline]
pub fn copy_cost(offset: usize, len: usize) -> usize {
    let tiered = |base: usize| {
        if len <= COPY_EXT_BASE {
            base
        } else {
            base + ext_cost(len - COPY_EXT_BASE)
        }
    };
    if offset <= COPY1_MAX_OFFSET {
        if len <= COPY1_INLINE_MAX_LEN {
            2
        } else if len <= COPY1_MAX_LEN {
            3
        } else {
            2 + repeat_cost(len - COPY1_INLINE_MAX_LEN)
        }
    } else if offset <= COPY2_MAX_OFFSET {
        tiered(3)
    } else {
        tiered(4)
    }
}
