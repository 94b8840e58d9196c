//! Block-format constants, error and level types, load helpers and hashes.
//!
//! Everything in here is shared between the tag codec, the three encoder
//! levels and the decoder.  Loads are bounds-checked slice reads; callers
//! guarantee the index is in range by construction of their loop limits.

use crate::config::MAX_BLOCK_SIZE;
use crate::error::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Format constants
// ─────────────────────────────────────────────────────────────────────────────

/// Marker byte that opens every native block.
pub const BLOCK_MARKER: u8 = 0x00;

/// Minimum match length the encoder will emit.
pub const MIN_MATCH: usize = 4;

/// Inputs up to this size are always stored raw.
pub const MIN_NON_LITERAL_BLOCK_SIZE: usize = 16;

/// The match finder stops this many bytes before the end of the input so
/// every 4-byte load stays in bounds.
pub const INPUT_MARGIN: usize = 4;

/// Encoded output must stay this many bytes below `len(src) + header`, or the
/// block is stored raw instead.
pub const BAIL_MARGIN: usize = 11;

/// Copy1: 10-bit offset, stored minus one.
pub const COPY1_MIN_OFFSET: usize = 1;
pub const COPY1_MAX_OFFSET: usize = 1024;
/// Copy1 lengths up to this value fit in the tag byte.
pub const COPY1_INLINE_MAX_LEN: usize = 18;
/// Copy1 lengths up to this value fit in one extra byte.
pub const COPY1_MAX_LEN: usize = COPY1_INLINE_MAX_LEN + 255;

/// Copy2: 16-bit offset, stored minus 64.
pub const COPY2_MIN_OFFSET: usize = 64;
pub const COPY2_MAX_OFFSET: usize = 65_535 + COPY2_MIN_OFFSET;

/// Copy3: 21-bit offset, stored minus 65 536.
pub const COPY3_MIN_OFFSET: usize = 65_536;
pub const COPY3_MAX_OFFSET: usize = (1 << 21) - 1 + COPY3_MIN_OFFSET;

/// Fused copy2 carries 4..=11 bytes of match length inline.
pub const FUSED_COPY2_MAX_LEN: usize = 11;
/// Fused copy2 carries 1..=4 literals.
pub const FUSED_COPY2_MAX_LITS: usize = 4;
/// Copy3 carries 0..=3 literals.
pub const COPY3_MAX_LITS: usize = 3;

/// Literal and repeat lengths below this base fit in the tag byte.
pub const LITERAL_EXT_BASE: usize = 30;
/// Copy2/copy3 lengths from this base spill into extra bytes.
pub const COPY_EXT_BASE: usize = 64;

/// Extra bytes consumed by each length tier of a literal or repeat tag
/// (selector values 29, 30, 31).
pub const LITERAL_TIER_BYTES: [usize; 3] = [1, 2, 3];
/// Extra bytes consumed by each length tier of a copy2 or copy3 tag
/// (length codes 61, 62, 63).
pub const COPY_TIER_BYTES: [usize; 3] = [1, 2, 3];

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure signal of the block-level routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// Malformed tag stream: bad marker, out-of-range offset or length,
    /// truncated input, or produced size differing from the declared size.
    #[error("minlz: corrupt block")]
    Corrupt,
    /// Declared or requested size above the 8 MiB block limit.
    #[error("minlz: block too large")]
    TooLarge,
}

// ─────────────────────────────────────────────────────────────────────────────
// Compression level
// ─────────────────────────────────────────────────────────────────────────────

/// Encoder effort level.  All levels emit the same format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// Single hash table, greedy matching.
    Fastest = 1,
    /// Long and short hash tables, repeat and `s+1` candidate checks.
    #[default]
    Balanced = 2,
    /// Hash-chain search with cost-based selection and lazy matching.
    Smallest = 3,
}

impl TryFrom<i32> for Level {
    type Error = Error;

    fn try_from(level: i32) -> Result<Self, Error> {
        match level {
            1 => Ok(Level::Fastest),
            2 => Ok(Level::Balanced),
            3 => Ok(Level::Smallest),
            other => Err(Error::InvalidLevel(other)),
        }
    }
}

impl From<Level> for i32 {
    fn from(level: Level) -> i32 {
        level as i32
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Size helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Worst-case encoded size of a block of `src_len` bytes.
///
/// Returns `None` when `src_len` exceeds the 8 MiB block limit.
pub fn max_encoded_len(src_len: usize) -> Option<usize> {
    match src_len {
        0 => Some(1),
        n if n > MAX_BLOCK_SIZE => None,
        n => Some(n + 2),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Little-endian loads
// ─────────────────────────────────────────────────────────────────────────────

#[inline(always)]
pub fn load32(b: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]])
}

#[inline(always)]
pub fn load64(b: &[u8], i: usize) -> u64 {
    let mut tmp = [0u8; 8];
    tmp.copy_from_slice(&b[i..i + 8]);
    u64::from_le_bytes(tmp)
}

// ─────────────────────────────────────────────────────────────────────────────
// Hashes
// ─────────────────────────────────────────────────────────────────────────────

const PRIME_4_BYTES: u32 = 2_654_435_761;
const PRIME_6_BYTES: u64 = 227_718_039_650_203;
const PRIME_8_BYTES: u64 = 0xcf1b_bcdc_b7a5_6463;

/// Hash of the low 4 bytes of `u`, reduced to `bits` bits.
#[inline(always)]
pub fn hash4(u: u32, bits: u32) -> usize {
    (u.wrapping_mul(PRIME_4_BYTES) >> (32 - bits)) as usize
}

/// Hash of the low 6 bytes of `u`, reduced to `bits` bits.
#[inline(always)]
pub fn hash6(u: u64, bits: u32) -> usize {
    ((u << 16).wrapping_mul(PRIME_6_BYTES) >> (64 - bits)) as usize
}

/// Hash of all 8 bytes of `u`, reduced to `bits` bits.
#[inline(always)]
pub fn hash8(u: u64, bits: u32) -> usize {
    (u.wrapping_mul(PRIME_8_BYTES) >> (64 - bits)) as usize
}

// ─────────────────────────────────────────────────────────────────────────────
// Match length
// ─────────────────────────────────────────────────────────────────────────────

/// Number of equal bytes at `src[a..]` and `src[b..]`, with `a < b`, scanning
/// no further than the end of `src`.
#[inline]
pub fn match_len(src: &[u8], mut a: usize, mut b: usize) -> usize {
    let start = b;
    while b + 8 <= src.len() {
        let diff = load64(src, a) ^ load64(src, b);
        if diff != 0 {
            return b - start + (diff.trailing_zeros() / 8) as usize;
        }
        a += 8;
        b += 8;
    }
    while b < src.len() && src[a] == src[b] {
        a += 1;
        b += 1;
    }
    b - start
}
