//! Stream container constants and chunk framing helpers.
//!
//! Every chunk is `type:u8`, `len:u24 LE`, then `len` bytes of payload.  The
//! type space is split into ranges that tell a reader what to do with a type
//! it does not know:
//!
//! | range       | meaning                                     |
//! |-------------|---------------------------------------------|
//! | `0x00–0x3F` | non-skippable, unknown types are an error   |
//! | `0x40–0x7F` | internal, skippable                         |
//! | `0x80–0xBF` | user defined, skippable                     |
//! | `0xC0–0xFD` | user defined, error unless a handler exists |
//! | `0xFE`      | padding                                     |
//! | `0xFF`      | stream identifier                           |

use crate::config::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Chunk types
// ─────────────────────────────────────────────────────────────────────────────

/// Snappy/S2 compressed block, CRC over the decoded bytes.  Fallback only.
pub const CHUNK_LEGACY_COMPRESSED: u8 = 0x00;
/// Raw block, CRC over the payload.
pub const CHUNK_UNCOMPRESSED: u8 = 0x01;
/// MinLZ block, CRC over the decoded bytes.
pub const CHUNK_MINLZ_BLOCK: u8 = 0x02;
/// MinLZ block, CRC over the compressed bytes.
pub const CHUNK_MINLZ_COMPRESSED_CRC: u8 = 0x03;
/// End of stream, payload is `uvarint(total decoded bytes)`.
pub const CHUNK_EOF: u8 = 0x20;
/// Seek index.
pub const CHUNK_INDEX: u8 = 0x40;
pub const CHUNK_PADDING: u8 = 0xfe;
pub const CHUNK_STREAM_ID: u8 = 0xff;

pub const MAX_NON_SKIPPABLE_CHUNK: u8 = 0x3f;
pub const MIN_USER_SKIPPABLE_CHUNK: u8 = 0x80;
pub const MAX_USER_SKIPPABLE_CHUNK: u8 = 0xbf;
pub const MIN_USER_NON_SKIPPABLE_CHUNK: u8 = 0xc0;
pub const MAX_USER_NON_SKIPPABLE_CHUNK: u8 = 0xfd;

// ─────────────────────────────────────────────────────────────────────────────
// Sizes and magics
// ─────────────────────────────────────────────────────────────────────────────

pub const CHUNK_HEADER_SIZE: usize = 4;
pub const CHECKSUM_SIZE: usize = 4;
/// Largest payload a 24-bit length can describe.
pub const MAX_CHUNK_SIZE: usize = (1 << 24) - 1;

pub const MAGIC_BODY: &[u8; 5] = b"MinLz";
pub const MAGIC_BODY_S2: &[u8; 6] = b"S2sTwO";
pub const MAGIC_BODY_SNAPPY: &[u8; 6] = b"sNaPpY";
/// Payload size of the stream identifier chunk in every dialect.
pub const STREAM_ID_LEN: usize = 6;
pub const STREAM_HEADER_SIZE: usize = CHUNK_HEADER_SIZE + STREAM_ID_LEN;

/// Block limit of S2 streams read in fallback mode.
pub const S2_MAX_BLOCK_SIZE: usize = 4 << 20;
/// Block limit of Snappy streams read in fallback mode.
pub const SNAPPY_MAX_BLOCK_SIZE: usize = 64 << 10;

/// Largest padding multiple a writer accepts.
pub const MAX_PADDING: usize = 4 << 20;

// ─────────────────────────────────────────────────────────────────────────────
// Chunk header
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed 4-byte chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: u8,
    pub len: usize,
}

impl ChunkHeader {
    pub fn parse(b: &[u8; CHUNK_HEADER_SIZE]) -> Self {
        ChunkHeader {
            chunk_type: b[0],
            len: usize::from(b[1]) | usize::from(b[2]) << 8 | usize::from(b[3]) << 16,
        }
    }

    /// Reads a header from the front of `src`, if four bytes are available.
    pub fn read(src: &[u8]) -> Option<Self> {
        let b: &[u8; CHUNK_HEADER_SIZE] = src.get(..CHUNK_HEADER_SIZE)?.try_into().ok()?;
        Some(Self::parse(b))
    }

    pub fn to_bytes(self) -> [u8; CHUNK_HEADER_SIZE] {
        let len = (self.len as u32).to_le_bytes();
        [self.chunk_type, len[0], len[1], len[2]]
    }
}

/// Appends a chunk header for `len` payload bytes.
pub fn put_chunk_header(dst: &mut Vec<u8>, chunk_type: u8, len: usize) {
    debug_assert!(len <= MAX_CHUNK_SIZE);
    dst.extend_from_slice(&ChunkHeader { chunk_type, len }.to_bytes());
}

/// What a reader does with a chunk type it has no dedicated handling for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkClass {
    /// `0x00–0x3F`: must be understood.
    NonSkippable,
    /// `0x40–0x7F`: skipped silently.
    Skippable,
    /// `0x80–0xBF`: handed to a registered callback, skipped otherwise.
    UserSkippable,
    /// `0xC0–0xFD`: handed to a registered callback, an error otherwise.
    UserNonSkippable,
    Padding,
    StreamId,
}

impl ChunkClass {
    pub fn of(chunk_type: u8) -> Self {
        match chunk_type {
            0x00..=MAX_NON_SKIPPABLE_CHUNK => ChunkClass::NonSkippable,
            0x40..=0x7f => ChunkClass::Skippable,
            MIN_USER_SKIPPABLE_CHUNK..=MAX_USER_SKIPPABLE_CHUNK => ChunkClass::UserSkippable,
            MIN_USER_NON_SKIPPABLE_CHUNK..=MAX_USER_NON_SKIPPABLE_CHUNK => {
                ChunkClass::UserNonSkippable
            }
            CHUNK_PADDING => ChunkClass::Padding,
            CHUNK_STREAM_ID => ChunkClass::StreamId,
        }
    }
}

/// `true` for ids a caller may use with `add_user_chunk` / `on_user_chunk`.
pub fn is_user_chunk(chunk_type: u8) -> bool {
    matches!(
        ChunkClass::of(chunk_type),
        ChunkClass::UserSkippable | ChunkClass::UserNonSkippable
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream identifier
// ─────────────────────────────────────────────────────────────────────────────

/// Dialect announced by a stream identifier chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Native stream with its negotiated maximum block size.
    MinLz { max_block_size: usize },
    /// S2 framing, accepted in fallback mode.
    S2,
    /// Snappy framing, accepted in fallback mode.
    Snappy,
}

impl StreamFormat {
    pub fn max_block_size(self) -> usize {
        match self {
            StreamFormat::MinLz { max_block_size } => max_block_size,
            StreamFormat::S2 => S2_MAX_BLOCK_SIZE,
            StreamFormat::Snappy => SNAPPY_MAX_BLOCK_SIZE,
        }
    }

    pub fn is_legacy(self) -> bool {
        !matches!(self, StreamFormat::MinLz { .. })
    }
}

/// Flags nibble for a writer using `block_size`: `ceil(log2(block_size)) - 10`.
pub fn block_size_flags(block_size: usize) -> u8 {
    let size = block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
    (size.next_power_of_two().trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros()) as u8
}

/// Full stream identifier chunk, header included.
pub fn stream_header(block_size: usize) -> [u8; STREAM_HEADER_SIZE] {
    let mut out = [0u8; STREAM_HEADER_SIZE];
    out[..CHUNK_HEADER_SIZE].copy_from_slice(
        &ChunkHeader { chunk_type: CHUNK_STREAM_ID, len: STREAM_ID_LEN }.to_bytes(),
    );
    out[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + MAGIC_BODY.len()].copy_from_slice(MAGIC_BODY);
    out[STREAM_HEADER_SIZE - 1] = block_size_flags(block_size);
    out
}

/// Parses a stream identifier payload.
///
/// Legacy dialects are only recognised when `fallback` is set.
pub fn parse_stream_id(payload: &[u8], fallback: bool) -> Result<StreamFormat> {
    if payload.len() != STREAM_ID_LEN {
        return Err(Error::Corrupt);
    }
    if &payload[..MAGIC_BODY.len()] == MAGIC_BODY {
        let flags = payload[MAGIC_BODY.len()];
        if flags >> 6 != 0 {
            return Err(Error::Corrupt);
        }
        let max_block_size = 1usize << ((flags & 15) + 10);
        if max_block_size > MAX_BLOCK_SIZE {
            return Err(Error::TooLarge);
        }
        return Ok(StreamFormat::MinLz { max_block_size });
    }
    if fallback {
        if payload == MAGIC_BODY_S2 {
            return Ok(StreamFormat::S2);
        }
        if payload == MAGIC_BODY_SNAPPY {
            return Ok(StreamFormat::Snappy);
        }
    }
    Err(Error::Corrupt)
}

// ─────────────────────────────────────────────────────────────────────────────
// Padding
// ─────────────────────────────────────────────────────────────────────────────

/// Size of the padding chunk (header included) that brings `written` up to a
/// multiple of `multiple`.  Zero when already aligned or padding is off.
pub fn padding_len(written: u64, multiple: usize) -> usize {
    if multiple <= 1 {
        return 0;
    }
    let leftover = (written % multiple as u64) as usize;
    if leftover == 0 {
        return 0;
    }
    let mut add = multiple - leftover;
    if add < CHUNK_HEADER_SIZE {
        add += multiple;
    }
    add
}

/// Appends a padding chunk of `total` bytes, header included.
pub fn put_padding(dst: &mut Vec<u8>, total: usize) {
    if total < CHUNK_HEADER_SIZE {
        return;
    }
    put_chunk_header(dst, CHUNK_PADDING, total - CHUNK_HEADER_SIZE);
    dst.resize(dst.len() + total - CHUNK_HEADER_SIZE, 0);
}
