// minlz: MinLZ block and stream compression

pub mod config;
pub mod crc;
pub mod error;
pub mod varint;
pub mod block;
pub mod stream;

// ── Version constants ─────────────────────────────────────────────────────────
pub const MINLZ_VERSION_MAJOR: u32 = 1;
pub const MINLZ_VERSION_MINOR: u32 = 0;
pub const MINLZ_VERSION_RELEASE: u32 = 0;
pub const MINLZ_VERSION_NUMBER: u32 =
    MINLZ_VERSION_MAJOR * 100 * 100 + MINLZ_VERSION_MINOR * 100 + MINLZ_VERSION_RELEASE;
pub const MINLZ_VERSION_STRING: &str = "1.0.0";

/// Returns the runtime version number.
pub fn version_number() -> u32 {
    MINLZ_VERSION_NUMBER
}

/// Returns the runtime version string.
pub fn version_string() -> &'static str {
    MINLZ_VERSION_STRING
}

// ── Top-level re-exports ──────────────────────────────────────────────────────
pub use block::{decode, decode_into, decoded_len, encode, max_encoded_len, BlockError, Encoder, Level};
pub use config::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use error::{Error, Result};
pub use stream::{
    compress, decode_concurrent, decompress, Index, Reader, ReaderOptions, Writer, WriterOptions,
};
