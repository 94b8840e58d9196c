//! MinLZ block compression and decompression.
//!
//! A block is a self-delimited unit of at most 8 MiB: a `0x00` marker, the
//! decoded length as a uvarint, then a tag stream.  Blocks of up to 16 bytes,
//! and blocks that do not compress, are stored raw.  The legacy Snappy/S2
//! decoder lives in [`legacy`] and is only reached explicitly.

pub mod decode;
pub mod encode;
pub mod legacy;
pub mod tag;
pub mod types;

// Re-export the most important public API items at the module level.
pub use decode::{decode, decode_into, decoded_len};
pub use encode::{encode, Encoder};
pub use tag::Tag;
pub use types::{max_encoded_len, BlockError, Level};
