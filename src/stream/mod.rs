//! MinLZ stream container.
//!
//! A stream is a sequence of chunks: an identifier, checksummed blocks,
//! optional user chunks, an end-of-stream chunk and an optional seek index.
//! [`Writer`] and [`Reader`] adapt any `io::Write` / `io::Read`;
//! [`decode_concurrent`] decodes an indexed stream held in memory on several
//! threads.

pub mod concurrent;
pub mod index;
pub mod options;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export the most important public API items at the module level.
pub use concurrent::{decode_concurrent, decode_with_index};
pub use index::{Index, IndexEntry};
pub use options::{ReaderOptions, WriterOptions};
pub use reader::{decompress, decompress_with, Reader, UserChunkHandler};
pub use types::{ChunkClass, StreamFormat};
pub use writer::{compress, Writer};
