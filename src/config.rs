// config.rs: Compile-time configuration constants and runtime defaults.
//
// Option structs that consume these values live in `stream::options`; the
// block layer only depends on the size limits.

// Hard upper bound on the uncompressed size of one block (8 MiB).
// Blocks above this size are rejected with `TooLarge` before any allocation.
pub const MAX_BLOCK_SIZE: usize = 8 << 20;

// Smallest block size a stream may advertise (1 KiB, flags nibble 0).
pub const MIN_BLOCK_SIZE: usize = 1 << 10;

// Default stream block size (2 MiB).
// Can be overridden per writer with `WriterOptions::block_size`.
pub const DEFAULT_BLOCK_SIZE: usize = 2 << 20;

// Default compression level (2 = balanced).
pub const DEFAULT_LEVEL: i32 = 2;

// Maximum number of workers accepted by the writer and the concurrent decoder.
pub const MAX_CONCURRENCY: usize = 256;

/// Default number of worker threads: one per logical CPU, capped at
/// [`MAX_CONCURRENCY`].
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, MAX_CONCURRENCY)
}
