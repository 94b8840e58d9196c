// options.rs: Writer and reader preferences.
//
// Plain value types with public fields and documented defaults.  Setters that
// can fail return `Result`; everything is validated again when a `Writer` or
// `Reader` is built, so a hand-edited struct cannot slip past the checks.

use crate::block::Level;
use crate::config::{
    default_concurrency, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MAX_CONCURRENCY, MIN_BLOCK_SIZE,
};
use crate::error::{Error, Result};

use super::types::MAX_PADDING;

// ---------------------------------------------------------------------------
// WriterOptions
// ---------------------------------------------------------------------------

/// Stream writer preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Encoder effort. Default: `Level::Balanced`.
    pub level: Level,
    /// Uncompressed bytes per block, 1 KiB..=8 MiB. Default: 2 MiB.
    pub block_size: usize,
    /// Blocks encoded in parallel. 1 encodes on the calling thread.
    /// Default: one per logical CPU.
    pub concurrency: usize,
    /// Pad the finished stream to a multiple of this many bytes. 0 or 1
    /// disables padding. Default: 0.
    pub padding: usize,
    /// Append a seek index when the stream is closed. Default: true.
    pub add_index: bool,
    /// Checksum the compressed bytes (chunk `0x03`) instead of the decoded
    /// bytes (chunk `0x02`). Default: false.
    pub checksum_compressed: bool,
    /// Store every block raw. Default: false.
    pub uncompressed: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            level: Level::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            concurrency: default_concurrency(),
            padding: 0,
            add_index: true,
            checksum_compressed: false,
            uncompressed: false,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level from its numeric form (1 = fastest … 3 = smallest).
    pub fn set_level(&mut self, level: i32) -> Result<Level> {
        self.level = Level::try_from(level)?;
        Ok(self.level)
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_index(mut self, add_index: bool) -> Self {
        self.add_index = add_index;
        self
    }

    pub fn with_compressed_checksum(mut self, yes: bool) -> Self {
        self.checksum_compressed = yes;
        self
    }

    pub fn with_uncompressed(mut self, yes: bool) -> Self {
        self.uncompressed = yes;
        self
    }

    /// Rejects out-of-range sizes and worker counts.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(Error::InvalidConfiguration(format!(
                "block size {} outside {}..={}",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(Error::InvalidConfiguration(format!(
                "concurrency {} outside 1..={}",
                self.concurrency, MAX_CONCURRENCY
            )));
        }
        if self.padding > MAX_PADDING {
            return Err(Error::InvalidConfiguration(format!(
                "padding {} above {}",
                self.padding, MAX_PADDING
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReaderOptions
// ---------------------------------------------------------------------------

/// Stream reader preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Accept Snappy and S2 stream identifiers and legacy compressed chunks.
    /// Default: false.
    pub fallback: bool,
    /// Skip checksum verification. Default: false.
    pub ignore_crc: bool,
    /// Largest block size the reader will allocate for; streams announcing a
    /// bigger one are rejected with `TooLarge`. Default: 8 MiB.
    pub max_block_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            fallback: false,
            ignore_crc: false,
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, yes: bool) -> Self {
        self.fallback = yes;
        self
    }

    pub fn with_ignore_crc(mut self, yes: bool) -> Self {
        self.ignore_crc = yes;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.max_block_size) {
            return Err(Error::InvalidConfiguration(format!(
                "max block size {} outside {}..={}",
                self.max_block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }
}
