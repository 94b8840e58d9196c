//! Crate-wide error type.
//!
//! Block-level routines report [`BlockError`](crate::block::BlockError), a
//! small `Copy` enum that is cheap to return from the hot decode loop.  The
//! stream layer widens it into [`Error`], which additionally carries I/O
//! failures and caller mistakes (bad level, bad options).
//!
//! Every corruption condition, including checksum mismatches, surfaces as
//! [`Error::Corrupt`].  Nothing in this crate retries: corruption is a
//! property of the bytes, not a transient condition.

use std::io;

use crate::block::BlockError;

/// Errors returned by the stream API and the one-shot helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed tag, out-of-range length or offset, checksum mismatch, bad
    /// magic or header, truncated stream.
    #[error("minlz: corrupt input")]
    Corrupt,

    /// A block or chunk exceeds the negotiated maximum block size, or a
    /// declared length does not fit the supported range.
    #[error("minlz: decoded block is too large")]
    TooLarge,

    /// Compression level outside of 1..=3.
    #[error("minlz: invalid compression level {0}")]
    InvalidLevel(i32),

    /// Options rejected at call time.
    #[error("minlz: invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure of the underlying reader or writer.
    #[error("minlz: i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias used throughout the stream API.
pub type Result<T> = std::result::Result<T, Error>;

impl From<BlockError> for Error {
    fn from(e: BlockError) -> Self {
        match e {
            BlockError::Corrupt => Error::Corrupt,
            BlockError::TooLarge => Error::TooLarge,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            Error::InvalidLevel(_) | Error::InvalidConfiguration(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

impl Error {
    /// Recovers a crate error that was wrapped into an `io::Error` by the
    /// `Read`/`Write` implementations.
    pub fn from_io(e: io::Error) -> Self {
        if e.get_ref().map_or(false, |inner| inner.is::<Error>()) {
            if let Some(inner) = e.into_inner() {
                if let Ok(err) = inner.downcast::<Error>() {
                    return *err;
                }
            }
            return Error::Corrupt;
        }
        Error::Io(e)
    }

    /// Copy of this error, handed out again after a reader or writer has
    /// failed.  I/O errors keep their kind and message.
    pub(crate) fn replay(&self) -> Error {
        match self {
            Error::Corrupt => Error::Corrupt,
            Error::TooLarge => Error::TooLarge,
            Error::InvalidLevel(n) => Error::InvalidLevel(*n),
            Error::InvalidConfiguration(msg) => Error::InvalidConfiguration(msg.clone()),
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }

    /// `true` for [`Error::Corrupt`].
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt)
    }
}
