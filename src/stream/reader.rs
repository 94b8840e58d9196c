//! Stream reader: walks chunks, verifies checksums and hands out decoded
//! bytes through [`io::Read`].
//!
//! Chunk dispatch follows the type ranges in [`super::types`].  A stream must
//! open with an identifier chunk; a native stream must end with an
//! end-of-stream chunk whose total matches what was decoded.  After that
//! chunk a new identifier may start another stream, so concatenated streams
//! read back as one.
//!
//! With a seekable source the reader also implements [`io::Seek`], using the
//! index stored at the end of the stream.
//!
//! Decoding errors are final: once a chunk fails, every later read, skip or
//! seek returns the same error.  The reader never resynchronises.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};

use tracing::{debug, trace};

use super::index::Index;
use super::options::ReaderOptions;
use super::types::{
    is_user_chunk, parse_stream_id, ChunkClass, ChunkHeader, StreamFormat, CHECKSUM_SIZE,
    CHUNK_EOF, CHUNK_HEADER_SIZE, CHUNK_LEGACY_COMPRESSED, CHUNK_MINLZ_BLOCK,
    CHUNK_MINLZ_COMPRESSED_CRC, CHUNK_STREAM_ID, CHUNK_UNCOMPRESSED, STREAM_HEADER_SIZE,
    STREAM_ID_LEN,
};
use crate::block::{self, legacy};
use crate::crc::checksum;
use crate::error::{Error, Result};
use crate::varint::{get_uvarint, MAX_VARINT_LEN64};

/// Callback receiving the payload of a user chunk.
pub type UserChunkHandler = Box<dyn FnMut(&[u8]) -> Result<()> + Send>;

// ---------------------------------------------------------------------------
// Data chunk helpers, shared with the concurrent decoder
// ---------------------------------------------------------------------------

fn verify_checksum(expected: u32, data: &[u8]) -> Result<()> {
    let got = checksum(data);
    if got != expected {
        debug!(expected, got, "checksum mismatch");
        return Err(Error::Corrupt);
    }
    Ok(())
}

fn split_checksum(payload: &[u8]) -> Result<(u32, &[u8])> {
    if payload.len() < CHECKSUM_SIZE {
        return Err(Error::Corrupt);
    }
    let (crc, body) = payload.split_at(CHECKSUM_SIZE);
    Ok((u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]), body))
}

/// Decoded size of a `0x01`, `0x02` or `0x03` chunk payload.
pub(crate) fn data_chunk_len(chunk_type: u8, payload: &[u8], max_block: usize) -> Result<usize> {
    let (_, body) = split_checksum(payload)?;
    let n = match chunk_type {
        CHUNK_UNCOMPRESSED => body.len(),
        CHUNK_MINLZ_BLOCK | CHUNK_MINLZ_COMPRESSED_CRC => block::decoded_len(body)?,
        _ => return Err(Error::Corrupt),
    };
    if n > max_block {
        debug!(n, max_block, "block exceeds stream maximum");
        return Err(Error::TooLarge);
    }
    Ok(n)
}

/// Decodes a `0x01`, `0x02` or `0x03` chunk payload into `dst`, which must be
/// exactly the decoded size.
pub(crate) fn decode_data_chunk(
    chunk_type: u8,
    payload: &[u8],
    dst: &mut [u8],
    verify: bool,
) -> Result<()> {
    let (crc, body) = split_checksum(payload)?;
    match chunk_type {
        CHUNK_UNCOMPRESSED => {
            if body.len() != dst.len() {
                return Err(Error::Corrupt);
            }
            if verify {
                verify_checksum(crc, body)?;
            }
            dst.copy_from_slice(body);
        }
        CHUNK_MINLZ_BLOCK => {
            if block::decode_into(dst, body)? != dst.len() {
                return Err(Error::Corrupt);
            }
            if verify {
                verify_checksum(crc, dst)?;
            }
        }
        CHUNK_MINLZ_COMPRESSED_CRC => {
            if verify {
                verify_checksum(crc, body)?;
            }
            if block::decode_into(dst, body)? != dst.len() {
                return Err(Error::Corrupt);
            }
        }
        _ => return Err(Error::Corrupt),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Decompressing reader.
pub struct Reader<R: Read> {
    inner: R,
    opts: ReaderOptions,
    format: Option<StreamFormat>,
    /// Payload of the chunk being processed.
    chunk: Vec<u8>,
    decoded: Vec<u8>,
    pos: usize,
    /// Decoded bytes of the current stream, checked against its EOF chunk.
    stream_total: u64,
    stream_ended: bool,
    /// Decoded bytes handed out or skipped.
    position: u64,
    handlers: HashMap<u8, UserChunkHandler>,
    index: Option<Index>,
    /// First decoding failure; returned again by every later call.
    err: Option<Error>,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self::build(inner, ReaderOptions::default())
    }

    pub fn with_options(inner: R, opts: ReaderOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self::build(inner, opts))
    }

    fn build(inner: R, opts: ReaderOptions) -> Self {
        Reader {
            inner,
            opts,
            format: None,
            chunk: Vec::new(),
            decoded: Vec::new(),
            pos: 0,
            stream_total: 0,
            stream_ended: false,
            position: 0,
            handlers: HashMap::new(),
            index: None,
            err: None,
        }
    }

    /// Dialect of the stream being read, once its identifier has been seen.
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Registers `handler` for user chunks of type `id`.
    ///
    /// Chunks in `0xC0..=0xFD` are rejected as corrupt unless a handler is
    /// registered; chunks in `0x80..=0xBF` are skipped without one.
    pub fn on_user_chunk<F>(&mut self, id: u8, handler: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()> + Send + 'static,
    {
        if !is_user_chunk(id) {
            return Err(Error::InvalidConfiguration(format!(
                "chunk id {:#04x} is not in a user range",
                id
            )));
        }
        self.handlers.insert(id, Box::new(handler));
        Ok(())
    }

    /// Fails with the stored error, if any.
    fn check_failed(&self) -> Result<()> {
        match &self.err {
            Some(e) => Err(e.replay()),
            None => Ok(()),
        }
    }

    /// Keeps the first error of `result` so later calls report it too.
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.err.is_none() {
                debug!(error = %e, position = self.position, "reader failed, rejecting further reads");
                self.err = Some(e.replay());
            }
        }
        result
    }

    /// Discards the next `n` decoded bytes.
    pub fn skip(&mut self, mut n: u64) -> Result<()> {
        self.check_failed()?;
        loop {
            let avail = (self.decoded.len() - self.pos) as u64;
            if n <= avail {
                self.pos += n as usize;
                self.position += n;
                return Ok(());
            }
            n -= avail;
            self.position += avail;
            self.pos = self.decoded.len();
            if !self.fill()? {
                return Err(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
            }
        }
    }

    /// Replaces the buffer with the next non-empty decoded block.  `false` at
    /// a clean end of input.
    fn fill(&mut self) -> Result<bool> {
        self.decoded.clear();
        self.pos = 0;
        loop {
            match self.next_chunk() {
                Ok(true) if self.decoded.is_empty() => continue,
                Ok(more) => return Ok(more),
                Err(e) => {
                    self.decoded.clear();
                    return self.record(Err(e));
                }
            }
        }
    }

    /// Reads and dispatches one chunk.  `false` at a clean end of input.
    fn next_chunk(&mut self) -> Result<bool> {
        let mut hdr = [0u8; CHUNK_HEADER_SIZE];
        if !self.read_chunk_header(&mut hdr)? {
            return match self.format {
                Some(StreamFormat::MinLz { .. }) if !self.stream_ended => {
                    debug!(decoded = self.stream_total, "stream ends without end-of-stream chunk");
                    Err(Error::Corrupt)
                }
                _ => Ok(false),
            };
        }
        let ChunkHeader { chunk_type, len } = ChunkHeader::parse(&hdr);
        trace!(chunk_type, len, "chunk");

        if chunk_type == CHUNK_STREAM_ID {
            self.read_stream_id(len)?;
            return Ok(true);
        }
        let format = match self.format {
            Some(format) => format,
            None => {
                debug!(chunk_type, "chunk before stream identifier");
                return Err(Error::Corrupt);
            }
        };
        match chunk_type {
            CHUNK_UNCOMPRESSED
            | CHUNK_MINLZ_BLOCK
            | CHUNK_MINLZ_COMPRESSED_CRC
            | CHUNK_LEGACY_COMPRESSED => self.read_block(chunk_type, len, format)?,
            CHUNK_EOF if !format.is_legacy() => self.read_eof(len)?,
            _ => self.read_other(chunk_type, len)?,
        }
        Ok(true)
    }

    fn read_chunk_header(&mut self, hdr: &mut [u8; CHUNK_HEADER_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < hdr.len() {
            match self.inner.read(&mut hdr[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(false),
            CHUNK_HEADER_SIZE => Ok(true),
            _ => {
                debug!(filled, "truncated chunk header");
                Err(Error::Corrupt)
            }
        }
    }

    fn read_payload(&mut self, len: usize) -> Result<()> {
        self.chunk.resize(len, 0);
        self.inner.read_exact(&mut self.chunk).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                debug!(len, "truncated chunk payload");
                Error::Corrupt
            } else {
                Error::Io(e)
            }
        })
    }

    fn discard(&mut self, len: usize) -> Result<()> {
        let n = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())?;
        if n != len as u64 {
            debug!(len, n, "truncated skippable chunk");
            return Err(Error::Corrupt);
        }
        Ok(())
    }

    fn read_stream_id(&mut self, len: usize) -> Result<()> {
        if len != STREAM_ID_LEN {
            return Err(Error::Corrupt);
        }
        self.read_payload(len)?;
        let format = parse_stream_id(&self.chunk, self.opts.fallback)?;
        if let Some(StreamFormat::MinLz { .. }) = self.format {
            if !self.stream_ended {
                debug!("stream identifier inside an unfinished stream");
                return Err(Error::Corrupt);
            }
        }
        if format.max_block_size() > self.opts.max_block_size {
            debug!(
                announced = format.max_block_size(),
                limit = self.opts.max_block_size,
                "stream block size above reader limit"
            );
            return Err(Error::TooLarge);
        }
        if format.is_legacy() {
            debug!(?format, "reading legacy stream in fallback mode");
        } else {
            debug!(max_block_size = format.max_block_size(), "stream header");
        }
        self.format = Some(format);
        self.stream_total = 0;
        self.stream_ended = false;
        Ok(())
    }

    fn read_block(&mut self, chunk_type: u8, len: usize, format: StreamFormat) -> Result<()> {
        if self.stream_ended {
            debug!(chunk_type, "data after end-of-stream chunk");
            return Err(Error::Corrupt);
        }
        match chunk_type {
            CHUNK_LEGACY_COMPRESSED if !self.opts.fallback => return Err(Error::Corrupt),
            CHUNK_MINLZ_BLOCK | CHUNK_MINLZ_COMPRESSED_CRC if format.is_legacy() => {
                return Err(Error::Corrupt)
            }
            _ => {}
        }
        let max = format.max_block_size();
        if len < CHECKSUM_SIZE {
            return Err(Error::Corrupt);
        }
        let limit = match chunk_type {
            CHUNK_UNCOMPRESSED => CHECKSUM_SIZE + max,
            // Worst case of the legacy encoders, which covers ours too.
            _ => CHECKSUM_SIZE + 32 + max + max / 6,
        };
        if len > limit {
            debug!(len, limit, "chunk exceeds stream maximum");
            return Err(Error::TooLarge);
        }
        self.read_payload(len)?;
        let verify = !self.opts.ignore_crc;

        if chunk_type == CHUNK_LEGACY_COMPRESSED {
            let (crc, body) = split_checksum(&self.chunk)?;
            if legacy::decoded_len(body)? > max {
                return Err(Error::TooLarge);
            }
            self.decoded = legacy::decode(body)?;
            if verify {
                verify_checksum(crc, &self.decoded)?;
            }
        } else {
            let n = data_chunk_len(chunk_type, &self.chunk, max)?;
            self.decoded.resize(n, 0);
            decode_data_chunk(chunk_type, &self.chunk, &mut self.decoded, verify)?;
        }
        self.pos = 0;
        self.stream_total += self.decoded.len() as u64;
        Ok(())
    }

    fn read_eof(&mut self, len: usize) -> Result<()> {
        if self.stream_ended || len > MAX_VARINT_LEN64 {
            return Err(Error::Corrupt);
        }
        self.read_payload(len)?;
        if len > 0 {
            match get_uvarint(&self.chunk) {
                Some((total, n)) if n == len && total == self.stream_total => {}
                other => {
                    debug!(
                        announced = other.map(|(t, _)| t),
                        decoded = self.stream_total,
                        "end-of-stream total mismatch"
                    );
                    return Err(Error::Corrupt);
                }
            }
        }
        self.stream_ended = true;
        debug!(total = self.stream_total, "end of stream");
        Ok(())
    }

    fn read_other(&mut self, chunk_type: u8, len: usize) -> Result<()> {
        match ChunkClass::of(chunk_type) {
            ChunkClass::Skippable | ChunkClass::Padding => self.discard(len),
            class @ (ChunkClass::UserSkippable | ChunkClass::UserNonSkippable) => {
                if self.handlers.contains_key(&chunk_type) {
                    self.read_payload(len)?;
                    match self.handlers.get_mut(&chunk_type) {
                        Some(handler) => handler(&self.chunk),
                        None => Ok(()),
                    }
                } else if class == ChunkClass::UserSkippable {
                    self.discard(len)
                } else {
                    debug!(chunk_type, "no handler for non-skippable user chunk");
                    Err(Error::Corrupt)
                }
            }
            ChunkClass::NonSkippable | ChunkClass::StreamId => {
                debug!(chunk_type, "unknown non-skippable chunk");
                Err(Error::Corrupt)
            }
        }
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_failed()?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.decoded.len() && !self.fill()? {
            return Ok(0);
        }
        let n = buf.len().min(self.decoded.len() - self.pos);
        buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
        self.pos += n;
        self.position += n as u64;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Seeking
// ---------------------------------------------------------------------------

impl<R: Read + Seek> Reader<R> {
    /// Index stored at the end of the source, loaded on first use.
    ///
    /// The source must hold a single indexed stream starting at offset 0.
    pub fn index(&mut self) -> Result<&Index> {
        self.check_failed()?;
        if self.index.is_none() {
            let here = self.inner.stream_position()?;
            let index = Index::from_reader(&mut self.inner);
            self.inner.seek(SeekFrom::Start(here))?;
            match index? {
                Some(index) => self.index = Some(index),
                None => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "stream has no seek index",
                    )))
                }
            }
        }
        self.index.as_ref().ok_or(Error::Corrupt)
    }

    fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_failed()?;
        let total = self.index()?.total_uncompressed;
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n).unwrap_or(i64::MAX),
            SeekFrom::End(n) => total.saturating_add(n),
            SeekFrom::Current(n) => (self.position as i64).saturating_add(n),
        };
        if target < 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )));
        }
        let (compressed, uncompressed) = self.index()?.find(target)?;

        self.decoded.clear();
        self.pos = 0;
        self.stream_ended = false;
        if compressed < STREAM_HEADER_SIZE as i64 || self.format.is_none() {
            self.format = None;
            self.inner.seek(SeekFrom::Start(0))?;
            let header = self.next_chunk();
            self.record(header)?;
            if self.format.is_none() {
                return self.record(Err(Error::Corrupt));
            }
        }
        if compressed >= STREAM_HEADER_SIZE as i64 {
            self.inner.seek(SeekFrom::Start(compressed as u64))?;
        }
        self.stream_total = uncompressed as u64;
        self.position = uncompressed as u64;
        trace!(target, compressed, uncompressed, "seek");
        self.skip((target - uncompressed) as u64)?;
        Ok(target as u64)
    }
}

impl<R: Read + Seek> Seek for Reader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_to(pos).map_err(io::Error::from)
    }
}

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Decompresses a complete stream (or several concatenated streams).
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    decompress_with(src, &ReaderOptions::default())
}

pub fn decompress_with(src: &[u8], opts: &ReaderOptions) -> Result<Vec<u8>> {
    let mut r = Reader::with_options(src, opts.clone())?;
    let mut out = Vec::new();
    r.read_to_end(&mut out).map_err(Error::from_io)?;
    Ok(out)
}
