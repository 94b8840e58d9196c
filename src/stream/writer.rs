//! Stream writer: buffers input into blocks, encodes them (in parallel when
//! configured) and frames them as checksummed chunks.
//!
//! Layout of a finished stream:
//!
//! ```text
//! stream id | block chunks and user chunks ... | [index] | [padding] | eof
//! ```
//!
//! The end-of-stream chunk is always last, so a stream cut anywhere before
//! it fails to decode.  Blocks are encoded in batches of at most
//! `concurrency` groups, each worker owning one [`Encoder`] for the life of
//! the writer; a batch is collected in input order before anything is
//! written, so the output does not depend on scheduling.
//!
//! The first error from the destination or the encoder is kept: every later
//! call returns it again and nothing more is written.

use std::io::{self, Write};

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use super::index::Index;
use super::options::WriterOptions;
use super::types::{
    is_user_chunk, padding_len, put_chunk_header, put_padding, stream_header, CHECKSUM_SIZE,
    CHUNK_EOF, CHUNK_MINLZ_BLOCK, CHUNK_MINLZ_COMPRESSED_CRC, CHUNK_UNCOMPRESSED, MAX_CHUNK_SIZE,
};
use crate::block::{max_encoded_len, Encoder};
use crate::crc::checksum;
use crate::error::{Error, Result};
use crate::varint::put_uvarint;

/// Frames one block as a complete chunk, header included.
fn frame_block(enc: &mut Encoder, block: &[u8], opts: &WriterOptions) -> Result<Vec<u8>> {
    if !opts.uncompressed {
        let mut encoded = Vec::with_capacity(max_encoded_len(block.len()).unwrap_or(0));
        enc.encode_into(&mut encoded, block, opts.level)?;
        // A zero length after the marker means the encoder fell back to raw.
        let stored_raw = encoded.get(1) == Some(&0);
        if !stored_raw && encoded.len() < block.len() {
            let (chunk_type, crc) = if opts.checksum_compressed {
                (CHUNK_MINLZ_COMPRESSED_CRC, checksum(&encoded))
            } else {
                (CHUNK_MINLZ_BLOCK, checksum(block))
            };
            let mut out = Vec::with_capacity(4 + CHECKSUM_SIZE + encoded.len());
            put_chunk_header(&mut out, chunk_type, CHECKSUM_SIZE + encoded.len());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&encoded);
            return Ok(out);
        }
    }
    let mut out = Vec::with_capacity(4 + CHECKSUM_SIZE + block.len());
    put_chunk_header(&mut out, CHUNK_UNCOMPRESSED, CHECKSUM_SIZE + block.len());
    out.extend_from_slice(&checksum(block).to_le_bytes());
    out.extend_from_slice(block);
    Ok(out)
}

/// Compressing writer.
///
/// Call [`close`](Writer::close) or [`into_inner`](Writer::into_inner) to
/// finish the stream.  Dropping an unclosed writer closes it and logs any
/// error at `warn`.
pub struct Writer<W: Write> {
    inner: Option<W>,
    opts: WriterOptions,
    /// One per worker, created on first use and kept for reuse.
    encoders: Vec<Encoder>,
    pool: Option<rayon::ThreadPool>,
    pending: Vec<u8>,
    index: Index,
    /// Bytes handed to `inner` so far.
    written: u64,
    /// Input bytes framed so far.
    uncompressed: u64,
    header_written: bool,
    closed: bool,
    /// First failure; returned again by every later call.
    err: Option<Error>,
}

impl<W: Write> Writer<W> {
    /// Writer with default options.
    pub fn new(inner: W) -> Self {
        Self::build(inner, WriterOptions::default())
    }

    pub fn with_options(inner: W, opts: WriterOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self::build(inner, opts))
    }

    fn build(inner: W, opts: WriterOptions) -> Self {
        Writer {
            inner: Some(inner),
            index: Index::new(opts.block_size),
            opts,
            encoders: Vec::new(),
            pool: None,
            pending: Vec::new(),
            written: 0,
            uncompressed: 0,
            header_written: false,
            closed: false,
            err: None,
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.opts
    }

    /// Compressed bytes emitted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Input bytes accepted so far, buffered ones included.
    pub fn total_in(&self) -> u64 {
        self.uncompressed + self.pending.len() as u64
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    fn out(&mut self) -> Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::InvalidConfiguration("writer has no destination".into()))
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out()?.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Fails with the stored error, if any.
    fn check_failed(&self) -> Result<()> {
        match &self.err {
            Some(e) => Err(e.replay()),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        self.check_failed()?;
        if self.closed {
            return Err(Error::InvalidConfiguration("write after close".into()));
        }
        Ok(())
    }

    /// Keeps the first error of `result` so later calls report it too.
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.err.is_none() {
                debug!(error = %e, "writer failed, rejecting further calls");
                self.err = Some(e.replay());
            }
        }
        result
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let header = stream_header(self.opts.block_size);
        self.emit(&header)?;
        self.header_written = true;
        debug!(block_size = self.opts.block_size, "stream header written");
        Ok(())
    }

    /// Frames the first `len` pending bytes, one chunk per block, in order.
    fn frame_pending(&mut self, len: usize) -> Result<Vec<Vec<u8>>> {
        let Writer { opts, encoders, pool, pending, .. } = self;
        let opts = &*opts;
        let blocks: Vec<&[u8]> = pending[..len].chunks(opts.block_size).collect();

        if blocks.len() < 2 || opts.concurrency < 2 {
            if encoders.is_empty() {
                encoders.push(Encoder::new());
            }
            let enc = &mut encoders[0];
            return blocks.iter().map(|block| frame_block(enc, block, opts)).collect();
        }

        if pool.is_none() {
            let built = rayon::ThreadPoolBuilder::new()
                .num_threads(opts.concurrency)
                .build()
                .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
            *pool = Some(built);
        }
        let pool = pool
            .as_ref()
            .ok_or_else(|| Error::InvalidConfiguration("encoder pool missing".into()))?;
        if encoders.len() < opts.concurrency {
            encoders.resize_with(opts.concurrency, Encoder::new);
        }
        let workers = opts.concurrency.min(blocks.len());
        let per_worker = (blocks.len() + workers - 1) / workers;
        let groups = pool.install(|| {
            encoders[..workers]
                .par_iter_mut()
                .zip(blocks.par_chunks(per_worker))
                .map(|(enc, group)| {
                    group
                        .iter()
                        .map(|block| frame_block(enc, block, opts))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(groups.into_iter().flatten().collect())
    }

    /// Encodes and writes the first `len` pending bytes.  They leave the
    /// buffer only once written.
    fn encode_pending(&mut self, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.write_header()?;
        let framed = self.frame_pending(len)?;
        let block_size = self.opts.block_size;
        let mut done = 0usize;
        for chunk in &framed {
            let input = block_size.min(len - done);
            if self.opts.add_index {
                self.index.add(self.written as i64, self.uncompressed as i64)?;
            }
            self.emit(chunk)?;
            self.uncompressed += input as u64;
            done += input;
            trace!(chunk_type = chunk[0], len = chunk.len(), input, "block written");
        }
        self.pending.drain(..len);
        Ok(())
    }

    /// Writes every buffered byte as blocks, the last one possibly short.
    fn flush_blocks(&mut self) -> Result<()> {
        self.encode_pending(self.pending.len())
    }

    /// Buffers `buf`, encoding whenever a full batch of blocks is available.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.pending.extend_from_slice(buf);
        let batch = self.opts.block_size * self.opts.concurrency;
        if self.pending.len() >= batch {
            let full = self.pending.len() - self.pending.len() % self.opts.block_size;
            let result = self.encode_pending(full);
            return self.record(result);
        }
        Ok(())
    }

    /// Encodes buffered input and flushes the destination.
    pub fn flush_stream(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.flush_blocks().and_then(|()| Ok(self.out()?.flush()?));
        self.record(result)
    }

    /// Writes a user-defined chunk.  Buffered input is flushed first so the
    /// chunk lands at the current position in the decoded data.
    pub fn add_user_chunk(&mut self, id: u8, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if !is_user_chunk(id) {
            return Err(Error::InvalidConfiguration(format!(
                "chunk id {:#04x} is not in a user range",
                id
            )));
        }
        if data.len() > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfiguration(format!(
                "user chunk of {} bytes exceeds {}",
                data.len(),
                MAX_CHUNK_SIZE
            )));
        }
        let result = self.write_user_chunk(id, data);
        self.record(result)
    }

    fn write_user_chunk(&mut self, id: u8, data: &[u8]) -> Result<()> {
        self.flush_blocks()?;
        self.write_header()?;
        let mut chunk = Vec::with_capacity(4 + data.len());
        put_chunk_header(&mut chunk, id, data.len());
        chunk.extend_from_slice(data);
        self.emit(&chunk)?;
        trace!(chunk_type = id, len = data.len(), "user chunk written");
        Ok(())
    }

    /// Finishes the stream: remaining blocks, the index, padding and the
    /// end-of-stream chunk.  Further writes fail; closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.check_failed()?;
        if self.closed {
            return Ok(());
        }
        let result = self.finish();
        self.record(result)
    }

    fn finish(&mut self) -> Result<()> {
        self.flush_blocks()?;
        self.write_header()?;
        self.closed = true;

        let mut tail = Vec::new();
        if self.opts.add_index {
            let total_compressed = self.written as i64;
            self.index.append_to(&mut tail, self.uncompressed as i64, total_compressed);
        }

        let mut total = Vec::with_capacity(10);
        put_uvarint(&mut total, self.uncompressed);
        let eof_len = 4 + total.len();
        if self.opts.padding > 1 {
            let end = self.written + (tail.len() + eof_len) as u64;
            let pad = padding_len(end, self.opts.padding);
            put_padding(&mut tail, pad);
            trace!(len = pad, "padding written");
        }
        put_chunk_header(&mut tail, CHUNK_EOF, total.len());
        tail.extend_from_slice(&total);

        self.emit(&tail)?;
        self.out()?.flush()?;
        debug!(
            uncompressed = self.uncompressed,
            compressed = self.written,
            indexed = self.opts.add_index,
            "stream closed"
        );
        Ok(())
    }

    /// Closes the stream and returns the destination.
    pub fn into_inner(mut self) -> Result<W> {
        self.close()?;
        self.inner
            .take()
            .ok_or_else(|| Error::InvalidConfiguration("writer has no destination".into()))
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_stream().map_err(io::Error::from)
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "closing dropped writer failed, stream is incomplete");
            }
        }
    }
}

/// Compresses `src` into a complete stream.
pub fn compress(src: &[u8], opts: &WriterOptions) -> Result<Vec<u8>> {
    let mut w = Writer::with_options(Vec::with_capacity(src.len() / 2 + 64), opts.clone())?;
    w.write_bytes(src)?;
    w.into_inner()
}
