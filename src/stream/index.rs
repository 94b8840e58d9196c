//! Seek index: a compact map from uncompressed to compressed stream offsets.
//!
//! The writer records one entry per block boundary.  A table that reaches
//! 65 536 entries while still being built drops every other entry and from
//! then on only accepts entries at least one (doubled) block estimate apart.
//! Before serialising, the table is thinned to at most 65 536 entries spaced
//! roughly 1 MiB apart (never thinner than 1 000 entries).
//!
//! The writer places the index chunk just before the trailing padding and
//! end-of-stream chunks, so it is found by stepping back over those.
//!
//! Wire layout, inside a chunk of type `0x40`:
//!
//! ```text
//! "s2idx\0"
//! varint total_uncompressed      (>= 0)
//! varint total_compressed        (-1 when unknown)
//! varint est_block_uncompressed  (>= 0)
//! varint entry_count             (0..=65536)
//! u8     has_uncompressed        (0 or 1)
//! [varint uncompressed delta] * entry_count   only when has_uncompressed == 1
//! [varint compressed delta]   * entry_count
//! u32 LE total index size, chunk header included
//! "\0xdi2s"
//! ```
//!
//! All varints are zig-zag signed.  Uncompressed deltas are taken against
//! `previous + est_block_uncompressed`.  Compressed deltas are taken against
//! `previous + predictor`, where the predictor starts at half the block
//! estimate and moves by half of every observed delta.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

use super::types::{
    put_chunk_header, ChunkHeader, CHUNK_EOF, CHUNK_HEADER_SIZE, CHUNK_INDEX, CHUNK_PADDING,
    MAX_CHUNK_SIZE,
};
use crate::error::{Error, Result};
use crate::varint::{get_uvarint, get_varint, put_varint, MAX_VARINT_LEN64};

pub const INDEX_HEADER: &[u8; 6] = b"s2idx\x00";
pub const INDEX_TRAILER: &[u8; 6] = b"\x00xdi2s";
pub const MAX_INDEX_ENTRIES: usize = 1 << 16;

/// Size field plus trailer, the fixed-size tail of every index chunk.
const INDEX_TAIL_SIZE: usize = 4 + INDEX_TRAILER.len();
/// Target spacing between entries after thinning.
const MIN_INDEX_DIST: i64 = 1 << 20;
/// Thinning never goes below this many entries.
const MIN_KEPT_ENTRIES: usize = 1000;
/// First read size when looking for the index at the end of a seekable source.
const TAIL_WINDOW: u64 = 64 << 10;

/// One block start: where it begins in the compressed stream and in the
/// decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub compressed_offset: i64,
    pub uncompressed_offset: i64,
}

/// Seek index of one stream.
#[derive(Debug, Clone)]
pub struct Index {
    /// Decoded size of the whole stream, -1 while still being built.
    pub total_uncompressed: i64,
    /// Compressed size of the stream up to the index, -1 when unknown.
    pub total_compressed: i64,
    /// Block start positions, strictly increasing in both columns.
    pub entries: Vec<IndexEntry>,
    est_block_uncompressed: i64,
    /// Smallest decoded distance between entries accepted by `add`.
    min_dist: i64,
}

// Equality covers what is serialised, not the spacing used while building.
impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.total_uncompressed == other.total_uncompressed
            && self.total_compressed == other.total_compressed
            && self.est_block_uncompressed == other.est_block_uncompressed
            && self.entries == other.entries
    }
}

impl Eq for Index {}

impl Default for Index {
    fn default() -> Self {
        Index::new(0)
    }
}

fn corrupt(what: &str) -> Error {
    debug!(what, "rejecting index");
    Error::Corrupt
}

fn read_varint(b: &mut &[u8], what: &str) -> Result<i64> {
    let (v, n) = get_varint(b).ok_or_else(|| corrupt(what))?;
    *b = &b[n..];
    Ok(v)
}

/// Outcome of looking for the index at the end of a stream suffix.
enum TailScan {
    /// The index chunk ends at this offset into the suffix.
    Found(usize),
    Missing,
    /// The suffix starts too late to tell.
    NeedMore,
}

/// Start of the end-of-stream chunk that ends `tail`.
fn find_eof(tail: &[u8]) -> Option<usize> {
    (1..=MAX_VARINT_LEN64).chain(0..1).find_map(|n| {
        let at = tail.len().checked_sub(CHUNK_HEADER_SIZE + n)?;
        let header = ChunkHeader::read(&tail[at..])?;
        let payload = &tail[at + CHUNK_HEADER_SIZE..];
        let total_fits = n == 0 || get_uvarint(payload).map_or(false, |(_, used)| used == n);
        (header.chunk_type == CHUNK_EOF && header.len == n && total_fits).then_some(at)
    })
}

/// Finds where the index chunk ends in `tail`, a suffix of a stream laid out
/// as `... index | [padding] | eof`.  `whole` is set when `tail` is the
/// entire stream.
fn scan_tail(tail: &[u8], whole: bool) -> TailScan {
    let short = if whole { TailScan::Missing } else { TailScan::NeedMore };
    let eof_at = match find_eof(tail) {
        Some(at) => at,
        None => return TailScan::Missing,
    };
    let before = &tail[..eof_at];
    if before.len() >= INDEX_TAIL_SIZE && before.ends_with(INDEX_TRAILER) {
        return TailScan::Found(eof_at);
    }
    // Padding is zero-filled, so its header holds the last non-zero byte.
    let last = match before.iter().rposition(|&b| b != 0) {
        Some(last) => last,
        None => return short,
    };
    let pad_at = (last.saturating_sub(CHUNK_HEADER_SIZE - 1)..=last).find(|&at| {
        ChunkHeader::read(&before[at..]).map_or(false, |h| {
            h.chunk_type == CHUNK_PADDING && at + CHUNK_HEADER_SIZE + h.len == eof_at
        })
    });
    match pad_at {
        Some(at) if at >= INDEX_TAIL_SIZE && before[..at].ends_with(INDEX_TRAILER) => {
            TailScan::Found(at)
        }
        Some(at) if at < INDEX_TAIL_SIZE => short,
        None if before.len() < INDEX_TAIL_SIZE => short,
        _ => TailScan::Missing,
    }
}

/// Total index size stored just before the trailer that ends `prefix`.
fn trailer_size(prefix: &[u8]) -> Result<usize> {
    if prefix.len() < INDEX_TAIL_SIZE {
        return Err(corrupt("index size"));
    }
    let at = prefix.len() - INDEX_TAIL_SIZE;
    let size = u32::from_le_bytes([prefix[at], prefix[at + 1], prefix[at + 2], prefix[at + 3]]);
    let size = size as usize;
    if size < CHUNK_HEADER_SIZE + INDEX_TAIL_SIZE || size > MAX_CHUNK_SIZE + CHUNK_HEADER_SIZE {
        return Err(corrupt("index size"));
    }
    Ok(size)
}

impl Index {
    /// Empty index for a writer producing blocks of `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        Index {
            total_uncompressed: -1,
            total_compressed: -1,
            entries: Vec::new(),
            est_block_uncompressed: block_size as i64,
            min_dist: 0,
        }
    }

    /// Estimated decoded size of the blocks between two entries.
    pub fn est_block_uncompressed(&self) -> i64 {
        self.est_block_uncompressed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a block starting at `compressed_offset` in the stream and at
    /// `uncompressed_offset` in the decoded output.
    ///
    /// A block that starts at the same decoded offset as the previous entry
    /// replaces its compressed offset.  Offsets moving backwards are an error.
    /// Once the table has been halved, blocks closer than the current
    /// estimate to the previous entry are not recorded.
    pub fn add(&mut self, compressed_offset: i64, uncompressed_offset: i64) -> Result<()> {
        if let Some(last) = self.entries.last_mut() {
            if last.uncompressed_offset == uncompressed_offset {
                last.compressed_offset = compressed_offset;
                return Ok(());
            }
            if last.uncompressed_offset > uncompressed_offset
                || last.compressed_offset >= compressed_offset
            {
                return Err(Error::InvalidConfiguration(format!(
                    "index offsets must increase: ({}, {}) after ({}, {})",
                    compressed_offset,
                    uncompressed_offset,
                    last.compressed_offset,
                    last.uncompressed_offset
                )));
            }
            if uncompressed_offset - last.uncompressed_offset < self.min_dist {
                return Ok(());
            }
        }
        self.entries.push(IndexEntry { compressed_offset, uncompressed_offset });
        if self.entries.len() > MAX_INDEX_ENTRIES {
            self.halve();
        }
        Ok(())
    }

    /// Keeps every other entry and doubles the spacing `add` requires.
    fn halve(&mut self) {
        let kept: Vec<IndexEntry> = self.entries.iter().step_by(2).copied().collect();
        self.entries = kept;
        self.est_block_uncompressed *= 2;
        self.min_dist = self.est_block_uncompressed;
        debug!(entries = self.entries.len(), est = self.est_block_uncompressed, "index halved");
    }

    /// Thins the table to at most [`MAX_INDEX_ENTRIES`] entries, aiming for
    /// about 1 MiB between entries without dropping below 1 000 entries.
    pub fn reduce(&mut self) {
        let n = self.entries.len();
        if n < MAX_INDEX_ENTRIES && self.est_block_uncompressed >= MIN_INDEX_DIST {
            return;
        }
        let mut remove_n = (n + 1) / MAX_INDEX_ENTRIES;
        while self.est_block_uncompressed * (remove_n as i64 + 1) < MIN_INDEX_DIST
            && n / (remove_n + 1) > MIN_KEPT_ENTRIES
        {
            remove_n += 1;
        }
        if remove_n == 0 {
            return;
        }
        let step = remove_n + 1;
        let kept: Vec<IndexEntry> = self.entries.iter().step_by(step).copied().collect();
        self.entries = kept;
        self.est_block_uncompressed *= step as i64;
    }

    /// Thins the table, then appends the full index chunk to `dst`.
    pub fn append_to(&mut self, dst: &mut Vec<u8>, total_uncompressed: i64, total_compressed: i64) {
        self.reduce();
        self.total_uncompressed = total_uncompressed;
        self.total_compressed = total_compressed;

        let start = dst.len();
        put_chunk_header(dst, CHUNK_INDEX, 0);
        dst.extend_from_slice(INDEX_HEADER);
        put_varint(dst, total_uncompressed);
        put_varint(dst, total_compressed);
        put_varint(dst, self.est_block_uncompressed);
        put_varint(dst, self.entries.len() as i64);

        let est = self.est_block_uncompressed;
        let has_uncompressed = self.entries.iter().enumerate().any(|(i, e)| match i {
            0 => e.uncompressed_offset != 0,
            _ => e.uncompressed_offset != self.entries[i - 1].uncompressed_offset + est,
        });
        dst.push(u8::from(has_uncompressed));
        if has_uncompressed {
            for (i, e) in self.entries.iter().enumerate() {
                let mut delta = e.uncompressed_offset;
                if i > 0 {
                    delta -= self.entries[i - 1].uncompressed_offset + est;
                }
                put_varint(dst, delta);
            }
        }

        let mut predict = est / 2;
        for (i, e) in self.entries.iter().enumerate() {
            let mut delta = e.compressed_offset;
            if i > 0 {
                delta -= self.entries[i - 1].compressed_offset + predict;
                predict += delta / 2;
            }
            put_varint(dst, delta);
        }

        let total = (dst.len() - start + INDEX_TAIL_SIZE) as u32;
        dst.extend_from_slice(&total.to_le_bytes());
        dst.extend_from_slice(INDEX_TRAILER);

        let chunk_len = dst.len() - start - CHUNK_HEADER_SIZE;
        let header = ChunkHeader { chunk_type: CHUNK_INDEX, len: chunk_len }.to_bytes();
        dst[start..start + CHUNK_HEADER_SIZE].copy_from_slice(&header);
        debug!(entries = self.entries.len(), bytes = dst.len() - start, "index written");
    }

    /// Parses a complete index chunk, header included.
    pub fn load(chunk: &[u8]) -> Result<Self> {
        let header = ChunkHeader::read(chunk).ok_or_else(|| corrupt("short chunk"))?;
        if header.chunk_type != CHUNK_INDEX {
            return Err(corrupt("wrong chunk type"));
        }
        let payload = chunk
            .get(CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + header.len)
            .ok_or_else(|| corrupt("truncated chunk"))?;
        Self::load_payload(payload)
    }

    /// Parses an index chunk payload.
    pub fn load_payload(payload: &[u8]) -> Result<Self> {
        let mut b = payload
            .strip_prefix(INDEX_HEADER.as_slice())
            .ok_or_else(|| corrupt("header magic"))?;

        let total_uncompressed = read_varint(&mut b, "total uncompressed")?;
        if total_uncompressed < 0 {
            return Err(corrupt("negative total uncompressed"));
        }
        let total_compressed = read_varint(&mut b, "total compressed")?;
        if total_compressed < -1 {
            return Err(corrupt("negative total compressed"));
        }
        let est = read_varint(&mut b, "block estimate")?;
        if est < 0 {
            return Err(corrupt("negative block estimate"));
        }
        let count = read_varint(&mut b, "entry count")?;
        if !(0..=MAX_INDEX_ENTRIES as i64).contains(&count) {
            return Err(corrupt("entry count"));
        }
        let count = count as usize;

        let (&has_uncompressed, rest) = b.split_first().ok_or_else(|| corrupt("flags"))?;
        b = rest;
        if has_uncompressed > 1 {
            return Err(corrupt("has-uncompressed flag"));
        }

        let mut entries = vec![IndexEntry { compressed_offset: 0, uncompressed_offset: 0 }; count];
        for i in 0..count {
            let mut off = if has_uncompressed == 1 {
                read_varint(&mut b, "uncompressed delta")?
            } else {
                0
            };
            if i > 0 {
                let prev = entries[i - 1].uncompressed_offset;
                off = off
                    .checked_add(prev)
                    .and_then(|v| v.checked_add(est))
                    .ok_or_else(|| corrupt("uncompressed overflow"))?;
                if off <= prev {
                    return Err(corrupt("uncompressed offsets not increasing"));
                }
            }
            if off < 0 {
                return Err(corrupt("negative uncompressed offset"));
            }
            entries[i].uncompressed_offset = off;
        }

        let mut predict = est / 2;
        for i in 0..count {
            let mut off = read_varint(&mut b, "compressed delta")?;
            if i > 0 {
                let next_predict = predict
                    .checked_add(off / 2)
                    .ok_or_else(|| corrupt("compressed predictor overflow"))?;
                let prev = entries[i - 1].compressed_offset;
                off = off
                    .checked_add(prev)
                    .and_then(|v| v.checked_add(predict))
                    .ok_or_else(|| corrupt("compressed overflow"))?;
                if off <= prev {
                    return Err(corrupt("compressed offsets not increasing"));
                }
                predict = next_predict;
            }
            if off < 0 {
                return Err(corrupt("negative compressed offset"));
            }
            entries[i].compressed_offset = off;
        }

        if b.len() < INDEX_TAIL_SIZE || &b[4..INDEX_TAIL_SIZE] != INDEX_TRAILER {
            return Err(corrupt("trailer"));
        }

        Ok(Index {
            total_uncompressed,
            total_compressed,
            entries,
            est_block_uncompressed: est,
            min_dist: 0,
        })
    }

    /// Locates the index from the end of a finished `stream`, stepping back
    /// over the end-of-stream and padding chunks.  `Ok(None)` when no index
    /// precedes them.
    pub fn from_tail(stream: &[u8]) -> Result<Option<Self>> {
        let end = match scan_tail(stream, true) {
            TailScan::Found(end) => end,
            TailScan::Missing | TailScan::NeedMore => return Ok(None),
        };
        let size = trailer_size(&stream[..end])?;
        if size > end {
            return Err(corrupt("index size"));
        }
        Self::load(&stream[end - size..end]).map(Some)
    }

    /// Walks chunk headers from the start of `stream` and parses the last
    /// index chunk found.  `Ok(None)` when there is none.
    pub fn from_stream(stream: &[u8]) -> Result<Option<Self>> {
        let mut pos = 0usize;
        let mut found = None;
        while pos < stream.len() {
            let header = ChunkHeader::read(&stream[pos..]).ok_or_else(|| corrupt("chunk header"))?;
            let end = pos + CHUNK_HEADER_SIZE + header.len;
            if end > stream.len() {
                return Err(corrupt("chunk runs past the end"));
            }
            if header.chunk_type == CHUNK_INDEX {
                found = Some(Self::load(&stream[pos..end])?);
            }
            pos = end;
        }
        Ok(found)
    }

    /// Reads the index at the end of a seekable stream.  The stream position
    /// is left unspecified.
    pub fn from_reader<R: Read + Seek>(rs: &mut R) -> Result<Option<Self>> {
        let len = rs.seek(SeekFrom::End(0))?;
        let mut window = TAIL_WINDOW.min(len);
        loop {
            let start = len - window;
            rs.seek(SeekFrom::Start(start))?;
            let mut tail = vec![0u8; window as usize];
            rs.read_exact(&mut tail)?;
            let end = match scan_tail(&tail, window == len) {
                TailScan::Found(end) => end,
                TailScan::Missing => return Ok(None),
                TailScan::NeedMore => {
                    window = window.saturating_mul(8).min(len);
                    continue;
                }
            };
            let size = trailer_size(&tail[..end])?;
            if size <= end {
                return Self::load(&tail[end - size..end]).map(Some);
            }
            let index_end = start + end as u64;
            if size as u64 > index_end {
                return Err(corrupt("index size"));
            }
            rs.seek(SeekFrom::Start(index_end - size as u64))?;
            let mut buf = vec![0u8; size];
            rs.read_exact(&mut buf)?;
            return Self::load(&buf).map(Some);
        }
    }

    /// Entry at or before decoded `offset`, as `(compressed, uncompressed)`
    /// start offsets.  A negative `offset` counts back from the end.
    pub fn find(&self, offset: i64) -> Result<(i64, i64)> {
        if self.total_uncompressed < 0 {
            return Err(Error::Corrupt);
        }
        let offset = if offset < 0 { self.total_uncompressed + offset } else { offset };
        if offset < 0 || offset > self.total_uncompressed {
            return Err(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }
        let n = self.entries.partition_point(|e| e.uncompressed_offset <= offset);
        Ok(match n {
            0 => (0, 0),
            n => (self.entries[n - 1].compressed_offset, self.entries[n - 1].uncompressed_offset),
        })
    }
}
