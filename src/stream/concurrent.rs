//! Parallel decode of one indexed stream.
//!
//! The stream is first walked chunk by chunk (headers only, plus each block's
//! length prefix) so that every block's position in the output is known.  The
//! index entries, checked against that walk, are the only places the output
//! is cut: consecutive entries are grouped into at most `workers` ranges of
//! similar decoded size, the pre-sized output buffer is split into disjoint
//! slices, and each range decodes into its own slice on a rayon pool.
//!
//! Streams without an index, and concatenated streams, are decoded
//! sequentially instead.

use std::ops::Range;

use rayon::prelude::*;
use tracing::debug;

use super::index::Index;
use super::reader::{data_chunk_len, decode_data_chunk, decompress};
use super::types::{
    parse_stream_id, ChunkClass, ChunkHeader, CHUNK_EOF, CHUNK_HEADER_SIZE, CHUNK_MINLZ_BLOCK,
    CHUNK_MINLZ_COMPRESSED_CRC, CHUNK_STREAM_ID, CHUNK_UNCOMPRESSED,
};
use crate::error::{Error, Result};
use crate::varint::{get_uvarint, MAX_VARINT_LEN64};

/// Position of one data chunk in the stream and in the output.
#[derive(Debug, Clone)]
struct BlockRef {
    offset: usize,
    chunk_type: u8,
    payload: Range<usize>,
    start: usize,
    len: usize,
}

fn check_workers(workers: usize) -> Result<()> {
    if workers == 0 {
        return Err(Error::InvalidConfiguration("workers must be at least 1".into()));
    }
    Ok(())
}

/// Decodes `src` using up to `workers` threads.
///
/// The index is taken from the end of the stream, or found by walking the
/// chunks when something else follows it.
pub fn decode_concurrent(src: &[u8], workers: usize) -> Result<Vec<u8>> {
    check_workers(workers)?;
    let index = match Index::from_tail(src)? {
        Some(index) => Some(index),
        None => Index::from_stream(src)?,
    };
    match index {
        Some(index) => decode_with_index(src, &index, workers),
        None => {
            debug!("stream has no index, decoding sequentially");
            decompress(src)
        }
    }
}

/// Decodes `src` using up to `workers` threads and a caller-supplied index.
pub fn decode_with_index(src: &[u8], index: &Index, workers: usize) -> Result<Vec<u8>> {
    check_workers(workers)?;
    let (blocks, total) = match scan(src)? {
        Some(layout) => layout,
        None => {
            debug!("concatenated streams, decoding sequentially");
            return decompress(src);
        }
    };
    if index.total_uncompressed != total as i64 {
        debug!(
            index_total = index.total_uncompressed,
            stream_total = total,
            "index does not describe this stream"
        );
        return Err(Error::Corrupt);
    }

    let ranges = partition(&blocks, index, total, workers)?;
    let mut out = vec![0u8; total];
    let mut slices = Vec::with_capacity(ranges.len());
    let mut rest: &mut [u8] = &mut out;
    for range in &ranges {
        let len: usize = blocks[range.clone()].iter().map(|b| b.len).sum();
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
        slices.push((&blocks[range.clone()], head));
        rest = tail;
    }
    debug!(workers, ranges = ranges.len(), total, "concurrent decode");

    if slices.len() <= 1 {
        for (range, dst) in slices {
            decode_range(src, range, dst)?;
        }
        return Ok(out);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.min(slices.len()))
        .build()
        .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
    pool.install(|| {
        slices
            .into_par_iter()
            .try_for_each(|(range, dst)| decode_range(src, range, dst))
    })?;
    Ok(out)
}

/// Walks the chunks of a single stream.  `None` when a second stream follows.
fn scan(src: &[u8]) -> Result<Option<(Vec<BlockRef>, usize)>> {
    let mut blocks = Vec::new();
    let mut max_block = None;
    let mut total = 0usize;
    let mut ended = false;
    let mut pos = 0usize;

    while pos < src.len() {
        let h = ChunkHeader::read(&src[pos..]).ok_or(Error::Corrupt)?;
        let payload = pos + CHUNK_HEADER_SIZE..pos + CHUNK_HEADER_SIZE + h.len;
        let body = src.get(payload.clone()).ok_or(Error::Corrupt)?;

        if h.chunk_type == CHUNK_STREAM_ID {
            if max_block.is_some() {
                if !ended {
                    return Err(Error::Corrupt);
                }
                return Ok(None);
            }
            max_block = Some(parse_stream_id(body, false)?.max_block_size());
            pos = payload.end;
            continue;
        }
        let max = max_block.ok_or(Error::Corrupt)?;

        match h.chunk_type {
            CHUNK_UNCOMPRESSED | CHUNK_MINLZ_BLOCK | CHUNK_MINLZ_COMPRESSED_CRC => {
                if ended {
                    return Err(Error::Corrupt);
                }
                let len = data_chunk_len(h.chunk_type, body, max)?;
                blocks.push(BlockRef {
                    offset: pos,
                    chunk_type: h.chunk_type,
                    payload: payload.clone(),
                    start: total,
                    len,
                });
                total += len;
            }
            CHUNK_EOF => {
                if ended || h.len > MAX_VARINT_LEN64 {
                    return Err(Error::Corrupt);
                }
                if h.len > 0 {
                    match get_uvarint(body) {
                        Some((n, used)) if used == h.len && n == total as u64 => {}
                        _ => return Err(Error::Corrupt),
                    }
                }
                ended = true;
            }
            t => match ChunkClass::of(t) {
                ChunkClass::Skippable | ChunkClass::Padding | ChunkClass::UserSkippable => {}
                _ => {
                    debug!(chunk_type = t, "chunk not supported by concurrent decode");
                    return Err(Error::Corrupt);
                }
            },
        }
        pos = payload.end;
    }
    if max_block.is_some() && !ended {
        return Err(Error::Corrupt);
    }
    Ok(Some((blocks, total)))
}

/// Groups blocks into at most `workers` ranges, cutting only at indexed
/// block starts.
fn partition(
    blocks: &[BlockRef],
    index: &Index,
    total: usize,
    workers: usize,
) -> Result<Vec<Range<usize>>> {
    let mut cuts = vec![0usize];
    for e in &index.entries {
        let at = blocks
            .binary_search_by_key(&e.compressed_offset, |b| b.offset as i64)
            .map_err(|_| Error::Corrupt)?;
        if blocks[at].start as i64 != e.uncompressed_offset {
            return Err(Error::Corrupt);
        }
        if at == 0 {
            continue;
        }
        let target = total * cuts.len() / workers;
        if cuts.len() < workers && blocks[at].start >= target {
            cuts.push(at);
        }
    }
    let mut ranges: Vec<Range<usize>> = cuts.windows(2).map(|w| w[0]..w[1]).collect();
    ranges.push(cuts[cuts.len() - 1]..blocks.len());
    Ok(ranges)
}

fn decode_range(src: &[u8], blocks: &[BlockRef], dst: &mut [u8]) -> Result<()> {
    let base = match blocks.first() {
        Some(b) => b.start,
        None => return Ok(()),
    };
    let mut produced = 0usize;
    for b in blocks {
        let out = dst
            .get_mut(b.start - base..b.start - base + b.len)
            .ok_or(Error::Corrupt)?;
        decode_data_chunk(b.chunk_type, &src[b.payload.clone()], out, true)?;
        produced += b.len;
    }
    if produced != dst.len() {
        return Err(Error::Corrupt);
    }
    Ok(())
}
