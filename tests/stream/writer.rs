// Stream writer: framing, batching and lifecycle.
//
//   - output is independent of write sizes and of the worker count
//   - flush cuts a short block, close is idempotent, drop closes
//   - option validation
//   - the end-of-stream chunk is last, after index and padding
//   - a failed destination makes every later call fail

use std::io::{self, Write};

use minlz::stream::types::{ChunkHeader, CHUNK_EOF, CHUNK_INDEX, CHUNK_PADDING, CHUNK_STREAM_ID};
use minlz::{compress, decompress, Error, Index, Level, Writer, WriterOptions};

fn corpus(n: usize) -> Vec<u8> {
    let mut x = 0x1234_5678u32;
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        let word = (x % 50) as usize;
        out.extend_from_slice(format!("token{} ", word).as_bytes());
    }
    out.truncate(n);
    out
}

fn chunk_types(stream: &[u8]) -> Vec<u8> {
    let mut types = Vec::new();
    let mut pos = 0;
    while pos < stream.len() {
        let h = ChunkHeader::read(&stream[pos..]).unwrap();
        types.push(h.chunk_type);
        pos += 4 + h.len;
    }
    types
}

#[test]
fn output_does_not_depend_on_write_sizes() {
    let src = corpus(300_000);
    let opts = WriterOptions::default().with_block_size(16 << 10).with_concurrency(3);
    let whole = compress(&src, &opts).unwrap();

    for piece in [1usize, 7, 4096, 50_000] {
        let mut w = Writer::with_options(Vec::new(), opts.clone()).unwrap();
        for part in src.chunks(piece) {
            w.write_all(part).unwrap();
        }
        assert_eq!(w.into_inner().unwrap(), whole, "piece {}", piece);
    }
}

#[test]
fn parallel_encode_matches_sequential() {
    let src = corpus(500_000);
    for level in [Level::Fastest, Level::Balanced, Level::Smallest] {
        let base = WriterOptions::default().with_block_size(32 << 10).with_level(level);
        let one = compress(&src, &base.clone().with_concurrency(1)).unwrap();
        let many = compress(&src, &base.with_concurrency(8)).unwrap();
        assert_eq!(one, many, "{:?}", level);
        assert_eq!(decompress(&many).unwrap(), src);
    }
}

#[test]
fn flush_cuts_a_short_block() {
    let opts = WriterOptions::default().with_block_size(4096).with_index(false);
    let mut w = Writer::with_options(Vec::new(), opts).unwrap();
    w.write_all(&corpus(100)).unwrap();
    w.flush().unwrap();
    let after_flush = w.written();
    assert!(after_flush > 10);
    w.write_all(&corpus(100)).unwrap();
    let out = w.into_inner().unwrap();
    assert_eq!(chunk_types(&out).len(), 4);

    let mut want = corpus(100);
    want.extend_from_slice(&corpus(100));
    assert_eq!(decompress(&out).unwrap(), want);
}

#[test]
fn dropping_an_unclosed_writer_finishes_the_stream() {
    let mut sink = Vec::new();
    {
        let mut w = Writer::new(&mut sink);
        w.write_all(b"dropped, not closed").unwrap();
    }
    assert_eq!(decompress(&sink).unwrap(), b"dropped, not closed");
    let types = chunk_types(&sink);
    assert_eq!(types[0], CHUNK_STREAM_ID);
    assert_eq!(&types[types.len() - 2..], [CHUNK_INDEX, CHUNK_EOF]);
}

#[test]
fn empty_stream_round_trips() {
    let out = compress(b"", &WriterOptions::default()).unwrap();
    assert_eq!(chunk_types(&out), [CHUNK_STREAM_ID, CHUNK_INDEX, CHUNK_EOF]);
    assert!(decompress(&out).unwrap().is_empty());
    let idx = Index::from_tail(&out).unwrap().unwrap();
    assert_eq!(idx.total_uncompressed, 0);
    assert!(idx.is_empty());
}

#[test]
fn total_in_counts_buffered_bytes() {
    let mut w = Writer::with_options(Vec::new(), WriterOptions::default().with_block_size(1 << 20)).unwrap();
    w.write_all(&[1u8; 1000]).unwrap();
    assert_eq!(w.total_in(), 1000);
    assert_eq!(w.written(), 0);
    w.close().unwrap();
    assert_eq!(w.total_in(), 1000);
}

#[test]
fn invalid_options_are_rejected() {
    let bad = [
        WriterOptions::default().with_block_size(100),
        WriterOptions::default().with_block_size(9 << 20),
        WriterOptions::default().with_concurrency(0),
        WriterOptions::default().with_concurrency(1000),
        WriterOptions::default().with_padding(5 << 20),
    ];
    for opts in bad {
        assert!(matches!(Writer::with_options(Vec::new(), opts.clone()), Err(Error::InvalidConfiguration(_))));
        assert!(matches!(compress(b"x", &opts), Err(Error::InvalidConfiguration(_))));
    }
    let mut opts = WriterOptions::default();
    assert!(matches!(opts.set_level(0), Err(Error::InvalidLevel(0))));
    assert!(matches!(opts.set_level(4), Err(Error::InvalidLevel(4))));
    assert_eq!(opts.set_level(3).unwrap(), Level::Smallest);
}

#[test]
fn user_chunk_ids_are_checked() {
    let mut w = Writer::new(Vec::new());
    for id in [0x00, 0x20, 0x40, 0x7f, 0xfe, 0xff] {
        assert!(matches!(w.add_user_chunk(id, b"x"), Err(Error::InvalidConfiguration(_))), "{:#x}", id);
    }
    for id in [0x80, 0xbf, 0xc0, 0xfd] {
        w.add_user_chunk(id, b"x").unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream tail
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn eof_chunk_ends_every_stream() {
    let src = corpus(10_000);
    for opts in [
        WriterOptions::default().with_block_size(4096),
        WriterOptions::default().with_block_size(4096).with_index(false),
        WriterOptions::default().with_block_size(4096).with_padding(1000),
    ] {
        let out = compress(&src, &opts).unwrap();
        let types = chunk_types(&out);
        assert_eq!(*types.last().unwrap(), CHUNK_EOF, "{:?}", opts);
        assert_eq!(types.iter().filter(|&&t| t == CHUNK_EOF).count(), 1);
    }
}

#[test]
fn padding_sits_between_index_and_eof() {
    let opts = WriterOptions::default().with_block_size(4096).with_padding(1000);
    let out = compress(&corpus(10_000), &opts).unwrap();
    assert_eq!(out.len() % 1000, 0);
    let types = chunk_types(&out);
    assert_eq!(&types[types.len() - 3..], [CHUNK_INDEX, CHUNK_PADDING, CHUNK_EOF]);
    let idx = Index::from_tail(&out).unwrap().unwrap();
    assert_eq!(idx.total_uncompressed, 10_000);
    assert_eq!(decompress(&out).unwrap(), corpus(10_000));
}

#[test]
fn truncation_before_eof_is_detected() {
    let out = compress(&corpus(10_000), &WriterOptions::default().with_block_size(4096)).unwrap();
    let idx = Index::from_tail(&out).unwrap().unwrap();
    // Cutting off only the end-of-stream chunk leaves a complete index.
    let eof_at = out.len() - 6;
    assert_eq!(out[eof_at], CHUNK_EOF);
    assert!(decompress(&out[..eof_at]).unwrap_err().is_corrupt());
    assert!(decompress(&out[..idx.total_compressed as usize]).unwrap_err().is_corrupt());
}

// ─────────────────────────────────────────────────────────────────────────────
// Failing destination
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts the first `ok_writes` writes and refuses the rest.
struct FlakySink {
    data: Vec<u8>,
    ok_writes: usize,
}

impl Write for FlakySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.ok_writes == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink refused"));
        }
        self.ok_writes -= 1;
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn accepted_data_is_never_dropped_silently() {
    let opts = WriterOptions::default().with_block_size(4096).with_concurrency(1);
    let mut w = Writer::with_options(FlakySink { data: Vec::new(), ok_writes: 1 }, opts).unwrap();
    let a = corpus(3000);
    let b = corpus(3000);
    w.write_all(&a).unwrap();
    // The header is accepted, the first block is not.
    let err = w.write_all(&b).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

    assert_eq!(w.write_all(&b).unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(w.flush().unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    assert!(matches!(w.close(), Err(Error::Io(_))));
    assert!(matches!(w.close(), Err(Error::Io(_))));

    let partial = &w.get_ref().unwrap().data;
    assert_eq!(partial.len(), 10);
    assert!(decompress(partial).unwrap_err().is_corrupt());
}

