//! E2E Test Suite 04: Error Handling
//!
//! Every public entry point must reject bad input with an error and never
//! panic:
//! - damaged blocks and streams report `Corrupt`
//! - oversized blocks and headers report `TooLarge`
//! - bad options report `InvalidConfiguration` / `InvalidLevel`
//! - errors surfacing through `io::Read` keep their kind

extern crate minlz;

use std::io::{self, Read, Write};

use minlz::stream::types::{CHUNK_EOF, STREAM_HEADER_SIZE};
use minlz::{
    compress, decode, decode_concurrent, decompress, BlockError, Error, Level, Reader,
    ReaderOptions, Writer, WriterOptions,
};

fn sample(n: usize) -> Vec<u8> {
    (0..n)
        .map(|i| b"error handling sample text; "[i % 28] ^ ((i / 4096) as u8 & 3))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: corrupted stream bytes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_every_flipped_byte_is_detected_or_harmless() {
    let original = sample(20_000);
    let z = compress(&original, &WriterOptions::default().with_block_size(4096)).unwrap();
    for i in 0..z.len() {
        let mut bad = z.clone();
        bad[i] ^= 0x21;
        match decompress(&bad) {
            // Only bytes inside skippable chunks may change without notice.
            Ok(out) => assert_eq!(out, original, "byte {} changed the output silently", i),
            Err(e) => assert!(
                matches!(e, Error::Corrupt | Error::TooLarge),
                "byte {}: unexpected {:?}",
                i,
                e
            ),
        }
        let _ = decode_concurrent(&bad, 3);
    }
}

#[test]
fn test_truncated_streams() {
    let z = compress(&sample(10_000), &WriterOptions::default().with_index(false)).unwrap();
    for cut in [1, 4, STREAM_HEADER_SIZE, STREAM_HEADER_SIZE + 3, z.len() / 2, z.len() - 1] {
        let err = decompress(&z[..cut]).unwrap_err();
        assert!(err.is_corrupt(), "cut {}: {:?}", cut, err);
    }
    // Without its end-of-stream chunk the stream is incomplete.
    let eof_at = z.len() - 6;
    assert_eq!(z[eof_at], CHUNK_EOF);
    assert!(decompress(&z[..eof_at]).unwrap_err().is_corrupt());
}

#[test]
fn test_garbage_is_not_a_stream() {
    assert!(decompress(b"definitely not a stream").unwrap_err().is_corrupt());
    assert!(decompress(b"\xff\x06\x00\x00MinLZ\x00").unwrap_err().is_corrupt());
    assert!(decompress(b"\xff\x06\x00\x00sNaPpY").unwrap_err().is_corrupt());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: block errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_block_errors() {
    assert_eq!(decode(b""), Err(BlockError::Corrupt));
    assert_eq!(decode(b"\x00\xff\xff\xff\x7f"), Err(BlockError::TooLarge));
    let block = minlz::encode(&sample(10_000), Level::Balanced).unwrap();
    assert_eq!(decode(&block[..block.len() - 1]), Err(BlockError::Corrupt));

    let e: Error = BlockError::TooLarge.into();
    assert!(matches!(e, Error::TooLarge));
    let e: Error = BlockError::Corrupt.into();
    assert!(e.is_corrupt());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: configuration errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_configuration_errors() {
    assert!(matches!(Level::try_from(7), Err(Error::InvalidLevel(7))));
    assert!(matches!(
        Writer::with_options(Vec::new(), WriterOptions::default().with_block_size(1)),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        Reader::with_options(io::empty(), ReaderOptions::default().with_max_block_size(0)),
        Err(Error::InvalidConfiguration(_))
    ));
    let z = compress(b"x", &WriterOptions::default()).unwrap();
    assert!(matches!(decode_concurrent(&z, 0), Err(Error::InvalidConfiguration(_))));

    let mut w = Writer::new(Vec::new());
    assert!(matches!(w.add_user_chunk(0x01, b""), Err(Error::InvalidConfiguration(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: io adapters
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_read_error_kind() {
    let mut z = compress(&sample(5000), &WriterOptions::default()).unwrap();
    z[STREAM_HEADER_SIZE + 6] ^= 0xff;
    let mut r = Reader::new(&z[..]);
    let mut out = Vec::new();
    let err = r.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert!(Error::from_io(err).is_corrupt());
}

struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_write_errors_propagate() {
    let opts = WriterOptions::default().with_block_size(4096).with_concurrency(1);
    let mut w = Writer::with_options(FailingSink, opts).unwrap();
    let err = w.write_all(&sample(10_000)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

    let mut w = Writer::new(FailingSink);
    w.write_all(b"buffered").unwrap();
    assert!(matches!(w.close(), Err(Error::Io(_))));
}

#[test]
fn test_closed_writer_rejects_writes() {
    let mut w = Writer::new(Vec::new());
    w.write_all(b"data").unwrap();
    w.close().unwrap();
    w.close().unwrap();
    assert!(w.write_all(b"more").is_err());
}
