// Stream reader: chunk dispatch, validation, fallback mode and seeking.
// A failed chunk ends the stream for good; later reads do not skip past it.

use std::io::{Cursor, Read, Seek, SeekFrom};

use minlz::crc::checksum;
use minlz::stream::decompress_with;
use minlz::stream::types::{stream_header, StreamFormat, MAGIC_BODY_S2, MAGIC_BODY_SNAPPY};
use minlz::{compress, decompress, Error, Reader, ReaderOptions, WriterOptions};

fn corpus(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8 ^ (i / 1000) as u8).collect()
}

fn chunk(dst: &mut Vec<u8>, chunk_type: u8, payload: &[u8]) {
    let len = (payload.len() as u32).to_le_bytes();
    dst.extend_from_slice(&[chunk_type, len[0], len[1], len[2]]);
    dst.extend_from_slice(payload);
}

fn raw_chunk(dst: &mut Vec<u8>, data: &[u8]) {
    let mut payload = checksum(data).to_le_bytes().to_vec();
    payload.extend_from_slice(data);
    chunk(dst, 0x01, &payload);
}

/// Stream header (1 MiB blocks), the given chunks, then a matching EOF.
fn handmade(body: impl FnOnce(&mut Vec<u8>), total: u8) -> Vec<u8> {
    let mut s = stream_header(1 << 20).to_vec();
    body(&mut s);
    chunk(&mut s, 0x20, &[total]);
    s
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn skippable_and_padding_chunks_are_ignored() {
    let s = handmade(
        |s| {
            raw_chunk(s, b"hello ");
            chunk(s, 0x41, b"internal");
            chunk(s, 0xfe, &[0; 17]);
            chunk(s, 0x99, b"user, skippable");
            raw_chunk(s, b"world");
        },
        11,
    );
    assert_eq!(decompress(&s).unwrap(), b"hello world");
}

#[test]
fn unknown_non_skippable_chunk_is_corrupt() {
    let s = handmade(|s| chunk(s, 0x05, b"??"), 0);
    assert!(decompress(&s).unwrap_err().is_corrupt());
}

#[test]
fn eof_without_total_is_accepted() {
    let mut s = stream_header(1 << 20).to_vec();
    raw_chunk(&mut s, b"abc");
    chunk(&mut s, 0x20, b"");
    assert_eq!(decompress(&s).unwrap(), b"abc");
}

#[test]
fn eof_total_must_be_exact() {
    let s = handmade(|s| raw_chunk(s, b"abc"), 4);
    assert!(decompress(&s).unwrap_err().is_corrupt());
    // Unterminated varint.
    let mut s = stream_header(1 << 20).to_vec();
    raw_chunk(&mut s, b"abc");
    chunk(&mut s, 0x20, &[0x83]);
    assert!(decompress(&s).unwrap_err().is_corrupt());
}

#[test]
fn data_after_eof_is_corrupt() {
    let mut s = handmade(|s| raw_chunk(s, b"abc"), 3);
    raw_chunk(&mut s, b"def");
    assert!(decompress(&s).unwrap_err().is_corrupt());
}

#[test]
fn header_validation() {
    let mut reserved = stream_header(1 << 20).to_vec();
    reserved[9] |= 0x80;
    chunk(&mut reserved, 0x20, &[0]);
    assert!(decompress(&reserved).unwrap_err().is_corrupt());

    let mut huge = stream_header(1 << 20).to_vec();
    huge[9] = 14;
    chunk(&mut huge, 0x20, &[0]);
    assert!(matches!(decompress(&huge), Err(Error::TooLarge)));

    let mut short_id = vec![0xff, 0x05, 0x00, 0x00];
    short_id.extend_from_slice(b"MinLz");
    assert!(decompress(&short_id).unwrap_err().is_corrupt());
}

#[test]
fn block_larger_than_header_allows_is_too_large() {
    let mut s = stream_header(1 << 10).to_vec();
    raw_chunk(&mut s, &[7u8; 2000]);
    chunk(&mut s, 0x20, &[0xd0, 0x0f]);
    assert!(matches!(decompress(&s), Err(Error::TooLarge)));
}

#[test]
fn every_truncation_before_eof_fails() {
    let src = corpus(40_000);
    let z = compress(&src, &WriterOptions::default().with_block_size(8192).with_index(false)).unwrap();
    for cut in 1..z.len() {
        assert!(decompress(&z[..cut]).is_err(), "cut {}", cut);
    }
    assert_eq!(decompress(&z).unwrap(), src);
}

#[test]
fn reader_reports_format() {
    let z = compress(b"fmt", &WriterOptions::default().with_block_size(64 << 10)).unwrap();
    let mut r = Reader::new(&z[..]);
    assert_eq!(r.format(), None);
    let mut b = [0u8; 1];
    r.read_exact(&mut b).unwrap();
    assert_eq!(r.format(), Some(StreamFormat::MinLz { max_block_size: 64 << 10 }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Fallback mode
// ─────────────────────────────────────────────────────────────────────────────

fn legacy_stream(magic: &[u8; 6]) -> Vec<u8> {
    let mut s = Vec::new();
    chunk(&mut s, 0xff, magic);
    let mut payload = checksum(b"abcd").to_le_bytes().to_vec();
    payload.extend_from_slice(b"\x04\x0cabcd");
    chunk(&mut s, 0x00, &payload);
    raw_chunk(&mut s, b"efgh");
    s
}

#[test]
fn legacy_streams_need_fallback() {
    for magic in [MAGIC_BODY_S2, MAGIC_BODY_SNAPPY] {
        let s = legacy_stream(magic);
        assert!(decompress(&s).unwrap_err().is_corrupt());
        let opts = ReaderOptions::default().with_fallback(true);
        assert_eq!(decompress_with(&s, &opts).unwrap(), b"abcdefgh");
    }
}

#[test]
fn legacy_chunk_checksum_is_verified() {
    let mut s = legacy_stream(MAGIC_BODY_S2);
    // First checksum byte of the 0x00 chunk.
    s[14] ^= 1;
    let opts = ReaderOptions::default().with_fallback(true);
    assert!(decompress_with(&s, &opts).unwrap_err().is_corrupt());
}

// ─────────────────────────────────────────────────────────────────────────────
// Seeking
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn seek_relative_and_from_end() {
    let src = corpus(1 << 20);
    let z = compress(&src, &WriterOptions::default().with_block_size(32 << 10)).unwrap();
    let mut r = Reader::new(Cursor::new(z));
    let mut buf = vec![0u8; 1000];

    r.seek(SeekFrom::Start(300_000)).unwrap();
    r.read_exact(&mut buf).unwrap();
    assert_eq!(buf, &src[300_000..301_000]);

    assert_eq!(r.seek(SeekFrom::Current(-101_000)).unwrap(), 200_000);
    r.read_exact(&mut buf).unwrap();
    assert_eq!(buf, &src[200_000..201_000]);

    assert_eq!(r.seek(SeekFrom::End(-1000)).unwrap(), (1 << 20) - 1000);
    r.read_exact(&mut buf).unwrap();
    assert_eq!(buf, &src[src.len() - 1000..]);
    assert_eq!(r.read(&mut buf).unwrap(), 0);

    assert!(r.seek(SeekFrom::Current(-(2 << 20))).is_err());
    assert_eq!(r.index().unwrap().total_uncompressed, 1 << 20);
}

#[test]
fn seek_without_index_is_unsupported() {
    let z = compress(&corpus(10_000), &WriterOptions::default().with_index(false)).unwrap();
    let mut r = Reader::new(Cursor::new(z));
    let err = r.seek(SeekFrom::Start(10)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
}

#[test]
fn invalid_reader_options() {
    let opts = ReaderOptions::default().with_max_block_size(16 << 20);
    assert!(matches!(Reader::with_options(&b""[..], opts), Err(Error::InvalidConfiguration(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// After a failure
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reads_after_checksum_failure_keep_failing() {
    let src = corpus(5 * 4096);
    let opts = WriterOptions::default().with_block_size(4096);
    let mut z = compress(&src, &opts).unwrap();
    // CRC of the first block.
    z[14] ^= 0x01;

    let mut r = Reader::new(&z[..]);
    let mut buf = vec![0u8; 4096];
    let first = r.read(&mut buf).unwrap_err();
    assert!(Error::from_io(first).is_corrupt());
    let second = r.read(&mut buf).unwrap_err();
    assert!(Error::from_io(second).is_corrupt());
    assert!(r.skip(4096).unwrap_err().is_corrupt());
}

#[test]
fn seek_does_not_recover_a_failed_reader() {
    let src = corpus(5 * 4096);
    let mut z = compress(&src, &WriterOptions::default().with_block_size(4096)).unwrap();
    let last = minlz::Index::from_tail(&z).unwrap().unwrap().entries[4].compressed_offset as usize;
    z[last + 4] ^= 0x01;

    let mut r = Reader::new(Cursor::new(z));
    let mut out = Vec::new();
    assert!(r.read_to_end(&mut out).is_err());
    assert!(r.seek(SeekFrom::Start(0)).is_err());
    assert!(r.read(&mut [0u8; 8]).is_err());
}

