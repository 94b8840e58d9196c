//! E2E Test Suite 02: Stream Round Trip
//!
//! Drives `Writer` and `Reader` the way an application would:
//! - io::copy through both ends
//! - every writer option combination that changes the framing
//! - user metadata chunks interleaved with data
//! - concatenated streams and seeking inside a file-like source

extern crate minlz;

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use minlz::{compress, decompress, Level, Reader, ReaderOptions, Writer, WriterOptions};

fn document(n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n + 64);
    let mut x = 12_345u64;
    while out.len() < n {
        x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        match (x >> 60) % 4 {
            0 => out.extend_from_slice(b"{\"id\":1,\"kind\":\"event\",\"ok\":true}\n"),
            1 => out.extend_from_slice(&x.to_le_bytes()),
            _ => out.extend_from_slice(format!("row {} col {}\n", x % 97, x % 13).as_bytes()),
        }
    }
    out.truncate(n);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: io::copy through writer and reader
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_io_copy_roundtrip() {
    let original = document(3 << 20);
    let mut w = Writer::new(Vec::new());
    let copied = io::copy(&mut &original[..], &mut w).expect("copy into writer");
    assert_eq!(copied, original.len() as u64);
    let compressed = w.into_inner().expect("close");
    assert!(compressed.len() < original.len());

    let mut r = Reader::new(&compressed[..]);
    let mut decoded = Vec::new();
    io::copy(&mut r, &mut decoded).expect("copy out of reader");
    assert_eq!(decoded, original);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: option matrix
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_option_matrix() {
    let original = document(300_000);
    for level in [Level::Fastest, Level::Balanced, Level::Smallest] {
        for block_size in [4096usize, 100_000, 1 << 20] {
            for (crc_compressed, uncompressed, padding) in
                [(false, false, 0usize), (true, false, 0), (false, true, 0), (false, false, 65_536)]
            {
                let opts = WriterOptions::default()
                    .with_level(level)
                    .with_block_size(block_size)
                    .with_concurrency(2)
                    .with_compressed_checksum(crc_compressed)
                    .with_uncompressed(uncompressed)
                    .with_padding(padding);
                let z = compress(&original, &opts).expect("compress");
                if padding > 0 {
                    assert_eq!(z.len() % padding, 0);
                }
                assert_eq!(decompress(&z).expect("decompress"), original, "{:?}", opts);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: user metadata chunks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_user_metadata_chunks() {
    let mut w = Writer::with_options(Vec::new(), WriterOptions::default().with_block_size(8192))
        .expect("writer");
    let mut original = Vec::new();
    for i in 0..5u8 {
        let part = document(20_000 + i as usize);
        w.write_all(&part).unwrap();
        original.extend_from_slice(&part);
        w.add_user_chunk(0xc0, format!("section {}", i).as_bytes()).unwrap();
        w.add_user_chunk(0x80, b"ignored by default").unwrap();
    }
    let z = w.into_inner().unwrap();

    let sections = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&sections);
    let mut r = Reader::new(&z[..]);
    r.on_user_chunk(0xc0, move |payload| {
        seen.lock().unwrap().push(String::from_utf8_lossy(payload).into_owned());
        Ok(())
    })
    .unwrap();
    let mut decoded = Vec::new();
    r.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, original);
    let sections = sections.lock().unwrap();
    assert_eq!(sections.len(), 5);
    assert_eq!(sections[4], "section 4");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: concatenated streams
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_concatenated_streams() {
    let a = document(70_000);
    let b = document(1);
    let c = document(250_000);
    let mut joined = compress(&a, &WriterOptions::default()).unwrap();
    joined.extend(compress(&b, &WriterOptions::default().with_index(false)).unwrap());
    joined.extend(compress(&c, &WriterOptions::default().with_block_size(16 << 10)).unwrap());

    let mut want = a;
    want.extend_from_slice(&b);
    want.extend_from_slice(&c);
    assert_eq!(decompress(&joined).unwrap(), want);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: random access through Seek
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_random_access() {
    let original = document(2 << 20);
    let opts = WriterOptions::default().with_block_size(64 << 10).with_concurrency(4);
    let z = compress(&original, &opts).unwrap();

    let mut r = Reader::new(Cursor::new(z));
    let mut x = 7usize;
    let mut buf = vec![0u8; 5000];
    for _ in 0..50 {
        x = (x * 1_103_515_245 + 12_345) % (1 << 31);
        let at = x % (original.len() - buf.len());
        r.seek(SeekFrom::Start(at as u64)).unwrap();
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &original[at..at + buf.len()], "at {}", at);
    }
    let idx = r.index().unwrap();
    assert_eq!(idx.total_uncompressed, original.len() as i64);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: reader limits
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_reader_block_size_limit() {
    let original = document(10_000);
    let z = compress(&original, &WriterOptions::default().with_block_size(256 << 10)).unwrap();
    let tight = ReaderOptions::default().with_max_block_size(256 << 10);
    assert_eq!(minlz::stream::decompress_with(&z, &tight).unwrap(), original);
    let tighter = ReaderOptions::default().with_max_block_size(128 << 10);
    assert!(minlz::stream::decompress_with(&z, &tighter).is_err());
}
