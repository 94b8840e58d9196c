//! E2E Test Suite 03: Concurrent Encode and Decode
//!
//! - parallel writers produce byte-identical streams to a single worker
//! - decode_concurrent matches the sequential reader for any worker count
//! - indexed streams written in several flushes still split cleanly

extern crate minlz;

use std::io::Write;

use minlz::{compress, decode_concurrent, decompress, Index, Writer, WriterOptions};

fn dataset(n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    let mut state = 0x9e37_79b9u32;
    while out.len() < n {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let run = 16 + (state % 400) as usize;
        if state & 1 == 0 {
            let at = out.len().saturating_sub(1 + (state as usize % 100_000));
            let end = (at + run).min(out.len());
            let piece: Vec<u8> = out[at..end].to_vec();
            out.extend_from_slice(&piece);
            if piece.is_empty() {
                out.push(state as u8);
            }
        } else {
            out.extend((0..run).map(|i| (state >> (i % 24)) as u8));
        }
    }
    out.truncate(n);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: encoder concurrency does not change the output
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_parallel_encode_is_deterministic() {
    let original = dataset(4 << 20);
    let base = WriterOptions::default().with_block_size(128 << 10);
    let reference = compress(&original, &base.clone().with_concurrency(1)).expect("compress");
    for workers in [2usize, 3, 8, 32] {
        let z = compress(&original, &base.clone().with_concurrency(workers)).expect("compress");
        assert_eq!(z, reference, "concurrency {}", workers);
    }
    assert_eq!(decompress(&reference).expect("decompress"), original);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: decode worker counts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_decode_worker_counts() {
    let original = dataset(3 << 20);
    let z = compress(&original, &WriterOptions::default().with_block_size(64 << 10)).unwrap();
    let index = Index::from_tail(&z).unwrap().expect("stream carries an index");
    assert_eq!(index.len(), 48);
    for workers in [1usize, 2, 4, 7, 48, 100] {
        let out = decode_concurrent(&z, workers).expect("decode");
        assert_eq!(out.len(), original.len());
        assert!(out == original, "mismatch with {} workers", workers);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: flushes and metadata between blocks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_irregular_stream_layout() {
    let original = dataset(1 << 20);
    let opts = WriterOptions::default().with_block_size(32 << 10).with_concurrency(4);
    let mut w = Writer::with_options(Vec::new(), opts).unwrap();
    let mut at = 0usize;
    let mut step = 1usize;
    while at < original.len() {
        let end = (at + step * 3331).min(original.len());
        w.write_all(&original[at..end]).unwrap();
        if step % 3 == 0 {
            w.flush().unwrap();
        }
        if step % 5 == 0 {
            w.add_user_chunk(0xa0, &(at as u64).to_le_bytes()).unwrap();
        }
        at = end;
        step += 1;
    }
    let z = w.into_inner().unwrap();
    assert_eq!(decompress(&z).unwrap(), original);
    for workers in [2usize, 5, 16] {
        assert!(decode_concurrent(&z, workers).unwrap() == original, "workers {}", workers);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: unindexed and concatenated input fall back to sequential decode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_sequential_fallback() {
    let a = dataset(200_000);
    let b = dataset(300_000);
    let plain = compress(&a, &WriterOptions::default().with_index(false)).unwrap();
    assert!(decode_concurrent(&plain, 4).unwrap() == a);

    let opts = WriterOptions::default().with_block_size(16 << 10);
    let mut both = compress(&a, &opts).unwrap();
    both.extend(compress(&b, &opts).unwrap());
    let mut want = a;
    want.extend_from_slice(&b);
    assert!(decode_concurrent(&both, 4).unwrap() == want);
}
