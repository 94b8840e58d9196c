//! E2E Test Suite 01: Block One-Shot API
//!
//! Validates the block functions exported at the crate root:
//! - encode / Encoder::encode / Encoder::encode_into
//! - decode / decode_into / decoded_len
//! - max_encoded_len
//! - block::legacy::decode for Snappy/S2 blocks

extern crate minlz;

use minlz::block::legacy;
use minlz::{
    decode, decode_into, decoded_len, encode, max_encoded_len, BlockError, Encoder, Level,
    MAX_BLOCK_SIZE,
};

const LEVELS: [Level; 3] = [Level::Fastest, Level::Balanced, Level::Smallest];

fn log_lines(n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n + 128);
    let mut i = 0u32;
    while out.len() < n {
        let line = format!(
            "2024-01-{:02}T{:02}:{:02}:00Z level=info service=api request_id={} status={}\n",
            i % 28 + 1,
            i % 24,
            i % 60,
            i.wrapping_mul(2_654_435_761) % 100_000,
            [200, 200, 200, 404, 500][i as usize % 5]
        );
        out.extend_from_slice(line.as_bytes());
        i += 1;
    }
    out.truncate(n);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: round trip of typical data at every level
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_typical_data() {
    let original = log_lines(256 << 10);
    for level in LEVELS {
        let block = encode(&original, level).expect("encode should succeed");
        assert!(
            block.len() < original.len() / 2,
            "{:?}: {} bytes should compress below half",
            level,
            block.len()
        );
        let decoded = decode(&block).expect("decode should succeed");
        assert_eq!(decoded, original, "{:?} round trip mismatch", level);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: higher levels do not lose to lower ones on compressible data
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_levels_are_ordered_on_text() {
    let original = log_lines(512 << 10);
    let sizes: Vec<usize> = LEVELS
        .iter()
        .map(|&l| encode(&original, l).expect("encode should succeed").len())
        .collect();
    assert!(
        sizes[2] <= sizes[0] + sizes[0] / 50,
        "smallest {} vs fastest {}",
        sizes[2],
        sizes[0]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: largest block
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_max_block_size() {
    let original: Vec<u8> = log_lines(MAX_BLOCK_SIZE);
    let block = encode(&original, Level::Fastest).expect("8 MiB block should encode");
    assert!(block.len() <= max_encoded_len(MAX_BLOCK_SIZE).unwrap());
    assert_eq!(decoded_len(&block), Ok(MAX_BLOCK_SIZE));
    assert_eq!(decode(&block).expect("decode"), original);

    let too_big = vec![0u8; MAX_BLOCK_SIZE + 1];
    assert_eq!(encode(&too_big, Level::Fastest), Err(BlockError::TooLarge));
    assert_eq!(max_encoded_len(MAX_BLOCK_SIZE + 1), None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: tiny inputs are stored raw
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_tiny_inputs_stored_raw() {
    assert_eq!(encode(b"", Level::Balanced).unwrap(), [0x00]);
    assert_eq!(decode(&[0x00]).unwrap(), b"");
    for n in 1..=16usize {
        let src = vec![b'z'; n];
        let block = encode(&src, Level::Smallest).unwrap();
        assert_eq!(&block[..2], [0x00, 0x00], "n={}", n);
        assert_eq!(&block[2..], &src[..]);
        assert_eq!(decode(&block).unwrap(), src);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: encode_into appends, decode_into writes in place
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_encode_into_appends_several_blocks() {
    let parts = [log_lines(10_000), vec![0u8; 30_000], log_lines(777)];
    let mut enc = Encoder::new();
    let mut buf = b"prefix".to_vec();
    let mut spans = Vec::new();
    for part in &parts {
        let start = buf.len();
        let n = enc.encode_into(&mut buf, part, Level::Balanced).unwrap();
        assert_eq!(buf.len(), start + n);
        spans.push(start..start + n);
    }
    assert_eq!(&buf[..6], b"prefix");
    for (part, span) in parts.iter().zip(spans) {
        let mut out = vec![0xffu8; part.len()];
        assert_eq!(decode_into(&mut out, &buf[span]).unwrap(), part.len());
        assert_eq!(&out, part);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: the four-byte literal in both dialects
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_abcd_legacy_and_native() {
    // Snappy/S2 literal tag for four bytes is 0x0c.
    assert_eq!(legacy::decode(b"\x04\x0cabcd").unwrap(), b"abcd");
    assert_eq!(legacy::decoded_len(b"\x04\x0cabcd").unwrap(), 4);

    // Native blocks start with a zero marker byte and use 0x18.
    assert_eq!(decode(b"\x00\x04\x18abcd"), Err(BlockError::Corrupt));
    let native = {
        let mut enc = Encoder::new();
        let mut v = Vec::new();
        enc.encode_into(&mut v, b"abcd", Level::Fastest).unwrap();
        v
    };
    assert_eq!(decode(&native).unwrap(), b"abcd");
    assert!(decode(b"\x04\x0cabcd").is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: long runs and periodic data
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_overlapping_copies() {
    let mut original = Vec::new();
    for period in [1usize, 2, 3, 7, 64, 1000] {
        let unit: Vec<u8> = (0..period).map(|i| (i * 31 + period) as u8).collect();
        original.extend(unit.iter().cycle().take(20_000));
    }
    for level in LEVELS {
        let block = encode(&original, level).unwrap();
        assert!(block.len() < original.len() / 20, "{:?}: {}", level, block.len());
        assert_eq!(decode(&block).unwrap(), original);
    }
}
