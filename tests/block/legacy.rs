// Legacy decode mode: Snappy blocks with the S2 repeat extension.
//
//   - the four-byte "abcd" literal uses tag 0x0C here and 0x18 natively
//   - legacy blocks are never accepted by the native decoder
//   - extended literal lengths, copies and repeats

use minlz::block::legacy;
use minlz::block::tag::{decode_tag, Tag};
use minlz::{decode, encode, BlockError, Level};

#[test]
fn abcd_literal_legacy_and_native() {
    assert_eq!(legacy::decode(b"\x04\x0cabcd").unwrap(), b"abcd");
    assert_eq!(legacy::decoded_len(b"\x04\x0cabcd").unwrap(), 4);

    // Native blocks of up to 16 bytes are stored raw; the native literal tag
    // for four bytes is 0x18.
    assert_eq!(encode(b"abcd", Level::Balanced).unwrap(), b"\x00\x00abcd");
    assert_eq!(decode_tag(b"\x18abcd").unwrap(), (Tag::Literal { len: 4 }, 1));
}

#[test]
fn legacy_block_is_not_native() {
    assert_eq!(decode(b"\x04\x0cabcd"), Err(BlockError::Corrupt));
}

#[test]
fn extended_literal_length() {
    let payload: Vec<u8> = (0..100u8).collect();
    let mut block = vec![100, 60 << 2, 99];
    block.extend_from_slice(&payload);
    assert_eq!(legacy::decode(&block).unwrap(), payload);

    // Same literal with a truncated length byte.
    assert_eq!(legacy::decode(&[100, 60 << 2]), Err(BlockError::Corrupt));
}

#[test]
fn repeat_extension_lengths() {
    // "ab", copy1(offset 2, len 4), then an S2 repeat with a one-byte length:
    // field 5, extra byte 10, length 10 + 4 + 4 = 18.
    let block = [24, 0x04, b'a', b'b', 0x01, 0x02, 0x01 | 5 << 2, 0x00, 10];
    let out = legacy::decode(&block).unwrap();
    assert_eq!(out.len(), 24);
    assert!(out.chunks(2).all(|p| p == b"ab"));
}

#[test]
fn bad_offsets_are_corrupt() {
    // Copy further back than the output.
    assert_eq!(legacy::decode(b"\x08\x0cabcd\x01\x05"), Err(BlockError::Corrupt));
    // Copy2 with offset zero.
    assert_eq!(legacy::decode(b"\x08\x0cabcd\x0e\x00\x00"), Err(BlockError::Corrupt));
    // Declared size above the block limit.
    assert_eq!(legacy::decode(b"\x81\x80\x80\x04"), Err(BlockError::TooLarge));
}
