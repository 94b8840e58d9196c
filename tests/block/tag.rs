// Tag codec through the public `minlz::block::tag` API.
//
//   - exact bytes for the smallest form of each tag kind
//   - every emitted tag decodes back to the same instruction
//   - cost functions agree with what the emitters produce
//   - decode_tag never reads past the end of its input

use minlz::block::tag::{
    copy_cost, decode_tag, emit_copy, emit_copy3, emit_copy_lits, emit_literal, emit_repeat,
    literal_cost, repeat_cost, Tag,
};
use minlz::block::types::{COPY1_MAX_OFFSET, COPY2_MAX_OFFSET, COPY3_MAX_OFFSET};
use minlz::BlockError;

fn emitted<F: FnOnce(&mut Vec<u8>)>(f: F) -> Vec<u8> {
    let mut v = Vec::new();
    f(&mut v);
    v
}

// ─────────────────────────────────────────────────────────────────────────────
// Exact encodings
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn smallest_forms() {
    assert_eq!(emitted(|d| emit_literal(d, b"a")), [0x00, b'a']);
    assert_eq!(emitted(|d| emit_literal(d, b"abcd")), [0x18, b'a', b'b', b'c', b'd']);
    assert_eq!(emitted(|d| emit_repeat(d, 1)), [0x04]);
    assert_eq!(emitted(|d| emit_copy(d, 1, 4)), [0x01, 0x00]);
    assert_eq!(emitted(|d| emit_copy(d, 1025, 4)), [0x02, 0xc1, 0x03]);
    assert_eq!(emitted(|d| emit_copy(d, 65_600, 4)), [0x07, 0x00, 0x02, 0x00]);
}

#[test]
fn copy1_largest_inline_form() {
    let v = emitted(|d| emit_copy(d, 1024, 18));
    assert_eq!(v, [0xf9, 0xff]);
    assert_eq!(decode_tag(&v).unwrap(), (Tag::Copy1 { offset: 1024, len: 18 }, 2));
}

#[test]
fn empty_literal_emits_nothing() {
    assert!(emitted(|d| emit_literal(d, b"")).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Decode agreement
// ─────────────────────────────────────────────────────────────────────────────

const LENGTHS: [usize; 12] = [4, 5, 11, 12, 18, 19, 64, 65, 273, 274, 319, 70_000];

#[test]
fn plain_copies_decode_to_same_instruction() {
    let offsets = [
        1,
        63,
        64,
        COPY1_MAX_OFFSET,
        COPY1_MAX_OFFSET + 1,
        65_535,
        COPY2_MAX_OFFSET,
        COPY2_MAX_OFFSET + 1,
        COPY3_MAX_OFFSET,
    ];
    for &offset in &offsets {
        for &len in &LENGTHS {
            let v = emitted(|d| emit_copy(d, offset, len));
            assert_eq!(v.len(), copy_cost(offset, len), "offset={} len={}", offset, len);

            let (tag, used) = decode_tag(&v).unwrap();
            let mut total = tag.produced();
            let got_offset = match tag {
                Tag::Copy1 { offset, .. }
                | Tag::Copy2 { offset, .. }
                | Tag::Copy3 { offset, .. } => offset,
                other => panic!("unexpected {:?}", other),
            };
            assert_eq!(got_offset, offset);
            // Long copy1 runs continue as a repeat.
            if used < v.len() {
                let (rest, _) = decode_tag(&v[used..]).unwrap();
                assert!(matches!(rest, Tag::Repeat { .. }));
                total += rest.produced();
            }
            assert_eq!(total, len, "offset={} len={}", offset, len);
        }
    }
}

#[test]
fn literal_and_repeat_costs_match() {
    for &n in &[1usize, 29, 30, 285, 286, 65_565, 65_566, 100_000] {
        let lits = vec![7u8; n];
        let v = emitted(|d| emit_literal(d, &lits));
        assert_eq!(v.len(), literal_cost(n) + n);
        assert_eq!(decode_tag(&v).unwrap(), (Tag::Literal { len: n }, literal_cost(n)));

        let r = emitted(|d| emit_repeat(d, n));
        assert_eq!(r.len(), repeat_cost(n));
        assert_eq!(decode_tag(&r).unwrap(), (Tag::Repeat { len: n }, r.len()));
    }
}

#[test]
fn fused_forms_carry_literals() {
    let v = emitted(|d| emit_copy_lits(d, b"xyz", 5000, 9));
    let (tag, used) = decode_tag(&v).unwrap();
    assert_eq!(tag, Tag::Copy2 { offset: 5000, len: 9, lits: 3 });
    assert_eq!(&v[used..], b"xyz");

    let v = emitted(|d| emit_copy3(d, 100_000, 4, b"pq"));
    let (tag, used) = decode_tag(&v).unwrap();
    assert_eq!(tag, Tag::Copy3 { offset: 100_000, len: 4, lits: 2 });
    assert_eq!(tag.literal_bytes(), 2);
    assert_eq!(&v[used..], b"pq");
}

#[test]
fn short_offsets_are_never_fused() {
    let v = emitted(|d| emit_copy_lits(d, b"ab", 10, 4));
    let (first, used) = decode_tag(&v).unwrap();
    assert_eq!(first, Tag::Literal { len: 2 });
    let (second, _) = decode_tag(&v[used + 2..]).unwrap();
    assert_eq!(second, Tag::Copy1 { offset: 10, len: 4 });
}

// ─────────────────────────────────────────────────────────────────────────────
// Truncation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn every_prefix_of_a_tag_header_is_corrupt() {
    let samples = [
        emitted(|d| emit_literal(d, &vec![0u8; 70_000])),
        emitted(|d| emit_copy(d, 1000, 200)),
        emitted(|d| emit_copy(d, 40_000, 70_000)),
        emitted(|d| emit_copy(d, 2_000_000, 300)),
    ];
    for v in &samples {
        let (_, used) = decode_tag(v).unwrap();
        for cut in 0..used {
            assert_eq!(decode_tag(&v[..cut]), Err(BlockError::Corrupt), "cut={}", cut);
        }
    }
}
