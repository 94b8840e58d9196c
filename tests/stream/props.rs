// Property tests for the stream container.

use std::io::{Read, Write};

use minlz::{decode_concurrent, decompress, Reader, Writer, WriterOptions};
use proptest::prelude::*;

fn opts() -> impl Strategy<Value = WriterOptions> {
    (
        prop_oneof![Just(1024usize), Just(4096), Just(64 << 10)],
        1usize..4,
        any::<bool>(),
        prop_oneof![Just(0usize), Just(1), Just(512)],
    )
        .prop_map(|(block_size, concurrency, checksum_compressed, padding)| {
            WriterOptions::default()
                .with_block_size(block_size)
                .with_concurrency(concurrency)
                .with_compressed_checksum(checksum_compressed)
                .with_padding(padding)
        })
}

fn data() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..20_000),
        proptest::collection::vec(0u8..3, 0..40_000),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn chunked_writes_round_trip(
        data in data(),
        opts in opts(),
        piece in 1usize..5000,
        read_size in 1usize..3000,
    ) {
        let mut w = Writer::with_options(Vec::new(), opts).unwrap();
        for part in data.chunks(piece) {
            w.write_all(part).unwrap();
        }
        let z = w.into_inner().unwrap();

        prop_assert_eq!(&decompress(&z).unwrap(), &data);
        prop_assert_eq!(&decode_concurrent(&z, 3).unwrap(), &data);

        let mut r = Reader::new(&z[..]);
        let mut out = Vec::new();
        let mut buf = vec![0u8; read_size];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(out, data);
    }

    #[test]
    fn garbage_never_panics(body in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let mut s = b"\xff\x06\x00\x00MinLz\x00".to_vec();
        s.extend_from_slice(&body);
        let _ = decompress(&s);
        let _ = decode_concurrent(&s, 2);
    }
}
