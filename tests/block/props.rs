// Property tests for the block codec.

use minlz::{decode, encode, max_encoded_len, Level};
use proptest::prelude::*;

fn level() -> impl Strategy<Value = Level> {
    prop_oneof![Just(Level::Fastest), Just(Level::Balanced), Just(Level::Smallest)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_bytes_round_trip(data in proptest::collection::vec(any::<u8>(), 0..=20_000), level in level()) {
        let block = encode(&data, level).unwrap();
        prop_assert!(block.len() <= max_encoded_len(data.len()).unwrap());
        prop_assert_eq!(decode(&block).unwrap(), data);
    }

    #[test]
    fn small_alphabet_round_trip(data in proptest::collection::vec(0u8..4, 0..=70_000), level in level()) {
        let block = encode(&data, level).unwrap();
        prop_assert!(block.len() <= max_encoded_len(data.len()).unwrap());
        prop_assert_eq!(decode(&block).unwrap(), data);
    }

    #[test]
    fn arbitrary_input_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode(&data);
        let mut framed = vec![0u8, 0x80, 0x01];
        framed.extend_from_slice(&data);
        let _ = decode(&framed);
    }

    #[test]
    fn truncated_blocks_never_panic(
        data in proptest::collection::vec(0u8..8, 100..5_000),
        cut in any::<prop::sample::Index>(),
    ) {
        let block = encode(&data, Level::Balanced).unwrap();
        let n = cut.index(block.len());
        if let Ok(out) = decode(&block[..n]) {
            prop_assert!(out.len() <= data.len());
        }
    }
}
