//! Algebraic invariants of the AIS bit-level codec and wire quantization,
//! checked across randomly generated inputs rather than fixed examples.

use iqrange_core::ais::{crc16_ccitt, destuff, nrzi_decode, nrzi_encode, stuff, verify_crc};
use iqrange_core::dongle_server::{dequantize, quantize};
use proptest::prelude::*;

proptest! {
    #[test]
    fn nrzi_decode_is_the_inverse_of_nrzi_encode(
        bits in prop::collection::vec(0u8..=1, 1..200),
        seed in 0u8..=1,
    ) {
        let line = nrzi_encode(&bits, seed);
        let recovered = nrzi_decode(&line, seed);
        prop_assert_eq!(recovered, bits);
    }

    #[test]
    fn destuff_is_the_inverse_of_stuff(bits in prop::collection::vec(0u8..=1, 1..200)) {
        let stuffed = stuff(&bits);
        prop_assert_eq!(destuff(&stuffed), bits);
    }

    #[test]
    fn quantize_dequantize_round_trip_is_within_tolerance(v in -1.0f32..=1.0f32) {
        let recovered = dequantize(quantize(v));
        prop_assert!((recovered - v).abs() <= 1.0 / 127.5 + 1e-6);
    }

    #[test]
    fn crc_accepts_valid_frames_and_rejects_single_bit_flips(
        data in prop::collection::vec(0u8..=1, 32..200),
        flip_index in any::<usize>(),
    ) {
        let crc = crc16_ccitt(&data);
        let mut frame = data.clone();
        for i in (0..16).rev() {
            frame.push(((crc >> i) & 1) as u8);
        }
        prop_assert!(verify_crc(&frame));

        let flip_at = flip_index % frame.len();
        frame[flip_at] ^= 1;
        prop_assert!(!verify_crc(&frame));
    }
}
