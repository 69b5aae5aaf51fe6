//! Property-based tests for the RDS block codec (§8 properties 5-7).
//!
//! Mirrors the teacher's `sonido-core/tests/properties.rs` in structure:
//! randomized generators replace the hand-picked examples already covered
//! by `rds.rs`'s unit tests.

use heterodyne_dsp::{DecodeOutcome, OFFSETS};
use heterodyne_dsp::rds::{decode, encode, validate};
use proptest::prelude::*;

proptest! {
    /// Property 5: encoding then decoding any info word under any offset
    /// recovers it exactly, with no correction applied.
    #[test]
    fn encode_then_decode_recovers_the_info_word(
        info in any::<u16>(),
        offset_index in 0usize..4,
    ) {
        let offset = OFFSETS[offset_index];
        let block = encode(info, offset);
        prop_assert!(validate(block, offset));
        prop_assert_eq!(decode(block, offset), DecodeOutcome::Valid { info });
    }

    /// Property 6: flipping exactly one bit of an otherwise-valid block is
    /// always correctable back to the original info word.
    #[test]
    fn any_single_bit_flip_is_corrected(
        info in any::<u16>(),
        offset_index in 0usize..4,
        bit in 0u32..26,
    ) {
        let offset = OFFSETS[offset_index];
        let block = encode(info, offset);
        let flipped = block ^ (1 << bit);
        prop_assert_eq!(
            decode(flipped, offset),
            DecodeOutcome::Corrected { info, bit_index: bit },
        );
    }

    /// A double-bit flip that lands entirely within the check word (the low
    /// 10 bits) can never change the decoded info word, correction or not —
    /// the info word is carried solely in the high 16 bits. Property 7's
    /// false-accept *rate* bound (flips anywhere in the 26-bit block) is
    /// covered statistically by `rds.rs`'s `double_bit_flip_rarely_looks_like_a_clean_decode`.
    #[test]
    fn check_word_only_double_flip_leaves_the_info_word_unchanged(
        info in any::<u16>(),
        offset_index in 0usize..4,
        bit_a in 0u32..10,
        bit_b in 0u32..10,
    ) {
        prop_assume!(bit_a != bit_b);
        let offset = OFFSETS[offset_index];
        let block = encode(info, offset);
        let flipped = block ^ (1 << bit_a) ^ (1 << bit_b);

        match decode(flipped, offset) {
            DecodeOutcome::Failed => {}
            DecodeOutcome::Valid { info: got } | DecodeOutcome::Corrected { info: got, .. } => {
                prop_assert_eq!(got, info);
            }
        }
    }
}
