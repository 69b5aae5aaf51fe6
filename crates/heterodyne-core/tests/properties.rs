//! Property-based tests for the dataflow engine's foundational invariants.
//!
//! Mirrors the teacher's `sonido-core/tests/properties.rs`: randomized
//! generators drive the same primitives the unit tests exercise by hand, to
//! widen coverage past the hand-picked examples.

use heterodyne_core::Channel;
use proptest::prelude::*;

/// `round_up_to_power_of_two` (property 9, §8): for any input in range, the
/// result is a power of two, is at least as large as the input, and no
/// smaller power of two would also satisfy that.
mod round_up_to_power_of_two {
    use super::*;
    use heterodyne_core::buffer::round_up_to_power_of_two;

    proptest! {
        #[test]
        fn result_is_the_minimal_covering_power_of_two(value in 1u64..=(1u64 << 40)) {
            let rounded = round_up_to_power_of_two(value);
            prop_assert_eq!(rounded.count_ones(), 1, "{rounded} is not a power of two");
            prop_assert!(rounded >= value);
            prop_assert!(rounded / 2 < value, "{rounded} is not minimal for {value}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Write,
    Read,
}

proptest! {
    /// `readable() <= capacity()` must hold through any interleaving of
    /// single-element writes and reads (property 1, §8's ring invariant),
    /// and every sample that comes back out must match what went in, in
    /// order — a dropped or duplicated sample would desync the two.
    #[test]
    fn channel_round_trips_arbitrary_write_read_interleavings(
        ops in prop::collection::vec(
            prop_oneof![Just(Op::Write), Just(Op::Read)],
            1..500,
        ),
    ) {
        let channel = Channel::new_real(4);
        let mut next_value = 0.0f32;
        let mut produced = Vec::new();
        let mut consumed = Vec::new();

        for op in ops {
            match op {
                Op::Write => {
                    if channel.writable() == 0 {
                        continue;
                    }
                    let sample = [next_value];
                    channel.write_real(&sample);
                    channel.advance_write(1);
                    produced.push(next_value);
                    next_value += 1.0;
                }
                Op::Read => {
                    if channel.readable() == 0 {
                        continue;
                    }
                    let mut out = [0.0f32];
                    channel.read_real(&mut out);
                    channel.advance_read(1);
                    consumed.push(out[0]);
                }
            }
            prop_assert!(channel.readable() <= channel.capacity());
            prop_assert!(channel.readable() + channel.writable() == channel.capacity());
        }

        prop_assert_eq!(&consumed[..], &produced[..consumed.len()]);
    }
}
