//! RDS block codec, block synchronizer, and differential decoder (§4.H, §4.M).
//!
//! Grounded in `rds_bits_corrector.h` (the `encodeRdsBlock` /
//! `isRdsBlockValid` / `decodeRdsBlock` trio) and `rds_decoding_stats.h`
//! (the `{failed, corrected, valid, skipped, tentative_skipped}` counters
//! and `clear()` semantics). The original headers ship without their
//! generator-matrix constant definitions, so the generator polynomial and
//! the offset words below are the ones published in the RDS/IEC 62106
//! specification and used across open RDS decoders.

use std::sync::{Arc, Mutex};

use heterodyne_core::{EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

/// CRC-10 generator polynomial `x^10+x^8+x^7+x^5+x^4+x^3+1`, the feedback
/// taps for the RDS check-word shift register (IEC 62106 Annex B).
const GENERATOR_POLY: u16 = 0x5B9;

/// Offset word for block A.
pub const OFFSET_A: u16 = 0x0FC;
/// Offset word for block B.
pub const OFFSET_B: u16 = 0x198;
/// Offset word for block C.
pub const OFFSET_C: u16 = 0x168;
/// Offset word for block C' (used in type-B groups in place of C).
pub const OFFSET_C2: u16 = 0x350;
/// Offset word for block D.
pub const OFFSET_D: u16 = 0x1B4;

/// The four block-position offsets in transmission order (A, B, C, D).
pub const OFFSETS: [u16; 4] = [OFFSET_A, OFFSET_B, OFFSET_C, OFFSET_D];

fn crc(value: u32, width: u32) -> u16 {
    let mut reg: u16 = 0;
    for k in (0..width).rev() {
        let bit = ((value >> k) & 1) as u16;
        let feedback = (reg >> 9) & 1;
        reg = ((reg << 1) | bit) & 0x3FF;
        if feedback == 1 {
            reg ^= GENERATOR_POLY;
        }
    }
    reg
}

/// Encodes a 16-bit info word into a 26-bit RDS block for `offset`
/// (§4.H `encode`): `info·G ⊕ offset` in the info/check-word layout.
pub fn encode(info: u16, offset: u16) -> u32 {
    let message = (info as u32) << 10;
    let check = crc(message, 26) ^ offset;
    message | check as u32
}

fn syndrome(block: u32) -> u16 {
    crc(block, 26)
}

/// True iff `block` is error-free under `offset` (§4.H `validate`).
pub fn validate(block: u32, offset: u16) -> bool {
    syndrome(block) == offset
}

/// Result of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// No error detected; `info` is the 16-bit payload.
    Valid {
        /// The decoded 16-bit info word.
        info: u16,
    },
    /// Exactly one single-bit flip restores validity.
    Corrected {
        /// The decoded 16-bit info word after correction.
        info: u16,
        /// Index (0 = LSB of the check word) of the corrected bit.
        bit_index: u32,
    },
    /// No single-bit flip restores validity, or more than one does (a burst
    /// error); the decoder refuses to guess rather than risk a false accept.
    Failed,
}

/// Validates `block` against `offset`; if invalid, tries every single-bit
/// flip and accepts a correction only if it is unique (§4.H `decode`).
pub fn decode(block: u32, offset: u16) -> DecodeOutcome {
    if validate(block, offset) {
        return DecodeOutcome::Valid {
            info: (block >> 10) as u16,
        };
    }
    let mut candidate: Option<(u32, u32)> = None;
    for bit in 0..26u32 {
        let flipped = block ^ (1 << bit);
        if validate(flipped, offset) {
            if candidate.is_some() {
                return DecodeOutcome::Failed;
            }
            candidate = Some((flipped, bit));
        }
    }
    match candidate {
        Some((flipped, bit_index)) => DecodeOutcome::Corrected {
            info: (flipped >> 10) as u16,
            bit_index,
        },
        None => DecodeOutcome::Failed,
    }
}

/// Accumulated decoding statistics, grounded in `rds_decoding_stats.h`'s
/// field names and `clear()` semantics. Statistics counters are never reset
/// by errors (§7); only an explicit [`RdsDecodingStats::clear`] zeros them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RdsDecodingStats {
    /// Blocks that failed decoding outright (no unique single-bit fix).
    pub failed: u64,
    /// Blocks accepted after a single-bit correction.
    pub corrected: u64,
    /// Blocks that decoded with no error.
    pub valid: u64,
    /// Bit positions slid past during acquisition without finding a lock.
    pub skipped: u64,
    /// Blocks provisionally decoded before frame lock was established, and
    /// therefore not counted toward a locked group.
    pub tentative_skipped: u64,
}

impl RdsDecodingStats {
    /// Zeros every counter.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Shared, cloneable handle to a running decoder's statistics, readable from
/// any thread while the pipeline runs (mirrors the stereo weight's
/// cross-thread handle pattern in §9).
#[derive(Clone, Default)]
pub struct RdsStatsHandle(Arc<Mutex<RdsDecodingStats>>);

impl RdsStatsHandle {
    /// Reads a consistent snapshot of the current counters.
    pub fn snapshot(&self) -> RdsDecodingStats {
        *self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut RdsDecodingStats)) {
        let mut guard = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard);
    }
}

/// Number of consecutive failed blocks that drop a locked synchronizer back
/// into the acquisition search.
const LOCK_LOSS_THRESHOLD: u32 = 3;

/// Differentially decodes a hard-sliced symbol stream and maintains the
/// 26-bit sliding window across the four offsets (§4.H "block
/// synchronizer", §4.M). Has no output port: decoded groups are a diagnostic
/// side channel (the stats handle), not a sample stream, so this stage is a
/// sink like any audio sink.
pub struct RdsGroupDecoder {
    prev_bit: u32,
    window: u32,
    bits_in_window: u32,
    locked: bool,
    offset_cursor: usize,
    bits_since_block: u32,
    consecutive_failures: u32,
    stats: RdsStatsHandle,
    inputs: Vec<PortSpec>,
}

impl RdsGroupDecoder {
    /// Builds a decoder consuming `batch` symbol samples per call.
    pub fn new(batch: usize) -> Self {
        Self {
            prev_bit: 0,
            window: 0,
            bits_in_window: 0,
            locked: false,
            offset_cursor: 0,
            bits_since_block: 0,
            consecutive_failures: 0,
            stats: RdsStatsHandle::default(),
            inputs: vec![PortSpec::real("symbols", 0, batch)],
        }
    }

    /// A cloneable handle to this decoder's running statistics.
    pub fn stats_handle(&self) -> RdsStatsHandle {
        self.stats.clone()
    }

    fn push_bit(&mut self, sample: f32) {
        let hard_sliced = u32::from(sample >= 0.0);
        let bit = hard_sliced ^ self.prev_bit;
        self.prev_bit = hard_sliced;

        self.window = ((self.window << 1) | bit) & 0x3FF_FFFF;
        self.bits_in_window = (self.bits_in_window + 1).min(26);

        if !self.locked {
            self.try_acquire();
        } else {
            self.bits_since_block += 1;
            if self.bits_since_block >= 26 {
                self.bits_since_block = 0;
                self.decode_locked_block();
            }
        }
    }

    /// Tries every one of the four offsets against the current 26-bit
    /// window (§4.H "the surrounding block-synchronizer ... tries each of
    /// four offsets"). Locks on the first clean match.
    fn try_acquire(&mut self) {
        if self.bits_in_window < 26 {
            return;
        }
        let mut any_corrected = false;
        for (idx, &offset) in OFFSETS.iter().enumerate() {
            match decode(self.window, offset) {
                DecodeOutcome::Valid { .. } => {
                    self.lock(idx);
                    self.stats.update(|s| s.valid += 1);
                    return;
                }
                DecodeOutcome::Corrected { .. } => any_corrected = true,
                DecodeOutcome::Failed => {}
            }
        }
        if any_corrected {
            self.stats.update(|s| s.tentative_skipped += 1);
        } else {
            self.stats.update(|s| s.skipped += 1);
        }
    }

    fn lock(&mut self, matched_offset_index: usize) {
        tracing::debug!(offset_index = matched_offset_index, "RDS frame lock acquired");
        self.locked = true;
        self.bits_since_block = 0;
        self.consecutive_failures = 0;
        self.offset_cursor = (matched_offset_index + 1) % OFFSETS.len();
    }

    fn decode_locked_block(&mut self) {
        let offset = OFFSETS[self.offset_cursor];
        match decode(self.window, offset) {
            DecodeOutcome::Valid { .. } => {
                self.stats.update(|s| s.valid += 1);
                self.consecutive_failures = 0;
            }
            DecodeOutcome::Corrected { .. } => {
                self.stats.update(|s| s.corrected += 1);
                self.consecutive_failures = 0;
            }
            DecodeOutcome::Failed => {
                self.stats.update(|s| s.failed += 1);
                self.consecutive_failures += 1;
                if self.consecutive_failures >= LOCK_LOSS_THRESHOLD {
                    tracing::warn!(
                        consecutive_failures = self.consecutive_failures,
                        "RDS frame lock lost"
                    );
                    self.locked = false;
                    self.consecutive_failures = 0;
                }
            }
        }
        self.offset_cursor = (self.offset_cursor + 1) % OFFSETS.len();
    }
}

impl Stage for RdsGroupDecoder {
    fn name(&self) -> &str {
        "rds_group_decoder"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &[]
    }
    fn reset(&mut self) {
        self.prev_bit = 0;
        self.window = 0;
        self.bits_in_window = 0;
        self.locked = false;
        self.offset_cursor = 0;
        self.bits_since_block = 0;
        self.consecutive_failures = 0;
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let symbols = ctx.input(0).as_real();
        for &sample in symbols {
            self.push_bit(sample);
        }
        let n = symbols.len();
        ctx.input(0).mark_consumed(n);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_every_offset() {
        for &offset in &OFFSETS {
            for info in [0x0000u16, 0x0001, 0x1234, 0x8000, 0xFFFF, 0xBEEF] {
                let block = encode(info, offset);
                assert_eq!(decode(block, offset), DecodeOutcome::Valid { info });
            }
        }
    }

    #[test]
    fn single_bit_flip_is_corrected_to_original_info() {
        let info = 0x1234u16;
        let offset = OFFSET_A;
        let block = encode(info, offset);
        for bit in 0..26u32 {
            let flipped = block ^ (1 << bit);
            match decode(flipped, offset) {
                DecodeOutcome::Corrected {
                    info: got,
                    bit_index,
                } => {
                    assert_eq!(got, info);
                    assert_eq!(bit_index, bit);
                }
                other => panic!("bit {bit}: expected Corrected, got {other:?}"),
            }
        }
    }

    #[test]
    fn offset_a_single_bit_flip_at_bit_seven_is_corrected() {
        let info = 0x1234u16;
        let block = encode(info, OFFSET_A);
        let flipped = block ^ (1 << 7);
        assert_eq!(
            decode(flipped, OFFSET_A),
            DecodeOutcome::Corrected {
                info: 0x1234,
                bit_index: 7
            }
        );
    }

    #[test]
    fn double_bit_flip_rarely_looks_like_a_clean_decode() {
        let mut rng_state: u64 = 0x243F6A8885A308D3;
        let mut next = || {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;
            rng_state
        };

        let trials = 5_000;
        let mut false_accepts = 0u32;
        for _ in 0..trials {
            let info = (next() & 0xFFFF) as u16;
            let bit_a = (next() % 26) as u32;
            let mut bit_b = (next() % 26) as u32;
            if bit_b == bit_a {
                bit_b = (bit_b + 1) % 26;
            }
            let block = encode(info, OFFSET_A) ^ (1 << bit_a) ^ (1 << bit_b);
            match decode(block, OFFSET_A) {
                DecodeOutcome::Failed => {}
                DecodeOutcome::Valid { info: got } | DecodeOutcome::Corrected { info: got, .. } => {
                    if got == info {
                        false_accepts += 1;
                    }
                }
            }
        }
        let rate = f64::from(false_accepts) / f64::from(trials);
        assert!(rate < 4e-4 * 4.0, "false-accept rate too high: {rate}");
    }

    #[test]
    fn stats_clear_zeros_every_counter() {
        let mut stats = RdsDecodingStats {
            failed: 1,
            corrected: 2,
            valid: 3,
            skipped: 4,
            tentative_skipped: 5,
        };
        stats.clear();
        assert_eq!(stats, RdsDecodingStats::default());
    }

    #[test]
    fn group_decoder_locks_onto_a_clean_bitstream() {
        let mut decoder = RdsGroupDecoder::new(64);
        let info_words = [0x1234u16, 0x5678, 0x9ABC, 0xDEF0];
        let blocks: Vec<u32> = info_words
            .iter()
            .zip(OFFSETS.iter())
            .map(|(&info, &offset)| encode(info, offset))
            .collect();

        // Differential coding: transmitted_bit[i] = raw_bit[i] XOR transmitted_bit[i-1].
        let mut symbols = Vec::new();
        let mut prev = 0u32;
        for block in blocks.iter().cycle().take(blocks.len() * 20) {
            for k in (0..26).rev() {
                let raw = (block >> k) & 1;
                let transmitted = raw ^ prev;
                prev = transmitted;
                symbols.push(if transmitted == 1 { 1.0 } else { -1.0 });
            }
        }

        use std::cell::Cell;
        let consumed = Cell::new(0);
        let mut ctx = ProcessContext::new(
            vec![heterodyne_core::InputView::Real(&symbols, &consumed)],
            vec![],
        );
        decoder.process(&mut ctx).unwrap();

        let stats = decoder.stats_handle().snapshot();
        assert!(stats.valid > 0, "expected at least one valid lock: {stats:?}");
    }
}
