//! Lock-free single-producer/single-consumer sample ring (§4.A, §8 invariant 1).
//!
//! [`Ring<T>`] is the data-carrying half of a [`Channel`](crate::channel::Channel):
//! a power-of-two-sized slot array plus two monotonically increasing cursors.
//! Cursors never wrap (they count total elements ever produced/consumed), so
//! `read_cursor <= write_cursor <= read_cursor + capacity` holds by
//! construction; only the *indexing* into the slot array wraps, via a mask.
//!
//! The workspace denies `unsafe_code`, which rules out the usual trick of
//! sharing a `Vec<T>` across the producer/consumer threads through a raw
//! pointer. Instead each slot is stored as one or two [`AtomicU32`] words
//! (bit-cast from `f32`), so the whole ring can be accessed through a shared
//! `&Ring<T>` from both sides at once — exactly the access pattern
//! `crossbeam::thread::scope` gives two worker closures that each borrow the
//! same channel. Element stores/loads use `Relaxed` ordering; the
//! happens-before relationship is carried entirely by the `Release` store
//! and matching `Acquire` load on the cursors, the standard SPSC ring
//! protocol.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::buffer::{round_up_to_power_of_two, AlignedBuffer};
use crate::element::{Complex, Real};

/// A sample type that can be bit-cast into one or two atomic 32-bit words.
///
/// Implemented only for [`Real`] and [`Complex`]; see [`Element`](crate::element::Element).
pub trait AtomicCodec: Sized + Copy {
    /// Number of `u32` words one element occupies.
    const WORDS: usize;

    /// Reads an element out of `words` (`words.len() == Self::WORDS`).
    fn load(words: &[AtomicU32]) -> Self;

    /// Writes an element into `words` (`words.len() == Self::WORDS`).
    fn store(words: &[AtomicU32], value: Self);
}

impl AtomicCodec for Real {
    const WORDS: usize = 1;

    fn load(words: &[AtomicU32]) -> Self {
        f32::from_bits(words[0].load(Ordering::Relaxed))
    }

    fn store(words: &[AtomicU32], value: Self) {
        words[0].store(value.to_bits(), Ordering::Relaxed);
    }
}

impl AtomicCodec for Complex {
    const WORDS: usize = 2;

    fn load(words: &[AtomicU32]) -> Self {
        Complex::new(
            f32::from_bits(words[0].load(Ordering::Relaxed)),
            f32::from_bits(words[1].load(Ordering::Relaxed)),
        )
    }

    fn store(words: &[AtomicU32], value: Self) {
        words[0].store(value.re.to_bits(), Ordering::Relaxed);
        words[1].store(value.im.to_bits(), Ordering::Relaxed);
    }
}

/// The ring's slot array and cursor pair, with no blocking: callers decide
/// how much is readable/writable and wait elsewhere ([`Channel`](crate::channel::Channel)
/// layers the condvar-based blocking on top).
pub struct Ring<T> {
    words: AlignedBuffer<AtomicU32>,
    capacity: usize,
    mask: usize,
    write_cursor: AtomicUsize,
    read_cursor: AtomicUsize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: AtomicCodec> Ring<T> {
    /// Builds a ring able to hold at least `min_capacity` elements, rounded
    /// up to the next power of two.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = round_up_to_power_of_two(min_capacity.max(1) as u64) as usize;
        let words = AlignedBuffer::new(capacity * T::WORDS);
        Self {
            words,
            capacity,
            mask: capacity - 1,
            write_cursor: AtomicUsize::new(0),
            read_cursor: AtomicUsize::new(0),
            _marker: std::marker::PhantomData,
        }
    }

    /// Total slot count (always a power of two).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements available to read right now.
    pub fn readable(&self) -> usize {
        let w = self.write_cursor.load(Ordering::Acquire);
        let r = self.read_cursor.load(Ordering::Acquire);
        w - r
    }

    /// Free slots available to write right now.
    pub fn writable(&self) -> usize {
        self.capacity - self.readable()
    }

    /// Elements readable without wrapping past the end of the slot array.
    pub fn contiguous_readable(&self) -> usize {
        let r = self.read_cursor.load(Ordering::Acquire) & self.mask;
        self.readable().min(self.capacity - r)
    }

    /// Free slots writable without wrapping past the end of the slot array.
    pub fn contiguous_writable(&self) -> usize {
        let w = self.write_cursor.load(Ordering::Acquire) & self.mask;
        self.writable().min(self.capacity - w)
    }

    fn slot(&self, index: usize) -> &[AtomicU32] {
        let base = index * T::WORDS;
        &self.words.as_slice()[base..base + T::WORDS]
    }

    /// Copies `len` elements starting at the current read cursor into `out`.
    /// Does not advance the cursor; pairs with [`Ring::advance_read`].
    ///
    /// `len` must not exceed [`Ring::contiguous_readable`].
    pub fn read_into(&self, out: &mut [T], len: usize) {
        debug_assert!(len <= self.contiguous_readable());
        let r = self.read_cursor.load(Ordering::Relaxed) & self.mask;
        for (i, slot) in out.iter_mut().take(len).enumerate() {
            *slot = T::load(self.slot(r + i));
        }
    }

    /// Copies `len` elements from `input` to the current write cursor. Does
    /// not advance the cursor; pairs with [`Ring::advance_write`].
    ///
    /// `len` must not exceed [`Ring::contiguous_writable`].
    pub fn write_from(&self, input: &[T], len: usize) {
        debug_assert!(len <= self.contiguous_writable());
        let w = self.write_cursor.load(Ordering::Relaxed) & self.mask;
        for (i, value) in input.iter().take(len).enumerate() {
            T::store(self.slot(w + i), *value);
        }
    }

    /// Publishes `n` newly written elements, making them visible to the
    /// reader (`Release`).
    pub fn advance_write(&self, n: usize) {
        self.write_cursor.fetch_add(n, Ordering::Release);
    }

    /// Retires `n` consumed elements, making their slots visible as free to
    /// the writer (`Release`).
    pub fn advance_read(&self, n: usize) {
        self.read_cursor.fetch_add(n, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up() {
        let ring: Ring<Real> = Ring::new(5);
        assert_eq!(ring.capacity(), 8);
    }

    #[test]
    fn write_then_read_round_trips() {
        let ring: Ring<Real> = Ring::new(4);
        ring.write_from(&[1.0, 2.0, 3.0], 3);
        ring.advance_write(3);
        assert_eq!(ring.readable(), 3);

        let mut out = [0.0f32; 3];
        ring.read_into(&mut out, 3);
        ring.advance_read(3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(ring.readable(), 0);
        assert_eq!(ring.writable(), 4);
    }

    #[test]
    fn wrap_around_splits_contiguous_region() {
        let ring: Ring<Real> = Ring::new(4);
        ring.write_from(&[1.0, 2.0, 3.0], 3);
        ring.advance_write(3);
        let mut out = [0.0f32; 2];
        ring.read_into(&mut out, 2);
        ring.advance_read(2);

        // write cursor is at 3, only 1 contiguous slot before wrap
        assert_eq!(ring.contiguous_writable(), 1);
        ring.write_from(&[4.0], 1);
        ring.advance_write(1);
        // next contiguous_writable should now cover the wrapped region
        assert_eq!(ring.contiguous_writable(), 2);
    }

    #[test]
    fn complex_round_trips() {
        let ring: Ring<Complex> = Ring::new(4);
        let input = [Complex::new(1.0, -1.0), Complex::new(2.0, 0.5)];
        ring.write_from(&input, 2);
        ring.advance_write(2);
        let mut out = [Complex::new(0.0, 0.0); 2];
        ring.read_into(&mut out, 2);
        assert_eq!(out, input);
    }
}
