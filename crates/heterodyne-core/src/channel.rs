//! Typed, blocking channel between two stages (§4.A, §4.B, §5).
//!
//! A [`Channel`] pairs a [`Ring`] with the condvar machinery stages block on
//! when they need more data than is currently available (or more room than
//! is currently free). There are no locks held while a stage's `process` is
//! running — the mutex here only ever guards the "has something changed"
//! signal, never the sample data itself, which lives in the ring's atomics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::element::{Complex, ElementKind, Real};
use crate::error::{EngineError, EngineResult};
use crate::ring::Ring;

/// How often a blocked `wait_*` call re-checks the stop flag even without a
/// notification, so a stage can never hang forever on a missed wakeup.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

enum Storage {
    Real(Ring<Real>),
    Complex(Ring<Complex>),
}

/// A single connection between one stage's output port and another's input
/// port.
pub struct Channel {
    storage: Storage,
    gate: Mutex<()>,
    not_empty: Condvar,
    not_full: Condvar,
    /// Set once the producing stage has finished; readers drain whatever
    /// remains and then stop waiting for more (§8, scenario E6).
    producer_closed: AtomicBool,
    /// Set once the consuming stage has finished; writers stop waiting for
    /// room that will never be freed, so upstream shutdown can cascade.
    consumer_done: AtomicBool,
}

impl Channel {
    /// Builds a real-valued channel with at least `min_capacity` slots.
    pub fn new_real(min_capacity: usize) -> Self {
        Self::from_storage(Storage::Real(Ring::new(min_capacity)))
    }

    /// Builds a complex-valued channel with at least `min_capacity` slots.
    pub fn new_complex(min_capacity: usize) -> Self {
        Self::from_storage(Storage::Complex(Ring::new(min_capacity)))
    }

    fn from_storage(storage: Storage) -> Self {
        Self {
            storage,
            gate: Mutex::new(()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            producer_closed: AtomicBool::new(false),
            consumer_done: AtomicBool::new(false),
        }
    }

    /// The element type this channel carries.
    pub fn kind(&self) -> ElementKind {
        match &self.storage {
            Storage::Real(_) => ElementKind::Real,
            Storage::Complex(_) => ElementKind::Complex,
        }
    }

    /// Total slot count (power of two).
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Real(r) => r.capacity(),
            Storage::Complex(r) => r.capacity(),
        }
    }

    /// Elements available to read right now.
    pub fn readable(&self) -> usize {
        match &self.storage {
            Storage::Real(r) => r.readable(),
            Storage::Complex(r) => r.readable(),
        }
    }

    /// Free slots available to write right now.
    pub fn writable(&self) -> usize {
        match &self.storage {
            Storage::Real(r) => r.writable(),
            Storage::Complex(r) => r.writable(),
        }
    }

    fn real_ring(&self) -> &Ring<Real> {
        match &self.storage {
            Storage::Real(r) => r,
            Storage::Complex(_) => {
                panic!("channel kind mismatch: expected real, found complex (engine bug)")
            }
        }
    }

    fn complex_ring(&self) -> &Ring<Complex> {
        match &self.storage {
            Storage::Complex(r) => r,
            Storage::Real(_) => {
                panic!("channel kind mismatch: expected complex, found real (engine bug)")
            }
        }
    }

    /// Copies up to `out.len()` readable real samples into `out`, without
    /// advancing the read cursor.
    pub fn read_real(&self, out: &mut [Real]) {
        let len = out.len();
        self.real_ring().read_into(out, len);
    }

    /// Copies up to `out.len()` readable complex samples into `out`, without
    /// advancing the read cursor.
    pub fn read_complex(&self, out: &mut [Complex]) {
        let len = out.len();
        self.complex_ring().read_into(out, len);
    }

    /// Writes `input` into the channel's free region, without advancing the
    /// write cursor.
    pub fn write_real(&self, input: &[Real]) {
        let len = input.len();
        self.real_ring().write_from(input, len);
    }

    /// Writes `input` into the channel's free region, without advancing the
    /// write cursor.
    pub fn write_complex(&self, input: &[Complex]) {
        let len = input.len();
        self.complex_ring().write_from(input, len);
    }

    /// Retires `n` consumed elements and wakes any writer blocked on room.
    pub fn advance_read(&self, n: usize) {
        if n == 0 {
            return;
        }
        match &self.storage {
            Storage::Real(r) => r.advance_read(n),
            Storage::Complex(r) => r.advance_read(n),
        }
        let _guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.not_full.notify_all();
    }

    /// Publishes `n` newly written elements and wakes any reader blocked on
    /// data.
    pub fn advance_write(&self, n: usize) {
        if n == 0 {
            return;
        }
        match &self.storage {
            Storage::Real(r) => r.advance_write(n),
            Storage::Complex(r) => r.advance_write(n),
        }
        let _guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.not_empty.notify_all();
    }

    /// Blocks until at least `need` elements are readable, the producer has
    /// closed the channel (in which case fewer than `need` may be
    /// readable — this is the final call), or `stop` is set.
    pub fn wait_readable(&self, need: usize, stop: &AtomicBool) -> EngineResult<()> {
        if need == 0 || self.readable() >= need || self.producer_closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while self.readable() < need && !self.producer_closed.load(Ordering::Acquire) {
            if stop.load(Ordering::Acquire) {
                return Err(EngineError::PipelineAborted {
                    reason: "pipeline stopped while waiting for input".to_string(),
                });
            }
            let (next, _) = self
                .not_empty
                .wait_timeout(guard, STOP_POLL_INTERVAL)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard = next;
        }
        Ok(())
    }

    /// Blocks until at least `need` slots are writable, the consumer has
    /// finished (no more room will ever be freed), or `stop` is set.
    pub fn wait_writable(&self, need: usize, stop: &AtomicBool) -> EngineResult<()> {
        if need == 0 || self.writable() >= need || self.consumer_done.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while self.writable() < need && !self.consumer_done.load(Ordering::Acquire) {
            if stop.load(Ordering::Acquire) {
                return Err(EngineError::PipelineAborted {
                    reason: "pipeline stopped while waiting for room".to_string(),
                });
            }
            let (next, _) = self
                .not_full
                .wait_timeout(guard, STOP_POLL_INTERVAL)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard = next;
        }
        Ok(())
    }

    /// True once [`Channel::wait_writable`] should be treated as satisfied
    /// regardless of free room, because the consumer will never read again.
    pub fn is_consumer_done(&self) -> bool {
        self.consumer_done.load(Ordering::Acquire)
    }

    /// True once the producer has finished and `readable()` will never grow
    /// again.
    pub fn is_producer_closed(&self) -> bool {
        self.producer_closed.load(Ordering::Acquire)
    }

    /// Marks the channel as having no more data coming; wakes any reader
    /// blocked waiting for a full batch so it can take its final partial one.
    pub fn close_producer(&self) {
        let _guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.producer_closed.store(true, Ordering::Release);
        self.not_empty.notify_all();
    }

    /// Marks the channel as having no consumer left; wakes any writer
    /// blocked waiting for room that will never free.
    pub fn close_consumer(&self) {
        let _guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.consumer_done.store(true, Ordering::Release);
        self.not_full.notify_all();
    }

    /// Wakes every waiter regardless of state; used when the pipeline stops
    /// so no worker is left parked on a condvar.
    pub fn wake_all(&self) {
        let _guard = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Computes the minimum ring capacity for a connection, per §4.A: twice the
/// sum of the consumer's history-plus-batch-plus-look-ahead and the
/// producer's batch, so a full producer batch always fits alongside the
/// consumer's retained history and look-ahead tail without the writer
/// stalling on every call.
pub fn required_capacity(
    producer_batch: usize,
    consumer_history: usize,
    consumer_batch: usize,
    consumer_look_ahead: usize,
) -> usize {
    2 * ((consumer_history + consumer_batch + consumer_look_ahead) + producer_batch)
}
