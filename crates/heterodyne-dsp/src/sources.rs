//! Synthetic test/composite sources (component N): a periodic tone, a
//! ramp, and Gaussian noise — zero-input stages used to build self-contained
//! pipelines without a live SDR backend.
//!
//! [`SawToothSource`] and [`GaussianNoiseSource`] are grounded in
//! `saw_tooth_source.h` and `gaussian_noise_source.h`/`.cpp` respectively;
//! [`SineSource`] has no header of its own but mirrors the same
//! phase-accumulator shape `SawToothSource` uses for its ramp, generalized
//! to a sinusoid. `GaussianNoiseSource`'s original never seeds its
//! `std::mt19937` explicitly, which default-constructs it to the standard's
//! fixed seed (`5489`) rather than something random; the port keeps that
//! determinism with an equivalently fixed-seed `StdRng`.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use heterodyne_core::{EngineResult, PortSpec, ProcessContext, ProcessOutcome, Real, Stage};

/// The fixed seed `std::mt19937`'s default constructor uses absent an
/// explicit seed argument, carried over so repeated runs reproduce exactly.
const DEFAULT_GENERATOR_SEED: u64 = 5489;

/// Emits a pure sinusoid at `frequency_hz` sampled at `sample_rate_hz`,
/// scaled by `amplitude`. Runs forever; useful as a pilot or carrier
/// stand-in in test pipelines.
pub struct SineSource {
    phase: f32,
    phase_increment: f32,
    amplitude: f32,
    outputs: Vec<PortSpec>,
}

impl SineSource {
    /// Builds a source producing `batch` samples per call.
    pub fn new(frequency_hz: f32, sample_rate_hz: f32, amplitude: f32, batch: usize) -> Self {
        Self {
            phase: 0.0,
            phase_increment: 2.0 * PI * frequency_hz / sample_rate_hz,
            amplitude,
            outputs: vec![PortSpec::real("samples", 0, batch)],
        }
    }
}

impl Stage for SineSource {
    fn name(&self) -> &str {
        "sine_source"
    }
    fn inputs(&self) -> &[PortSpec] {
        &[]
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.phase = 0.0;
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let out = ctx.output(0).as_real_mut();
        for v in out.iter_mut() {
            *v = self.amplitude * self.phase.sin();
            self.phase += self.phase_increment;
            if self.phase > PI {
                self.phase -= 2.0 * PI;
            }
        }
        let n = out.len();
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

/// Emits a fixed-length ramp of `saw_tooth_size` samples spanning `[-1, 1]`,
/// either once (`samples` total, then [`ProcessOutcome::Finished`]) or
/// repeated forever when `loop_forever` is set.
pub struct SawToothSource {
    ramp: Vec<Real>,
    total_samples: usize,
    emitted: usize,
    position: usize,
    loop_forever: bool,
    outputs: Vec<PortSpec>,
}

impl SawToothSource {
    /// Builds a source producing `batch` samples per call.
    pub fn new(samples: usize, saw_tooth_size: usize, loop_forever: bool, batch: usize) -> Self {
        assert!(saw_tooth_size >= 1, "saw_tooth_size must be >= 1");
        let ramp = (0..saw_tooth_size)
            .map(|i| 2.0 * i as f32 / saw_tooth_size as f32 - 1.0)
            .collect();
        Self {
            ramp,
            total_samples: samples,
            emitted: 0,
            position: 0,
            loop_forever,
            outputs: vec![PortSpec::real("samples", 0, batch)],
        }
    }
}

impl Stage for SawToothSource {
    fn name(&self) -> &str {
        "saw_tooth_source"
    }
    fn inputs(&self) -> &[PortSpec] {
        &[]
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.emitted = 0;
        self.position = 0;
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let out = ctx.output(0).as_real_mut();
        let room = if self.loop_forever {
            out.len()
        } else {
            out.len().min(self.total_samples - self.emitted)
        };

        for slot in out.iter_mut().take(room) {
            *slot = self.ramp[self.position];
            self.position = (self.position + 1) % self.ramp.len();
        }
        self.emitted += room;
        ctx.output(0).mark_produced(room);

        if !self.loop_forever && self.emitted >= self.total_samples {
            Ok(ProcessOutcome::Finished)
        } else {
            Ok(ProcessOutcome::Progress)
        }
    }
}

/// Emits independent identically distributed Gaussian samples with the
/// given `mean` and `std_dev`. Runs forever.
pub struct GaussianNoiseSource {
    dist: Normal<f32>,
    rng: StdRng,
    outputs: Vec<PortSpec>,
}

impl GaussianNoiseSource {
    /// Builds a source producing `batch` samples per call.
    pub fn new(mean: f32, std_dev: f32, batch: usize) -> Self {
        Self {
            dist: Normal::new(mean, std_dev).expect("std_dev must be non-negative and finite"),
            rng: StdRng::seed_from_u64(DEFAULT_GENERATOR_SEED),
            outputs: vec![PortSpec::real("samples", 0, batch)],
        }
    }
}

impl Stage for GaussianNoiseSource {
    fn name(&self) -> &str {
        "gaussian_noise_source"
    }
    fn inputs(&self) -> &[PortSpec] {
        &[]
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(DEFAULT_GENERATOR_SEED);
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let out = ctx.output(0).as_real_mut();
        for v in out.iter_mut() {
            *v = self.dist.sample(&mut self.rng);
        }
        let n = out.len();
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}
