//! FM PLL demodulator (§4.F).
//!
//! Grounded in `fm_pll_decoder.h`'s `FmPllDecoder<T>`: a complex-in,
//! real-out stage tracking a single phase accumulator and a scalar phase
//! gain, with no history beyond the current sample.

use heterodyne_core::{
    Complex, EngineResult, InputView, PortSpec, ProcessContext, ProcessOutcome, Stage,
};

const PI: f32 = std::f32::consts::PI;

/// Peak frequency deviation for broadcast FM, in Hz.
pub const BROADCAST_DEVIATION_HZ: f32 = 75_000.0;

/// Tracks carrier phase and demodulates a complex baseband stream to the
/// instantaneous frequency deviation, scaled to a unit-amplitude audio
/// signal.
pub struct FmPllDecoder {
    phase: f32,
    phase_gain: f32,
    fm_gain: f32,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl FmPllDecoder {
    /// Builds a decoder for a stream sampled at `sample_rate_hz`, with a
    /// phase-tracking gain `phase_gain` (typically `0.001`-`0.05`; larger
    /// values track faster but are noisier).
    pub fn new(sample_rate_hz: f32, phase_gain: f32, batch: usize) -> Self {
        Self {
            phase: 0.0,
            phase_gain,
            fm_gain: sample_rate_hz / (2.0 * PI * BROADCAST_DEVIATION_HZ),
            inputs: vec![PortSpec::complex("iq", 0, batch)],
            outputs: vec![PortSpec::real("audio", 0, batch)],
        }
    }

    fn clamp_to_pi(value: f32) -> f32 {
        let mut v = value;
        while v > PI {
            v -= 2.0 * PI;
        }
        while v <= -PI {
            v += 2.0 * PI;
        }
        v
    }
}

impl Stage for FmPllDecoder {
    fn name(&self) -> &str {
        "fm_pll_decoder"
    }

    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let input = match ctx.input(0) {
            InputView::Complex(samples, _) => *samples,
            InputView::Real(_, _) => unreachable!("port declared complex"),
        };
        let out = ctx.output(0).as_real_mut();
        let n = input.len().min(out.len());

        for i in 0..n {
            let z = input[i];
            let reference = Complex::new(self.phase.cos(), -self.phase.sin());
            let rotated = z * reference;
            let error = Self::clamp_to_pi(rotated.im.atan2(rotated.re));
            self.phase = Self::clamp_to_pi(self.phase + self.phase_gain * error);
            out[i] = self.fm_gain * error;
        }

        ctx.input(0).mark_consumed(n);
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

/// Second-order phase-locked oscillator, grounded in `pll_generator.h`'s
/// `PllGenerator<T>`: complex-in, complex-out, tracking a frequency confined
/// to `[min_frequency, max_frequency]` with loop coefficients derived from
/// `loop_bandwidth` and a critically-damped `damping` of `1/sqrt(2)`.
///
/// This is what locks onto the 19 kHz stereo pilot directly out of the
/// broadband composite signal: no separate bandpass pre-filter is needed
/// (those are individual FIR/IIR tap-design concerns, out of scope per §1) —
/// the loop's narrow bandwidth and frequency clamp do the job a bandpass
/// would, the same way [`FmPllDecoder`] tracks FM without one.
pub struct PllGenerator {
    phase: f32,
    frequency: f32,
    min_frequency: f32,
    max_frequency: f32,
    alpha: f32,
    beta: f32,
    center_frequency: f32,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl PllGenerator {
    /// Builds a generator whose free-running frequency starts at the
    /// midpoint of `[min_frequency, max_frequency]` (both normalized angular
    /// frequency, radians/sample) and is pulled toward whatever dominant
    /// tone is present in that range by a critically-damped second-order
    /// loop of bandwidth `loop_bandwidth` (also radians/sample).
    pub fn new(loop_bandwidth: f32, min_frequency: f32, max_frequency: f32, batch: usize) -> Self {
        let damping = std::f32::consts::FRAC_1_SQRT_2;
        let theta = loop_bandwidth / (damping + 1.0 / (4.0 * damping));
        let denom = 1.0 + 2.0 * damping * theta + theta * theta;
        let alpha = (4.0 * damping * theta) / denom;
        let beta = (4.0 * theta * theta) / denom;
        let center_frequency = (min_frequency + max_frequency) / 2.0;
        Self {
            phase: 0.0,
            frequency: center_frequency,
            min_frequency,
            max_frequency,
            alpha,
            beta,
            center_frequency,
            inputs: vec![PortSpec::complex("signal", 0, batch)],
            outputs: vec![PortSpec::complex("reference", 0, batch)],
        }
    }

    fn clamp_to_pi(value: f32) -> f32 {
        let mut v = value;
        while v > PI {
            v -= 2.0 * PI;
        }
        while v <= -PI {
            v += 2.0 * PI;
        }
        v
    }
}

impl Stage for PllGenerator {
    fn name(&self) -> &str {
        "pll_generator"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.phase = 0.0;
        self.frequency = self.center_frequency;
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let input = match ctx.input(0) {
            InputView::Complex(samples, _) => *samples,
            InputView::Real(_, _) => unreachable!("port declared complex"),
        };
        let out = match ctx.output(0) {
            heterodyne_core::OutputView::Complex(samples, _) => samples,
            heterodyne_core::OutputView::Real(_, _) => unreachable!("port declared complex"),
        };
        let n = input.len().min(out.len());

        for i in 0..n {
            let reference = Complex::new(self.phase.cos(), self.phase.sin());
            let mixed = input[i] * reference.conj();
            let error = Self::clamp_to_pi(mixed.im.atan2(mixed.re));
            self.frequency = (self.frequency + self.beta * error)
                .clamp(self.min_frequency, self.max_frequency);
            self.phase = Self::clamp_to_pi(self.phase + self.frequency + self.alpha * error);
            out[i] = reference;
        }

        ctx.input(0).mark_consumed(n);
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_locks_onto_a_steady_tone_within_range() {
        let sample_rate = 240_000.0f32;
        let pilot_hz = 19_000.0f32;
        let pilot_omega = 2.0 * PI * pilot_hz / sample_rate;
        let mut gen = PllGenerator::new(
            2.0 * PI * 50.0 / sample_rate,
            2.0 * PI * 18_000.0 / sample_rate,
            2.0 * PI * 20_000.0 / sample_rate,
            4096,
        );

        let n = 4096;
        let input: Vec<Complex> = (0..n)
            .map(|i| Complex::new((pilot_omega * i as f32).cos(), (pilot_omega * i as f32).sin()))
            .collect();
        let consumed = std::cell::Cell::new(0);
        let produced = std::cell::Cell::new(0);
        let mut out = vec![Complex::new(0.0, 0.0); n];
        let mut ctx = ProcessContext::new(
            vec![InputView::Complex(&input, &consumed)],
            vec![heterodyne_core::OutputView::Complex(&mut out, &produced)],
        );
        gen.process(&mut ctx).unwrap();

        // After settling, the generator's frequency should be close to the
        // pilot's own angular frequency.
        let settle_error = (gen.frequency - pilot_omega).abs();
        assert!(settle_error < 0.05 * pilot_omega, "did not lock: freq={} target={}", gen.frequency, pilot_omega);
    }

    #[test]
    fn reset_returns_frequency_to_the_range_midpoint() {
        let mut gen = PllGenerator::new(0.001, 0.4, 0.6, 16);
        gen.frequency = 0.9;
        gen.phase = 1.0;
        gen.reset();
        assert_eq!(gen.frequency, 0.5);
        assert_eq!(gen.phase, 0.0);
    }

    #[test]
    fn demodulates_zero_deviation_to_silence() {
        let mut pll = FmPllDecoder::new(240_000.0, 0.01, 16);
        let samples = vec![Complex::new(1.0, 0.0); 16];
        let consumed = std::cell::Cell::new(0);
        let produced = std::cell::Cell::new(0);
        let mut out = vec![0.0f32; 16];
        let ctx_inputs = vec![InputView::Complex(&samples, &consumed)];
        let ctx_outputs = vec![heterodyne_core::OutputView::Real(&mut out, &produced)];
        let mut ctx = ProcessContext::new(ctx_inputs, ctx_outputs);
        pll.process(&mut ctx).unwrap();
        assert_eq!(produced.get(), 16);
        for v in out {
            assert!(v.abs() < 1e-4);
        }
    }
}
