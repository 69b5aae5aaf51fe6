//! Windowed-sinc anti-aliasing lowpass and integer decimation, as a
//! streaming [`Stage`].
//!
//! `design_lowpass` mirrors an offline resampler's filter design: a
//! Blackman-windowed sinc, normalized to unity DC gain. An offline
//! `decimate`/`apply_fir` operates on a whole buffer at once and zero-pads
//! at the edges; a pipeline stage instead gets its edge samples for free as
//! genuine history carried across calls, so the convolution here never
//! pads — it is a direct streaming FIR evaluated against real preceding
//! samples.

use heterodyne_core::{EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

const PI: f32 = std::f32::consts::PI;

/// Designs a windowed-sinc lowpass FIR with `num_taps` coefficients and
/// normalized cutoff `cutoff` in `(0.0, 1.0)` (`1.0` == Nyquist).
pub fn design_lowpass(num_taps: usize, cutoff: f32) -> Vec<f32> {
    if num_taps == 0 {
        return Vec::new();
    }
    let m = num_taps - 1;
    let mut coeffs = Vec::with_capacity(num_taps);

    for n in 0..num_taps {
        let x = n as f32 - m as f32 / 2.0;
        let sinc = if x.abs() < 1e-7 {
            cutoff
        } else {
            (PI * cutoff * x).sin() / (PI * x)
        };
        let window = if m == 0 {
            1.0
        } else {
            let phase = 2.0 * PI * n as f32 / m as f32;
            0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
        };
        coeffs.push(sinc * window);
    }

    let sum: f32 = coeffs.iter().sum();
    if sum.abs() > 1e-10 {
        for c in coeffs.iter_mut() {
            *c /= sum;
        }
    }
    coeffs
}

/// Default tap count used when a caller does not specify one: the
/// `4 * factor * 10 + 1` heuristic common to windowed-sinc decimators
/// (~60 dB stopband rejection).
pub fn default_taps(factor: usize) -> usize {
    4 * factor.max(1) * 10 + 1
}

/// Lowpass-filters and decimates a real stream by an integer `factor`.
///
/// The anti-aliasing cutoff is fixed at `0.9 / factor` (a 10% guard band
/// below the new Nyquist).
pub struct LowpassDecimator {
    coeffs: Vec<f32>,
    factor: usize,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl LowpassDecimator {
    /// `input_batch` must be a multiple of `factor` so every call can
    /// complete a whole number of output samples without leaving a partial
    /// decimation cycle to the next call.
    pub fn new(factor: usize, num_taps: usize, input_batch: usize) -> Self {
        assert!(factor >= 1, "decimation factor must be >= 1");
        assert_eq!(
            input_batch % factor,
            0,
            "input_batch must be a multiple of the decimation factor"
        );
        let cutoff = 0.9 / factor as f32;
        let coeffs = design_lowpass(num_taps, cutoff);
        let history = coeffs.len().saturating_sub(1);
        Self {
            coeffs,
            factor,
            inputs: vec![PortSpec::real("samples", history, input_batch)],
            outputs: vec![PortSpec::real("decimated", 0, input_batch / factor)],
        }
    }
}

impl Stage for LowpassDecimator {
    fn name(&self) -> &str {
        "lowpass_decimator"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    /// No state beyond the fixed filter coefficients; the scheduler owns the
    /// carried-over history.
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let history = self.inputs[0].history;
        let input = ctx.input(0).as_real();
        let available_new = input.len().saturating_sub(history);

        let mut n_out = available_new / self.factor;
        let out = ctx.output(0).as_real_mut();
        n_out = n_out.min(out.len());

        for m in 0..n_out {
            let center = history + m * self.factor;
            let mut acc = 0.0f32;
            for (k, &c) in self.coeffs.iter().enumerate() {
                acc += c * input[center - k];
            }
            out[m] = acc;
        }

        ctx.input(0).mark_consumed(n_out * self.factor);
        ctx.output(0).mark_produced(n_out);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heterodyne_core::InputView;
    use std::cell::Cell;

    fn sine_wave(frequency: f32, sample_rate: f32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn design_lowpass_is_symmetric_and_unity_dc() {
        let coeffs = design_lowpass(65, 0.4);
        let n = coeffs.len();
        for i in 0..n / 2 {
            assert!((coeffs[i] - coeffs[n - 1 - i]).abs() < 1e-6);
        }
        let sum: f32 = coeffs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn decimates_by_factor_and_consumes_full_multiples() {
        let factor = 4;
        let num_taps = default_taps(factor);
        let mut stage = LowpassDecimator::new(factor, num_taps, 64);
        let history = num_taps - 1;

        let sr = 48_000.0;
        let signal = sine_wave(2_000.0, sr, history + 64);
        let consumed = Cell::new(0);
        let produced = Cell::new(0);
        let mut out = vec![0.0f32; 16];
        let mut ctx = ProcessContext::new(
            vec![InputView::Real(&signal, &consumed)],
            vec![heterodyne_core::OutputView::Real(&mut out, &produced)],
        );
        stage.process(&mut ctx).unwrap();
        assert_eq!(consumed.get(), 64);
        assert_eq!(produced.get(), 16);
    }
}
