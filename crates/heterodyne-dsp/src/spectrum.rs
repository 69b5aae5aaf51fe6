//! FFT-backed spectral power estimation, supporting the station finder and
//! SNR estimator (§4.I, §4.J) without a hand-designed bandpass filter.
//!
//! The FFT back-end itself is an opaque forward transformer per the
//! framework boundary (§1 Non-goals): this leans on `rustfft` the same way
//! `sonido-analysis`'s `fft.rs` does, windowing with the same Blackman
//! coefficients [`crate::resample::design_lowpass`] uses for its FIR taps.
//! What it supplies on top is the band-power split the SNR estimator (§4.I)
//! needs its `signal_band`/`noise_band` real inputs for — an alternative to
//! designing a bandpass/bandstop FIR or IIR pair (also out of scope, §1) to
//! isolate a frequency range.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner};

use heterodyne_core::{Complex, EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

fn blackman_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / (n - 1) as f32;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

/// Averages magnitude-squared power over two frequency bands of a complex
/// block, one FFT per call, consuming `fft_size` input samples and emitting
/// one `(signal_power, noise_power)` reading.
pub struct SpectrumPowerEstimator {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex>,
    signal_bins: Vec<(usize, usize)>,
    noise_bins: Vec<(usize, usize)>,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl SpectrumPowerEstimator {
    /// `signal_band`/`noise_band` are `(low, high)` fractions of the sample
    /// rate in `[-0.5, 0.5)` (negative meaning below the carrier), mapped to
    /// the nearest FFT bins of a `fft_size`-point transform.
    pub fn new(fft_size: usize, signal_band: (f32, f32), noise_band: (f32, f32)) -> Self {
        assert!(fft_size >= 2, "fft_size must be >= 2");
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            window: blackman_window(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            signal_bins: Self::band_to_bins(signal_band, fft_size),
            noise_bins: Self::band_to_bins(noise_band, fft_size),
            inputs: vec![PortSpec::complex("iq", 0, fft_size)],
            outputs: vec![
                PortSpec::real("signal_power", 0, 1),
                PortSpec::real("noise_power", 0, 1),
            ],
        }
    }

    /// Maps `band` to the FFT bin range(s) it covers. A band whose low edge
    /// is negative and high edge is not (e.g. `(-0.02, 0.02)`, straddling
    /// the carrier) covers *two* disjoint bin ranges — one just below
    /// `fft_size` (the wrapped negative frequencies) and one just above bin
    /// 0 — not the single contiguous range in between, which is everything
    /// *except* the carrier's neighborhood.
    fn band_to_bins(band: (f32, f32), fft_size: usize) -> Vec<(usize, usize)> {
        let n = fft_size as f32;
        let to_bin = |frac: f32| -> usize {
            let wrapped = if frac < 0.0 { frac + 1.0 } else { frac };
            ((wrapped * n).round() as usize).min(fft_size - 1)
        };
        if band.0 < 0.0 && band.1 >= 0.0 {
            let low_bin = to_bin(band.0);
            let high_bin = to_bin(band.1);
            vec![(low_bin, fft_size - 1), (0, high_bin)]
        } else {
            let (a, b) = (to_bin(band.0), to_bin(band.1));
            vec![(a.min(b), a.max(b))]
        }
    }

    fn band_power(&self, ranges: &[(usize, usize)]) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for &(lo, hi) in ranges {
            sum += self.scratch[lo..=hi].iter().map(Complex::norm_sqr).sum::<f32>();
            count += hi - lo + 1;
        }
        sum / count.max(1) as f32
    }
}

impl Stage for SpectrumPowerEstimator {
    fn name(&self) -> &str {
        "spectrum_power_estimator"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let input = ctx.input(0).as_complex();
        let fft_size = self.scratch.len();
        if input.len() < fft_size {
            ctx.input(0).mark_consumed(0);
            ctx.output(0).mark_produced(0);
            ctx.output(1).mark_produced(0);
            return Ok(ProcessOutcome::Progress);
        }

        for (slot, (&sample, &w)) in self
            .scratch
            .iter_mut()
            .zip(input.iter().zip(self.window.iter()))
        {
            *slot = sample * w;
        }
        self.fft.process(&mut self.scratch);

        let signal_power = self.band_power(&self.signal_bins);
        let noise_power = self.band_power(&self.noise_bins);

        let out0 = ctx.output(0).as_real_mut();
        if !out0.is_empty() {
            out0[0] = signal_power;
        }
        let out1 = ctx.output(1).as_real_mut();
        if !out1.is_empty() {
            out1[0] = noise_power;
        }

        ctx.input(0).mark_consumed(fft_size);
        ctx.output(0).mark_produced(1);
        ctx.output(1).mark_produced(1);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heterodyne_core::{InputView, OutputView};
    use std::cell::Cell;

    #[test]
    fn tone_in_signal_band_outweighs_noise_band() {
        let fft_size = 256;
        let mut estimator = SpectrumPowerEstimator::new(fft_size, (0.05, 0.1), (0.3, 0.35));
        let tone_freq = 0.075;
        let input: Vec<Complex> = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * PI * tone_freq * i as f32;
                Complex::new(phase.cos(), phase.sin())
            })
            .collect();

        let consumed = Cell::new(0);
        let produced0 = Cell::new(0);
        let produced1 = Cell::new(0);
        let mut signal_power = vec![0.0f32; 1];
        let mut noise_power = vec![0.0f32; 1];
        let mut ctx = ProcessContext::new(
            vec![InputView::Complex(&input, &consumed)],
            vec![
                OutputView::Real(&mut signal_power, &produced0),
                OutputView::Real(&mut noise_power, &produced1),
            ],
        );
        estimator.process(&mut ctx).unwrap();

        assert_eq!(consumed.get(), fft_size);
        assert!(signal_power[0] > noise_power[0] * 10.0);
    }

    #[test]
    fn carrier_straddling_band_covers_near_dc_bins_not_the_complement() {
        let fft_size = 256;
        // A band straddling the carrier, the shape the station scanner uses
        // to isolate a tuned carrier's immediate neighborhood.
        let mut estimator = SpectrumPowerEstimator::new(fft_size, (-0.02, 0.02), (0.3, 0.45));
        // A tone right at the carrier (frequency 0): all its energy lands
        // in bin 0, which only a near-DC band (not its complement) covers.
        let input = vec![Complex::new(1.0, 0.0); fft_size];

        let consumed = Cell::new(0);
        let produced0 = Cell::new(0);
        let produced1 = Cell::new(0);
        let mut signal_power = vec![0.0f32; 1];
        let mut noise_power = vec![0.0f32; 1];
        let mut ctx = ProcessContext::new(
            vec![InputView::Complex(&input, &consumed)],
            vec![
                OutputView::Real(&mut signal_power, &produced0),
                OutputView::Real(&mut noise_power, &produced1),
            ],
        );
        estimator.process(&mut ctx).unwrap();

        assert!(signal_power[0] > noise_power[0] * 100.0);
    }
}
