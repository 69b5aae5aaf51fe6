//! SNR estimator built from two windowed power sums (§4.I).
//!
//! Grounded in `fm_snr_estimator.h`. The band-extraction filters the header
//! designs from `(center_frequency, bandwidth, stopband)` triples are
//! individual FIR/IIR tap-design math, explicitly out of scope (§1
//! Non-goals); this stage takes the two already-band-filtered real signals
//! as its inputs and owns only the power averaging and the ratio.

use heterodyne_core::{EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

use crate::running_sum::RunningSum;

/// Averages squared magnitude over a signal band and a displaced noise
/// band, emitting a clamped SNR reading every `snr_rate` input samples.
pub struct SnrEstimator {
    power_signal: RunningSum,
    power_noise: RunningSum,
    noise_multiplier: f32,
    snr_rate: usize,
    samples_since_emit: usize,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl SnrEstimator {
    /// `signal_window`/`noise_window` size the two running sums;
    /// `noise_multiplier` (`k`) compensates the bandwidth/gain ratio between
    /// the signal and noise band extractors; `update_rate` is how many
    /// samples are consumed per call; `snr_rate` is how many input samples
    /// elapse between emitted readings.
    pub fn new(
        signal_window: usize,
        noise_window: usize,
        noise_multiplier: f32,
        update_rate: usize,
        snr_rate: usize,
    ) -> Self {
        Self {
            power_signal: RunningSum::new(signal_window),
            power_noise: RunningSum::new(noise_window),
            noise_multiplier,
            snr_rate: snr_rate.max(1),
            samples_since_emit: 0,
            inputs: vec![
                PortSpec::real("signal_band", 0, update_rate),
                PortSpec::real("noise_band", 0, update_rate),
            ],
            outputs: vec![PortSpec::real("snr", 0, 1)],
        }
    }
}

impl Stage for SnrEstimator {
    fn name(&self) -> &str {
        "fm_snr_estimator"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.power_signal.clear();
        self.power_noise.clear();
        self.samples_since_emit = 0;
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let signal = ctx.input(0).as_real();
        let noise = ctx.input(1).as_real();
        let n = signal.len().min(noise.len());

        for i in 0..n {
            self.power_signal.add(signal[i] * signal[i]);
            self.power_noise.add(noise[i] * noise[i]);
        }
        ctx.input(0).mark_consumed(n);
        ctx.input(1).mark_consumed(n);
        self.samples_since_emit += n;

        let mut produced = 0;
        if self.samples_since_emit >= self.snr_rate {
            self.samples_since_emit -= self.snr_rate;
            let p_signal = self.power_signal.avg();
            let denom = self.noise_multiplier * self.power_noise.avg();
            let out = ctx.output(0).as_real_mut();
            if !out.is_empty() {
                out[0] = if denom > 0.0 {
                    ((p_signal - denom) / denom).max(0.0)
                } else {
                    0.0
                };
                produced = 1;
            }
        }
        ctx.output(0).mark_produced(produced);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_signal_weak_noise_yields_high_snr() {
        let mut estimator = SnrEstimator::new(32, 32, 1.0, 32, 32);
        let signal = vec![1.0f32; 32];
        let noise = vec![0.01f32; 32];
        let consumed_s = std::cell::Cell::new(0);
        let consumed_n = std::cell::Cell::new(0);
        let produced = std::cell::Cell::new(0);
        let mut out = vec![0.0f32; 1];
        let mut ctx = ProcessContext::new(
            vec![
                heterodyne_core::InputView::Real(&signal, &consumed_s),
                heterodyne_core::InputView::Real(&noise, &consumed_n),
            ],
            vec![heterodyne_core::OutputView::Real(&mut out, &produced)],
        );
        estimator.process(&mut ctx).unwrap();
        assert_eq!(produced.get(), 1);
        assert!(out[0] > 50.0);
    }
}
