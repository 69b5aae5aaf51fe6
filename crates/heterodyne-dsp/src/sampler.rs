//! Symbol-rate sampler and a complex-to-real bridge (component L).
//!
//! [`Sampler`] is grounded in `sampler.h`'s `Sampler<T>`: a same-type-in,
//! same-type-out stage that decimates by `rate`, optionally averaging a
//! `window_size` window of input samples around each decimation instant to
//! smooth out sampling jitter. The header ships without its `.cpp`; the
//! averaging behavior below is reconstructed from its `rate_`/`window_size_`
//! fields using the same windowed-decimation shape as
//! [`crate::resample::LowpassDecimator`], but with a boxcar average in place
//! of a designed FIR — a sampler is a data-rate adapter, not a filter.
//!
//! [`ComplexToReal`] has no counterpart of its own in the original filter
//! set; it exists to carry the Costas loop's complex baseband into the
//! real-valued symbol stream the RDS bit slicer consumes, the same way a
//! receiver would take only the in-phase arm of a synchronously
//! demodulated BPSK signal.

use heterodyne_core::{
    Complex, ElementKind, EngineResult, InputView, OutputView, PortSpec, ProcessContext,
    ProcessOutcome, Real, Stage,
};

/// Decimates a real or complex stream by `rate`, averaging a `window_size`
/// window of samples ending at each decimation instant.
pub struct Sampler {
    rate: usize,
    window_size: usize,
    kind: ElementKind,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl Sampler {
    /// `window_size` defaults to `1` in the original (a plain decimator with
    /// no averaging); `input_batch` must be a multiple of `rate` so every
    /// call completes a whole number of decimation cycles.
    pub fn new(kind: ElementKind, rate: usize, window_size: usize, input_batch: usize) -> Self {
        assert!(rate >= 1, "sample rate must be >= 1");
        assert!(
            window_size >= 1 && window_size <= rate,
            "window_size must be in [1, rate]"
        );
        assert_eq!(
            input_batch % rate,
            0,
            "input_batch must be a multiple of the sample rate"
        );
        let history = window_size - 1;
        let output_batch = input_batch / rate;
        let (input_port, output_port) = match kind {
            ElementKind::Real => (
                PortSpec::real("samples", history, input_batch),
                PortSpec::real("symbols", 0, output_batch),
            ),
            ElementKind::Complex => (
                PortSpec::complex("samples", history, input_batch),
                PortSpec::complex("symbols", 0, output_batch),
            ),
        };
        Self {
            rate,
            window_size,
            kind,
            inputs: vec![input_port],
            outputs: vec![output_port],
        }
    }
}

impl Stage for Sampler {
    fn name(&self) -> &str {
        "sampler"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    /// No state beyond the fixed rate and window; history is the
    /// scheduler's responsibility.
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let history = self.inputs[0].history;
        match self.kind {
            ElementKind::Real => {
                let input = ctx.input(0).as_real();
                let available_new = input.len().saturating_sub(history);
                let mut n_out = available_new / self.rate;
                let out = ctx.output(0).as_real_mut();
                n_out = n_out.min(out.len());

                for m in 0..n_out {
                    let end = history + m * self.rate;
                    let start = end + 1 - self.window_size;
                    let sum: Real = input[start..=end].iter().sum();
                    out[m] = sum / self.window_size as f32;
                }
                ctx.input(0).mark_consumed(n_out * self.rate);
                ctx.output(0).mark_produced(n_out);
            }
            ElementKind::Complex => {
                let input = ctx.input(0).as_complex();
                let available_new = input.len().saturating_sub(history);
                let mut n_out = available_new / self.rate;
                let out = ctx.output(0).as_complex_mut();
                n_out = n_out.min(out.len());

                for m in 0..n_out {
                    let end = history + m * self.rate;
                    let start = end + 1 - self.window_size;
                    let mut sum = Complex::new(0.0, 0.0);
                    for &sample in &input[start..=end] {
                        sum += sample;
                    }
                    out[m] = sum / self.window_size as f32;
                }
                ctx.input(0).mark_consumed(n_out * self.rate);
                ctx.output(0).mark_produced(n_out);
            }
        }
        Ok(ProcessOutcome::Progress)
    }
}

/// Projects a complex stream onto its real (in-phase) component.
pub struct ComplexToReal {
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl ComplexToReal {
    /// Builds a projector processing `batch` samples per call.
    pub fn new(batch: usize) -> Self {
        Self {
            inputs: vec![PortSpec::complex("iq", 0, batch)],
            outputs: vec![PortSpec::real("i", 0, batch)],
        }
    }
}

impl Stage for ComplexToReal {
    fn name(&self) -> &str {
        "complex_to_real"
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
        let out = ctx.output(0).as_real_mut();
        let n = input.len().min(out.len());
        for i in 0..n {
            out[i] = input[i].re;
        }
        ctx.input(0).mark_consumed(n);
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

/// Lifts a real stream to a complex one with a zero imaginary part, the
/// shape the pilot-tracking [`crate::pll::PllGenerator`] needs its broadband
/// input in.
pub struct RealToComplex {
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl RealToComplex {
    /// Builds a lift processing `batch` samples per call.
    pub fn new(batch: usize) -> Self {
        Self {
            inputs: vec![PortSpec::real("samples", 0, batch)],
            outputs: vec![PortSpec::complex("iq", 0, batch)],
        }
    }
}

impl Stage for RealToComplex {
    fn name(&self) -> &str {
        "real_to_complex"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let input = ctx.input(0).as_real();
        let out = ctx.output(0).as_complex_mut();
        let n = input.len().min(out.len());
        for i in 0..n {
            out[i] = Complex::new(input[i], 0.0);
        }
        ctx.input(0).mark_consumed(n);
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn real_sampler_decimates_without_averaging_at_window_one() {
        let mut sampler = Sampler::new(ElementKind::Real, 4, 1, 16);
        let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let consumed = Cell::new(0);
        let produced = Cell::new(0);
        let mut out = vec![0.0f32; 4];
        let mut ctx = ProcessContext::new(
            vec![InputView::Real(&input, &consumed)],
            vec![OutputView::Real(&mut out, &produced)],
        );
        sampler.process(&mut ctx).unwrap();
        assert_eq!(produced.get(), 4);
        assert_eq!(out, vec![3.0, 7.0, 11.0, 15.0]);
    }

    #[test]
    fn real_sampler_averages_its_window() {
        let mut sampler = Sampler::new(ElementKind::Real, 4, 4, 16);
        let input = vec![1.0f32; 16];
        let consumed = Cell::new(0);
        let produced = Cell::new(0);
        let mut out = vec![0.0f32; 4];
        let mut ctx = ProcessContext::new(
            vec![InputView::Real(&input, &consumed)],
            vec![OutputView::Real(&mut out, &produced)],
        );
        sampler.process(&mut ctx).unwrap();
        assert_eq!(produced.get(), 4);
        for v in out {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn complex_to_real_projects_in_phase_component() {
        let mut projector = ComplexToReal::new(4);
        let input = vec![
            Complex::new(1.0, 9.0),
            Complex::new(-2.0, 9.0),
            Complex::new(3.0, 9.0),
            Complex::new(-4.0, 9.0),
        ];
        let consumed = Cell::new(0);
        let produced = Cell::new(0);
        let mut out = vec![0.0f32; 4];
        let mut ctx = ProcessContext::new(
            vec![InputView::Complex(&input, &consumed)],
            vec![OutputView::Real(&mut out, &produced)],
        );
        projector.process(&mut ctx).unwrap();
        assert_eq!(out, vec![1.0, -2.0, 3.0, -4.0]);
    }

    #[test]
    fn real_to_complex_zeroes_the_imaginary_component() {
        let mut lift = RealToComplex::new(3);
        let input = [1.0f32, -2.0, 3.0];
        let consumed = Cell::new(0);
        let produced = Cell::new(0);
        let mut out = vec![Complex::new(0.0, 0.0); 3];
        let mut ctx = ProcessContext::new(
            vec![InputView::Real(&input, &consumed)],
            vec![OutputView::Complex(&mut out, &produced)],
        );
        lift.process(&mut ctx).unwrap();
        assert_eq!(out, vec![Complex::new(1.0, 0.0), Complex::new(-2.0, 0.0), Complex::new(3.0, 0.0)]);
    }
}
