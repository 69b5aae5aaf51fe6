//! De-emphasis filter, the inverse of broadcast FM's pre-emphasis (§9, Open
//! Question (b); GLOSSARY).
//!
//! Grounded in `fm_deemphasizer.h`'s `FmDeemphasizer<T>`: a one-pole lowpass
//! with time constant `tau` (50 µs in Europe, the header's own default; 75
//! µs in North America, the option implementers must expose alongside it).
//! The header keeps both the previous input and previous output sample,
//! which is the signature of a bilinear-transform discretization of
//! `H(s) = 1/(1+s*tau)` rather than the simpler one-history-term
//! exponential form.

use heterodyne_core::{EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

/// Europe's standard de-emphasis time constant.
pub const TAU_EUROPE_SECONDS: f32 = 50e-6;
/// North America's standard de-emphasis time constant.
pub const TAU_NORTH_AMERICA_SECONDS: f32 = 75e-6;

/// One-pole de-emphasis lowpass, discretized via the bilinear transform.
pub struct FmDeemphasizer {
    b: f32,
    a1: f32,
    last_input: f32,
    last_output: f32,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl FmDeemphasizer {
    /// Builds a de-emphasis filter for a stream at `sample_rate_hz` with
    /// time constant `tau_seconds` (use [`TAU_EUROPE_SECONDS`] or
    /// [`TAU_NORTH_AMERICA_SECONDS`]).
    pub fn new(sample_rate_hz: f32, tau_seconds: f32, batch: usize) -> Self {
        let k = 2.0 * sample_rate_hz * tau_seconds;
        Self {
            b: 1.0 / (1.0 + k),
            a1: (1.0 - k) / (1.0 + k),
            last_input: 0.0,
            last_output: 0.0,
            inputs: vec![PortSpec::real("demodulated", 0, batch)],
            outputs: vec![PortSpec::real("audio", 0, batch)],
        }
    }
}

impl Stage for FmDeemphasizer {
    fn name(&self) -> &str {
        "fm_deemphasizer"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.last_input = 0.0;
        self.last_output = 0.0;
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let input = ctx.input(0).as_real();
        let out = ctx.output(0).as_real_mut();
        let n = input.len().min(out.len());

        for i in 0..n {
            let x = input[i];
            let y = self.b * x + self.b * self.last_input - self.a1 * self.last_output;
            out[i] = y;
            self.last_input = x;
            self.last_output = y;
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
    fn dc_input_settles_to_dc_output() {
        let mut filt = FmDeemphasizer::new(48_000.0, TAU_EUROPE_SECONDS, 256);
        let input = vec![1.0f32; 256];
        let consumed = std::cell::Cell::new(0);
        let produced = std::cell::Cell::new(0);
        let mut out = vec![0.0f32; 256];
        let mut ctx = ProcessContext::new(
            vec![heterodyne_core::InputView::Real(&input, &consumed)],
            vec![heterodyne_core::OutputView::Real(&mut out, &produced)],
        );
        filt.process(&mut ctx).unwrap();
        assert!((out[255] - 1.0).abs() < 1e-3);
    }
}
