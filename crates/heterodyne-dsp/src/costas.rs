//! Costas loop carrier recovery for the RDS subcarrier (§4.K).
//!
//! Grounded in `costas_loop.h`'s `CostasLoop<T>`: a two-input, one-output
//! stage (`composite: Real`, `pilot_reference: Complex`) holding a rotation
//! phasor, a scalar `phase_error_gain`, and two second-order IIR branch
//! filters (`branch_real_filter_`, `branch_imag_filter_`). The header ships
//! without its `.cpp`, so the per-sample update below is reconstructed from
//! those four fields rather than transcribed: the pilot reference (tripled
//! to the 57 kHz RDS subcarrier) supplies the coarse mixing frequency, the
//! rotation phasor supplies a fine phase correction refined every sample
//! from a standard BPSK Costas phase detector, and the branch filters
//! lowpass the mixed-down real/imaginary arms before they're used both as
//! the stage's output and as the detector's input.

use heterodyne_core::{
    Complex, EngineResult, InputView, PortSpec, ProcessContext, ProcessOutcome, Stage,
};

/// Direct-form-II-transposed biquad, used for both branch filters.
///
/// Designed as an RBJ-cookbook lowpass at `cutoff` (normalized to the
/// stage's sample rate, `(0, 0.5)`) with a Butterworth `q = 1/sqrt(2)`.
struct BranchFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl BranchFilter {
    fn lowpass(cutoff: f32) -> Self {
        let q = std::f32::consts::FRAC_1_SQRT_2;
        let omega = 2.0 * std::f32::consts::PI * cutoff.clamp(1e-6, 0.499);
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Locks a local 57 kHz oscillator (derived from a tripled 19 kHz pilot
/// reference) onto the RDS subcarrier phase and mixes the composite signal
/// down to baseband.
pub struct CostasLoop {
    phase_error_gain: f32,
    rotation: Complex,
    branch_real_filter: BranchFilter,
    branch_imag_filter: BranchFilter,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl CostasLoop {
    /// `lowpass_freq` is the branch filters' cutoff, normalized to the
    /// stage's sample rate (`(0, 0.5)`); `phase_error_gain` scales the
    /// per-sample phase-detector correction applied to the rotation phasor.
    pub fn new(lowpass_freq: f32, phase_error_gain: f32, batch: usize) -> Self {
        Self {
            phase_error_gain,
            rotation: Complex::new(1.0, 0.0),
            branch_real_filter: BranchFilter::lowpass(lowpass_freq),
            branch_imag_filter: BranchFilter::lowpass(lowpass_freq),
            inputs: vec![
                PortSpec::real("composite", 0, batch),
                PortSpec::complex("pilot_reference", 0, batch),
            ],
            outputs: vec![PortSpec::complex("rds_baseband", 0, batch)],
        }
    }
}

impl Stage for CostasLoop {
    fn name(&self) -> &str {
        "costas_loop"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {
        self.rotation = Complex::new(1.0, 0.0);
        self.branch_real_filter.reset();
        self.branch_imag_filter.reset();
    }
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let composite = ctx.input(0).as_real();
        let pilot = match ctx.input(1) {
            InputView::Complex(samples, _) => *samples,
            InputView::Real(_, _) => unreachable!("port declared complex"),
        };
        let n = composite.len().min(pilot.len());

        let out = match ctx.output(0) {
            heterodyne_core::OutputView::Complex(samples, _) => samples,
            heterodyne_core::OutputView::Real(_, _) => unreachable!("port declared complex"),
        };
        let n = n.min(out.len());

        for i in 0..n {
            let subcarrier_reference = pilot[i] * pilot[i] * pilot[i];
            let local_oscillator = subcarrier_reference * self.rotation;
            let mixed = Complex::new(composite[i], 0.0) * local_oscillator.conj();

            let branch_real = self.branch_real_filter.process(mixed.re);
            let branch_imag = self.branch_imag_filter.process(mixed.im);

            let error = branch_imag * branch_real.signum();
            let correction = -self.phase_error_gain * error;
            let (sin_c, cos_c) = correction.sin_cos();
            self.rotation = self.rotation * Complex::new(cos_c, sin_c);
            let norm = self.rotation.norm();
            if norm > 1e-9 {
                self.rotation = self.rotation / norm;
            }

            out[i] = Complex::new(branch_real, branch_imag);
        }

        ctx.input(0).mark_consumed(n);
        ctx.input(1).mark_consumed(n);
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_pilot_produces_bounded_baseband() {
        let mut loop_ = CostasLoop::new(0.05, 0.01, 32);
        let composite: Vec<f32> = (0..32)
            .map(|i| (2.0 * std::f32::consts::PI * 0.02 * i as f32).sin())
            .collect();
        let pilot: Vec<Complex> = (0..32)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * (0.02 / 3.0) * i as f32;
                Complex::new(phase.cos(), phase.sin())
            })
            .collect();
        let consumed_c = std::cell::Cell::new(0);
        let consumed_p = std::cell::Cell::new(0);
        let produced = std::cell::Cell::new(0);
        let mut out = vec![Complex::new(0.0, 0.0); 32];
        let mut ctx = ProcessContext::new(
            vec![
                InputView::Real(&composite, &consumed_c),
                InputView::Complex(&pilot, &consumed_p),
            ],
            vec![heterodyne_core::OutputView::Complex(&mut out, &produced)],
        );
        loop_.process(&mut ctx).unwrap();
        assert_eq!(produced.get(), 32);
        for z in out {
            assert!(z.re.is_finite() && z.im.is_finite());
            assert!(z.norm() < 10.0);
        }
    }

    #[test]
    fn reset_returns_rotation_to_identity() {
        let mut loop_ = CostasLoop::new(0.05, 0.01, 4);
        loop_.rotation = Complex::new(0.3, 0.7);
        loop_.reset();
        assert_eq!(loop_.rotation, Complex::new(1.0, 0.0));
    }
}
