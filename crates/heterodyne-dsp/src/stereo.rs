//! Stereo pilot recovery and L/R demultiplexing (§4.G).
//!
//! Grounded in `fm_stereo_extractor.h` and `fm_stereo_demultiplexer.h`. The
//! extractor has no persistent state: every sample is an independent
//! multiply. The demultiplexer's stereo weight is the one piece of stage
//! state that must be mutable from outside the audio thread while the
//! pipeline runs; it is backed by an `AtomicU32` bit-cast the same way
//! [`heterodyne_core::ring::AtomicCodec`] bit-casts ring samples, since
//! `std` has no `AtomicF32`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use heterodyne_core::{Complex, EngineResult, InputView, PortSpec, ProcessContext, ProcessOutcome, Stage};

/// Recovers the 38 kHz DSB-SC stereo difference signal `S = (L-R)/2` from
/// the composite demodulated audio, using a complex 19 kHz pilot reference
/// (`exp(i * pilot_phase)`) supplied by an upstream PLL.
pub struct StereoExtractor {
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl StereoExtractor {
    /// Builds an extractor processing `batch` samples per call.
    pub fn new(batch: usize) -> Self {
        Self {
            inputs: vec![
                PortSpec::complex("pilot_reference", 0, batch),
                PortSpec::real("composite", 0, batch),
            ],
            outputs: vec![PortSpec::real("stereo_difference", 0, batch)],
        }
    }
}

impl Stage for StereoExtractor {
    fn name(&self) -> &str {
        "fm_stereo_extractor"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let pilot = match ctx.input(0) {
            InputView::Complex(samples, _) => *samples,
            InputView::Real(_, _) => unreachable!("port declared complex"),
        };
        let composite = ctx.input(1).as_real();
        let n = pilot.len().min(composite.len());

        let out = ctx.output(0).as_real_mut();
        let n = n.min(out.len());
        for i in 0..n {
            let doubled: Complex = pilot[i] * pilot[i];
            out[i] = 2.0 * composite[i] * doubled.re;
        }

        ctx.input(0).mark_consumed(n);
        ctx.input(1).mark_consumed(n);
        ctx.output(0).mark_produced(n);
        Ok(ProcessOutcome::Progress)
    }
}

/// Cross-thread mutable stereo blend weight in `[0, 1]`, the only field any
/// stage exposes outside its own worker thread (§9).
#[derive(Clone)]
pub struct StereoWeight(Arc<AtomicU32>);

impl StereoWeight {
    /// Creates a new handle initialized to `value`.
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    /// Reads the current weight.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Sets the weight, clamped to `[0, 1]`.
    pub fn set(&self, value: f32) {
        self.0.store(value.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }
}

impl Default for StereoWeight {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Combines mono `M = (L+R)/2` with stereo difference `S = (L-R)/2`,
/// blended by a hot-swappable weight: `L = M + w*S`, `R = M - w*S`. `w = 0`
/// collapses to mono, used when SNR is too low to trust the pilot lock.
pub struct StereoDemultiplexer {
    weight: StereoWeight,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl StereoDemultiplexer {
    /// Builds a demultiplexer with initial weight `stereo_weight`.
    pub fn new(stereo_weight: f32, batch: usize) -> Self {
        Self {
            weight: StereoWeight::new(stereo_weight),
            inputs: vec![PortSpec::real("mono", 0, batch), PortSpec::real("stereo_difference", 0, batch)],
            outputs: vec![PortSpec::real("left", 0, batch), PortSpec::real("right", 0, batch)],
        }
    }

    /// A cloneable handle other threads can use to hot-swap the stereo
    /// weight while the pipeline runs (§8, scenario E4).
    pub fn weight_handle(&self) -> StereoWeight {
        self.weight.clone()
    }
}

impl Stage for StereoDemultiplexer {
    fn name(&self) -> &str {
        "fm_stereo_demultiplexer"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    /// Deliberately does not touch the stereo weight: like the broadcast
    /// receiver's volume knob, it is a listener-facing control, not stage
    /// state, and a pipeline restart should not silently undo a hot-swap.
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let mono = ctx.input(0).as_real();
        let stereo = ctx.input(1).as_real();
        let n = mono.len().min(stereo.len());
        let w = self.weight.get();

        let left_n;
        {
            let left = ctx.output(0).as_real_mut();
            left_n = n.min(left.len());
            for i in 0..left_n {
                left[i] = mono[i] + w * stereo[i];
            }
        }
        let right_n;
        {
            let right = ctx.output(1).as_real_mut();
            right_n = left_n.min(right.len());
            for i in 0..right_n {
                right[i] = mono[i] - w * stereo[i];
            }
        }

        ctx.input(0).mark_consumed(right_n);
        ctx.input(1).mark_consumed(right_n);
        ctx.output(0).mark_produced(right_n);
        ctx.output(1).mark_produced(right_n);
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_weight_yields_mono_identical_channels() {
        let mut demux = StereoDemultiplexer::new(0.0, 4);
        let mono = [1.0f32, 2.0, 3.0, 4.0];
        let stereo = [0.5f32, -0.5, 0.25, -0.25];
        let consumed_m = std::cell::Cell::new(0);
        let consumed_s = std::cell::Cell::new(0);
        let produced_l = std::cell::Cell::new(0);
        let produced_r = std::cell::Cell::new(0);
        let mut left = vec![0.0f32; 4];
        let mut right = vec![0.0f32; 4];
        let inputs = vec![
            InputView::Real(&mono, &consumed_m),
            InputView::Real(&stereo, &consumed_s),
        ];
        let outputs = vec![
            heterodyne_core::OutputView::Real(&mut left, &produced_l),
            heterodyne_core::OutputView::Real(&mut right, &produced_r),
        ];
        let mut ctx = ProcessContext::new(inputs, outputs);
        demux.process(&mut ctx).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, mono);
    }
}
