//! Fans a single stream out to several identical copies.
//!
//! The channel model is strictly single-producer/single-consumer (§3: "A
//! channel owns exactly one buffer ... pairing of one output port on a
//! producer stage and one input port on a consumer stage"), so the three
//! parallel branches the receiver's data flow describes — mono audio,
//! stereo recovery, RDS — need an explicit splitting stage between the FM
//! demodulator's single output and its three downstream consumers, the
//! same role a signal splitter plays in an analog receiver's block diagram.

use heterodyne_core::{ElementKind, EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

/// Copies its single input to `n` identical real outputs.
pub struct Tee {
    kind: ElementKind,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl Tee {
    /// Builds a tee with `fan_out` output ports, each processing `batch`
    /// samples per call.
    pub fn new(kind: ElementKind, fan_out: usize, batch: usize) -> Self {
        assert!(fan_out >= 1, "fan_out must be >= 1");
        let port = |name: String| match kind {
            ElementKind::Real => PortSpec::real(name, 0, batch),
            ElementKind::Complex => PortSpec::complex(name, 0, batch),
        };
        Self {
            kind,
            inputs: vec![port("in".to_string())],
            outputs: (0..fan_out).map(|i| port(format!("out{i}"))).collect(),
        }
    }
}

impl Stage for Tee {
    fn name(&self) -> &str {
        "tee"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let n_outputs = self.outputs.len();
        let n = match self.kind {
            ElementKind::Real => {
                let input = ctx.input(0).as_real().to_vec();
                let mut n = input.len();
                for idx in 0..n_outputs {
                    let out = ctx.output(idx).as_real_mut();
                    n = n.min(out.len());
                }
                for idx in 0..n_outputs {
                    let out = ctx.output(idx).as_real_mut();
                    out[..n].copy_from_slice(&input[..n]);
                }
                n
            }
            ElementKind::Complex => {
                let input = ctx.input(0).as_complex().to_vec();
                let mut n = input.len();
                for idx in 0..n_outputs {
                    let out = ctx.output(idx).as_complex_mut();
                    n = n.min(out.len());
                }
                for idx in 0..n_outputs {
                    let out = ctx.output(idx).as_complex_mut();
                    out[..n].copy_from_slice(&input[..n]);
                }
                n
            }
        };

        ctx.input(0).mark_consumed(n);
        for idx in 0..n_outputs {
            ctx.output(idx).mark_produced(n);
        }
        Ok(ProcessOutcome::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heterodyne_core::{InputView, OutputView};
    use std::cell::Cell;

    #[test]
    fn three_way_tee_copies_the_same_samples_to_every_output() {
        let mut tee = Tee::new(ElementKind::Real, 3, 4);
        let input = [1.0f32, 2.0, 3.0, 4.0];
        let consumed = Cell::new(0);
        let produced: Vec<Cell<usize>> = (0..3).map(|_| Cell::new(0)).collect();
        let mut outs = vec![vec![0.0f32; 4]; 3];

        let mut outputs = Vec::new();
        for (out, p) in outs.iter_mut().zip(produced.iter()) {
            outputs.push(OutputView::Real(out, p));
        }
        let mut ctx = ProcessContext::new(vec![InputView::Real(&input, &consumed)], outputs);
        tee.process(&mut ctx).unwrap();

        assert_eq!(consumed.get(), 4);
        for p in &produced {
            assert_eq!(p.get(), 4);
        }
        for out in &outs {
            assert_eq!(out, &vec![1.0, 2.0, 3.0, 4.0]);
        }
    }
}
