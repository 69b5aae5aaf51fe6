//! The `Stage` capability interface every graph node implements (§4.C).
//!
//! A stage declares its ports once (element type, history, and nominal batch
//! size) and then repeatedly has `process` called with read-only views of
//! whatever is available on its inputs and write views of whatever room is
//! available on its outputs. A stage is never handed less than the history
//! it declared plus at least one full batch, and is never asked to produce
//! more than one batch's worth of output room — the scheduler (§4.E) is
//! responsible for enforcing both sides of that contract.

use std::cell::Cell;

use crate::element::{Complex, ElementKind, Real};
use crate::error::EngineResult;

/// One input or output port a stage exposes.
#[derive(Debug, Clone)]
pub struct PortSpec {
    /// Name used in error messages and graph diagnostics.
    pub name: String,
    /// Element type carried on this port.
    pub kind: ElementKind,
    /// Samples of history this *input* port needs retained across calls
    /// (unused for output ports).
    pub history: usize,
    /// Nominal number of samples processed per call.
    pub batch: usize,
    /// Samples past the last output sample of a batch this *input* port
    /// needs visible before the stage may be called (unused for output
    /// ports). Most stages need none; a stage with a nonzero look-ahead
    /// simply holds that many trailing samples back from `mark_consumed`
    /// each call, the same way unconsumed history rolls forward.
    pub look_ahead: usize,
}

impl PortSpec {
    /// Builds a real-valued port with no look-ahead.
    pub fn real(name: impl Into<String>, history: usize, batch: usize) -> Self {
        Self {
            name: name.into(),
            kind: ElementKind::Real,
            history,
            batch,
            look_ahead: 0,
        }
    }

    /// Builds a complex-valued port with no look-ahead.
    pub fn complex(name: impl Into<String>, history: usize, batch: usize) -> Self {
        Self {
            name: name.into(),
            kind: ElementKind::Complex,
            history,
            batch,
            look_ahead: 0,
        }
    }

    /// Returns this port with its look-ahead requirement set to `n`.
    #[must_use]
    pub fn with_look_ahead(mut self, n: usize) -> Self {
        self.look_ahead = n;
        self
    }
}

/// A read-only view of one input port's available samples for this call.
pub enum InputView<'a> {
    /// Real samples, oldest first, `history` of them followed by up to one
    /// batch of new data.
    Real(&'a [Real], &'a Cell<usize>),
    /// Complex samples, same layout as [`InputView::Real`].
    Complex(&'a [Complex], &'a Cell<usize>),
}

impl<'a> InputView<'a> {
    /// Returns the real slice, panicking if this view is complex.
    pub fn as_real(&self) -> &'a [Real] {
        match self {
            InputView::Real(s, _) => s,
            InputView::Complex(_, _) => panic!("input port is complex, not real"),
        }
    }

    /// Returns the complex slice, panicking if this view is real.
    pub fn as_complex(&self) -> &'a [Complex] {
        match self {
            InputView::Complex(s, _) => s,
            InputView::Real(_, _) => panic!("input port is real, not complex"),
        }
    }

    /// Records how many of the offered samples (oldest-first) the stage
    /// consumed this call; the rest remain as history for the next call.
    pub fn mark_consumed(&self, n: usize) {
        match self {
            InputView::Real(_, c) | InputView::Complex(_, c) => c.set(n),
        }
    }
}

/// A write view of one output port's available room for this call.
pub enum OutputView<'a> {
    /// Real samples the stage should fill, starting at index 0.
    Real(&'a mut [Real], &'a Cell<usize>),
    /// Complex samples the stage should fill, starting at index 0.
    Complex(&'a mut [Complex], &'a Cell<usize>),
}

impl<'a> OutputView<'a> {
    /// Returns the real slice for writing, panicking if this view is complex.
    pub fn as_real_mut(&mut self) -> &mut [Real] {
        match self {
            OutputView::Real(s, _) => s,
            OutputView::Complex(_, _) => panic!("output port is complex, not real"),
        }
    }

    /// Returns the complex slice for writing, panicking if this view is real.
    pub fn as_complex_mut(&mut self) -> &mut [Complex] {
        match self {
            OutputView::Complex(s, _) => s,
            OutputView::Real(_, _) => panic!("output port is real, not complex"),
        }
    }

    /// Records how many samples (from index 0) the stage actually wrote.
    pub fn mark_produced(&self, n: usize) {
        match self {
            OutputView::Real(_, c) | OutputView::Complex(_, c) => c.set(n),
        }
    }
}

/// The views a `process` call operates on, one per declared input and output
/// port, in declaration order.
pub struct ProcessContext<'a> {
    inputs: Vec<InputView<'a>>,
    outputs: Vec<OutputView<'a>>,
}

impl<'a> ProcessContext<'a> {
    /// Used by the scheduler to assemble a call's views.
    pub fn new(inputs: Vec<InputView<'a>>, outputs: Vec<OutputView<'a>>) -> Self {
        Self { inputs, outputs }
    }

    /// Borrows input port `index`.
    pub fn input(&self, index: usize) -> &InputView<'a> {
        &self.inputs[index]
    }

    /// Mutably borrows output port `index`.
    pub fn output(&mut self, index: usize) -> &mut OutputView<'a> {
        &mut self.outputs[index]
    }

    /// Number of declared input ports.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of declared output ports.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

/// What a `process` call accomplished, used by the scheduler's drive loop
/// (§4.E) to decide whether to call again immediately or fall back to
/// waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The stage consumed and/or produced at least one sample; keep driving
    /// it while its thresholds are satisfied.
    Progress,
    /// The stage has no more output to produce and will consume no further
    /// input (e.g. a finite source has exhausted its data, or a sink has
    /// seen its upstream close); the scheduler retires this stage.
    Finished,
}

/// The unit of work a graph node performs. Implementations are expected to
/// be single-threaded internally — the scheduler gives each stage exactly
/// one worker thread (§4.E) — so no interior synchronization is needed
/// beyond what `ProcessContext` already provides.
pub trait Stage: Send {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// This stage's input ports, in the order `process` expects their views.
    fn inputs(&self) -> &[PortSpec];

    /// This stage's output ports, in the order `process` expects their views.
    fn outputs(&self) -> &[PortSpec];

    /// Clears internal state back to what a freshly constructed stage would
    /// hold (§4.C, §8 invariant 4). Called once by the scheduler before a
    /// stage's first `process` call and again on any recovery restart. Must
    /// not touch port declarations.
    fn reset(&mut self);

    /// Consumes available input and/or produces available output. Called
    /// repeatedly by the scheduler whenever this stage's threshold
    /// (declared history plus one batch on every input, one batch of room
    /// on every output) is satisfied.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome>;

    /// Called exactly once, after this stage's last `process` call, whether
    /// it stopped because it returned [`ProcessOutcome::Finished`] or
    /// because its upstream closed with nothing left to read. Sinks that
    /// buffer or need a trailing flush (a WAV writer's header, say) override
    /// this; most stages have nothing to do here.
    fn finish(&mut self) -> EngineResult<()> {
        Ok(())
    }
}
