//! Multi-threaded scheduler: one worker per stage, driven by channel
//! thresholds (§4.E).
//!
//! Each [`crate::stage::Stage`] gets its own OS thread, spawned through
//! `crossbeam::thread::scope` so stage state can borrow the graph instead of
//! needing `'static` bounds and an `Arc` per node. A worker alternates
//! between waiting for its thresholds (declared history plus one batch on
//! every input, one batch of room on every output) and calling `process`
//! once they're met. The first error any stage reports wins: it is recorded,
//! every channel is woken, and every other worker unwinds on its next check
//! of the shared stop flag — mirroring the C++ original's
//! `std::exception_ptr` capture-and-rethrow (`pipeline_tests.cpp`'s
//! `ExceptionPropagation` case).

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::channel::Channel;
use crate::element::{Complex, ElementKind, Real};
use crate::error::{EngineError, EngineResult};
use crate::graph::ProcessingGraph;
use crate::stage::{InputView, OutputView, PortSpec, ProcessContext, ProcessOutcome, Stage};

/// A validated [`ProcessingGraph`] ready to run.
pub struct Pipeline {
    graph: ProcessingGraph,
}

impl Pipeline {
    /// Validates `graph` (every port connected, no cycles) and wraps it.
    pub fn new(graph: ProcessingGraph) -> EngineResult<Self> {
        graph.validate()?;
        Ok(Self { graph })
    }

    /// Runs every stage to completion (or until one reports an error),
    /// blocking the calling thread until the whole pipeline has finished.
    pub fn run(&mut self) -> EngineResult<()> {
        let stop = AtomicBool::new(false);
        let error_slot: Mutex<Option<EngineError>> = Mutex::new(None);
        let channels = &self.graph.channels;
        let node_count = self.graph.nodes.len();

        let node_ports: Vec<(Vec<Option<usize>>, Vec<Option<usize>>)> = self
            .graph
            .nodes
            .iter()
            .map(|n| (n.input_channels.clone(), n.output_channels.clone()))
            .collect();

        tracing::info!(stages = node_count, "pipeline run starting");
        let scope_result = crossbeam::thread::scope(|scope| {
            for (idx, node) in self.graph.nodes.iter_mut().enumerate() {
                let stage = node.stage.as_mut();
                let thread_name = format!("{}-{idx}", stage.name());
                let (inputs, outputs) = &node_ports[idx];
                let stop = &stop;
                let error_slot = &error_slot;
                let spawned = scope
                    .builder()
                    .name(thread_name.clone())
                    .spawn(move |_| {
                        drive_node(stage, inputs, outputs, channels, stop, error_slot);
                    });
                if spawned.is_err() {
                    record_error(
                        error_slot,
                        stop,
                        channels,
                        EngineError::internal("failed to spawn a worker thread"),
                    );
                } else {
                    tracing::debug!(thread = %thread_name, "worker thread spawned");
                }
            }
        });
        scope_result.map_err(|_| EngineError::internal("a worker thread panicked"))?;

        let mut guard = error_slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.take() {
            Some(err) => Err(err),
            None => {
                tracing::info!("pipeline run completed");
                Ok(())
            }
        }
    }
}

enum Scratch {
    Real(Vec<Real>),
    Complex(Vec<Complex>),
}

impl Scratch {
    fn new(kind: ElementKind, len: usize) -> Self {
        match kind {
            ElementKind::Real => Scratch::Real(vec![0.0; len]),
            ElementKind::Complex => Scratch::Complex(vec![Complex::new(0.0, 0.0); len]),
        }
    }

    fn real_mut(&mut self) -> &mut [Real] {
        match self {
            Scratch::Real(v) => v,
            Scratch::Complex(_) => panic!("scratch kind mismatch (engine bug)"),
        }
    }

    fn complex_mut(&mut self) -> &mut [Complex] {
        match self {
            Scratch::Complex(v) => v,
            Scratch::Real(_) => panic!("scratch kind mismatch (engine bug)"),
        }
    }
}

fn record_error(error_slot: &Mutex<Option<EngineError>>, stop: &AtomicBool, channels: &[Channel], err: EngineError) {
    let mut guard = error_slot
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if guard.is_none() {
        tracing::error!(error = %err, "pipeline stage failed, aborting run");
        *guard = Some(err);
    } else {
        tracing::warn!(error = %err, "additional stage error suppressed (first error wins)");
    }
    drop(guard);
    stop.store(true, Ordering::Release);
    for channel in channels {
        channel.wake_all();
    }
}

fn finish_node(
    input_channel_idx: &[Option<usize>],
    output_channel_idx: &[Option<usize>],
    channels: &[Channel],
) {
    for idx in input_channel_idx.iter().flatten() {
        channels[*idx].close_consumer();
    }
    for idx in output_channel_idx.iter().flatten() {
        channels[*idx].close_producer();
    }
}

#[allow(clippy::too_many_arguments)]
fn drive_node(
    stage: &mut dyn Stage,
    input_channel_idx: &[Option<usize>],
    output_channel_idx: &[Option<usize>],
    channels: &[Channel],
    stop: &AtomicBool,
    error_slot: &Mutex<Option<EngineError>>,
) {
    let input_specs: Vec<PortSpec> = stage.inputs().to_vec();
    let output_specs: Vec<PortSpec> = stage.outputs().to_vec();

    let mut input_scratch: Vec<Scratch> = input_specs
        .iter()
        .map(|s| Scratch::new(s.kind, s.history + s.batch + s.look_ahead))
        .collect();
    let mut output_scratch: Vec<Scratch> = output_specs
        .iter()
        .map(|s| Scratch::new(s.kind, s.batch.max(1)))
        .collect();
    let mut history_len: Vec<usize> = vec![0; input_specs.len()];

    stage.reset();
    tracing::debug!(stage = stage.name(), "worker started");

    loop {
        if stop.load(Ordering::Acquire) {
            tracing::debug!(stage = stage.name(), "worker stopped");
            return;
        }

        for (i, spec) in input_specs.iter().enumerate() {
            let channel = &channels[input_channel_idx[i].expect("input port is connected")];
            if let Err(err) = channel.wait_readable(spec.batch, stop) {
                record_error(error_slot, stop, channels, err);
                return;
            }
        }
        for (o, spec) in output_specs.iter().enumerate() {
            let channel = &channels[output_channel_idx[o].expect("output port is connected")];
            if let Err(err) = channel.wait_writable(spec.batch, stop) {
                record_error(error_slot, stop, channels, err);
                return;
            }
        }
        if stop.load(Ordering::Acquire) {
            return;
        }

        let mut available_new = vec![0usize; input_specs.len()];
        for (i, spec) in input_specs.iter().enumerate() {
            let channel = &channels[input_channel_idx[i].expect("input port is connected")];
            available_new[i] = channel.readable().min(spec.batch);
        }
        let mut output_room = vec![0usize; output_specs.len()];
        for (o, spec) in output_specs.iter().enumerate() {
            let channel = &channels[output_channel_idx[o].expect("output port is connected")];
            output_room[o] = channel.writable().min(spec.batch);
        }

        let inputs_exhausted = !input_specs.is_empty()
            && input_specs.iter().enumerate().all(|(i, _)| {
                let channel = &channels[input_channel_idx[i].expect("input port is connected")];
                available_new[i] == 0 && channel.is_producer_closed()
            });
        if inputs_exhausted {
            if let Err(err) = stage.finish() {
                record_error(error_slot, stop, channels, err);
                return;
            }
            tracing::debug!(stage = stage.name(), "worker finished (inputs exhausted)");
            finish_node(input_channel_idx, output_channel_idx, channels);
            return;
        }

        for (i, spec) in input_specs.iter().enumerate() {
            let channel = &channels[input_channel_idx[i].expect("input port is connected")];
            let new_len = available_new[i];
            let history = history_len[i];
            match spec.kind {
                ElementKind::Real => {
                    channel.read_real(&mut input_scratch[i].real_mut()[history..history + new_len]);
                }
                ElementKind::Complex => {
                    channel.read_complex(
                        &mut input_scratch[i].complex_mut()[history..history + new_len],
                    );
                }
            }
            channel.advance_read(new_len);
        }

        let consumed_cells: Vec<Cell<usize>> = input_specs.iter().map(|_| Cell::new(0)).collect();
        let produced_cells: Vec<Cell<usize>> = output_specs.iter().map(|_| Cell::new(0)).collect();

        let mut input_views = Vec::with_capacity(input_specs.len());
        for (i, spec) in input_specs.iter().enumerate() {
            let total = history_len[i] + available_new[i];
            input_views.push(match spec.kind {
                ElementKind::Real => {
                    InputView::Real(&input_scratch[i].real_mut()[..total], &consumed_cells[i])
                }
                ElementKind::Complex => {
                    InputView::Complex(&input_scratch[i].complex_mut()[..total], &consumed_cells[i])
                }
            });
        }
        let mut output_views = Vec::with_capacity(output_specs.len());
        for (o, spec) in output_specs.iter().enumerate() {
            let room = output_room[o];
            output_views.push(match spec.kind {
                ElementKind::Real => {
                    OutputView::Real(&mut output_scratch[o].real_mut()[..room], &produced_cells[o])
                }
                ElementKind::Complex => OutputView::Complex(
                    &mut output_scratch[o].complex_mut()[..room],
                    &produced_cells[o],
                ),
            });
        }

        let mut ctx = ProcessContext::new(input_views, output_views);
        let outcome = match stage.process(&mut ctx) {
            Ok(outcome) => outcome,
            Err(err) => {
                record_error(error_slot, stop, channels, err);
                return;
            }
        };
        drop(ctx);

        for (i, spec) in input_specs.iter().enumerate() {
            let total = history_len[i] + available_new[i];
            let consumed = consumed_cells[i].get().min(total);
            let leftover = total - consumed;
            match spec.kind {
                ElementKind::Real => {
                    let buf = input_scratch[i].real_mut();
                    buf.copy_within(consumed..total, 0);
                }
                ElementKind::Complex => {
                    let buf = input_scratch[i].complex_mut();
                    buf.copy_within(consumed..total, 0);
                }
            }
            history_len[i] = leftover.min(spec.history + spec.batch + spec.look_ahead);
        }
        for (o, spec) in output_specs.iter().enumerate() {
            let produced = produced_cells[o].get().min(output_room[o]);
            if produced == 0 {
                continue;
            }
            let channel = &channels[output_channel_idx[o].expect("output port is connected")];
            match spec.kind {
                ElementKind::Real => channel.write_real(&output_scratch[o].real_mut()[..produced]),
                ElementKind::Complex => {
                    channel.write_complex(&output_scratch[o].complex_mut()[..produced])
                }
            }
            channel.advance_write(produced);
        }

        if outcome == ProcessOutcome::Finished {
            if let Err(err) = stage.finish() {
                record_error(error_slot, stop, channels, err);
                return;
            }
            tracing::debug!(stage = stage.name(), "worker finished (stage reported Finished)");
            finish_node(input_channel_idx, output_channel_idx, channels);
            return;
        }
    }
}
