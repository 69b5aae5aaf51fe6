//! Dataflow execution engine for the Heterodyne SDR framework.
//!
//! This crate owns the parts of the system that know nothing about radio:
//! aligned sample storage, a typed single-producer/single-consumer channel,
//! the [`Stage`](stage::Stage) capability every graph node implements, the
//! [`ProcessingGraph`](graph::ProcessingGraph) that wires stages together,
//! and the [`Pipeline`](scheduler::Pipeline) scheduler that runs them on a
//! worker-per-stage thread pool with back-pressure and first-error-wins
//! abort semantics. Everything radio-specific — the PLL demodulator, RDS
//! codec, resamplers — lives in `heterodyne-dsp` and is expressed purely in
//! terms of the `Stage` trait this crate defines.

pub mod buffer;
pub mod channel;
pub mod element;
pub mod error;
pub mod graph;
pub mod ring;
pub mod scheduler;
pub mod stage;

pub use channel::Channel;
pub use element::{Complex, Element, ElementKind, Real};
pub use error::{EngineError, EngineResult, EIO};
pub use graph::{NodeId, ProcessingGraph};
pub use scheduler::Pipeline;
pub use stage::{InputView, OutputView, PortSpec, ProcessContext, ProcessOutcome, Stage};
