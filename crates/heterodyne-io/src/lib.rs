//! SDR source and audio sink interfaces for the Heterodyne receiver.
//!
//! Both the hardware SDR driver and the audio output device are external
//! collaborators the dataflow engine only talks to through a trait
//! boundary; this crate defines those boundaries (mirroring
//! `sonido-io`'s backend abstraction) and ships file-backed
//! implementations of each side for offline use and testing.

mod error;
pub mod sdr;
pub mod sink;

pub use error::{Error, Result};
pub use sdr::{write_iq_capture, FileSdrBackend, SdrBackend, SdrConfig, SdrDevice, SdrSource};
pub use sink::{AudioSink, AudioSinkStage, NullSink, WavFileSink};
