//! SDR source boundary (§6 "SDR source"): a pull-model stage that wraps a
//! driver-supplied blocking read, and a pluggable backend abstraction for
//! selecting/opening that driver — mirroring `sonido_io::backend`'s
//! `AudioBackend` trait, the boundary a future live-hardware backend would
//! plug into.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use heterodyne_core::{Complex, EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

use crate::error::{Error, Result};

/// Receiver-side tuning parameters an `SdrDevice` is opened with (§6: "the
/// source stage ... Configuration it consumes from the driver").
#[derive(Debug, Clone)]
pub struct SdrConfig {
    /// Sample rate the device should stream at, in Hz.
    pub sample_rate: u32,
    /// Tuned center frequency, in Hz.
    pub center_frequency: u64,
    /// Backend-specific gain mode (e.g. `"auto"`, `"manual:20"`).
    pub gain_mode: String,
    /// Requested tuner bandwidth, in Hz.
    pub tuner_bandwidth: u32,
}

/// An open SDR device: a blocking source of interleaved I/Q samples.
pub trait SdrDevice: Send {
    /// Blocks until at least one sample is available (or the device is
    /// exhausted/closed), filling as much of `buffer` as it can and
    /// returning the number of samples written.
    fn read_iq(&mut self, buffer: &mut [Complex]) -> Result<usize>;
}

/// Lists and opens SDR devices, decoupling the dataflow graph from any
/// specific hardware driver (out of scope per the framework boundary — this
/// crate only defines where such a driver would plug in).
pub trait SdrBackend {
    /// Names of devices this backend can currently see.
    fn list_devices(&self) -> Vec<String>;

    /// Opens `device_name` (or the backend's default device when `None`)
    /// with the given tuning configuration.
    fn open(&self, device_name: Option<&str>, config: SdrConfig) -> Result<Box<dyn SdrDevice>>;
}

/// Reads a recorded IQ capture file (raw interleaved little-endian `f32`
/// I/Q pairs) as a stand-in for live hardware — used by offline tests and
/// the CLI's `--input-file` mode.
pub struct FileSdrBackend {
    capture_path: PathBuf,
}

impl FileSdrBackend {
    /// Builds a backend that always opens the capture at `capture_path`,
    /// regardless of the requested device name.
    pub fn new(capture_path: impl Into<PathBuf>) -> Self {
        Self {
            capture_path: capture_path.into(),
        }
    }
}

impl SdrBackend for FileSdrBackend {
    fn list_devices(&self) -> Vec<String> {
        vec![self.capture_path.display().to_string()]
    }

    fn open(&self, _device_name: Option<&str>, config: SdrConfig) -> Result<Box<dyn SdrDevice>> {
        let file = File::open(&self.capture_path).map_err(|e| {
            tracing::warn!(path = %self.capture_path.display(), error = %e, "failed to open IQ capture");
            Error::Io(e)
        })?;
        tracing::info!(
            path = %self.capture_path.display(),
            sample_rate = config.sample_rate,
            center_frequency = config.center_frequency,
            "IQ capture opened"
        );
        Ok(Box::new(FileIqDevice {
            reader: BufReader::new(file),
            exhausted: false,
        }))
    }
}

struct FileIqDevice {
    reader: BufReader<File>,
    exhausted: bool,
}

impl SdrDevice for FileIqDevice {
    fn read_iq(&mut self, buffer: &mut [Complex]) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        let mut raw = [0u8; 8];
        let mut n = 0;
        for slot in buffer.iter_mut() {
            match self.reader.read_exact(&mut raw) {
                Ok(()) => {
                    let i = f32::from_le_bytes(raw[0..4].try_into().unwrap());
                    let q = f32::from_le_bytes(raw[4..8].try_into().unwrap());
                    *slot = Complex::new(i, q);
                    n += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!(samples_read = n, "IQ capture exhausted");
                    self.exhausted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "IQ capture read failed");
                    return Err(Error::Io(e));
                }
            }
        }
        Ok(n)
    }
}

/// Writes a capture file [`FileSdrBackend`] can read back, used by tests
/// that synthesize an IQ recording rather than shipping one as a fixture.
pub fn write_iq_capture(path: impl AsRef<Path>, samples: &[Complex]) -> Result<()> {
    use std::io::Write;
    let mut file = File::create(path)?;
    for s in samples {
        file.write_all(&s.re.to_le_bytes())?;
        file.write_all(&s.im.to_le_bytes())?;
    }
    Ok(())
}

/// Zero-input stage pulling I/Q samples from an [`SdrDevice`] (§6 "Pull
/// model: the source stage exposes `process(outputs)` and internally calls
/// a driver-supplied blocking read").
pub struct SdrSource {
    device: Box<dyn SdrDevice>,
    outputs: Vec<PortSpec>,
}

impl SdrSource {
    /// Builds a source pulling from `device`, producing `batch` samples per
    /// call.
    pub fn new(device: Box<dyn SdrDevice>, batch: usize) -> Self {
        Self {
            device,
            outputs: vec![PortSpec::complex("iq", 0, batch)],
        }
    }
}

impl Stage for SdrSource {
    fn name(&self) -> &str {
        "sdr_source"
    }
    fn inputs(&self) -> &[PortSpec] {
        &[]
    }
    fn outputs(&self) -> &[PortSpec] {
        &self.outputs
    }
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let out = ctx.output(0).as_complex_mut();
        let n = self
            .device
            .read_iq(out)
            .map_err(|e| heterodyne_core::EngineError::io(heterodyne_core::EIO, e.to_string()))?;
        ctx.output(0).mark_produced(n);
        if n == 0 {
            Ok(ProcessOutcome::Finished)
        } else {
            Ok(ProcessOutcome::Progress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_backend_streams_back_what_was_written_and_then_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.iq");
        let samples: Vec<Complex> = (0..40)
            .map(|i| Complex::new(i as f32, -(i as f32)))
            .collect();
        write_iq_capture(&path, &samples).unwrap();

        let backend = FileSdrBackend::new(&path);
        let device = backend
            .open(
                None,
                SdrConfig {
                    sample_rate: 2_000_000,
                    center_frequency: 99_800_000,
                    gain_mode: "auto".into(),
                    tuner_bandwidth: 200_000,
                },
            )
            .unwrap();
        let mut source = SdrSource::new(device, 16);

        let produced = std::cell::Cell::new(0);
        let mut out = vec![Complex::new(0.0, 0.0); 16];
        let mut ctx = ProcessContext::new(
            vec![],
            vec![heterodyne_core::OutputView::Complex(&mut out, &produced)],
        );
        let outcome = source.process(&mut ctx).unwrap();
        assert_eq!(outcome, ProcessOutcome::Progress);
        assert_eq!(produced.get(), 16);
        assert_eq!(out[0], samples[0]);

        let produced2 = std::cell::Cell::new(0);
        let mut out2 = vec![Complex::new(0.0, 0.0); 16];
        let mut ctx2 = ProcessContext::new(
            vec![],
            vec![heterodyne_core::OutputView::Complex(&mut out2, &produced2)],
        );
        source.process(&mut ctx2).unwrap();
        assert_eq!(produced2.get(), 8);

        let produced3 = std::cell::Cell::new(0);
        let mut out3 = vec![Complex::new(0.0, 0.0); 16];
        let mut ctx3 = ProcessContext::new(
            vec![],
            vec![heterodyne_core::OutputView::Complex(&mut out3, &produced3)],
        );
        let outcome3 = source.process(&mut ctx3).unwrap();
        assert_eq!(outcome3, ProcessOutcome::Finished);
    }
}
