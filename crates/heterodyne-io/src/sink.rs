//! Audio sink boundary (§6 "Audio sink"): a blocking PCM writer stage and a
//! pluggable backend abstraction, mirroring `sonido_io::wav` for the
//! concrete WAV-file implementation.

use std::path::Path;

use heterodyne_core::{EngineResult, PortSpec, ProcessContext, ProcessOutcome, Stage};

use crate::error::Result;

/// A blocking drain for interleaved stereo PCM audio (§6: "Expects
/// interleaved L,R float samples at a fixed rate").
pub trait AudioSink: Send {
    /// Writes one block of left/right samples, equal length.
    fn write_block(&mut self, left: &[f32], right: &[f32]) -> Result<()>;

    /// Flushes and closes the underlying resource. Called once when the
    /// sink stage's upstream closes.
    fn finalize(&mut self) -> Result<()>;
}

/// Writes received audio to a WAV file, mirroring `sonido_io::wav::write_wav_stereo`.
pub struct WavFileSink {
    writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
}

impl WavFileSink {
    /// Creates (or truncates) a stereo WAV file at `path`, sampled at
    /// `sample_rate_hz`.
    pub fn create(path: impl AsRef<Path>, sample_rate_hz: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: sample_rate_hz,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = path.as_ref();
        let writer = hound::WavWriter::create(path, spec)?;
        tracing::info!(path = %path.display(), sample_rate = sample_rate_hz, "WAV sink opened");
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl AudioSink for WavFileSink {
    fn write_block(&mut self, left: &[f32], right: &[f32]) -> Result<()> {
        let writer = self.writer.as_mut().expect("write after finalize");
        for (&l, &r) in left.iter().zip(right.iter()) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::info!("WAV sink finalized");
        }
        Ok(())
    }
}

/// Discards every sample, counting how many it has seen; used for
/// throughput/back-pressure tests where no real audio output is needed
/// (§8 scenario E6).
#[derive(Default)]
pub struct NullSink {
    samples_seen: u64,
}

impl NullSink {
    /// Builds an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total samples accepted so far.
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }
}

impl AudioSink for NullSink {
    fn write_block(&mut self, left: &[f32], _right: &[f32]) -> Result<()> {
        self.samples_seen += left.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Two-input, no-output stage driving an [`AudioSink`] (mono sinks get the
/// same signal duplicated to both channels upstream by a demultiplexer set
/// to a zero stereo weight, so this stage is always stereo-shaped).
pub struct AudioSinkStage {
    sink: Box<dyn AudioSink>,
    inputs: Vec<PortSpec>,
}

impl AudioSinkStage {
    /// Builds a sink stage consuming `batch` samples per channel per call.
    pub fn new(sink: Box<dyn AudioSink>, batch: usize) -> Self {
        Self {
            sink,
            inputs: vec![
                PortSpec::real("left", 0, batch),
                PortSpec::real("right", 0, batch),
            ],
        }
    }
}

impl Stage for AudioSinkStage {
    fn name(&self) -> &str {
        "audio_sink"
    }
    fn inputs(&self) -> &[PortSpec] {
        &self.inputs
    }
    fn outputs(&self) -> &[PortSpec] {
        &[]
    }
    fn reset(&mut self) {}
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> EngineResult<ProcessOutcome> {
        let left = ctx.input(0).as_real();
        let right = ctx.input(1).as_real();
        let n = left.len().min(right.len());

        self.sink
            .write_block(&left[..n], &right[..n])
            .map_err(|e| heterodyne_core::EngineError::io(heterodyne_core::EIO, e.to_string()))?;

        ctx.input(0).mark_consumed(n);
        ctx.input(1).mark_consumed(n);
        Ok(ProcessOutcome::Progress)
    }
    fn finish(&mut self) -> EngineResult<()> {
        self.sink
            .finalize()
            .map_err(|e| heterodyne_core::EngineError::io(heterodyne_core::EIO, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heterodyne_core::InputView;
    use std::cell::Cell;

    #[test]
    fn wav_file_sink_writes_interleaved_stereo_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut sink = WavFileSink::create(&path, 48_000).unwrap();
        sink.write_block(&[1.0, 2.0], &[-1.0, -2.0]).unwrap();
        sink.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn null_sink_counts_samples_without_storing_them() {
        let mut sink = NullSink::new();
        sink.write_block(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(sink.samples_seen(), 4);
    }

    #[test]
    fn audio_sink_stage_consumes_a_full_block_from_both_channels() {
        let mut stage = AudioSinkStage::new(Box::new(NullSink::new()), 4);
        let left = [1.0f32, 2.0, 3.0, 4.0];
        let right = [1.0f32, 2.0, 3.0, 4.0];
        let consumed_l = Cell::new(0);
        let consumed_r = Cell::new(0);
        let mut ctx = ProcessContext::new(
            vec![InputView::Real(&left, &consumed_l), InputView::Real(&right, &consumed_r)],
            vec![],
        );
        stage.process(&mut ctx).unwrap();
        assert_eq!(consumed_l.get(), 4);
        assert_eq!(consumed_r.get(), 4);
    }

    #[test]
    fn audio_sink_stage_finish_finalizes_the_wav_file() {
        use heterodyne_core::Stage;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut stage = AudioSinkStage::new(Box::new(WavFileSink::create(&path, 48_000).unwrap()), 2);
        let left = [1.0f32, 2.0];
        let right = [-1.0f32, -2.0];
        let consumed_l = Cell::new(0);
        let consumed_r = Cell::new(0);
        let mut ctx = ProcessContext::new(
            vec![InputView::Real(&left, &consumed_l), InputView::Real(&right, &consumed_r)],
            vec![],
        );
        stage.process(&mut ctx).unwrap();
        stage.finish().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![1.0, -1.0, 2.0, -2.0]);
    }
}
