//! Wires a tuned [`ReceiverConfig`] into a runnable [`Pipeline`] (§6).
//!
//! The graph shape mirrors the receiver's own block diagram: the SDR
//! source and FM PLL demodulator always run; everything downstream of the
//! demodulator's composite audio output branches on `config.stereo` and
//! `config.rds`. Composite audio and the pilot-locked reference are each
//! single-producer streams, so wherever more than one downstream stage
//! needs a copy a [`Tee`] sits between them.

use heterodyne_core::{ElementKind, EngineResult, Pipeline, ProcessingGraph};
use heterodyne_dsp::{
    ComplexToReal, CostasLoop, FmDeemphasizer, FmPllDecoder, LowpassDecimator, PllGenerator,
    RdsGroupDecoder, RdsStatsHandle, RealToComplex, Sampler, StereoDemultiplexer, StereoExtractor,
    Tee,
};
use heterodyne_io::{AudioSink, AudioSinkStage, SdrDevice, SdrSource};

use heterodyne_config::ReceiverConfig;

/// RDS symbol rate, per IEC 62106.
const RDS_SYMBOL_RATE_HZ: f32 = 1187.5;

/// Handles the caller may want after the pipeline starts running, since the
/// graph itself takes ownership of every stage.
pub struct ReceiverHandles {
    /// Live RDS decoding statistics, `None` unless `config.rds` was set.
    pub rds_stats: Option<RdsStatsHandle>,
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

/// Picks an IQ batch size that both the audio decimation factor and (when
/// RDS is enabled) the symbol-rate decimation factor divide evenly, scaled
/// up to a few thousand samples so the scheduler isn't re-locking channel
/// condvars every handful of samples.
fn pick_batch(decimation_factor: usize, samples_per_symbol: Option<usize>) -> usize {
    let base = match samples_per_symbol {
        Some(sps) => lcm(decimation_factor, sps),
        None => decimation_factor,
    };
    let mut batch = base;
    while batch < 2048 {
        batch += base;
    }
    batch
}

/// Builds the full receive pipeline described by `config`, reading IQ from
/// `device` and writing decoded audio to `sink`.
pub fn build_pipeline(
    config: &ReceiverConfig,
    device: Box<dyn SdrDevice>,
    sink: Box<dyn AudioSink>,
) -> EngineResult<(Pipeline, ReceiverHandles)> {
    let sample_rate = config.sample_rate as f32;
    let decimation_factor = (config.sample_rate / config.audio_sample_rate) as usize;
    let samples_per_symbol = if config.rds {
        Some((sample_rate / RDS_SYMBOL_RATE_HZ).round() as usize)
    } else {
        None
    };
    let full_batch = pick_batch(decimation_factor, samples_per_symbol);
    let audio_batch = full_batch / decimation_factor;

    let mut graph = ProcessingGraph::new();

    let source = graph.add_node(Box::new(SdrSource::new(device, full_batch)));
    let demod = graph.add_node(Box::new(FmPllDecoder::new(sample_rate, 0.01, full_batch)));
    graph.connect(source, 0, demod, 0)?;

    let need_pilot = config.stereo || config.rds;
    let composite_fanout = 1 + usize::from(config.stereo) + usize::from(config.rds) + usize::from(need_pilot);
    let composite_tee = graph.add_node(Box::new(Tee::new(ElementKind::Real, composite_fanout, full_batch)));
    graph.connect(demod, 0, composite_tee, 0)?;

    let mut next_composite_port = 1;
    let mono_port = 0;

    let pilot_composite_port = if need_pilot {
        let port = next_composite_port;
        next_composite_port += 1;
        Some(port)
    } else {
        None
    };
    let stereo_composite_port = if config.stereo {
        let port = next_composite_port;
        next_composite_port += 1;
        Some(port)
    } else {
        None
    };
    let rds_composite_port = if config.rds {
        let port = next_composite_port;
        next_composite_port += 1;
        Some(port)
    } else {
        None
    };

    let mono_decimated = {
        let taps = heterodyne_dsp::default_taps(decimation_factor);
        let decimator = graph.add_node(Box::new(LowpassDecimator::new(decimation_factor, taps, full_batch)));
        graph.connect(composite_tee, mono_port, decimator, 0)?;
        decimator
    };

    let pilot_reference = if need_pilot {
        let to_complex = graph.add_node(Box::new(RealToComplex::new(full_batch)));
        graph.connect(composite_tee, pilot_composite_port.unwrap(), to_complex, 0)?;

        let loop_bandwidth = 2.0 * std::f32::consts::PI * 50.0 / sample_rate;
        let min_frequency = 2.0 * std::f32::consts::PI * 18_000.0 / sample_rate;
        let max_frequency = 2.0 * std::f32::consts::PI * 20_000.0 / sample_rate;
        let pll = graph.add_node(Box::new(PllGenerator::new(
            loop_bandwidth,
            min_frequency,
            max_frequency,
            full_batch,
        )));
        graph.connect(to_complex, 0, pll, 0)?;

        if config.stereo && config.rds {
            let pilot_tee = graph.add_node(Box::new(Tee::new(ElementKind::Complex, 2, full_batch)));
            graph.connect(pll, 0, pilot_tee, 0)?;
            Some((pilot_tee, 0usize, 1usize))
        } else {
            Some((pll, 0, 0))
        }
    } else {
        None
    };

    let (left, right) = if config.stereo {
        let (pilot_node, stereo_pilot_port, _) = pilot_reference.expect("stereo needs the pilot reference");
        let extractor = graph.add_node(Box::new(StereoExtractor::new(full_batch)));
        graph.connect(pilot_node, stereo_pilot_port, extractor, 0)?;
        graph.connect(composite_tee, stereo_composite_port.unwrap(), extractor, 1)?;

        let taps = heterodyne_dsp::default_taps(decimation_factor);
        let stereo_decimator = graph.add_node(Box::new(LowpassDecimator::new(decimation_factor, taps, full_batch)));
        graph.connect(extractor, 0, stereo_decimator, 0)?;

        let demux = graph.add_node(Box::new(StereoDemultiplexer::new(1.0, audio_batch)));
        graph.connect(mono_decimated, 0, demux, 0)?;
        graph.connect(stereo_decimator, 0, demux, 1)?;

        let tau = config.deemphasis.tau_seconds();
        let audio_rate = config.audio_sample_rate as f32;
        let left_deemph = graph.add_node(Box::new(FmDeemphasizer::new(audio_rate, tau, audio_batch)));
        let right_deemph = graph.add_node(Box::new(FmDeemphasizer::new(audio_rate, tau, audio_batch)));
        graph.connect(demux, 0, left_deemph, 0)?;
        graph.connect(demux, 1, right_deemph, 0)?;
        (left_deemph, right_deemph)
    } else {
        let tau = config.deemphasis.tau_seconds();
        let audio_rate = config.audio_sample_rate as f32;
        let deemph = graph.add_node(Box::new(FmDeemphasizer::new(audio_rate, tau, audio_batch)));
        graph.connect(mono_decimated, 0, deemph, 0)?;

        let tee = graph.add_node(Box::new(Tee::new(ElementKind::Real, 2, audio_batch)));
        graph.connect(deemph, 0, tee, 0)?;
        (tee, tee)
    };

    let sink_stage = graph.add_node(Box::new(AudioSinkStage::new(sink, audio_batch)));
    if config.stereo {
        graph.connect(left, 0, sink_stage, 0)?;
        graph.connect(right, 0, sink_stage, 1)?;
    } else {
        graph.connect(left, 0, sink_stage, 0)?;
        graph.connect(right, 1, sink_stage, 1)?;
    }

    let rds_stats = if config.rds {
        let (pilot_node, _, rds_pilot_port) = pilot_reference.expect("rds needs the pilot reference");
        let rds_pilot_port = if config.stereo { rds_pilot_port } else { 0 };
        let costas = graph.add_node(Box::new(CostasLoop::new(2_400.0 / sample_rate, 0.001, full_batch)));
        graph.connect(composite_tee, rds_composite_port.unwrap(), costas, 0)?;
        graph.connect(pilot_node, rds_pilot_port, costas, 1)?;

        let sps = samples_per_symbol.expect("rds implies samples_per_symbol");
        let sampler = graph.add_node(Box::new(Sampler::new(ElementKind::Complex, sps, sps, full_batch)));
        graph.connect(costas, 0, sampler, 0)?;

        let symbol_batch = full_batch / sps;
        let to_real = graph.add_node(Box::new(ComplexToReal::new(symbol_batch)));
        graph.connect(sampler, 0, to_real, 0)?;

        let decoder = RdsGroupDecoder::new(symbol_batch);
        let stats = decoder.stats_handle();
        let decoder_node = graph.add_node(Box::new(decoder));
        graph.connect(to_real, 0, decoder_node, 0)?;
        Some(stats)
    } else {
        None
    };

    let pipeline = Pipeline::new(graph)?;
    Ok((pipeline, ReceiverHandles { rds_stats }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use heterodyne_io::SdrBackend;

    #[test]
    fn batch_size_divides_both_decimation_and_symbol_rate() {
        let batch = pick_batch(40, Some(1617));
        assert_eq!(batch % 40, 0);
        assert_eq!(batch % 1617, 0);
        assert!(batch >= 2048);
    }

    #[test]
    fn mono_only_pipeline_builds_and_validates() {
        let config = ReceiverConfig::new(99_800_000);
        let samples: Vec<heterodyne_core::Complex> = (0..8192)
            .map(|i| heterodyne_core::Complex::new((i as f32 * 0.01).cos(), (i as f32 * 0.01).sin()))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.iq");
        heterodyne_io::write_iq_capture(&path, &samples).unwrap();
        let backend = heterodyne_io::FileSdrBackend::new(&path);
        let device = backend
            .open(
                None,
                heterodyne_io::SdrConfig {
                    sample_rate: config.sample_rate,
                    center_frequency: config.frequency_hz,
                    gain_mode: config.gain_mode.clone(),
                    tuner_bandwidth: config.tuner_bandwidth,
                },
            )
            .unwrap();
        let sink = Box::new(heterodyne_io::NullSink::new());
        let (pipeline, handles) = build_pipeline(&config, device, sink).unwrap();
        assert!(handles.rds_stats.is_none());
        drop(pipeline);
    }

    #[test]
    fn stereo_and_rds_pipeline_builds_and_validates() {
        let mut config = ReceiverConfig::new(99_800_000);
        config.stereo = true;
        config.rds = true;
        let samples: Vec<heterodyne_core::Complex> = (0..8192)
            .map(|i| heterodyne_core::Complex::new((i as f32 * 0.01).cos(), (i as f32 * 0.01).sin()))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.iq");
        heterodyne_io::write_iq_capture(&path, &samples).unwrap();
        let backend = heterodyne_io::FileSdrBackend::new(&path);
        let device = backend
            .open(
                None,
                heterodyne_io::SdrConfig {
                    sample_rate: config.sample_rate,
                    center_frequency: config.frequency_hz,
                    gain_mode: config.gain_mode.clone(),
                    tuner_bandwidth: config.tuner_bandwidth,
                },
            )
            .unwrap();
        let sink = Box::new(heterodyne_io::NullSink::new());
        let (pipeline, handles) = build_pipeline(&config, device, sink).unwrap();
        assert!(handles.rds_stats.is_some());
        drop(pipeline);
    }
}
