//! `fm-receiver`: tunes a pipeline to a broadcast FM station and streams
//! decoded audio to a WAV file or discards it for throughput testing, and
//! sweeps a band looking for stations above an SNR threshold (§4.J, §6).
//!
//! Subcommand naming follows `sonido-cli`'s convention of an explicit verb
//! per invocation (`receive`, `scan`) rather than a bare positional
//! frequency argument, so the station-scan tool has a natural home in the
//! same binary instead of needing one of its own.

mod receiver;
mod scan;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use heterodyne_config::{DeemphasisRegion, ReceiverConfig, ScanConfig};
use heterodyne_io::{FileSdrBackend, NullSink, SdrBackend, SdrConfig, WavFileSink};

#[derive(Parser)]
#[command(name = "fm-receiver")]
#[command(author, version, about = "Heterodyne FM broadcast receiver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tune to a station and decode audio (and RDS, if requested)
    Receive(ReceiveArgs),
    /// Sweep a frequency range and report stations above the SNR threshold
    Scan(ScanArgs),
}

#[derive(Args)]
struct ReceiveArgs {
    /// Center frequency to tune to, in Hz
    frequency_hz: u64,

    /// Recover and output stereo audio instead of mono
    #[arg(long)]
    stereo: bool,

    /// Decode the RDS subcarrier alongside audio
    #[arg(long)]
    rds: bool,

    /// Recorded IQ capture to read from (raw interleaved little-endian f32 I/Q)
    #[arg(long, value_name = "PATH")]
    input_file: PathBuf,

    /// WAV file to write decoded audio to; omit to discard audio
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// SDR capture sample rate, in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Output audio sample rate, in Hz
    #[arg(long)]
    audio_sample_rate: Option<u32>,

    /// De-emphasis region (`europe` or `north-america`)
    #[arg(long, value_enum)]
    deemphasis: Option<CliDeemphasisRegion>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliDeemphasisRegion {
    Europe,
    NorthAmerica,
}

impl From<CliDeemphasisRegion> for DeemphasisRegion {
    fn from(region: CliDeemphasisRegion) -> Self {
        match region {
            CliDeemphasisRegion::Europe => DeemphasisRegion::Europe,
            CliDeemphasisRegion::NorthAmerica => DeemphasisRegion::NorthAmerica,
        }
    }
}

#[derive(Args)]
struct ScanArgs {
    /// Low end of the band to sweep, in Hz
    start_hz: u64,

    /// High end of the band to sweep, in Hz
    end_hz: u64,

    /// Recorded IQ capture each step reads from (offline mode)
    #[arg(long, value_name = "PATH")]
    input_file: PathBuf,

    /// Minimum averaged SNR, in dB, for a frequency to be reported
    #[arg(long)]
    snr_threshold: Option<f32>,
}

/// Errors the CLI's `main` can map to an exit code (§6: 0 success, 1
/// configuration error, 2 I/O error from radio or audio device, 3 internal
/// panic).
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Config(#[from] heterodyne_config::ConfigError),
    #[error(transparent)]
    Io(#[from] heterodyne_io::Error),
    #[error(transparent)]
    Engine(#[from] heterodyne_core::EngineError),
}

fn exit_code_for(err: &CliError) -> u8 {
    match err {
        CliError::Config(_) => 1,
        CliError::Io(_) | CliError::Engine(_) => 2,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match panic::catch_unwind(AssertUnwindSafe(|| dispatch(cli))) {
        Ok(Ok(())) => ExitCode::from(0),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "fm-receiver failed");
            eprintln!("error: {err}");
            ExitCode::from(exit_code_for(&err))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %message, "fm-receiver panicked");
            eprintln!("internal error: {message}");
            ExitCode::from(3)
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Receive(args) => receive(args),
        Commands::Scan(args) => scan(args),
    }
}

fn receive(args: ReceiveArgs) -> Result<(), CliError> {
    let mut config = ReceiverConfig::new(args.frequency_hz);
    config.stereo = args.stereo;
    config.rds = args.rds;
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(rate) = args.audio_sample_rate {
        config.audio_sample_rate = rate;
    }
    if let Some(region) = args.deemphasis {
        config.deemphasis = region.into();
    }
    config.validate()?;

    let backend = FileSdrBackend::new(&args.input_file);
    let device = backend.open(
        None,
        SdrConfig {
            sample_rate: config.sample_rate,
            center_frequency: config.frequency_hz,
            gain_mode: config.gain_mode.clone(),
            tuner_bandwidth: config.tuner_bandwidth,
        },
    )?;

    let sink: Box<dyn heterodyne_io::AudioSink> = match &args.record {
        Some(path) => Box::new(WavFileSink::create(path, config.audio_sample_rate)?),
        None => Box::new(NullSink::new()),
    };

    let (mut pipeline, handles) = receiver::build_pipeline(&config, device, sink)?;
    pipeline.run()?;

    if let Some(stats) = handles.rds_stats {
        let snapshot = stats.snapshot();
        tracing::info!(
            valid = snapshot.valid,
            corrected = snapshot.corrected,
            failed = snapshot.failed,
            "rds decoding finished"
        );
    }

    Ok(())
}

fn scan(args: ScanArgs) -> Result<(), CliError> {
    let mut scan_config = ScanConfig::default();
    if let Some(threshold) = args.snr_threshold {
        scan_config.snr_threshold = threshold;
    }
    scan_config.validate()?;

    let backend = FileSdrBackend::new(&args.input_file);
    let readings = scan::scan_band(&backend, None, args.start_hz, args.end_hz, &scan_config)?;
    print!("{}", scan::format_readings(&readings));
    Ok(())
}
