//! DSP stages for the Heterodyne FM receiver: FM demodulation, stereo
//! recovery, RDS carrier recovery and decoding, anti-aliasing/decimation,
//! de-emphasis, SNR estimation, and the synthetic sources used to build
//! self-contained test pipelines.

pub mod costas;
pub mod deemphasis;
pub mod pll;
pub mod rds;
pub mod resample;
pub mod running_sum;
pub mod sampler;
pub mod snr;
pub mod sources;
pub mod spectrum;
pub mod stereo;
pub mod tee;

pub use costas::CostasLoop;
pub use deemphasis::{FmDeemphasizer, TAU_EUROPE_SECONDS, TAU_NORTH_AMERICA_SECONDS};
pub use pll::{FmPllDecoder, PllGenerator, BROADCAST_DEVIATION_HZ};
pub use rds::{
    DecodeOutcome, RdsDecodingStats, RdsGroupDecoder, RdsStatsHandle, OFFSETS, OFFSET_A,
    OFFSET_B, OFFSET_C, OFFSET_C2, OFFSET_D,
};
pub use resample::{default_taps, design_lowpass, LowpassDecimator};
pub use running_sum::RunningSum;
pub use sampler::{ComplexToReal, RealToComplex, Sampler};
pub use snr::SnrEstimator;
pub use sources::{GaussianNoiseSource, SawToothSource, SineSource};
pub use spectrum::SpectrumPowerEstimator;
pub use stereo::{StereoDemultiplexer, StereoExtractor, StereoWeight};
pub use tee::Tee;
