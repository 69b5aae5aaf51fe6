//! Receiver configuration: what the `fm-receiver` CLI driver needs to wire
//! up a tuned pipeline (§6 "SDR source ... Configuration it consumes from
//! the driver: `sample_rate`, `center_frequency`, `gain_mode`,
//! `tuner_bandwidth`", plus the de-emphasis region choice from Open
//! Question (b)).

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// De-emphasis time constant region (§9 Open Question (b): "the de-emphasis
/// time constant defaults to 50 µs (Europe); implementers must expose the
/// 75 µs option for North America").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeemphasisRegion {
    /// 50 µs time constant, used across Europe and most of the world.
    Europe,
    /// 75 µs time constant, used in North America and South Korea.
    NorthAmerica,
}

impl DeemphasisRegion {
    /// The time constant, in seconds, this region's de-emphasis filter uses.
    pub fn tau_seconds(self) -> f32 {
        match self {
            DeemphasisRegion::Europe => 50e-6,
            DeemphasisRegion::NorthAmerica => 75e-6,
        }
    }
}

impl Default for DeemphasisRegion {
    fn default() -> Self {
        DeemphasisRegion::Europe
    }
}

fn default_sample_rate() -> u32 {
    // 40x the default audio rate, the same ratio RTL-SDR captures commonly
    // use so decimation lands on an integer factor without resampling.
    1_920_000
}

fn default_gain_mode() -> String {
    "auto".to_string()
}

fn default_tuner_bandwidth() -> u32 {
    200_000
}

fn default_audio_sample_rate() -> u32 {
    48_000
}

/// Full configuration for a single `fm-receiver` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Tuned center frequency, in Hz.
    pub frequency_hz: u64,

    /// SDR capture sample rate, in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Output audio sample rate, in Hz (after decimation).
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    /// Whether to recover and output stereo (`L`, `R`) instead of mono.
    #[serde(default)]
    pub stereo: bool,

    /// Whether to run the RDS subcarrier decode chain alongside audio.
    #[serde(default)]
    pub rds: bool,

    /// Backend-specific gain mode string (e.g. `"auto"`, `"manual:20"`).
    #[serde(default = "default_gain_mode")]
    pub gain_mode: String,

    /// Requested tuner bandwidth, in Hz.
    #[serde(default = "default_tuner_bandwidth")]
    pub tuner_bandwidth: u32,

    /// De-emphasis time constant region.
    #[serde(default)]
    pub deemphasis: DeemphasisRegion,
}

impl ReceiverConfig {
    /// Builds a minimal configuration tuned to `frequency_hz`, with every
    /// other field at its default.
    pub fn new(frequency_hz: u64) -> Self {
        Self {
            frequency_hz,
            sample_rate: default_sample_rate(),
            audio_sample_rate: default_audio_sample_rate(),
            stereo: false,
            rds: false,
            gain_mode: default_gain_mode(),
            tuner_bandwidth: default_tuner_bandwidth(),
            deemphasis: DeemphasisRegion::default(),
        }
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Checks field values fall within the ranges the receiver can actually
    /// run with, before any stage is constructed.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::invalid_value(
                "sample_rate",
                "must be greater than zero",
            ));
        }
        if self.audio_sample_rate == 0 || self.audio_sample_rate > self.sample_rate {
            return Err(ConfigError::invalid_value(
                "audio_sample_rate",
                "must be greater than zero and not exceed sample_rate",
            ));
        }
        if self.sample_rate % self.audio_sample_rate != 0 {
            return Err(ConfigError::invalid_value(
                "audio_sample_rate",
                "must evenly divide sample_rate for integer decimation",
            ));
        }
        if self.frequency_hz == 0 {
            return Err(ConfigError::invalid_value(
                "frequency_hz",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_config() {
        let config = ReceiverConfig::new(99_800_000);
        assert!(config.validate().is_ok());
        assert_eq!(config.deemphasis, DeemphasisRegion::Europe);
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let config = ReceiverConfig::new(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn non_divisor_audio_rate_is_rejected() {
        let mut config = ReceiverConfig::new(99_800_000);
        config.sample_rate = 2_000_000;
        config.audio_sample_rate = 48_001;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn parses_from_toml_with_sparse_fields() {
        let text = r#"
            frequency_hz = 99800000
            stereo = true
            deemphasis = "north_america"
        "#;
        let config = ReceiverConfig::from_toml_str(text).unwrap();
        assert_eq!(config.frequency_hz, 99_800_000);
        assert!(config.stereo);
        assert_eq!(config.deemphasis, DeemphasisRegion::NorthAmerica);
        assert_eq!(config.sample_rate, default_sample_rate());
    }
}
