//! Station scan configuration (§4.J): sweep step size, readings per step,
//! and the averaging scale noted in the source's Open Question (a).

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

fn default_sampling_rate() -> u64 {
    2_000_000
}

fn default_use_spectrum_percent() -> u64 {
    90
}

fn default_readings_per_sec() -> u64 {
    10
}

fn default_snr_threshold() -> f32 {
    8.0
}

fn default_scale() -> f32 {
    1e10
}

/// Configuration for a full-band station scan (`findStations`, §4.J).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Hardware capture sample rate, in Hz.
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u64,

    /// Fraction (as a percentage) of `sampling_rate` each sweep step
    /// advances the center frequency by.
    #[serde(default = "default_use_spectrum_percent")]
    pub use_spectrum_percent: u64,

    /// SNR readings averaged per sweep step.
    #[serde(default = "default_readings_per_sec")]
    pub readings_per_sec: u64,

    /// Minimum averaged SNR, in dB, for a frequency to be reported.
    #[serde(default = "default_snr_threshold")]
    pub snr_threshold: f32,

    /// Averaging scale applied to each SNR reading before it's accumulated
    /// into the running sum (kept for parity with the original's dynamic
    /// range note; an `f64` accumulator needs no actual scaling, see
    /// `RunningSum`/Open Question (a)).
    #[serde(default = "default_scale")]
    pub scale: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
            use_spectrum_percent: default_use_spectrum_percent(),
            readings_per_sec: default_readings_per_sec(),
            snr_threshold: default_snr_threshold(),
            scale: default_scale(),
        }
    }
}

impl ScanConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// The frequency step, in Hz, between successive sweep positions.
    pub fn step_hz(&self) -> u64 {
        self.sampling_rate * self.use_spectrum_percent / 100
    }

    /// Checks the scan parameters are usable before any sub-pipeline is
    /// built.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sampling_rate == 0 {
            return Err(ConfigError::invalid_value(
                "sampling_rate",
                "must be greater than zero",
            ));
        }
        if self.use_spectrum_percent == 0 || self.use_spectrum_percent > 100 {
            return Err(ConfigError::invalid_value(
                "use_spectrum_percent",
                "must be in (0, 100]",
            ));
        }
        if self.readings_per_sec == 0 {
            return Err(ConfigError::invalid_value(
                "readings_per_sec",
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
    fn default_step_matches_ninety_percent_of_sampling_rate() {
        let config = ScanConfig::default();
        assert_eq!(config.step_hz(), 1_800_000);
    }

    #[test]
    fn zero_spectrum_percent_is_rejected() {
        let mut config = ScanConfig::default();
        config.use_spectrum_percent = 0;
        assert!(config.validate().is_err());
    }
}
