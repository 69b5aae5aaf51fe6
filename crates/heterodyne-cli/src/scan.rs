//! Station finder (§4.J): sweeps a frequency range, averaging `readings_per_sec`
//! SNR samples per step via [`SpectrumPowerEstimator`], and reports every
//! step whose averaged SNR clears `snr_threshold`.
//!
//! Per the source's Open Question (a) on dynamic range, the per-step
//! average is accumulated in `f64` rather than threaded through
//! [`heterodyne_dsp::RunningSum`]'s `f32` ring — `readings_per_sec` is small
//! enough that an `f64` running average needs no resync step of its own.

use heterodyne_core::{Complex, InputView, OutputView, ProcessContext, Stage};
use heterodyne_config::ScanConfig;
use heterodyne_dsp::SpectrumPowerEstimator;
use heterodyne_io::{SdrBackend, SdrConfig, SdrDevice};

use crate::CliError;

/// One frequency that cleared the scan's SNR threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationReading {
    /// Center frequency of the reading, in Hz.
    pub frequency_hz: u64,
    /// SNR averaged over `readings_per_sec` readings, in dB.
    pub snr_db: f32,
}

const FFT_SIZE: usize = 4096;
/// Narrow band straddling the carrier, used as the scan's signal power
/// estimate; wide enough to catch center-frequency drift, narrow enough to
/// stay clear of the stereo pilot and RDS subcarrier.
const SIGNAL_BAND: (f32, f32) = (-0.02, 0.02);
/// Band far from the carrier, used as the scan's noise floor estimate.
const NOISE_BAND: (f32, f32) = (0.3, 0.45);

/// Sweeps `[start_hz, end_hz]` in `scan_config.step_hz()` increments,
/// opening `backend` fresh at each step and returning every frequency whose
/// averaged SNR clears `scan_config.snr_threshold`, sorted ascending by
/// frequency (the sweep visits them in that order already).
pub fn scan_band(
    backend: &dyn SdrBackend,
    device_name: Option<&str>,
    start_hz: u64,
    end_hz: u64,
    scan_config: &ScanConfig,
) -> Result<Vec<StationReading>, CliError> {
    scan_config.validate().map_err(CliError::Config)?;

    let step_hz = scan_config.step_hz().max(1);
    let mut readings = Vec::new();
    let mut frequency_hz = start_hz;

    while frequency_hz <= end_hz {
        if let Some(snr_db) = measure_step(backend, device_name, frequency_hz, scan_config)? {
            if snr_db >= scan_config.snr_threshold {
                readings.push(StationReading { frequency_hz, snr_db });
            }
        }
        frequency_hz += step_hz;
    }

    Ok(readings)
}

fn measure_step(
    backend: &dyn SdrBackend,
    device_name: Option<&str>,
    frequency_hz: u64,
    scan_config: &ScanConfig,
) -> Result<Option<f32>, CliError> {
    let mut device = backend.open(
        device_name,
        SdrConfig {
            sample_rate: scan_config.sampling_rate as u32,
            center_frequency: frequency_hz,
            gain_mode: "auto".to_string(),
            tuner_bandwidth: scan_config.sampling_rate as u32,
        },
    )?;

    let mut estimator = SpectrumPowerEstimator::new(FFT_SIZE, SIGNAL_BAND, NOISE_BAND);
    let mut total_db = 0.0f64;
    let mut count = 0u64;

    for _ in 0..scan_config.readings_per_sec {
        let mut buffer = vec![Complex::new(0.0, 0.0); FFT_SIZE];
        let n = device.read_iq(&mut buffer)?;
        if n < FFT_SIZE {
            break;
        }

        let consumed = std::cell::Cell::new(0);
        let signal_produced = std::cell::Cell::new(0);
        let noise_produced = std::cell::Cell::new(0);
        let mut signal_out = [0.0f32];
        let mut noise_out = [0.0f32];
        let mut ctx = ProcessContext::new(
            vec![InputView::Complex(&buffer, &consumed)],
            vec![
                OutputView::Real(&mut signal_out, &signal_produced),
                OutputView::Real(&mut noise_out, &noise_produced),
            ],
        );
        estimator
            .process(&mut ctx)
            .map_err(CliError::Engine)?;

        let snr_linear = signal_out[0] / noise_out[0].max(1e-12);
        total_db += f64::from(10.0 * snr_linear.log10());
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }
    Ok(Some((total_db / count as f64) as f32))
}

/// Formats readings as the plain-text table the CLI prints (§6 "Persisted
/// state ... Scanner writes a plain text table: `frequency_hz snr` one pair
/// per line, sorted ascending by frequency"): one `frequency_hz snr` line
/// per station.
pub fn format_readings(readings: &[StationReading]) -> String {
    let mut out = String::new();
    for reading in readings {
        out.push_str(&format!("{} {:.2}\n", reading.frequency_hz, reading.snr_db));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use heterodyne_io::FileSdrBackend;

    #[test]
    fn formats_one_line_per_reading() {
        let readings = vec![
            StationReading { frequency_hz: 99_800_000, snr_db: 12.3 },
            StationReading { frequency_hz: 101_500_000, snr_db: 8.1 },
        ];
        let text = format_readings(&readings);
        assert_eq!(text, "99800000 12.30\n101500000 8.10\n");
    }

    #[test]
    fn a_flat_tone_capture_clears_threshold_at_every_step() {
        let n = FFT_SIZE;
        let samples: Vec<Complex> = (0..n)
            .map(|i| Complex::new((i as f32 * 0.3).cos(), (i as f32 * 0.3).sin()))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.iq");
        heterodyne_io::write_iq_capture(&path, &samples).unwrap();
        let backend = FileSdrBackend::new(&path);

        let mut scan_config = ScanConfig::default();
        scan_config.readings_per_sec = 1;
        scan_config.snr_threshold = -1_000.0;

        let readings = scan_band(&backend, None, 100_000_000, 100_000_000, &scan_config).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].frequency_hz, 100_000_000);
    }

    /// A synthetic band with known transmitters at 88.6, 91.2, and 99.8 MHz
    /// and nothing but noise elsewhere: scanning should report exactly
    /// those three frequencies, sorted ascending, and nothing else.
    #[test]
    fn three_known_transmitters_are_found_and_silence_elsewhere() {
        struct FakeBackend {
            known: Vec<u64>,
        }
        struct FakeDevice {
            has_tone: bool,
            state: u64,
        }
        impl SdrBackend for FakeBackend {
            fn list_devices(&self) -> Vec<String> {
                vec!["fake".to_string()]
            }
            fn open(
                &self,
                _device_name: Option<&str>,
                config: SdrConfig,
            ) -> heterodyne_io::Result<Box<dyn SdrDevice>> {
                let has_tone = self.known.contains(&config.center_frequency);
                Ok(Box::new(FakeDevice {
                    has_tone,
                    state: config.center_frequency ^ 0x9E37_79B9_7F4A_7C15,
                }))
            }
        }
        impl SdrDevice for FakeDevice {
            fn read_iq(&mut self, buffer: &mut [Complex]) -> heterodyne_io::Result<usize> {
                let mut next_u64 = || {
                    self.state ^= self.state << 13;
                    self.state ^= self.state >> 7;
                    self.state ^= self.state << 17;
                    self.state
                };
                for slot in buffer.iter_mut() {
                    let noise_re = ((next_u64() & 0xFFFF) as f32 / 65535.0 - 0.5) * 0.02;
                    let noise_im = ((next_u64() & 0xFFFF) as f32 / 65535.0 - 0.5) * 0.02;
                    *slot = if self.has_tone {
                        Complex::new(1.0 + noise_re, noise_im)
                    } else {
                        Complex::new(noise_re, noise_im)
                    };
                }
                Ok(buffer.len())
            }
        }

        let known = vec![88_600_000u64, 91_200_000u64, 99_800_000u64];
        let backend = FakeBackend {
            known: known.clone(),
        };

        let mut scan_config = ScanConfig::default();
        scan_config.sampling_rate = 200_000;
        scan_config.use_spectrum_percent = 100;
        scan_config.readings_per_sec = 1;
        scan_config.snr_threshold = 8.0;

        let readings =
            scan_band(&backend, None, 88_000_000, 100_000_000, &scan_config).unwrap();
        let found: Vec<u64> = readings.iter().map(|r| r.frequency_hz).collect();
        assert_eq!(found, known);
    }
}
