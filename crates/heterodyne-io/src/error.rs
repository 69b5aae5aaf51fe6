//! Error type for the SDR source and audio sink boundary, mirroring
//! `sonido_io::Error`'s shape (a `thiserror` enum wrapping the handful of
//! ways an external byte source/drain can fail).

use thiserror::Error;

/// Failure modes for the I/O boundary: opening a device, reading an IQ
/// capture, or writing out audio.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying WAV file read/write failure.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O failure (file open, raw capture read, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The named device does not exist or could not be opened.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The capture or sink ran out of data/room unexpectedly.
    #[error("end of stream: {0}")]
    EndOfStream(String),
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
