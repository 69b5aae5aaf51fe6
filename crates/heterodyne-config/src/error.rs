//! Construction-time configuration errors, mirroring
//! `sonido_config::error::ConfigError`'s shape: these are raised while
//! building a `ReceiverConfig`/`ScanConfig`, strictly before any stage
//! runs, which is why they're a separate type from `heterodyne_core::EngineError`
//! (§7: "`ConfigError` raised instead by a separate
//! `heterodyne-config::ConfigError`").

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating receiver/scan
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A numeric field was outside its valid range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: String,
        /// Description of why the value is invalid.
        reason: String,
    },
}

impl ConfigError {
    /// Builds a [`ConfigError::ReadFile`].
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type for this crate.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
