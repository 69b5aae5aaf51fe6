//! Engine-wide error type (§6).

use thiserror::Error;

/// Errors the engine can report, either from a stage's `process` or from the
/// scheduler itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stage's interaction with the outside world (a file, a device)
    /// failed. `message` already has the OS-level diagnostic for `code`
    /// appended (§8 scenario E1: the original caller's string survives
    /// verbatim as a prefix, with the errno-equivalent embedded after it).
    #[error("{message}")]
    Io {
        /// Platform error code, or `-1` when the failure has none.
        code: i32,
        /// Caller-supplied description followed by the OS diagnostic.
        message: String,
    },

    /// The pipeline was torn down because some other stage already failed;
    /// this is what every stage still waiting on a channel observes.
    #[error("pipeline aborted: {reason}")]
    PipelineAborted {
        /// The first error's message, copied in for convenience.
        reason: String,
    },

    /// The engine's own invariants were violated — a bug in the scheduler or
    /// in a `Stage` implementation's bookkeeping, never a data-dependent
    /// condition a caller should expect to recover from.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Builds an [`EngineError::Io`] from an OS error code and a caller
    /// message, appending the OS's own diagnostic string for `code` (e.g.
    /// `EIO` renders as `"Input/output error"` on Linux) the same way the
    /// original `IoError` concatenates its `what()` with `strerror(errno)`.
    pub fn io(code: i32, message: impl Into<String>) -> Self {
        let os_diagnostic = std::io::Error::from_raw_os_error(code).to_string();
        EngineError::Io {
            code,
            message: format!("{}: {os_diagnostic}", message.into()),
        }
    }

    /// Builds an [`EngineError::Internal`] from a message.
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }
}

/// POSIX `EIO` ("Input/output error"), the errno value the SDR source and
/// audio sink stages report when their blocking driver call fails.
pub const EIO: i32 = 5;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io {
            code: err.raw_os_error().unwrap_or(-1),
            message: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_message_starts_with_caller_text_and_contains_os_diagnostic() {
        let err = EngineError::io(EIO, "test exception");
        let message = err.to_string();
        assert!(message.starts_with("test exception"));
        assert!(message.contains("Input/output error"));
    }
}
