use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::log_sink::LogLevel;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while preparing, isolating or tearing down a session.
///
/// Every variant is fatal to the run. Failures raised by an example body are
/// reported as [`crate::ExampleFailure`] values instead and never surface here.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to capture session baseline: {0}")]
    Capture(String),
    #[error("failed to restore session baseline: {0}")]
    Restore(String),
    #[error("failed to prepare fixture repository at {path}: {message}")]
    Fixture { path: PathBuf, message: String },
    #[error("suite root {path} contains unsupported character {character:?}")]
    UnsupportedRoot { path: PathBuf, character: char },
    #[error("failed to write {level} log: {source}")]
    LogSink {
        level: LogLevel,
        #[source]
        source: io::Error,
    },
    #[error("example status file {path}: {message}")]
    StatusFile { path: PathBuf, message: String },
    #[error("invalid version {input:?}: {message}")]
    Version { input: String, message: String },
    #[error("failed to run command `{command}`: {source}")]
    Command {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn capture(message: impl Into<String>) -> Self {
        HarnessError::Capture(message.into())
    }

    pub(crate) fn restore(message: impl Into<String>) -> Self {
        HarnessError::Restore(message.into())
    }

    pub(crate) fn fixture(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        HarnessError::Fixture {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn status_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        HarnessError::StatusFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn version(input: impl Into<String>, message: impl Into<String>) -> Self {
        HarnessError::Version {
            input: input.into(),
            message: message.into(),
        }
    }
}
