//! Error types for imlc-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising or parsing an MLC run
#[derive(Debug, Error)]
pub enum Error {
    /// The run's cancellation scope was triggered
    #[error("Run cancelled")]
    Cancelled,

    /// Another MLC process is already being supervised
    #[error("MLC is already running (pid {pid})")]
    AlreadyRunning {
        /// Process id of the running instance
        pid: u32,
    },

    /// The MLC executable could not be spawned
    #[error("Failed to launch {program}: {source}")]
    Launch {
        /// Program that failed to start
        program: String,
        /// Underlying spawn error
        source: std::io::Error,
    },

    /// No MLC executable at the configured location
    #[error("Failed to find MLC at \"{}\". Please visit the Configure tab.", path.display())]
    ToolNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// The version probe never produced a version string
    #[error("Could not fetch the MLC version. Please check the configured path.")]
    VersionUnavailable,

    /// A run is active or an MLC process is still live
    #[error("A test is already running. Cancel it before starting another.")]
    RunInProgress,

    /// The tool path cannot change while a benchmark owns the process
    #[error("Cannot modify MLC path whilst MLC is running.")]
    ToolBusy,

    /// A path handed to `configure_path` is not an executable file
    #[error("Please select a valid exe: {}", path.display())]
    InvalidExecutable {
        /// Rejected path
        path: PathBuf,
    },

    /// A log file is already owned by another sink
    #[error("Log file path already in use: {}", path.display())]
    LogPathInUse {
        /// Contested path
        path: PathBuf,
    },

    /// Worker pool construction failed
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is the cooperative-cancellation signal rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AlreadyRunning { pid: 4242 };
        assert!(err.to_string().contains("already running"));
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn test_tool_not_found_mentions_path() {
        let err = Error::ToolNotFound {
            path: PathBuf::from("/opt/mlc/mlc"),
        };
        assert!(err.to_string().contains("/opt/mlc/mlc"));
        assert!(err.to_string().contains("Configure"));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::VersionUnavailable.is_cancelled());
        let io: Error = std::io::Error::other("broken pipe").into();
        assert!(!io.is_cancelled());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
