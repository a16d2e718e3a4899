//! Log sinks for run diagnostics
//!
//! The core writes every consumed MLC output line and every warning through a
//! [`LogSink`]. A sink can never fail a benchmark run: write errors are
//! reported through `tracing` and otherwise swallowed.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal progress
    Info,
    /// Recoverable anomaly
    Warn,
    /// Failure
    Error,
    /// Raw line read from the MLC process
    Process,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Process => "PROCESS",
        })
    }
}

/// Destination for leveled log lines
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Record one line. Must not panic and must not block for long.
    fn log(&self, level: LogLevel, message: &str);

    /// Record at [`LogLevel::Info`]
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Record at [`LogLevel::Warn`]
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Record at [`LogLevel::Error`]
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Sink that forwards to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    fn emit(level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Process => tracing::trace!(target: "imlc::process", "{message}"),
        }
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        Self::emit(level, message);
    }
}

/// Set of log paths currently owned by a [`FileLogSink`]
///
/// Two sinks appending to the same file would interleave partial lines, so a
/// path can only be held once per registry.
#[derive(Debug, Clone, Default)]
pub struct LogPathRegistry {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl LogPathRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry key for `path`: absolute, without `.` components
    fn key(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// Claim `path`; fails with [`Error::LogPathInUse`] if already held
    pub fn acquire(&self, path: &Path) -> Result<LogPathLease> {
        let key = Self::key(path);
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.clone()) {
            return Err(Error::LogPathInUse {
                path: path.to_path_buf(),
            });
        }
        Ok(LogPathLease {
            path: key,
            registry: self.clone(),
        })
    }

    /// Whether `path` is currently held
    #[must_use]
    pub fn is_held(&self, path: &Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&Self::key(path))
    }

    fn release(&self, path: &Path) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }
}

/// Ownership of one log path; released on drop
#[derive(Debug)]
pub struct LogPathLease {
    path: PathBuf,
    registry: LogPathRegistry,
}

impl LogPathLease {
    /// The leased path, made absolute
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LogPathLease {
    fn drop(&mut self) {
        self.registry.release(&self.path);
    }
}

/// Sink that appends timestamped lines to a file and mirrors them to `tracing`
#[derive(Debug)]
pub struct FileLogSink {
    file: Mutex<File>,
    lease: LogPathLease,
}

impl FileLogSink {
    /// Open (append) `path`, claiming it in `registry` first
    pub fn open(registry: &LogPathRegistry, path: impl AsRef<Path>) -> Result<Self> {
        let lease = registry.acquire(path.as_ref())?;
        // The lease is dropped (and the path released) if opening fails.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(lease.path())?;
        Ok(Self {
            file: Mutex::new(file),
            lease,
        })
    }

    /// Path being written
    #[must_use]
    pub fn path(&self) -> &Path {
        self.lease.path()
    }
}

/// Format one log line the way the log file stores it
#[must_use]
pub fn format_log_line(level: LogLevel, message: &str) -> String {
    format!(
        "[{}] [{level}]: {message}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

impl LogSink for FileLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        TracingSink::emit(level, message);
        let line = format_log_line(level, message);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.lease.path().display(), "failed to write log line: {e}");
        }
    }
}

/// Sink that keeps lines in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl MemoryLogSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded lines
    #[must_use]
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages recorded at `level`
    #[must_use]
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}
