//! MLC executable location and version

use crate::command::ToolLauncher;
use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::logging::LogSink;
use crate::version::probe_version;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Executable looked up in the working directory when no path is configured
pub const DEFAULT_EXECUTABLE: &str = if cfg!(windows) { "mlc.exe" } else { "mlc" };

/// `DEFAULT_EXECUTABLE` in the current directory
#[must_use]
pub fn default_executable() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(DEFAULT_EXECUTABLE)
}

/// Configured MLC path plus the version detected for it
pub struct ToolContext {
    config: Arc<dyn ConfigStore>,
    launcher: Arc<dyn ToolLauncher>,
    sink: Arc<dyn LogSink>,
    path: RwLock<String>,
    version: RwLock<Option<String>>,
    fallback: PathBuf,
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("path", &self.path())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl ToolContext {
    /// Context using the path held by `config`
    #[must_use]
    pub fn new(
        config: Arc<dyn ConfigStore>,
        launcher: Arc<dyn ToolLauncher>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let path = config.tool_path();
        Self {
            config,
            launcher,
            sink,
            path: RwLock::new(path),
            version: RwLock::new(None),
            fallback: default_executable(),
        }
    }

    /// Replace the executable used when no path is configured
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Configured path; empty when unset
    #[must_use]
    pub fn path(&self) -> String {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached version from the last probe
    #[must_use]
    pub fn version(&self) -> Option<String> {
        self.version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_version(&self, version: Option<String>) {
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = version;
    }

    /// Probe the configured (or fallback) executable and cache its version
    pub fn fetch_version(&self) -> Option<String> {
        let configured = self.path();
        let program = if configured.trim().is_empty() {
            if !self.fallback.is_file() {
                self.set_version(None);
                return None;
            }
            self.fallback.clone()
        } else {
            PathBuf::from(configured.trim())
        };

        let version = probe_version(self.launcher.as_ref(), &program, self.sink.as_ref());
        match version.as_deref() {
            Some(v) => self.sink.info(&format!("Detected MLC version: {v}")),
            None => self.sink.warn(&format!(
                "Could not detect the MLC version of \"{}\"",
                program.display()
            )),
        }
        self.set_version(version.clone());
        version
    }

    /// Resolve the executable for a run
    ///
    /// A blank path adopts the fallback executable when it exists and
    /// persists it; a failure to persist is logged only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if no executable exists at the path.
    pub fn validate(&self) -> Result<PathBuf> {
        let configured = self.path();
        if configured.trim().is_empty() {
            if !self.fallback.is_file() {
                return Err(Error::ToolNotFound {
                    path: self.fallback.clone(),
                });
            }
            let found = self.fallback.display().to_string();
            self.sink.info(&format!("Found {DEFAULT_EXECUTABLE} at: {found}"));
            if let Err(e) = self.config.set_tool_path(&found) {
                self.sink.error(&format!("Failed to save mlcPath to config: {e}"));
            }
            *self.path.write().unwrap_or_else(PoisonError::into_inner) = found;
            return Ok(self.fallback.clone());
        }

        let path = PathBuf::from(configured.trim());
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::ToolNotFound { path })
        }
    }

    /// Point at a new executable, persist it and re-probe its version
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExecutable`] if `path` is not an existing
    /// file, or the store's error if it cannot be saved.
    pub fn set_path(&self, path: &Path) -> Result<Option<String>> {
        if !path.is_file() {
            return Err(Error::InvalidExecutable {
                path: path.to_path_buf(),
            });
        }
        let text = path.display().to_string();
        self.config.set_tool_path(&text)?;
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = text;
        self.sink
            .info(&format!("MLC path set to \"{}\"", path.display()));
        Ok(self.fetch_version())
    }
}
