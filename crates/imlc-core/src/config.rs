//! Persistent settings
//!
//! The only persisted setting is the MLC executable path. The YAML store
//! treats a missing file as defaults and never writes blank values.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Default file name for [`YamlConfigStore`]
pub const DEFAULT_CONFIG_FILE: &str = "imlc.yaml";

/// Source and sink of the configured MLC path
pub trait ConfigStore: Send + Sync + fmt::Debug {
    /// Configured MLC path; empty when unset
    fn tool_path(&self) -> String;

    /// Persist a new MLC path
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set_tool_path(&self, path: &str) -> Result<()>;
}

/// On-disk settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// MLC executable path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mlc_path: String,
}

impl ToolConfig {
    /// Parse from YAML
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// YAML file backed store
#[derive(Debug)]
pub struct YamlConfigStore {
    path: PathBuf,
    config: Mutex<ToolConfig>,
}

impl YamlConfigStore {
    /// Load `path`; a missing file yields defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => ToolConfig::from_yaml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ToolConfig::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            config: Mutex::new(config),
        })
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for YamlConfigStore {
    fn tool_path(&self) -> String {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mlc_path
            .clone()
    }

    fn set_tool_path(&self, path: &str) -> Result<()> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = config.clone();
        updated.mlc_path = path.trim().to_string();
        std::fs::write(&self.path, updated.to_yaml()?)?;
        *config = updated;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    path: Mutex<String>,
}

impl MemoryConfigStore {
    /// Store holding `path`
    #[must_use]
    pub fn with_tool_path(path: impl Into<String>) -> Self {
        Self {
            path: Mutex::new(path.into()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn tool_path(&self) -> String {
        self.path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_tool_path(&self, path: &str) -> Result<()> {
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = path.trim().to_string();
        Ok(())
    }
}
