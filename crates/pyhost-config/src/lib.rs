//! Host configuration for the embedded interpreter
//!
//! Settings are read from TOML: the file named by `PYHOST_CONFIG`, or
//! `<config dir>/pyhost/config.toml`. Only `installation_root` is required.

pub mod install_paths;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PYHOST_CONFIG";

pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = "get-pip.py";
pub const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Root directory of the Python installation
    pub installation_root: PathBuf,

    /// Explicit "MAJOR.MINOR" version; derived from the root path when absent
    #[serde(default)]
    pub python_version: Option<String>,

    /// Script run by the installation's executable to bootstrap pip
    #[serde(default = "default_bootstrap_script")]
    pub bootstrap_script: String,

    #[serde(default = "default_bootstrap_timeout")]
    pub bootstrap_timeout_secs: u64,

    /// Forward the embedded interpreter's `logging` output to the host log file
    #[serde(default)]
    pub log_python: bool,
}

fn default_bootstrap_script() -> String {
    DEFAULT_BOOTSTRAP_SCRIPT.to_string()
}

fn default_bootstrap_timeout() -> u64 {
    DEFAULT_BOOTSTRAP_TIMEOUT_SECS
}

impl HostConfig {
    pub fn new(installation_root: impl Into<PathBuf>) -> Self {
        Self {
            installation_root: installation_root.into(),
            python_version: None,
            bootstrap_script: default_bootstrap_script(),
            bootstrap_timeout_secs: default_bootstrap_timeout(),
            log_python: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.python_version = Some(version.into());
        self
    }

    /// Load from `PYHOST_CONFIG`, or the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let content = match fs::read_to_string(path_ref) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path_ref.to_path_buf()));
            }
            Err(err) => return Err(ConfigError::Io(err)),
        };
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path_ref, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resolve the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR) {
            if !explicit.is_empty() {
                return Ok(PathBuf::from(explicit));
            }
        }
        dirs::config_dir()
            .map(|dir| dir.join("pyhost").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn bootstrap_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.bootstrap_timeout_secs)
    }
}
