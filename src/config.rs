//! Configuration: built-in defaults, optionally overridden by a TOML file,
//! then by command-line flags / environment variables (see `cli`).

use crate::dump::DEFAULT_MESSAGES_PER_SECOND;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 10031;
pub const DEFAULT_DATASET: &str = "Default";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Gateway host to connect to
    pub host: String,
    /// Gateway port
    pub port: u16,
    /// Dataset to dump
    pub dataset: String,
    /// Requested dump rate, forwarded to the cluster
    pub messages_per_second: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dataset: DEFAULT_DATASET.to_string(),
            messages_per_second: DEFAULT_MESSAGES_PER_SECOND,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/drndump/config.toml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("drndump").join("config.toml"))
    }

    /// Load from an explicit path, or from the default path if it exists.
    /// An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Requested rate, never below one message per second.
    pub fn effective_messages_per_second(&self) -> u32 {
        self.messages_per_second.max(1)
    }
}
