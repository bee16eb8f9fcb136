use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Configuration for one tag store instance.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub backend: Backend,
    pub path: String,
    /// Override the database flush interval; small values speed up tests.
    #[serde(default)]
    pub flush_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Fs,
    S3,
    Memory,
    Url,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl StoreConfig {
    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&data)?;
        Ok(cfg)
    }
}
