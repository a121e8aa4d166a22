use crate::error::{Result, VaultError};
use crate::models::install::AmbiguityPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per installed voice model
    #[serde(default = "default_model_root")]
    pub model_root: PathBuf,
    /// Scratch directory for downloaded archives
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DownloadConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct InstallConfig {
    #[serde(default)]
    pub on_ambiguous: AmbiguityPolicy,
}

// Default value functions
fn default_model_root() -> PathBuf {
    data_dir().join("models")
}
fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("voicevault")
}
fn default_timeout_secs() -> u64 {
    120
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voicevault")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_root: default_model_root(),
            temp_root: default_temp_root(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            on_ambiguous: AmbiguityPolicy::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            download: DownloadConfig::default(),
            install: InstallConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the user config directory, falling back to defaults
    /// if no file exists. Partial configs are merged with defaults via serde.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Path to the user config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| VaultError::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("voicevault").join("config.toml"))
    }
}
