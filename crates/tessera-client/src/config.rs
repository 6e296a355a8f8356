//! Configuration management for the tessera client
//!
//! Settings live in `<home>/config.toml`. The home directory defaults to
//! `~/.tessera` and can be overridden per invocation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tessera_store::StorageConfig;
use tessera_types::Network;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error:: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parsing error:: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("toml serialization error:: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid value for {key}:: {value}")]
    InvalidValue { key: String, value: String },

    #[error("unknown configuration key:: {0}")]
    UnknownKey(String),
}

/// Where owner keys are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyringBackend {
    /// Encrypted files under `<home>/keyring`
    #[default]
    File,
    /// Process memory only
    Memory,
}

impl std::str::FromStr for KeyringBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(KeyringBackend::File),
            "memory" => Ok(KeyringBackend::Memory),
            other => Err(other.to_string()),
        }
    }
}

/// Command output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(other.to_string()),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Network account references are encoded for
    pub network: Network,
    /// Script address holding locked outputs
    pub custody_address: String,
    pub keyring_backend: KeyringBackend,
    /// `tracing` filter directive
    pub log_level: String,
    pub output: OutputFormat,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            custody_address: "addr_test1wtesseracustody".to_string(),
            keyring_backend: KeyringBackend::File,
            log_level: "warn".to_string(),
            output: OutputFormat::Text,
            storage: StorageConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get default home directory
    pub fn default_home() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(".tessera")
        } else {
            PathBuf::from(".tessera")
        }
    }

    /// Configuration file inside a home directory
    pub fn config_file(home: &Path) -> PathBuf {
        home.join("config.toml")
    }

    /// Keyring directory inside a home directory
    pub fn keyring_dir(home: &Path) -> PathBuf {
        home.join("keyring")
    }

    /// Load configuration from `home` or fall back to defaults
    pub fn load_or_default(home: &Path) -> Result<Self, ConfigError> {
        let config_path = Self::config_file(home);

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Initialize the home directory and its configuration file
    ///
    /// An existing file is kept unless `overwrite` is set.
    pub fn init(home: &Path, overwrite: bool) -> Result<Self, ConfigError> {
        let config_file = Self::config_file(home);

        fs::create_dir_all(home)?;

        if config_file.exists() && !overwrite {
            return Self::load_from_file(config_file);
        }

        let config = Self::default();
        config.save_to_file(config_file)?;
        Ok(config)
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "network" => self.network = value.parse().map_err(|_| invalid())?,
            "custody_address" => {
                if value.trim().is_empty() {
                    return Err(invalid());
                }
                self.custody_address = value.trim().to_string();
            }
            "keyring_backend" => self.keyring_backend = value.parse().map_err(|_| invalid())?,
            "log_level" => self.log_level = value.to_string(),
            "output" => self.output = value.parse().map_err(|_| invalid())?,
            "storage.cache_size" => {
                self.storage.cache_size = Some(value.parse().map_err(|_| invalid())?)
            }
            "storage.max_open_files" => {
                self.storage.max_open_files = Some(value.parse().map_err(|_| invalid())?)
            }
            "storage.compression" => self.storage.compression = Some(value.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}
