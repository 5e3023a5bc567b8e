//! Daemon Configuration
//!
//! Configuration management for the remote control daemon: the device
//! name presented to the TV, and where the client identity is stored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default client-facing device name shown on the TV's pairing screen.
const DEFAULT_DEVICE_NAME: &str = "atvremote";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration
    pub device: DeviceConfig,

    /// Storage paths
    pub paths: PathConfig,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name advertised to the TV during pairing, and used as the client
    /// certificate's subject/SAN common name.
    pub name: String,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Configuration directory
    pub config_dir: PathBuf,

    /// Client identity directory (certificate + private key)
    pub identity_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("atvremote");

        let identity_dir = config_dir.join("identity");

        Self {
            device: DeviceConfig {
                name: DEFAULT_DEVICE_NAME.to_string(),
            },
            paths: PathConfig {
                config_dir,
                identity_dir,
            },
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if not found
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("atvremote");

        let config_path = config_dir.join("config.toml");

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir)
            .context("Failed to create config directory")?;

        let config_path = self.paths.config_dir.join("config.toml");
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir)
            .context("Failed to create config directory")?;
        fs::create_dir_all(&self.paths.identity_dir)
            .context("Failed to create identity directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.name, "atvremote");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.device.name, config.device.name);
    }

    #[test]
    fn test_ensure_directories_creates_identity_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.config_dir = temp.path().join("config");
        config.paths.identity_dir = temp.path().join("config").join("identity");
        config.ensure_directories().unwrap();
        assert!(config.paths.identity_dir.exists());
    }
}
