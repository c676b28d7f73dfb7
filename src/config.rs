//! Configuration management for Elektra
//!
//! This module handles loading, validation, and management of the adapter
//! configuration from YAML files.

use crate::error::{ElektraError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Charger adapter configuration
    pub charger: ChargerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Charger adapter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerConfig {
    /// Root topic prefix the charger publishes under
    pub topic: String,

    /// Optional root topic prefix of the energy manager controlling
    /// the charger's phase count
    #[serde(default)]
    pub energy_manager: Option<String>,

    /// Read timeout window in milliseconds
    #[serde(default = "ChargerConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ChargerConfig {
    fn default_timeout_ms() -> u64 {
        crate::protocol::TIMEOUT.as_millis() as u64
    }

    /// Read timeout window as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory; console-only when unset
    #[serde(default)]
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            topic: crate::protocol::ROOT_TOPIC.to_string(),
            energy_manager: None,
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from default locations, falling back to defaults
    pub fn load() -> Result<Self> {
        let default_paths = [
            "elektra_config.yaml",
            "/data/elektra_config.yaml",
            "/etc/elektra/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.charger.topic.is_empty() {
            return Err(ElektraError::validation(
                "charger.topic",
                "Topic root cannot be empty",
            ));
        }

        if let Some(em) = &self.charger.energy_manager
            && em.is_empty()
        {
            return Err(ElektraError::validation(
                "charger.energy_manager",
                "Energy manager topic root cannot be empty when set",
            ));
        }

        if self.charger.timeout_ms == 0 {
            return Err(ElektraError::validation(
                "charger.timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.logging.backup_count == 0 {
            return Err(ElektraError::validation(
                "logging.backup_count",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.charger.topic, "warp");
        assert_eq!(config.charger.timeout_ms, 30_000);
        assert!(config.charger.energy_manager.is_none());
        assert!(config.logging.console_output);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Empty topic root
        config.charger.topic = String::new();
        assert!(config.validate().is_err());

        // Reset and test zero timeout
        config = Config::default();
        config.charger.timeout_ms = 0;
        assert!(config.validate().is_err());

        // Present but empty energy manager root
        config = Config::default();
        config.charger.energy_manager = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.charger.energy_manager = Some("warp/em".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.charger.topic, deserialized.charger.topic);
        assert_eq!(
            deserialized.charger.energy_manager.as_deref(),
            Some("warp/em")
        );
    }

    #[test]
    fn test_from_yaml_minimal() {
        let config = Config::from_yaml("charger:\n  topic: garage\nlogging:\n  level: DEBUG\n  backup_count: 3\n  json_format: false\n").unwrap();
        assert_eq!(config.charger.topic, "garage");
        assert_eq!(config.charger.timeout_ms, 30_000);
        assert!(config.logging.console_output);
    }
}
