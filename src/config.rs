//! Configuration for herbal-compliance

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("herbal-compliance")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the ledger database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Alert threshold (percent) for limits created without one
    #[serde(default = "default_alert_threshold")]
    pub default_alert_threshold: f64,

    /// Reject batch status changes outside the forward processing order
    #[serde(default)]
    pub strict_batch_transitions: bool,

    /// Buffered events per subscriber before lagging
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_alert_threshold() -> f64 {
    80.0
}

fn default_event_bus_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            default_alert_threshold: default_alert_threshold(),
            strict_batch_transitions: false,
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Sled ledger path
    pub fn ledger_path(&self) -> PathBuf {
        self.storage_dir.join("ledger.sled")
    }

    /// Config file written on first run
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
