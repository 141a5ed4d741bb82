//! Configuration file support for the clinic scheduler.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/clinic/config.toml`.

use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Scheduling rules configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Minimum separation between two active appointments sharing a
    /// doctor or a room
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: default_buffer_minutes(),
        }
    }
}

impl SchedulingConfig {
    /// Saturates at `Duration::MAX` for values `Config::validate` rejects
    pub fn buffer(&self) -> Duration {
        Duration::try_minutes(self.buffer_minutes).unwrap_or(Duration::MAX)
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("clinic")
}

fn default_buffer_minutes() -> i64 {
    120
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduling.buffer_minutes <= 0 {
            return Err(Error::Config(format!(
                "scheduling.buffer_minutes must be positive, got {}",
                self.scheduling.buffer_minutes
            )));
        }
        if Duration::try_minutes(self.scheduling.buffer_minutes).is_none() {
            return Err(Error::Config(format!(
                "scheduling.buffer_minutes is out of range, got {}",
                self.scheduling.buffer_minutes
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("clinic").join("config.toml")
    }
}
