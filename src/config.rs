// src/config.rs
//! Configuration management

use crate::error::{Result, GpsError};
use crate::gps::nmea::CommitPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MAX_STANDBY_GRACE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub serial_port: Option<String>,
    pub serial_baudrate: u32,
    pub commit_policy: CommitPolicy,
    /// Seconds a pending standby waits on a silent link
    pub standby_grace_secs: u64,
    pub poll_interval_ms: u64,
    pub receive_queue_capacity: usize,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            serial_baudrate: 9600,
            commit_policy: CommitPolicy::default(),
            standby_grace_secs: 5,
            poll_interval_ms: 50,
            receive_queue_capacity: 4096,
        }
    }
}

impl GpsConfig {
    /// Load configuration from the config file, or defaults if there is none
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(config_path)?;
        let config: Self = serde_json::from_str(&contents)?;

        Ok(config)
    }

    /// Save configuration to the config file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| GpsError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("mt3339-gps").join("config.json"))
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.serial_port = Some(port);
        self.serial_baudrate = baudrate;
    }

    /// Require RMC/GGA agreement with at least `min_satellites`
    pub fn use_quorum(&mut self, min_satellites: u8) {
        self.commit_policy = CommitPolicy::Quorum { min_satellites };
    }

    /// Commit on RMC alone, tracking date and time only
    pub fn use_time_only(&mut self) {
        self.commit_policy = CommitPolicy::TimeOnly;
    }

    /// Grace window, capped at one day
    pub fn standby_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.standby_grace_secs.min(MAX_STANDBY_GRACE_SECS) as i64)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
