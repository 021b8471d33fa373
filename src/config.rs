//! Configuration management for the wallbox client
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The polling section mirrors the options a
//! host application exposes to its users (scan interval, category allowlist,
//! rotation size, inter-category delay).

use crate::api;
use crate::error::{Result, WallboxError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

fn default_username() -> String {
    "admin".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Wallbox connection and credentials
    pub device: DeviceConfig,

    /// Poll scheduling options
    #[serde(default)]
    pub polling: PollingConfig,

    /// Login rate limiting and timeouts
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wallbox connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host name or IP address of the wallbox
    pub host: String,

    /// Friendly name; derived from the device identity when empty
    #[serde(default)]
    pub name: String,

    /// API user
    #[serde(default = "default_username")]
    pub username: String,

    /// API password
    #[serde(default)]
    pub password: String,

    /// Session display name used when no friendly name is known
    #[serde(default)]
    pub display_name: String,
}

/// Poll scheduling options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between scheduled update cycles
    pub scan_interval_secs: u64,

    /// Timeout applied to each individual HTTP request
    pub request_timeout_secs: u64,

    /// Timeout for a whole update cycle
    pub cycle_timeout_secs: u64,

    /// Timeout for the first cycle, which also loads the static categories
    pub bootstrap_timeout_secs: u64,

    /// Categories refreshed by rotation; everything else is loaded once
    pub categories: Vec<String>,

    /// Number of rotating categories fetched per cycle
    pub categories_per_cycle: usize,

    /// Pause between two category fetches, in seconds (0..=5)
    pub category_fetch_delay_secs: f64,

    /// Fetch the device log every N cycles
    pub log_every_cycles: u32,

    /// Fetch the transaction log every N cycles
    pub transactions_every_cycles: u32,
}

/// Login rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Max login attempts inside the sliding window
    pub login_max_attempts: usize,

    /// Sliding window length in seconds
    pub login_window_secs: u64,

    /// Timeout for the proactive login at the start of a cycle
    pub login_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl PollingConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    /// Inter-category pause, held to 0..=5 s even for unvalidated options
    pub fn category_fetch_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.category_fetch_delay_secs.clamp(0.0, 5.0))
            .unwrap_or(Duration::ZERO)
    }

    /// Allowlisted categories that take part in rotation (logs and
    /// transactions run on their own schedule)
    pub fn rotating_categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|c| !api::is_stream_category(c))
            .cloned()
            .collect()
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Check the polling options on their own, as a host hands them in at runtime
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(WallboxError::validation(
                "self.scan_interval_secs",
                "Must be greater than 0",
            ));
        }
        if self.request_timeout_secs == 0
            || self.cycle_timeout_secs == 0
            || self.bootstrap_timeout_secs == 0
        {
            return Err(WallboxError::validation(
                "self.timeouts",
                "Timeouts must be greater than 0",
            ));
        }
        if let Some(unknown) = self
            .categories
            .iter()
            .find(|c| !api::CATEGORIES.contains(&c.as_str()))
        {
            return Err(WallboxError::validation(
                "self.categories".to_string(),
                format!("Unknown category '{}'", unknown),
            ));
        }
        if self.categories_per_cycle == 0 {
            return Err(WallboxError::validation(
                "self.categories_per_cycle",
                "Must be at least 1",
            ));
        }
        if !(0.0..=5.0).contains(&self.category_fetch_delay_secs) {
            return Err(WallboxError::validation(
                "self.category_fetch_delay_secs",
                "Must be between 0 and 5 seconds",
            ));
        }
        if self.log_every_cycles == 0 || self.transactions_every_cycles == 0 {
            return Err(WallboxError::validation(
                "self.every_cycles",
                "Cycle multipliers must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl SessionConfig {
    pub fn login_window(&self) -> Duration {
        Duration::from_secs(self.login_window_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.login_max_attempts == 0 {
            return Err(WallboxError::validation(
                "session.login_max_attempts",
                "Must be at least 1",
            ));
        }
        if self.login_window_secs == 0 {
            return Err(WallboxError::validation(
                "session.login_window_secs",
                "Must be greater than 0",
            ));
        }
        if self.login_timeout_secs == 0 {
            return Err(WallboxError::validation(
                "session.login_timeout_secs",
                "Must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "alfen_wallbox.yaml",
            "/data/alfen_wallbox.yaml",
            "/etc/alfen-wallbox/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
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
        if self.device.host.trim().is_empty() {
            return Err(WallboxError::validation(
                "device.host",
                "Host cannot be empty",
            ));
        }

        self.polling.validate()?;
        self.session.validate()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
