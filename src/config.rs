//! Configuration management for Hyperion
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{HyperionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote status API configuration
    pub api: ApiConfig,

    /// Polling loop configuration
    pub poll: PollConfig,

    /// Incident lifecycle configuration
    #[serde(default)]
    pub incidents: IncidentsConfig,

    /// Notification scheduling configuration
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Durable key-value storage configuration
    pub storage: StorageConfig,

    /// IANA timezone for trigger-time computation
    pub timezone: String,
}

/// Remote status API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the monitoring API
    pub base_url: String,

    /// Access key id header value
    pub access_key_id: String,

    /// Access key secret header value
    pub access_key_value: String,

    /// User id the session acts for
    pub user_id: String,

    /// Password presented to the token endpoint
    #[serde(default)]
    pub password: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Max retry attempts per request
    pub max_retries: u32,

    /// Base delay between retries in seconds, doubled on each attempt
    pub retry_delay_secs: u64,

    /// Page size for system enumeration
    pub page_size: usize,
}

/// Polling loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between refresh cycles
    pub interval_secs: u64,

    /// Run a refresh immediately on startup
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
}

/// Incident lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentsConfig {
    /// Active-incident TTL in seconds
    pub ttl_secs: u64,

    /// Seconds a pending incident may sit unacknowledged before escalation
    pub escalate_after_secs: u64,

    /// Hours a system must stay faulted before stale-fault reminders start
    pub remind_after_hours: u64,

    /// Minimum hours between stale-fault reminders for the same system
    pub remind_interval_hours: u64,

    /// Max incidents retained in history (oldest evicted first)
    pub history_cap: usize,
}

/// Notification scheduling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Morning check-in trigger time in HH:MM
    pub morning_time: String,

    /// Evening summary trigger time in HH:MM
    pub evening_time: String,

    /// Whether the platform grants notification permission to this host
    pub permission_granted: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level override
    #[serde(default)]
    pub console_level: Option<String>,

    /// Optional file-specific level override
    #[serde(default)]
    pub file_level: Option<String>,

    /// Path to log file
    pub file: String,

    /// Log format (structured or simple)
    pub format: String,

    /// Max log file size in MB
    pub max_file_size_mb: u32,

    /// Number of backup files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Durable key-value storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the JSON state file
    pub state_file: String,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with validation
    pub fn load() -> Result<Self> {
        // Explicit override wins
        if let Ok(path) = std::env::var("HYPERION_CONFIG")
            && !path.is_empty()
        {
            return Self::from_file(path);
        }

        // Try to load from default locations
        let default_paths = [
            "hyperion_config.yaml",
            "/data/hyperion_config.yaml",
            "/etc/hyperion/config.yaml",
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
        if self.api.base_url.is_empty() {
            return Err(HyperionError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        if self.api.page_size == 0 {
            return Err(HyperionError::validation(
                "api.page_size",
                "Must be greater than 0",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(HyperionError::validation(
                "api.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(HyperionError::validation(
                "poll.interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.incidents.ttl_secs == 0 {
            return Err(HyperionError::validation(
                "incidents.ttl_secs",
                "Must be greater than 0",
            ));
        }

        if self.incidents.escalate_after_secs == 0 {
            return Err(HyperionError::validation(
                "incidents.escalate_after_secs",
                "Must be greater than 0",
            ));
        }

        // Escalation must be able to fire while the incident is still active
        if self.incidents.escalate_after_secs >= self.incidents.ttl_secs {
            return Err(HyperionError::validation(
                "incidents.escalate_after_secs",
                "Must be below incidents.ttl_secs",
            ));
        }

        parse_hh_mm(&self.notifications.morning_time)
            .map_err(|_| HyperionError::validation("notifications.morning_time", "Expected HH:MM"))?;
        parse_hh_mm(&self.notifications.evening_time)
            .map_err(|_| HyperionError::validation("notifications.evening_time", "Expected HH:MM"))?;

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(HyperionError::validation(
                "timezone",
                "Unknown IANA timezone",
            ));
        }

        if self.web.port == 0 {
            return Err(HyperionError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if self.storage.state_file.is_empty() {
            return Err(HyperionError::validation(
                "storage.state_file",
                "State file path cannot be empty",
            ));
        }

        Ok(())
    }

    /// Parsed timezone; validated configurations never fail here
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .unwrap_or(chrono_tz::UTC)
    }
}

/// Parse a clock time in HH:MM (24h) form
pub fn parse_hh_mm(value: &str) -> Result<(u32, u32)> {
    let (h, m) = value
        .split_once(':')
        .ok_or_else(|| HyperionError::validation("time", "Expected HH:MM"))?;
    let hour: u32 = h
        .parse()
        .map_err(|_| HyperionError::validation("time", "Invalid hour"))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| HyperionError::validation("time", "Invalid minute"))?;
    if hour > 23 || minute > 59 {
        return Err(HyperionError::validation("time", "Out of range"));
    }
    Ok((hour, minute))
}
