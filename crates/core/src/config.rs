//! Rollcall Configuration
//!
//! This module defines the configuration structures with defaults expressed
//! through serde attributes, plus loading and validation.

use crate::error::RollcallError;
use crate::timetable::parse_clock_minute;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// Default listener host (all interfaces, agents run on other machines)
pub const DEFAULT_LISTENER_HOST: &str = "0.0.0.0";
/// Default listener port
pub const DEFAULT_LISTENER_PORT: u16 = 12000;
/// Default schedule poll cadence (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
/// Default end-of-day cutoff
pub const DEFAULT_DAY_END: &str = "17:00";

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_rollcall_dir() -> PathBuf {
    home_dir().join(".rollcall")
}

// ============================================================================
// Main Config
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telemetry listener configuration
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Period state machine configuration
    #[serde(default)]
    pub period: PeriodConfig,
    /// Database and report locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Roster file (YAML list of `{id, name}`)
    pub roster_path: PathBuf,
    /// Timetable file (YAML list of `{day, start, end, label, break}`)
    pub timetable_path: PathBuf,
    /// Location labels that count as authorized during class time
    #[serde(default)]
    pub safe_zones: Vec<String>,
}

// ============================================================================
// Listener Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "ListenerConfig::default_host")]
    pub host: String,
    #[serde(default = "ListenerConfig::default_port")]
    pub port: u16,
}

impl ListenerConfig {
    fn default_host() -> String {
        DEFAULT_LISTENER_HOST.to_string()
    }
    fn default_port() -> u16 {
        DEFAULT_LISTENER_PORT
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LISTENER_HOST.to_string(),
            port: DEFAULT_LISTENER_PORT,
        }
    }
}

// ============================================================================
// Period Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodConfig {
    /// Seconds between schedule polls
    #[serde(default = "PeriodConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// End-of-day cutoff as `HH:MM`; at or after it the day is closed
    #[serde(default = "PeriodConfig::default_day_end")]
    pub day_end: String,
}

impl PeriodConfig {
    fn default_poll_interval_secs() -> u64 {
        DEFAULT_POLL_INTERVAL_SECS
    }
    fn default_day_end() -> String {
        DEFAULT_DAY_END.to_string()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cutoff(&self) -> Result<NaiveTime, RollcallError> {
        let minute = parse_clock_minute(&self.day_end)
            .map_err(|e| RollcallError::config_invalid("period.day_end", e.to_string()))?;
        // 24:00 has no NaiveTime; treat it as the last representable minute.
        let minute = minute.min(24 * 60 - 1) as u32;
        NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
            .ok_or_else(|| RollcallError::config_invalid("period.day_end", "out of range"))
    }
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            day_end: DEFAULT_DAY_END.to_string(),
        }
    }
}

// ============================================================================
// Storage Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding the live and history tables
    #[serde(default = "StorageConfig::default_db_path")]
    pub db_path: PathBuf,
    /// Directory for per-period report files
    #[serde(default = "StorageConfig::default_report_dir")]
    pub report_dir: PathBuf,
}

impl StorageConfig {
    fn default_db_path() -> PathBuf {
        default_rollcall_dir().join("rollcall.db")
    }
    fn default_report_dir() -> PathBuf {
        default_rollcall_dir().join("reports")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
            report_dir: Self::default_report_dir(),
        }
    }
}

// ============================================================================
// Config Loading and Validation
// ============================================================================

/// Configuration loader with validation
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file or default locations. Relative roster and
    /// timetable paths are resolved against the config file's directory.
    pub fn load(path: Option<&Path>) -> Result<Config, RollcallError> {
        let config_path = Self::resolve_config_path(path)?;
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| RollcallError::config_parse_error(format!("Failed to read: {}", e)))?;
        let mut config: Config = serde_yml::from_str(&content)
            .map_err(|e| RollcallError::config_parse_error(format!("Failed to parse: {}", e)))?;

        if let Some(base) = config_path.parent() {
            config.roster_path = resolve_against(base, &config.roster_path);
            config.timetable_path = resolve_against(base, &config.timetable_path);
        }

        ConfigValidator::validate(&config)?;
        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf, RollcallError> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(RollcallError::config_not_found(p.display().to_string()));
            }
            return Ok(p.to_path_buf());
        }

        let default_paths = [
            default_rollcall_dir().join("config.yaml"),
            PathBuf::from("./rollcall.yaml"),
        ];

        default_paths
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                RollcallError::config_not_found(
                    "Config not found. Run `rollcall config-sample` or create ~/.rollcall/config.yaml",
                )
            })
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<(), RollcallError> {
        if config.period.poll_interval_secs == 0 {
            return Err(RollcallError::config_invalid(
                "period.poll_interval_secs",
                "must be positive",
            ));
        }

        config.period.cutoff()?;

        if config.safe_zones.is_empty() {
            tracing::warn!("No safe zones configured; every sighting will be an anomaly");
        }

        Ok(())
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, RollcallError> {
        ConfigLoader::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), RollcallError> {
        let content = serde_yml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        Config {
            listener: ListenerConfig::default(),
            period: PeriodConfig::default(),
            storage: StorageConfig::default(),
            roster_path: PathBuf::from("roster.yaml"),
            timetable_path: PathBuf::from("timetable.yaml"),
            safe_zones: vec!["Room1".to_string(), "Lab".to_string()],
        }
    }
}
