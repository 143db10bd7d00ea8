// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Feed the store from the synthetic fleet
    pub demo_mode: bool,

    /// Disruption thresholds
    pub detection: DetectionConfig,

    /// Timer cadences and query bounds
    pub scheduling: SchedulingConfig,

    /// Alert retention and reporting
    pub alerts: AlertConfig,

    /// Position store configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "TransitSentinel".to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            detection: DetectionConfig::default(),
            scheduling: SchedulingConfig::default(),
            alerts: AlertConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("transit-sentinel"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject nonsensical thresholds before anything is scheduled
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.scheduling.validate()?;
        self.alerts.validate()?;
        Ok(())
    }
}

/// Longest accepted look-back window, one week
pub const MAX_WINDOW_MINUTES: u64 = 7 * 24 * 60;

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositive {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Disruption detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minutes at a stop before a vehicle counts as delayed
    pub stopped_threshold_minutes: u64,

    /// Two vehicles on one route closer than this are bunched
    pub bunching_distance_km: f64,

    /// Routes with fewer active vehicles are under-served
    pub minimum_vehicles_per_route: u32,

    /// Minutes of silence before a vehicle counts as offline
    pub offline_threshold_minutes: u64,

    /// How recent a report must be for a vehicle to count as active
    pub recency_window_minutes: u64,

    /// Offline vehicles must have reported within this window
    pub active_window_minutes: u64,

    /// Upper bound for minute-based severities
    pub severity_cap: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            stopped_threshold_minutes: 5,
            bunching_distance_km: 1.0,
            minimum_vehicles_per_route: 2,
            offline_threshold_minutes: 15,
            recency_window_minutes: 5,
            active_window_minutes: 60,
            severity_cap: 999,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("detection.stopped_threshold_minutes", self.stopped_threshold_minutes)?;
        positive("detection.offline_threshold_minutes", self.offline_threshold_minutes)?;
        positive("detection.recency_window_minutes", self.recency_window_minutes)?;
        positive("detection.active_window_minutes", self.active_window_minutes)?;
        positive(
            "detection.minimum_vehicles_per_route",
            self.minimum_vehicles_per_route as u64,
        )?;
        positive("detection.severity_cap", self.severity_cap as u64)?;

        if !(self.bunching_distance_km.is_finite() && self.bunching_distance_km > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "detection.bunching_distance_km",
                value: self.bunching_distance_km.to_string(),
            });
        }

        if self.active_window_minutes > MAX_WINDOW_MINUTES {
            return Err(ConfigError::OutOfRange {
                field: "detection.active_window_minutes",
                value: self.active_window_minutes.to_string(),
                max: MAX_WINDOW_MINUTES.to_string(),
            });
        }

        if self.active_window_minutes <= self.offline_threshold_minutes {
            return Err(ConfigError::Inconsistent(format!(
                "detection.active_window_minutes ({}) must exceed detection.offline_threshold_minutes ({})",
                self.active_window_minutes, self.offline_threshold_minutes
            )));
        }

        Ok(())
    }
}

/// Timer cadences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Seconds between detection passes
    pub poll_interval_secs: u64,

    /// Seconds between statistics reports
    pub stats_interval_secs: u64,

    /// Upper bound on a single store query
    pub query_timeout_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            stats_interval_secs: 300,
            query_timeout_secs: 10,
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scheduling.poll_interval_secs", self.poll_interval_secs)?;
        positive("scheduling.stats_interval_secs", self.stats_interval_secs)?;
        positive("scheduling.query_timeout_secs", self.query_timeout_secs)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Alert retention and statistics output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Number of most recent alerts retained for inspection
    pub recent_capacity: usize,

    /// Alerts included in each statistics report
    pub report_sample_size: usize,

    /// Rendering of statistics reports
    pub report_format: ReportFormat,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 100,
            report_sample_size: 5,
            report_format: ReportFormat::Text,
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("alerts.recent_capacity", self.recent_capacity as u64)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Text,
    Json,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/positions.db"),
            busy_timeout_ms: 2000,
        }
    }
}
