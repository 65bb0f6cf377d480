//! Application configuration.
//!
//! Loaded from `config.toml` in the platform data directory. Missing files
//! and missing sections fall back to defaults.

use crate::recording::types::{RecorderConfig, RideType};
use crate::sensors::types::SensorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of metrics shown on the live display.
pub const MAX_DISPLAY_METRICS: usize = 3;

/// A metric that can be placed on the live display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMetric {
    Power,
    HeartRate,
    Cadence,
    Speed,
    Time,
}

impl std::fmt::Display for DisplayMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayMetric::Power => write!(f, "Power"),
            DisplayMetric::HeartRate => write!(f, "Heart Rate"),
            DisplayMetric::Cadence => write!(f, "Cadence"),
            DisplayMetric::Speed => write!(f, "Speed"),
            DisplayMetric::Time => write!(f, "Time"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Sensor settings
    pub sensors: SensorSettings,
    /// Recording settings
    pub recording: RecordingSettings,
    /// Live display settings
    pub display: DisplaySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            sensors: SensorSettings::default(),
            recording: RecordingSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.metrics.len() > MAX_DISPLAY_METRICS {
            return Err(ConfigError::Invalid(format!(
                "at most {} display metrics allowed, got {}",
                MAX_DISPLAY_METRICS,
                self.display.metrics.len()
            )));
        }
        let intervals = [
            ("recording.tick_interval_ms", self.recording.tick_interval_ms),
            (
                "recording.live_publish_interval_ms",
                self.recording.live_publish_interval_ms,
            ),
            (
                "sensors.reconnect_interval_secs",
                self.sensors.reconnect_interval_secs,
            ),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        let goal = self.display.goal_distance_m;
        if !(goal.is_finite() && goal >= 0.0) {
            return Err(ConfigError::Invalid(
                "display.goal_distance_m must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory rides are written to.
    pub fn rides_dir(&self) -> PathBuf {
        self.data_dir.join("rides")
    }
}

/// Sensor-related settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Auto-reconnect on an unrequested disconnect
    pub auto_reconnect: bool,
    /// Delay between reconnection attempts in seconds
    pub reconnect_interval_secs: u64,
    /// Give up after this many attempts (unset = until cancelled)
    pub max_reconnect_attempts: Option<u32>,
    /// Discovery timeout in seconds
    pub discovery_timeout_secs: u64,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_interval_secs: 3,
            max_reconnect_attempts: None,
            discovery_timeout_secs: 10,
            connection_timeout_secs: 10,
        }
    }
}

impl SensorSettings {
    pub fn to_sensor_config(&self) -> SensorConfig {
        SensorConfig {
            discovery_timeout_secs: self.discovery_timeout_secs,
            connection_timeout_secs: self.connection_timeout_secs,
            auto_reconnect: self.auto_reconnect,
            reconnect_interval_secs: self.reconnect_interval_secs,
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Recording-related settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Sampling tick in milliseconds
    pub tick_interval_ms: u64,
    /// Delay after ending a ride before a new one may start
    pub settle_delay_ms: u64,
    /// Periodic live metrics publish interval
    pub live_publish_interval_ms: u64,
    /// Keep per-lap records in saved sessions
    pub materialize_laps: bool,
    pub ride_type: RideType,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            settle_delay_ms: 1500,
            live_publish_interval_ms: 2000,
            materialize_laps: true,
            ride_type: RideType::Indoor,
        }
    }
}

impl RecordingSettings {
    pub fn to_recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            materialize_laps: self.materialize_laps,
            ride_type: self.ride_type,
        }
    }

    pub fn live_publish_interval(&self) -> Duration {
        Duration::from_millis(self.live_publish_interval_ms)
    }
}

/// Live display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Distance goal in meters, 0 = no goal
    pub goal_distance_m: f64,
    /// Metrics shown on the live display, in order
    pub metrics: Vec<DisplayMetric>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            goal_distance_m: 0.0,
            metrics: vec![
                DisplayMetric::Power,
                DisplayMetric::HeartRate,
                DisplayMetric::Cadence,
            ],
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "ridelink", "RideLink")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut config = load_config_from(&get_config_path())?;
    config.data_dir = get_data_dir();
    Ok(config)
}

/// Load and validate configuration from a specific file.
///
/// A missing file yields the defaults. `data_dir` is set to the file's
/// parent directory.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let data_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(AppConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.data_dir = data_dir;
    config.validate()?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save application configuration to a specific file.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
