//! Sensor types and enums for BLE fitness sensors.
//!
//! Connection states, sensor classification, transport events and the
//! errors raised by the radio side of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque identity of a peripheral as reported by the radio transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(pub String);

impl PeripheralId {
    /// Create a peripheral id from any string-like transport identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw transport identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Type of fitness sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Smart trainer with FTMS support
    Trainer,
    /// Standalone power meter
    PowerMeter,
    /// Heart rate monitor
    HeartRate,
    /// Combined speed/cadence sensor
    SpeedCadence,
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Trainer => write!(f, "Smart Trainer"),
            SensorType::PowerMeter => write!(f, "Power Meter"),
            SensorType::HeartRate => write!(f, "Heart Rate"),
            SensorType::SpeedCadence => write!(f, "Speed/Cadence"),
        }
    }
}

/// BLE communication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// BLE Fitness Machine Service (0x1826)
    BleFtms,
    /// BLE Cycling Power Service (0x1818)
    BleCyclingPower,
    /// BLE Heart Rate Service (0x180D)
    BleHeartRate,
    /// BLE Cycling Speed and Cadence (0x1816)
    BleCsc,
}

impl Protocol {
    /// The sensor class a peripheral advertising this protocol belongs to.
    pub fn sensor_type(&self) -> SensorType {
        match self {
            Protocol::BleFtms => SensorType::Trainer,
            Protocol::BleCyclingPower => SensorType::PowerMeter,
            Protocol::BleHeartRate => SensorType::HeartRate,
            Protocol::BleCsc => SensorType::SpeedCadence,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::BleFtms => write!(f, "FTMS"),
            Protocol::BleCyclingPower => write!(f, "Cycling Power"),
            Protocol::BleHeartRate => write!(f, "Heart Rate"),
            Protocol::BleCsc => write!(f, "Cycling Speed/Cadence"),
        }
    }
}

/// Connection state of a sensor, or of the sensor set as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Active connection
    Connected,
    /// Disconnect requested, waiting for the transport to confirm
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnecting => write!(f, "Disconnecting..."),
        }
    }
}

/// A sensor discovered during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredSensor {
    /// Transport identity
    pub peripheral: PeripheralId,
    /// User-friendly name (from BLE advertisement)
    pub name: String,
    /// Detected sensor type
    pub sensor_type: SensorType,
    /// Communication protocol
    pub protocol: Protocol,
    /// Signal strength (RSSI)
    pub signal_strength: Option<i16>,
}

/// Events delivered by the radio transport into the ride hub.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// A characteristic notification or read result arrived
    Frame {
        peripheral: PeripheralId,
        characteristic: uuid::Uuid,
        data: Vec<u8>,
    },
    /// The transport finished connecting to a peripheral
    Connected(PeripheralId),
    /// A connection attempt failed before completing
    ConnectFailed {
        peripheral: PeripheralId,
        error: String,
    },
    /// A peripheral disconnected; `error` is set when the disconnect was not requested
    Disconnected {
        peripheral: PeripheralId,
        error: Option<String>,
    },
    /// A new sensor was discovered during scanning
    Discovered(DiscoveredSensor),
}

/// Configuration for the sensor side of the pipeline.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Timeout for discovery scan in seconds
    pub discovery_timeout_secs: u64,
    /// Timeout for connection attempt in seconds
    pub connection_timeout_secs: u64,
    /// Whether to auto-reconnect on an unrequested disconnect
    pub auto_reconnect: bool,
    /// Flat delay between reconnection attempts in seconds
    pub reconnect_interval_secs: u64,
    /// Give up after this many attempts; `None` retries until cancelled
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 10,
            connection_timeout_secs: 10,
            auto_reconnect: true,
            reconnect_interval_secs: 3,
            max_reconnect_attempts: None,
        }
    }
}

/// Errors that can occur in the sensor system.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start BLE scanning
    #[error("Failed to start scanning: {0}")]
    ScanFailed(String),

    /// Sensor not found with given peripheral id
    #[error("Sensor not found: {0}")]
    SensorNotFound(PeripheralId),

    /// Connection to sensor failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Failed to subscribe to sensor notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}

/// Reasons a received frame is dropped without touching live telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer shorter than the fields its own flags require
    #[error("{characteristic} frame too short: need {needed} bytes, got {actual}")]
    TooShort {
        characteristic: &'static str,
        needed: usize,
        actual: usize,
    },

    /// Characteristic identity the decoder does not handle
    #[error("Unknown characteristic: {0}")]
    UnknownCharacteristic(uuid::Uuid),

    /// Device information string was not valid UTF-8
    #[error("Invalid UTF-8 in device information string")]
    InvalidUtf8,
}

impl FrameError {
    /// Length check shared by all decoders.
    pub fn ensure_len(
        characteristic: &'static str,
        data: &[u8],
        needed: usize,
    ) -> Result<(), FrameError> {
        if data.len() < needed {
            Err(FrameError::TooShort {
                characteristic,
                needed,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}
