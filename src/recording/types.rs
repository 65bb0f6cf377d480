//! Recording types for ride sessions.
//!
//! `RideSession` is the finished aggregate handed to persistence; the
//! engine builds it once at the end of a ride and nothing but the attached
//! report text changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of the ride session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideState {
    /// Ready for a new ride
    #[default]
    Idle,
    /// Sampling at the tick rate
    Riding,
    /// Ticks suspended, pause time accumulating
    Paused,
    /// Session finalized, waiting for the settle delay
    Ended,
}

impl std::fmt::Display for RideState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RideState::Idle => write!(f, "Idle"),
            RideState::Riding => write!(f, "Riding"),
            RideState::Paused => write!(f, "Paused"),
            RideState::Ended => write!(f, "Ended"),
        }
    }
}

/// Kind of ride, carried through to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideType {
    #[default]
    Indoor,
    Outdoor,
}

/// Where the session distance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSource {
    /// Integrated from speed once per tick
    #[default]
    SpeedIntegration,
    /// Device-reported absolute distance minus the session baseline
    Device,
}

/// Where the session energy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySource {
    /// Device-reported total energy
    Device,
    /// Average power x hours x 3.6
    #[default]
    Estimated,
}

/// One sampled second of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Wall-clock time of the tick
    pub timestamp: DateTime<Utc>,
    /// Pause-excluded seconds since ride start
    pub elapsed_seconds: u32,
    /// Instantaneous power in watts
    pub power_watts: u16,
    /// Heart rate in BPM, 0 = unknown
    pub heart_rate_bpm: u16,
    /// Cadence in RPM
    pub cadence_rpm: f32,
    /// Speed in km/h
    pub speed_kmh: f32,
}

/// Minimum, average and maximum of one metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f32,
    pub avg: f32,
    pub max: f32,
}

/// A closed lap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    /// 1-based lap number
    pub lap_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Pause-excluded lap duration
    pub duration_seconds: u32,
    /// Distance covered during the lap in meters
    pub distance_meters: f64,
    pub avg_power: f32,
    pub avg_heart_rate: f32,
    pub avg_cadence: f32,
    pub avg_speed: f32,
}

/// A finished ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSession {
    /// Unique identifier
    pub id: Uuid,
    /// Ride start timestamp
    pub started_at: DateTime<Utc>,
    /// Ride end timestamp
    pub ended_at: DateTime<Utc>,
    pub ride_type: RideType,
    pub power: MetricSummary,
    pub heart_rate: MetricSummary,
    pub cadence: MetricSummary,
    pub speed: MetricSummary,
    /// Total distance in meters
    pub distance_meters: f64,
    pub distance_source: DistanceSource,
    /// Active riding time in seconds
    pub duration_seconds: u32,
    /// Total energy in kcal
    pub energy_kcal: f64,
    pub energy_source: EnergySource,
    /// Times every sensor was lost during the ride
    pub dropout_count: u32,
    /// One point per tick
    pub samples: Vec<TimeSeriesPoint>,
    /// Closed laps (empty when lap records are disabled)
    pub laps: Vec<Lap>,
    /// Rendered ride report, attached after finalization
    pub report: Option<String>,
}

impl RideSession {
    /// Attach the rendered report text.
    pub fn attach_report(&mut self, text: String) {
        self.report = Some(text);
    }
}

/// Shortest tick interval the engine accepts; shorter values are raised.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the ride session engine.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Time between ticks
    pub tick_interval: Duration,
    /// Delay between `end` and the return to `Idle`
    pub settle_delay: Duration,
    /// Close laps into `Lap` records on split and at ride end
    pub materialize_laps: bool,
    pub ride_type: RideType,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            settle_delay: Duration::from_millis(1500),
            materialize_laps: true,
            ride_type: RideType::Indoor,
        }
    }
}

/// Errors from the ride session engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    /// A ride is already in progress or has not settled yet
    #[error("Cannot start a ride while {0}")]
    NotIdle(RideState),

    /// Operation needs an active ride
    #[error("Not currently riding (state: {0})")]
    NotRiding(RideState),

    /// Resume needs a paused ride
    #[error("Ride is not paused (state: {0})")]
    NotPaused(RideState),

    /// Reset needs an ended ride
    #[error("Ride has not ended (state: {0})")]
    NotEnded(RideState),
}
