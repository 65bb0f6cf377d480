//! Live metrics projection pushed to presentation collaborators.

use crate::recording::types::RideState;
use crate::sensors::types::ConnectionState;
use crate::storage::config::DisplayMetric;
use crate::telemetry::store::LiveTelemetrySample;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Glanceable view of the current ride.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    /// Instantaneous power in watts
    pub power_watts: u16,
    /// Heart rate in bpm, 0 = unknown
    pub heart_rate_bpm: u16,
    /// Cadence in rpm
    pub cadence_rpm: f32,
    /// Speed in km/h
    pub speed_kmh: f32,
    /// Pause-excluded elapsed time in seconds
    pub elapsed_seconds: u64,
    /// Session distance in meters
    pub distance_m: f64,
    /// Distance goal in meters, 0 = no goal
    pub goal_distance_m: f64,
    pub connection_state: ConnectionState,
    pub ride_state: RideState,
    /// Lap currently open, if riding
    pub current_lap: Option<u32>,
    pub distance_km: f64,
    pub goal_km: f64,
    /// Fraction of the goal covered, clamped to [0, 1]
    pub progress: f64,
    pub has_goal: bool,
}

/// Inputs to a [`LiveMetrics`] projection besides the telemetry sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct RideProgress {
    pub elapsed: Duration,
    pub distance_m: f64,
    pub goal_distance_m: f64,
    pub connection_state: ConnectionState,
    pub ride_state: RideState,
    pub current_lap: Option<u32>,
}

impl LiveMetrics {
    pub fn project(sample: &LiveTelemetrySample, progress: RideProgress) -> Self {
        let has_goal = progress.goal_distance_m > 0.0;
        let fraction = if has_goal {
            (progress.distance_m / progress.goal_distance_m).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            power_watts: sample.power_watts,
            heart_rate_bpm: sample.heart_rate_bpm,
            cadence_rpm: sample.cadence_rpm,
            speed_kmh: sample.speed_kmh,
            elapsed_seconds: progress.elapsed.as_secs(),
            distance_m: progress.distance_m,
            goal_distance_m: progress.goal_distance_m,
            connection_state: progress.connection_state,
            ride_state: progress.ride_state,
            current_lap: progress.current_lap,
            distance_km: progress.distance_m / 1000.0,
            goal_km: progress.goal_distance_m / 1000.0,
            progress: fraction,
            has_goal,
        }
    }

    /// Elapsed time as `H:MM:SS`.
    pub fn elapsed_display(&self) -> String {
        let secs = self.elapsed_seconds;
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// One display metric with its unit.
    pub fn format_metric(&self, metric: DisplayMetric) -> String {
        match metric {
            DisplayMetric::Power => format!("{} W", self.power_watts),
            DisplayMetric::HeartRate if self.heart_rate_bpm == 0 => "-- bpm".to_string(),
            DisplayMetric::HeartRate => format!("{} bpm", self.heart_rate_bpm),
            DisplayMetric::Cadence => format!("{:.0} rpm", self.cadence_rpm),
            DisplayMetric::Speed => format!("{:.1} km/h", self.speed_kmh),
            DisplayMetric::Time => self.elapsed_display(),
        }
    }
}
