//! Running sums, counts and extremes for an in-progress ride.
//!
//! Everything here is O(1) per tick and owned exclusively by the engine.

use crate::recording::types::{DistanceSource, Lap, MetricSummary};
use crate::telemetry::store::LiveTelemetrySample;
use chrono::{DateTime, Utc};

/// Sum, count, min and max of one metric.
///
/// Zero is treated as "no signal" for the minimum, which therefore covers
/// nonzero values only and stays 0 when none were seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricAccumulator {
    sum: f64,
    count: u32,
    min: Option<f32>,
    max: f32,
}

impl MetricAccumulator {
    /// Count a value.
    pub fn add(&mut self, value: f32) {
        self.sum += value as f64;
        self.count += 1;
        if value > 0.0 {
            self.min = Some(self.min.map_or(value, |m| m.min(value)));
        }
        self.max = self.max.max(value);
    }

    /// Count a value only when it is known (nonzero).
    pub fn add_known(&mut self, value: f32) {
        if value > 0.0 {
            self.add(value);
        }
    }

    /// Average with a count floor of one.
    pub fn average(&self) -> f32 {
        (self.sum / self.count.max(1) as f64) as f32
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn summary(&self) -> MetricSummary {
        MetricSummary {
            min: self.min.unwrap_or(0.0),
            avg: self.average(),
            max: self.max,
        }
    }
}

/// The four live metrics accumulated together.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricSet {
    pub power: MetricAccumulator,
    pub heart_rate: MetricAccumulator,
    pub cadence: MetricAccumulator,
    pub speed: MetricAccumulator,
}

impl MetricSet {
    /// Fold one snapshot in. Heart rate 0 means unknown and is not counted.
    pub fn add(&mut self, sample: &LiveTelemetrySample) {
        self.power.add(sample.power_watts as f32);
        self.heart_rate.add_known(sample.heart_rate_bpm as f32);
        self.cadence.add(sample.cadence_rpm);
        self.speed.add(sample.speed_kmh);
    }
}

/// Session distance with device-source exclusivity.
///
/// The first snapshot carrying a device total distance captures the
/// baseline and latches the device as the source for the rest of the
/// session. Until then, distance is integrated from speed.
///
/// A device total lower than the previous one is a counter reset (trainer
/// power cycle, reconnect, stale value from an earlier ride). Distance
/// covered so far is folded into an offset and the baseline is recaptured,
/// so session distance never goes backwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceTracker {
    baseline_m: Option<u32>,
    last_total_m: u32,
    offset_m: u64,
    device_latched: bool,
    distance_m: f64,
}

impl DistanceTracker {
    /// Advance by one tick of `tick_secs` seconds.
    pub fn update(&mut self, sample: &LiveTelemetrySample, tick_secs: f64) -> f64 {
        if let Some(total) = sample.total_distance_m {
            let baseline = match self.baseline_m {
                Some(baseline) if total < self.last_total_m => {
                    self.offset_m += u64::from(self.last_total_m.saturating_sub(baseline));
                    tracing::debug!(
                        "Device distance reset from {} m to {} m",
                        self.last_total_m,
                        total
                    );
                    self.baseline_m = Some(total);
                    total
                }
                Some(baseline) => baseline,
                None => *self.baseline_m.insert(total),
            };
            self.last_total_m = total;
            self.device_latched = true;
            self.distance_m = (self.offset_m + u64::from(total - baseline)) as f64;
        } else if !self.device_latched {
            self.distance_m += sample.speed_kmh as f64 / 3.6 * tick_secs;
        }
        self.distance_m
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn source(&self) -> DistanceSource {
        if self.device_latched {
            DistanceSource::Device
        } else {
            DistanceSource::SpeedIntegration
        }
    }
}

/// Whole-session accumulator, reset at every ride start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionAccumulator {
    pub metrics: MetricSet,
    pub distance: DistanceTracker,
    pub tick_count: u32,
}

impl SessionAccumulator {
    pub fn add(&mut self, sample: &LiveTelemetrySample, tick_secs: f64) {
        self.metrics.add(sample);
        self.distance.update(sample, tick_secs);
        self.tick_count += 1;
    }
}

/// Accumulator for the lap currently open.
#[derive(Debug, Clone, Copy)]
pub struct LapAccumulator {
    pub lap_number: u32,
    started_at: DateTime<Utc>,
    start_elapsed_secs: i64,
    start_distance_m: f64,
    metrics: MetricSet,
}

impl LapAccumulator {
    pub fn new(
        lap_number: u32,
        started_at: DateTime<Utc>,
        elapsed_secs: i64,
        distance_m: f64,
    ) -> Self {
        Self {
            lap_number,
            started_at,
            start_elapsed_secs: elapsed_secs,
            start_distance_m: distance_m,
            metrics: MetricSet::default(),
        }
    }

    pub fn add(&mut self, sample: &LiveTelemetrySample) {
        self.metrics.add(sample);
    }

    /// Close this lap into a record.
    pub fn close(&self, ended_at: DateTime<Utc>, elapsed_secs: i64, distance_m: f64) -> Lap {
        Lap {
            lap_number: self.lap_number,
            started_at: self.started_at,
            ended_at,
            duration_seconds: (elapsed_secs - self.start_elapsed_secs).max(0) as u32,
            distance_meters: (distance_m - self.start_distance_m).max(0.0),
            avg_power: self.metrics.power.average(),
            avg_heart_rate: self.metrics.heart_rate.average(),
            avg_cadence: self.metrics.cadence.average(),
            avg_speed: self.metrics.speed.average(),
        }
    }
}
