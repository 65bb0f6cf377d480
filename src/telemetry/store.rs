//! Live telemetry store: last known value per measurement.
//!
//! Frames are merged as sparse patches. A field the frame does not carry
//! keeps its previous value indefinitely; nothing is reset to zero
//! implicitly. The store is owned by the ride hub and only ever touched from
//! its event loop, so a patch is applied as one step and readers always see
//! whole samples.

use crate::sensors::device_info::{MachineStatus, SupportedRange, TrainingStatus};
use crate::sensors::gatt::{DeviceInfoField, RangeKind};
use crate::sensors::types::PeripheralId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Snapshot of the most recent value of every live measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveTelemetrySample {
    /// Instantaneous power in watts
    pub power_watts: u16,
    /// Heart rate in bpm, 0 = unknown
    pub heart_rate_bpm: u16,
    /// Cadence in rpm
    pub cadence_rpm: f32,
    /// Speed in km/h
    pub speed_kmh: f32,
    /// Device-reported absolute distance in meters
    pub total_distance_m: Option<u32>,
    /// Device-reported average power
    pub avg_power_watts: Option<u16>,
    /// Device-reported average speed in km/h
    pub avg_speed_kmh: Option<f32>,
    /// Device-reported average cadence in rpm
    pub avg_cadence_rpm: Option<f32>,
    /// Trainer resistance level in raw device units
    pub resistance_level: i16,
    /// Device-reported total energy in kcal
    pub total_energy_kcal: Option<u16>,
    /// Device-reported energy rate in kcal/h
    pub energy_per_hour_kcal: Option<u16>,
    /// Device-reported energy rate in kcal/min
    pub energy_per_minute_kcal: Option<u8>,
    /// Elapsed time according to the device, in seconds
    pub elapsed_time_from_device_s: Option<u16>,
    /// When the last patch was merged
    pub sample_timestamp: Option<DateTime<Utc>>,
}

/// Sparse set of field updates decoded from a single frame.
///
/// `None` means "not carried by this frame", never "reset".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryPatch {
    pub power_watts: Option<u16>,
    pub heart_rate_bpm: Option<u16>,
    pub cadence_rpm: Option<f32>,
    pub speed_kmh: Option<f32>,
    pub total_distance_m: Option<u32>,
    pub avg_power_watts: Option<u16>,
    pub avg_speed_kmh: Option<f32>,
    pub avg_cadence_rpm: Option<f32>,
    pub resistance_level: Option<i16>,
    pub total_energy_kcal: Option<u16>,
    pub energy_per_hour_kcal: Option<u16>,
    pub energy_per_minute_kcal: Option<u8>,
    pub elapsed_time_s: Option<u16>,
}

impl TelemetryPatch {
    /// True when the frame carried no live field at all.
    pub fn is_empty(&self) -> bool {
        *self == TelemetryPatch::default()
    }
}

impl LiveTelemetrySample {
    /// Merge a patch into this sample.
    pub fn merge(&mut self, patch: &TelemetryPatch, at: DateTime<Utc>) {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn set_opt<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut self.power_watts, patch.power_watts);
        set(&mut self.heart_rate_bpm, patch.heart_rate_bpm);
        set(&mut self.cadence_rpm, patch.cadence_rpm);
        set(&mut self.speed_kmh, patch.speed_kmh);
        set(&mut self.resistance_level, patch.resistance_level);
        set_opt(&mut self.total_distance_m, patch.total_distance_m);
        set_opt(&mut self.avg_power_watts, patch.avg_power_watts);
        set_opt(&mut self.avg_speed_kmh, patch.avg_speed_kmh);
        set_opt(&mut self.avg_cadence_rpm, patch.avg_cadence_rpm);
        set_opt(&mut self.total_energy_kcal, patch.total_energy_kcal);
        set_opt(&mut self.energy_per_hour_kcal, patch.energy_per_hour_kcal);
        set_opt(&mut self.energy_per_minute_kcal, patch.energy_per_minute_kcal);
        set_opt(&mut self.elapsed_time_from_device_s, patch.elapsed_time_s);
        self.sample_timestamp = Some(at);
    }
}

/// Static and slow-changing facts about one peripheral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub training_status: Option<TrainingStatus>,
    pub machine_status: Option<MachineStatus>,
    pub info: BTreeMap<DeviceInfoField, String>,
    pub ranges: BTreeMap<RangeKind, SupportedRange>,
}

/// A decoded frame, ready to be merged into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameUpdate {
    /// Live measurement fields
    Telemetry(TelemetryPatch),
    TrainingStatus(TrainingStatus),
    MachineStatus(MachineStatus),
    DeviceInfo(DeviceInfoField, String),
    SupportedRange(RangeKind, SupportedRange),
}

/// Single-writer store of live telemetry and per-peripheral device facts.
#[derive(Debug, Default)]
pub struct LiveTelemetryStore {
    sample: LiveTelemetrySample,
    devices: HashMap<PeripheralId, DeviceProfile>,
    frames_applied: u64,
}

impl LiveTelemetryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded frame in one step.
    pub fn apply(&mut self, peripheral: &PeripheralId, update: FrameUpdate, at: DateTime<Utc>) {
        self.frames_applied += 1;
        match update {
            FrameUpdate::Telemetry(patch) => self.sample.merge(&patch, at),
            FrameUpdate::TrainingStatus(status) => {
                self.device_mut(peripheral).training_status = Some(status);
            }
            FrameUpdate::MachineStatus(status) => {
                self.device_mut(peripheral).machine_status = Some(status);
            }
            FrameUpdate::DeviceInfo(field, value) => {
                self.device_mut(peripheral).info.insert(field, value);
            }
            FrameUpdate::SupportedRange(kind, range) => {
                self.device_mut(peripheral).ranges.insert(kind, range);
            }
        }
    }

    /// Copy of the current live sample.
    pub fn snapshot(&self) -> LiveTelemetrySample {
        self.sample
    }

    /// Device facts gathered for a peripheral, if any.
    pub fn device(&self, peripheral: &PeripheralId) -> Option<&DeviceProfile> {
        self.devices.get(peripheral)
    }

    /// Number of frames merged since creation.
    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    fn device_mut(&mut self, peripheral: &PeripheralId) -> &mut DeviceProfile {
        self.devices.entry(peripheral.clone()).or_default()
    }
}
