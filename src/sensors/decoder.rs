//! Frame decoder: characteristic identity + bytes to a store update.
//!
//! Stateless except for one crank cadence tracker per peripheral, which is
//! dropped whenever that peripheral connects or disconnects so the first CSC
//! frame of a new link only sets a baseline.

use crate::sensors::cadence::{csc_to_patch, parse_csc_measurement, CrankCadenceTracker};
use crate::sensors::device_info::{
    parse_device_string, parse_machine_status, parse_supported_range, parse_training_status,
};
use crate::sensors::ftms::{
    parse_cycling_power_measurement, parse_heart_rate_measurement, parse_indoor_bike_data,
};
use crate::sensors::gatt::Characteristic;
use crate::sensors::types::{FrameError, PeripheralId};
use crate::telemetry::store::{FrameUpdate, TelemetryPatch};
use std::collections::HashMap;
use uuid::Uuid;

/// Decodes raw characteristic payloads into [`FrameUpdate`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    crank_trackers: HashMap<PeripheralId, CrankCadenceTracker>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame identified by its full characteristic UUID.
    pub fn decode_uuid(
        &mut self,
        peripheral: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<Option<FrameUpdate>, FrameError> {
        let characteristic = Characteristic::from_uuid(characteristic)
            .ok_or(FrameError::UnknownCharacteristic(characteristic))?;
        self.decode(peripheral, characteristic, data)
    }

    /// Decode a frame.
    ///
    /// `Ok(None)` means the frame was valid but carries nothing to apply
    /// (e.g. the first crank reading, or a rejected cadence).
    pub fn decode(
        &mut self,
        peripheral: &PeripheralId,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Result<Option<FrameUpdate>, FrameError> {
        let update = match characteristic {
            Characteristic::IndoorBikeData => {
                telemetry(parse_indoor_bike_data(data)?.into())
            }
            Characteristic::CyclingPowerMeasurement => {
                telemetry(parse_cycling_power_measurement(data)?.into())
            }
            Characteristic::HeartRateMeasurement => {
                telemetry(parse_heart_rate_measurement(data)?.into())
            }
            Characteristic::CscMeasurement => {
                let measurement = parse_csc_measurement(data)?;
                let tracker = self.crank_trackers.entry(peripheral.clone()).or_default();
                csc_to_patch(&measurement, tracker).map(FrameUpdate::Telemetry)
            }
            Characteristic::TrainingStatus => {
                Some(FrameUpdate::TrainingStatus(parse_training_status(data)?))
            }
            Characteristic::MachineStatus => {
                Some(FrameUpdate::MachineStatus(parse_machine_status(data)?))
            }
            Characteristic::DeviceInfo(field) => {
                Some(FrameUpdate::DeviceInfo(field, parse_device_string(data)?))
            }
            Characteristic::SupportedRange(kind) => Some(FrameUpdate::SupportedRange(
                kind,
                parse_supported_range(kind, data)?,
            )),
        };
        Ok(update)
    }

    /// Forget per-connection state for a peripheral.
    pub fn reset_peripheral(&mut self, peripheral: &PeripheralId) {
        if self.crank_trackers.remove(peripheral).is_some() {
            tracing::debug!("Reset crank baseline for {}", peripheral);
        }
    }
}

fn telemetry(patch: TelemetryPatch) -> Option<FrameUpdate> {
    (!patch.is_empty()).then_some(FrameUpdate::Telemetry(patch))
}
