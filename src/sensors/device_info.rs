//! Status, device information and supported-range characteristics.

use crate::sensors::gatt::RangeKind;
use crate::sensors::types::FrameError;
use serde::{Deserialize, Serialize};

/// FTMS Training Status (0x2AD3) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Idle,
    WarmingUp,
    LowIntensityInterval,
    HighIntensityInterval,
    RecoveryInterval,
    Isometric,
    HeartRateControl,
    FitnessTest,
    CoolDown,
    WattControl,
    ManualMode,
    PreWorkout,
    PostWorkout,
    /// Any value outside the named table
    Unknown(u8),
}

impl From<u8> for TrainingStatus {
    fn from(value: u8) -> Self {
        match value {
            0x01 => TrainingStatus::Idle,
            0x02 => TrainingStatus::WarmingUp,
            0x03 => TrainingStatus::LowIntensityInterval,
            0x04 => TrainingStatus::HighIntensityInterval,
            0x05 => TrainingStatus::RecoveryInterval,
            0x06 => TrainingStatus::Isometric,
            0x07 => TrainingStatus::HeartRateControl,
            0x08 => TrainingStatus::FitnessTest,
            0x0B => TrainingStatus::CoolDown,
            0x0C => TrainingStatus::WattControl,
            0x0D => TrainingStatus::ManualMode,
            0x0E => TrainingStatus::PreWorkout,
            0x0F => TrainingStatus::PostWorkout,
            other => TrainingStatus::Unknown(other),
        }
    }
}

/// Parse Training Status: flags byte, then the status byte.
pub fn parse_training_status(data: &[u8]) -> Result<TrainingStatus, FrameError> {
    FrameError::ensure_len("Training Status", data, 2)?;
    Ok(TrainingStatus::from(data[1]))
}

/// FTMS Fitness Machine Status (0x2ADA) op codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Reset,
    StoppedOrPausedByUser,
    StoppedBySafetyKey,
    StartedOrResumedByUser,
    TargetResistanceChanged,
    TargetPowerChanged,
    SimulationParametersChanged,
    ControlPermissionLost,
    Other(u8),
}

impl From<u8> for MachineStatus {
    fn from(value: u8) -> Self {
        match value {
            0x01 => MachineStatus::Reset,
            0x02 => MachineStatus::StoppedOrPausedByUser,
            0x03 => MachineStatus::StoppedBySafetyKey,
            0x04 => MachineStatus::StartedOrResumedByUser,
            0x07 => MachineStatus::TargetResistanceChanged,
            0x08 => MachineStatus::TargetPowerChanged,
            0x12 => MachineStatus::SimulationParametersChanged,
            0xFF => MachineStatus::ControlPermissionLost,
            other => MachineStatus::Other(other),
        }
    }
}

/// Parse Fitness Machine Status; parameters after the op code are ignored.
pub fn parse_machine_status(data: &[u8]) -> Result<MachineStatus, FrameError> {
    FrameError::ensure_len("Machine Status", data, 1)?;
    Ok(MachineStatus::from(data[0]))
}

/// Parse a device information string, trimming surrounding whitespace.
///
/// Some devices pad with NULs, which are trimmed as well.
pub fn parse_device_string(data: &[u8]) -> Result<String, FrameError> {
    let text = std::str::from_utf8(data).map_err(|_| FrameError::InvalidUtf8)?;
    Ok(text
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string())
}

/// A supported value range, scaled to display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportedRange {
    pub min: f32,
    pub max: f32,
    /// Read for completeness, not used
    pub increment: Option<f32>,
}

/// Parse one of the Supported * Range characteristics.
///
/// Speed: u16 triple, 0.01 km/h. Resistance: i16 triple, 0.1. Power: i16
/// triple, watts. Heart rate: u8 min/max with an optional trailing increment.
pub fn parse_supported_range(kind: RangeKind, data: &[u8]) -> Result<SupportedRange, FrameError> {
    match kind {
        RangeKind::HeartRate => {
            FrameError::ensure_len("Supported Heart Rate Range", data, 2)?;
            Ok(SupportedRange {
                min: data[0] as f32,
                max: data[1] as f32,
                increment: data.get(2).map(|&b| b as f32),
            })
        }
        RangeKind::Speed => {
            FrameError::ensure_len("Supported Speed Range", data, 6)?;
            let read = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]) as f32 * 0.01;
            Ok(SupportedRange {
                min: read(0),
                max: read(2),
                increment: Some(read(4)),
            })
        }
        RangeKind::Resistance => {
            FrameError::ensure_len("Supported Resistance Level Range", data, 6)?;
            let read = |i: usize| i16::from_le_bytes([data[i], data[i + 1]]) as f32 * 0.1;
            Ok(SupportedRange {
                min: read(0),
                max: read(2),
                increment: Some(read(4)),
            })
        }
        RangeKind::Power => {
            FrameError::ensure_len("Supported Power Range", data, 6)?;
            let read = |i: usize| i16::from_le_bytes([data[i], data[i + 1]]) as f32;
            Ok(SupportedRange {
                min: read(0),
                max: read(2),
                increment: Some(read(4)),
            })
        }
    }
}
