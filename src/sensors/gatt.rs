//! GATT service and characteristic identities.
//!
//! Every characteristic the decoder understands is a variant of
//! [`Characteristic`]; dispatch over it is an exhaustive `match`, so adding
//! an identity without a decoder is a compile error.

use crate::sensors::types::Protocol;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Expand a 16-bit SIG-assigned id into the Bluetooth base UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

/// FTMS Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = uuid_from_u16(0x1826);

/// Cycling Power Service UUID (0x1818)
pub const CYCLING_POWER_SERVICE_UUID: Uuid = uuid_from_u16(0x1818);

/// Heart Rate Service UUID (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid = uuid_from_u16(0x180D);

/// Cycling Speed and Cadence Service UUID (0x1816)
pub const CSC_SERVICE_UUID: Uuid = uuid_from_u16(0x1816);

/// Device Information Service UUID (0x180A)
pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid = uuid_from_u16(0x180A);

/// Services used to filter discovery scans.
pub const SCAN_SERVICES: [Uuid; 4] = [
    FTMS_SERVICE_UUID,
    CYCLING_POWER_SERVICE_UUID,
    HEART_RATE_SERVICE_UUID,
    CSC_SERVICE_UUID,
];

/// Device information string fields (0x180A service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceInfoField {
    ManufacturerName,
    ModelNumber,
    SerialNumber,
    HardwareRevision,
    FirmwareRevision,
    SoftwareRevision,
}

/// Supported-range characteristics of the FTMS service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    /// km/h, 0.01 resolution
    Speed,
    /// Unitless, 0.1 resolution
    Resistance,
    /// Watts
    Power,
    /// bpm
    HeartRate,
}

/// A characteristic the frame decoder knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Characteristic {
    /// FTMS Indoor Bike Data (0x2AD2)
    IndoorBikeData,
    /// Cycling Power Measurement (0x2A63)
    CyclingPowerMeasurement,
    /// Heart Rate Measurement (0x2A37)
    HeartRateMeasurement,
    /// CSC Measurement (0x2A5B)
    CscMeasurement,
    /// FTMS Training Status (0x2AD3)
    TrainingStatus,
    /// FTMS Fitness Machine Status (0x2ADA)
    MachineStatus,
    /// Device Information string (0x2A24-0x2A29)
    DeviceInfo(DeviceInfoField),
    /// FTMS Supported * Range (0x2AD4, 0x2AD6, 0x2AD7, 0x2AD8)
    SupportedRange(RangeKind),
}

impl Characteristic {
    /// Every characteristic identity, in no particular order.
    pub const ALL: [Characteristic; 16] = [
        Characteristic::IndoorBikeData,
        Characteristic::CyclingPowerMeasurement,
        Characteristic::HeartRateMeasurement,
        Characteristic::CscMeasurement,
        Characteristic::TrainingStatus,
        Characteristic::MachineStatus,
        Characteristic::DeviceInfo(DeviceInfoField::ManufacturerName),
        Characteristic::DeviceInfo(DeviceInfoField::ModelNumber),
        Characteristic::DeviceInfo(DeviceInfoField::SerialNumber),
        Characteristic::DeviceInfo(DeviceInfoField::HardwareRevision),
        Characteristic::DeviceInfo(DeviceInfoField::FirmwareRevision),
        Characteristic::DeviceInfo(DeviceInfoField::SoftwareRevision),
        Characteristic::SupportedRange(RangeKind::Speed),
        Characteristic::SupportedRange(RangeKind::Resistance),
        Characteristic::SupportedRange(RangeKind::Power),
        Characteristic::SupportedRange(RangeKind::HeartRate),
    ];

    /// The SIG-assigned 16-bit identity.
    pub const fn short_id(&self) -> u16 {
        match self {
            Characteristic::IndoorBikeData => 0x2AD2,
            Characteristic::CyclingPowerMeasurement => 0x2A63,
            Characteristic::HeartRateMeasurement => 0x2A37,
            Characteristic::CscMeasurement => 0x2A5B,
            Characteristic::TrainingStatus => 0x2AD3,
            Characteristic::MachineStatus => 0x2ADA,
            Characteristic::DeviceInfo(DeviceInfoField::ManufacturerName) => 0x2A29,
            Characteristic::DeviceInfo(DeviceInfoField::ModelNumber) => 0x2A24,
            Characteristic::DeviceInfo(DeviceInfoField::SerialNumber) => 0x2A25,
            Characteristic::DeviceInfo(DeviceInfoField::HardwareRevision) => 0x2A27,
            Characteristic::DeviceInfo(DeviceInfoField::FirmwareRevision) => 0x2A26,
            Characteristic::DeviceInfo(DeviceInfoField::SoftwareRevision) => 0x2A28,
            Characteristic::SupportedRange(RangeKind::Speed) => 0x2AD4,
            Characteristic::SupportedRange(RangeKind::Resistance) => 0x2AD6,
            Characteristic::SupportedRange(RangeKind::HeartRate) => 0x2AD7,
            Characteristic::SupportedRange(RangeKind::Power) => 0x2AD8,
        }
    }

    /// Full 128-bit UUID.
    pub const fn uuid(&self) -> Uuid {
        uuid_from_u16(self.short_id())
    }

    /// Look up a characteristic by its 16-bit identity.
    pub fn from_short_id(short: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.short_id() == short)
    }

    /// Look up a characteristic by full UUID.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    /// Whether the transport should subscribe to notifications (as opposed to a one-shot read).
    pub fn is_notified(&self) -> bool {
        matches!(
            self,
            Characteristic::IndoorBikeData
                | Characteristic::CyclingPowerMeasurement
                | Characteristic::HeartRateMeasurement
                | Characteristic::CscMeasurement
                | Characteristic::TrainingStatus
                | Characteristic::MachineStatus
        )
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:04X})", self, self.short_id())
    }
}

/// Classify an advertised service list into the protocol we will talk.
pub fn classify_services(services: &[Uuid]) -> Option<Protocol> {
    if services.contains(&FTMS_SERVICE_UUID) {
        Some(Protocol::BleFtms)
    } else if services.contains(&CYCLING_POWER_SERVICE_UUID) {
        Some(Protocol::BleCyclingPower)
    } else if services.contains(&HEART_RATE_SERVICE_UUID) {
        Some(Protocol::BleHeartRate)
    } else if services.contains(&CSC_SERVICE_UUID) {
        Some(Protocol::BleCsc)
    } else {
        None
    }
}
