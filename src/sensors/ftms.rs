//! Measurement decoders for FTMS, Cycling Power and Heart Rate frames.
//!
//! Indoor Bike Data (0x2AD2), Cycling Power Measurement (0x2A63) and Heart
//! Rate Measurement (0x2A37). All functions are pure: the same bytes always
//! decode to the same fields.

use crate::sensors::types::FrameError;
use crate::telemetry::store::TelemetryPatch;

/// Energy fields use 0xFFFF for "not available".
const ENERGY_UNAVAILABLE: u16 = 0xFFFF;

/// Heart rate from a trainer is only trusted inside this open interval.
const TRAINER_HR_EXCLUSIVE_MAX: u8 = 250;

/// Parsed data from Indoor Bike Data characteristic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndoorBikeData {
    /// Instantaneous speed in km/h (if present)
    pub speed_kmh: Option<f32>,
    /// Average speed in km/h (if present)
    pub avg_speed_kmh: Option<f32>,
    /// Instantaneous cadence in RPM (if present)
    pub cadence_rpm: Option<f32>,
    /// Average cadence in RPM (if present)
    pub avg_cadence_rpm: Option<f32>,
    /// Total distance in meters (if present)
    pub total_distance_m: Option<u32>,
    /// Resistance level in raw device units (if present)
    pub resistance_level: Option<i16>,
    /// Instantaneous power in watts, negative readings clamped to 0
    pub power_watts: Option<u16>,
    /// Average power in watts, negative readings clamped to 0
    pub avg_power_watts: Option<u16>,
    /// Total expended energy in kcal (absent when the device sent 0xFFFF)
    pub total_energy_kcal: Option<u16>,
    /// Energy per hour in kcal (absent when the device sent 0xFFFF)
    pub energy_per_hour_kcal: Option<u16>,
    /// Energy per minute in kcal
    pub energy_per_minute_kcal: Option<u8>,
    /// Heart rate in BPM, only when inside (0, 250)
    pub heart_rate_bpm: Option<u8>,
    /// Elapsed time in seconds (if present)
    pub elapsed_time_s: Option<u16>,
}

/// Indoor Bike Data flags (first 2 bytes).
#[derive(Debug, Clone, Copy)]
struct IndoorBikeDataFlags(u16);

impl IndoorBikeDataFlags {
    /// More data (bit 0). Inverted: clear means instantaneous speed follows.
    const MORE_DATA: u16 = 0x0001;
    const AVG_SPEED: u16 = 0x0002;
    const INST_CADENCE: u16 = 0x0004;
    const AVG_CADENCE: u16 = 0x0008;
    const TOTAL_DISTANCE: u16 = 0x0010;
    const RESISTANCE_LEVEL: u16 = 0x0020;
    const INST_POWER: u16 = 0x0040;
    const AVG_POWER: u16 = 0x0080;
    const EXPENDED_ENERGY: u16 = 0x0100;
    const HEART_RATE: u16 = 0x0200;
    const METABOLIC_EQUIVALENT: u16 = 0x0400;
    const ELAPSED_TIME: u16 = 0x0800;
    const REMAINING_TIME: u16 = 0x1000;

    fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        FrameError::ensure_len("Indoor Bike Data", data, 2)?;
        Ok(Self(u16::from_le_bytes([data[0], data[1]])))
    }

    fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    fn speed_present(&self) -> bool {
        !self.has(Self::MORE_DATA)
    }
}

/// Cursor over a frame that follows flag order and tolerates a short tail.
///
/// Each `take_*` advances the offset by the field width whether or not the
/// bytes are in range, so later fields are never read from the wrong place.
struct FieldCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let start = self.offset;
        self.offset += N;
        self.data.get(start..start + N)?.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    fn i16(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_le_bytes)
    }

    fn u24(&mut self) -> Option<u32> {
        self.take::<3>().map(|[a, b, c]| u32::from_le_bytes([a, b, c, 0]))
    }

    fn skip(&mut self, width: usize) {
        self.offset += width;
    }
}

fn clamp_power(raw: i16) -> u16 {
    raw.max(0) as u16
}

fn energy_value(raw: u16) -> Option<u16> {
    (raw != ENERGY_UNAVAILABLE).then_some(raw)
}

/// Parse Indoor Bike Data notification.
///
/// The data format is:
/// - Bytes 0-1: Flags (indicates which fields are present)
/// - Remaining bytes: Data fields in flag-bit order
///
/// Only the 2-byte flags prefix is mandatory. A field whose bytes fall past
/// the end of the buffer is skipped rather than failing the whole frame.
pub fn parse_indoor_bike_data(data: &[u8]) -> Result<IndoorBikeData, FrameError> {
    type F = IndoorBikeDataFlags;

    let flags = F::from_bytes(data)?;
    let mut result = IndoorBikeData::default();
    let mut cursor = FieldCursor::new(data, 2);

    // Instantaneous speed, 0.01 km/h
    if flags.speed_present() {
        result.speed_kmh = cursor.u16().map(|raw| raw as f32 / 100.0);
    }

    if flags.has(F::AVG_SPEED) {
        result.avg_speed_kmh = cursor.u16().map(|raw| raw as f32 / 100.0);
    }

    // Cadence fields use 0.5 rpm resolution
    if flags.has(F::INST_CADENCE) {
        result.cadence_rpm = cursor.u16().map(|raw| raw as f32 * 0.5);
    }

    if flags.has(F::AVG_CADENCE) {
        result.avg_cadence_rpm = cursor.u16().map(|raw| raw as f32 * 0.5);
    }

    if flags.has(F::TOTAL_DISTANCE) {
        result.total_distance_m = cursor.u24();
    }

    // Raw level, no 0.1 scaling on this characteristic
    if flags.has(F::RESISTANCE_LEVEL) {
        result.resistance_level = cursor.i16();
    }

    if flags.has(F::INST_POWER) {
        result.power_watts = cursor.i16().map(clamp_power);
    }

    if flags.has(F::AVG_POWER) {
        result.avg_power_watts = cursor.i16().map(clamp_power);
    }

    // Expended energy: total (u16), per hour (u16), per minute (u8)
    if flags.has(F::EXPENDED_ENERGY) {
        result.total_energy_kcal = cursor.u16().and_then(energy_value);
        result.energy_per_hour_kcal = cursor.u16().and_then(energy_value);
        result.energy_per_minute_kcal = cursor.u8();
    }

    if flags.has(F::HEART_RATE) {
        result.heart_rate_bpm = cursor
            .u8()
            .filter(|&bpm| bpm > 0 && bpm < TRAINER_HR_EXCLUSIVE_MAX);
    }

    if flags.has(F::METABOLIC_EQUIVALENT) {
        cursor.skip(1);
    }

    if flags.has(F::ELAPSED_TIME) {
        result.elapsed_time_s = cursor.u16();
    }

    if flags.has(F::REMAINING_TIME) {
        cursor.skip(2);
    }

    Ok(result)
}

impl From<IndoorBikeData> for TelemetryPatch {
    fn from(data: IndoorBikeData) -> Self {
        TelemetryPatch {
            power_watts: data.power_watts,
            heart_rate_bpm: data.heart_rate_bpm.map(u16::from),
            cadence_rpm: data.cadence_rpm,
            speed_kmh: data.speed_kmh,
            total_distance_m: data.total_distance_m,
            avg_power_watts: data.avg_power_watts,
            avg_speed_kmh: data.avg_speed_kmh,
            avg_cadence_rpm: data.avg_cadence_rpm,
            resistance_level: data.resistance_level,
            total_energy_kcal: data.total_energy_kcal,
            energy_per_hour_kcal: data.energy_per_hour_kcal,
            energy_per_minute_kcal: data.energy_per_minute_kcal,
            elapsed_time_s: data.elapsed_time_s,
        }
    }
}

/// Parsed Cycling Power Measurement data.
///
/// Only instantaneous power is decoded. Pedal balance, torque and
/// wheel/crank revolution blocks advertised by the flags are not parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CyclingPowerData {
    /// Raw flags field
    pub flags: u16,
    /// Instantaneous power in watts, negative readings clamped to 0
    pub power_watts: u16,
}

/// Parse Cycling Power Measurement notification.
pub fn parse_cycling_power_measurement(data: &[u8]) -> Result<CyclingPowerData, FrameError> {
    FrameError::ensure_len("Cycling Power Measurement", data, 4)?;

    let flags = u16::from_le_bytes([data[0], data[1]]);
    let power = i16::from_le_bytes([data[2], data[3]]);

    Ok(CyclingPowerData {
        flags,
        power_watts: clamp_power(power),
    })
}

impl From<CyclingPowerData> for TelemetryPatch {
    fn from(data: CyclingPowerData) -> Self {
        TelemetryPatch {
            power_watts: Some(data.power_watts),
            ..Default::default()
        }
    }
}

/// Parsed Heart Rate Measurement data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartRateData {
    /// Heart rate in BPM
    pub heart_rate_bpm: u16,
    /// Sensor contact detected
    pub sensor_contact: bool,
}

/// Parse Heart Rate Measurement notification.
///
/// Bit 0 of the flags byte selects an 8-bit or 16-bit value. No range check
/// is applied on this path.
pub fn parse_heart_rate_measurement(data: &[u8]) -> Result<HeartRateData, FrameError> {
    FrameError::ensure_len("Heart Rate Measurement", data, 1)?;

    let flags = data[0];
    let hr_format_u16 = (flags & 0x01) != 0;
    let sensor_contact_supported = (flags & 0x04) != 0;
    let sensor_contact = sensor_contact_supported && ((flags & 0x02) != 0);

    let heart_rate_bpm = if hr_format_u16 {
        FrameError::ensure_len("Heart Rate Measurement", data, 3)?;
        u16::from_le_bytes([data[1], data[2]])
    } else {
        FrameError::ensure_len("Heart Rate Measurement", data, 2)?;
        data[1] as u16
    };

    Ok(HeartRateData {
        heart_rate_bpm,
        sensor_contact,
    })
}

impl From<HeartRateData> for TelemetryPatch {
    fn from(data: HeartRateData) -> Self {
        TelemetryPatch {
            heart_rate_bpm: Some(data.heart_rate_bpm),
            ..Default::default()
        }
    }
}
