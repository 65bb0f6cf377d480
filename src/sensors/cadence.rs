//! Cadence from wrapping crank-revolution counters.
//!
//! CSC Measurement (0x2A5B) frames carry cumulative 16-bit counters that
//! wrap at 65536. [`WraparoundDeltaTracker`] turns consecutive readings into
//! modular deltas; [`CrankCadenceTracker`] applies the plausibility policy on
//! top of it.

use crate::sensors::types::FrameError;
use crate::telemetry::store::TelemetryPatch;

/// Event time units per second (1/1024 s resolution).
pub const EVENT_TIME_UNITS_PER_SEC: f32 = 1024.0;

/// Crank deltas at or above this are treated as a glitch.
const MAX_PLAUSIBLE_REVOLUTIONS: u16 = 10;

/// Cadence is accepted only inside (0, 250) rpm.
const MAX_CADENCE_RPM: f32 = 250.0;

/// Modular difference between two readings of a wrapping 16-bit counter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    /// Count difference modulo 65536
    pub count: u16,
    /// Event-time difference modulo 65536
    pub time: u16,
}

/// Last-seen state for a (count, event time) pair of 16-bit counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WraparoundDeltaTracker {
    last: Option<(u16, u16)>,
}

impl WraparoundDeltaTracker {
    /// Create a tracker with no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new reading and return the delta from the previous one.
    ///
    /// The first reading only establishes the baseline. State always moves to
    /// the new reading, whatever the caller later decides about the delta.
    pub fn observe(&mut self, count: u16, event_time: u16) -> Option<CounterDelta> {
        let delta = self.last.map(|(last_count, last_time)| CounterDelta {
            count: count.wrapping_sub(last_count),
            time: event_time.wrapping_sub(last_time),
        });
        self.last = Some((count, event_time));
        delta
    }

    /// Drop the baseline (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Outcome of feeding one crank reading into the cadence policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CadenceReading {
    /// First reading after connect; nothing to emit
    Baseline,
    /// Accepted cadence in rpm (0 when the crank did not move)
    Rpm(f32),
    /// Implausible or duplicate reading, silently dropped
    Rejected,
}

impl CadenceReading {
    /// The cadence to publish, if any.
    pub fn rpm(&self) -> Option<f32> {
        match self {
            CadenceReading::Rpm(rpm) => Some(*rpm),
            _ => None,
        }
    }
}

/// Crank cadence derivation for one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrankCadenceTracker {
    counter: WraparoundDeltaTracker,
}

impl CrankCadenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed cumulative crank revolutions and the last crank event time.
    pub fn update(&mut self, revolutions: u16, event_time: u16) -> CadenceReading {
        let Some(delta) = self.counter.observe(revolutions, event_time) else {
            return CadenceReading::Baseline;
        };

        if delta.count == 0 {
            return CadenceReading::Rpm(0.0);
        }

        if delta.time == 0 || delta.count >= MAX_PLAUSIBLE_REVOLUTIONS {
            return CadenceReading::Rejected;
        }

        let seconds = delta.time as f32 / EVENT_TIME_UNITS_PER_SEC;
        let rpm = delta.count as f32 / seconds * 60.0;

        if rpm > 0.0 && rpm < MAX_CADENCE_RPM {
            CadenceReading::Rpm(rpm)
        } else {
            CadenceReading::Rejected
        }
    }

    /// Forget the baseline.
    pub fn reset(&mut self) {
        self.counter.reset();
    }
}

/// Crank revolution block of a CSC Measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrankRevolutions {
    /// Cumulative crank revolutions
    pub cumulative: u16,
    /// Last crank event time, 1/1024 s
    pub last_event_time: u16,
}

/// Parsed CSC Measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CscMeasurement {
    /// Whether a wheel block was present (consumed, not used)
    pub wheel_data_present: bool,
    /// Crank block, if present
    pub crank: Option<CrankRevolutions>,
}

const CSC_WHEEL_PRESENT: u8 = 0x01;
const CSC_CRANK_PRESENT: u8 = 0x02;
const CSC_WHEEL_BLOCK_LEN: usize = 6;
const CSC_CRANK_BLOCK_LEN: usize = 4;

/// Parse CSC Measurement notification.
///
/// Layout: flags (u8), optional wheel block (u32 revolutions + u16 event
/// time), optional crank block (u16 revolutions + u16 event time).
pub fn parse_csc_measurement(data: &[u8]) -> Result<CscMeasurement, FrameError> {
    FrameError::ensure_len("CSC Measurement", data, 1)?;

    let flags = data[0];
    let wheel_data_present = flags & CSC_WHEEL_PRESENT != 0;
    let crank_present = flags & CSC_CRANK_PRESENT != 0;

    let mut needed = 1;
    if wheel_data_present {
        needed += CSC_WHEEL_BLOCK_LEN;
    }
    let crank_offset = needed;
    if crank_present {
        needed += CSC_CRANK_BLOCK_LEN;
    }
    FrameError::ensure_len("CSC Measurement", data, needed)?;

    let crank = crank_present.then(|| CrankRevolutions {
        cumulative: u16::from_le_bytes([data[crank_offset], data[crank_offset + 1]]),
        last_event_time: u16::from_le_bytes([data[crank_offset + 2], data[crank_offset + 3]]),
    });

    Ok(CscMeasurement {
        wheel_data_present,
        crank,
    })
}

/// Run a CSC frame through a connection's crank tracker.
pub fn csc_to_patch(
    measurement: &CscMeasurement,
    tracker: &mut CrankCadenceTracker,
) -> Option<TelemetryPatch> {
    let crank = measurement.crank?;
    let rpm = tracker.update(crank.cumulative, crank.last_event_time).rpm()?;
    Some(TelemetryPatch {
        cadence_rpm: Some(rpm),
        ..Default::default()
    })
}
