//! Telemetry module: last-known live values and the outbound live projection.

pub mod live;
pub mod store;

pub use live::{LiveMetrics, RideProgress};
pub use store::{
    DeviceProfile, FrameUpdate, LiveTelemetrySample, LiveTelemetryStore, TelemetryPatch,
};
