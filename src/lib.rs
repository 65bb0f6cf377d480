//! RideLink - Cycling sensor telemetry and ride recording
//!
//! Decodes telemetry from BLE fitness sensors (FTMS trainers, power meters,
//! heart rate straps, speed/cadence sensors), keeps a live view of the
//! latest values, samples it at a fixed rate into a ride session with
//! pause/resume and laps, and produces a short post-ride report.

pub mod hub;
pub mod metrics;
pub mod recording;
pub mod sensors;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub use hub::{HubConfig, HubHandle, RideEvent, RideHub};
pub use metrics::report::RideReportGenerator;
pub use recording::engine::RideSessionEngine;
pub use sensors::decoder::FrameDecoder;
pub use sensors::manager::SensorManager;
pub use storage::config::AppConfig;
pub use telemetry::store::LiveTelemetryStore;
