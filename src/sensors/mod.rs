//! Sensor module: BLE transport, frame decoding and connection supervision.

pub mod cadence;
pub mod decoder;
pub mod device_info;
pub mod ftms;
pub mod gatt;
pub mod manager;
pub mod supervisor;
pub mod types;

pub use cadence::{CadenceReading, CrankCadenceTracker, WraparoundDeltaTracker};
pub use decoder::FrameDecoder;
pub use device_info::{MachineStatus, SupportedRange, TrainingStatus};
pub use gatt::Characteristic;
pub use manager::SensorManager;
pub use supervisor::{ConnectionSupervisor, RetryTick, SensorTransport};
pub use types::{
    ConnectionState, DiscoveredSensor, FrameError, PeripheralId, Protocol, SensorConfig,
    SensorError, SensorEvent, SensorType,
};
