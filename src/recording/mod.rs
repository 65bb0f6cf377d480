//! Recording module: ride lifecycle, sampling and session persistence.

pub mod accumulator;
pub mod engine;
pub mod sink;
pub mod types;

pub use engine::RideSessionEngine;
pub use sink::{JsonFileSink, MemorySink, SessionSink, SinkError};
pub use types::{
    DistanceSource, EnergySource, Lap, MetricSummary, RecorderConfig, RecorderError, RideSession,
    RideState, RideType, TimeSeriesPoint,
};
