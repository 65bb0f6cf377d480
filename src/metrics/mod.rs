//! Metrics module: post-ride analysis over the recorded time series.

pub mod report;
pub mod smoothing;

pub use report::{CadencePattern, HrDrift, RideReport, RideReportGenerator};
pub use smoothing::{best_window_average, RollingAverage};
