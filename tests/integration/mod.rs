//! Integration test modules.

mod hub_test;
mod ride_recording_test;
