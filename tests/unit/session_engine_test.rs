//! Unit tests for the ride session engine.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ridelink::recording::engine::RideSessionEngine;
use ridelink::recording::types::{
    DistanceSource, RecorderConfig, RecorderError, RideState, MIN_TICK_INTERVAL,
};
use ridelink::telemetry::store::LiveTelemetrySample;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 7, 30, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

fn riding_sample(power: u16, hr: u16, cadence: f32, speed: f32) -> LiveTelemetrySample {
    LiveTelemetrySample {
        power_watts: power,
        heart_rate_bpm: hr,
        cadence_rpm: cadence,
        speed_kmh: speed,
        ..Default::default()
    }
}

#[test]
fn test_end_without_samples_has_zero_averages() {
    let mut engine = RideSessionEngine::with_defaults();
    engine.start(t0()).unwrap();
    let session = engine.end(at(3)).unwrap();

    assert!(session.samples.is_empty());
    assert_eq!(session.power.avg, 0.0);
    assert_eq!(session.heart_rate.avg, 0.0);
    assert_eq!(session.cadence.avg, 0.0);
    assert_eq!(session.speed.avg, 0.0);
    assert_eq!(session.energy_kcal, 0.0);
    assert!(session.power.avg.is_finite());
}

#[test]
fn test_pause_excluded_from_elapsed() {
    let mut engine = RideSessionEngine::with_defaults();
    engine.start(t0()).unwrap();

    engine.pause(at(100)).unwrap();
    // Elapsed is frozen while paused
    assert_eq!(engine.elapsed(at(500)), Duration::seconds(100));

    engine.resume(at(1_000)).unwrap();
    assert_eq!(engine.elapsed(at(1_060)), Duration::seconds(160));

    let session = engine.end(at(1_200)).unwrap();
    assert_eq!(session.duration_seconds, 300);
}

#[test]
fn test_pause_interval_exact_to_the_millisecond() {
    let mut engine = RideSessionEngine::with_defaults();
    engine.start(t0()).unwrap();

    engine.pause(at(10) + Duration::milliseconds(250)).unwrap();
    engine.resume(at(20) + Duration::milliseconds(750)).unwrap();

    // 30 s wall clock minus a 10.5 s pause
    assert_eq!(engine.elapsed(at(30)), Duration::milliseconds(19_500));
}

#[test]
fn test_end_while_paused_excludes_open_pause() {
    let mut engine = RideSessionEngine::with_defaults();
    engine.start(t0()).unwrap();
    engine.pause(at(60)).unwrap();
    let session = engine.end(at(600)).unwrap();

    assert_eq!(session.duration_seconds, 60);
}

#[test]
fn test_averages_and_maxima() {
    let mut engine = RideSessionEngine::with_defaults();
    let gen = engine.start(t0()).unwrap();

    engine.tick(gen, at(1), &riding_sample(100, 0, 80.0, 25.0));
    engine.tick(gen, at(2), &riding_sample(200, 130, 90.0, 30.0));
    engine.tick(gen, at(3), &riding_sample(300, 150, 100.0, 35.0));
    let session = engine.end(at(3)).unwrap();

    assert_eq!(session.samples.len(), 3);
    assert_eq!(session.power.avg, 200.0);
    assert_eq!(session.power.max, 300.0);
    assert_eq!(session.power.min, 100.0);
    // Heart rate averaged over known readings only
    assert_eq!(session.heart_rate.avg, 140.0);
    assert_eq!(session.heart_rate.min, 130.0);
    assert_eq!(session.cadence.avg, 90.0);
    assert_eq!(session.speed.max, 35.0);
}

#[test]
fn test_distance_integrated_from_speed() {
    let mut engine = RideSessionEngine::with_defaults();
    let gen = engine.start(t0()).unwrap();
    for s in 1..=60 {
        engine.tick(gen, at(s), &riding_sample(200, 0, 90.0, 36.0));
    }
    let session = engine.end(at(60)).unwrap();

    assert!((session.distance_meters - 600.0).abs() < 1e-6);
    assert_eq!(session.distance_source, DistanceSource::SpeedIntegration);
}

#[test]
fn test_device_distance_never_falls_back_to_integration() {
    let mut engine = RideSessionEngine::with_defaults();
    let gen = engine.start(t0()).unwrap();

    let mut with_distance = riding_sample(200, 0, 90.0, 36.0);
    with_distance.total_distance_m = Some(12_000);
    engine.tick(gen, at(1), &with_distance);

    with_distance.total_distance_m = Some(12_050);
    engine.tick(gen, at(2), &with_distance);
    assert_eq!(engine.distance_m(), 50.0);

    // Device omits the field on later ticks: distance holds
    let without_distance = riding_sample(200, 0, 90.0, 36.0);
    for s in 3..=10 {
        engine.tick(gen, at(s), &without_distance);
    }
    let session = engine.end(at(10)).unwrap();

    assert_eq!(session.distance_meters, 50.0);
    assert_eq!(session.distance_source, DistanceSource::Device);
}

#[test]
fn test_new_ride_recaptures_distance_baseline() {
    let mut engine = RideSessionEngine::with_defaults();
    let mut sample = riding_sample(200, 0, 90.0, 30.0);

    let gen = engine.start(t0()).unwrap();
    sample.total_distance_m = Some(1_000);
    engine.tick(gen, at(1), &sample);
    sample.total_distance_m = Some(1_400);
    engine.tick(gen, at(2), &sample);
    engine.end(at(2)).unwrap();
    engine.reset().unwrap();

    let gen = engine.start(at(10)).unwrap();
    engine.tick(gen, at(11), &sample);
    sample.total_distance_m = Some(1_500);
    engine.tick(gen, at(12), &sample);
    let session = engine.end(at(12)).unwrap();

    assert_eq!(session.distance_meters, 100.0);
}

#[test]
fn test_device_counter_reset_mid_ride_keeps_distance() {
    let mut engine = RideSessionEngine::with_defaults();
    let gen = engine.start(t0()).unwrap();
    let mut sample = riding_sample(200, 0, 90.0, 30.0);

    let mut seen = Vec::new();
    for (i, total) in [5_000, 5_100, 5_200, 5_300, 0, 100, 200].into_iter().enumerate() {
        sample.total_distance_m = Some(total);
        engine.tick(gen, at(i as i64 + 1), &sample);
        seen.push(engine.distance_m());
    }

    assert_eq!(seen, vec![0.0, 100.0, 200.0, 300.0, 300.0, 400.0, 500.0]);
    let session = engine.end(at(7)).unwrap();
    assert_eq!(session.distance_meters, 500.0);
    assert_eq!(session.distance_source, DistanceSource::Device);
}

#[test]
fn test_stale_total_from_previous_ride_does_not_zero_distance() {
    let mut engine = RideSessionEngine::with_defaults();
    let mut sample = riding_sample(200, 0, 90.0, 30.0);

    let gen = engine.start(t0()).unwrap();
    sample.total_distance_m = Some(8_000);
    engine.tick(gen, at(1), &sample);
    engine.end(at(1)).unwrap();
    engine.reset().unwrap();

    // Trainer restarted its counter; the store still holds 8000 for one tick
    let gen = engine.start(at(10)).unwrap();
    engine.tick(gen, at(11), &sample);
    for (i, total) in [20, 70, 120].into_iter().enumerate() {
        sample.total_distance_m = Some(total);
        engine.tick(gen, at(12 + i as i64), &sample);
    }

    // Baseline recaptured at the first post-reset reading
    assert_eq!(engine.distance_m(), 100.0);
}

#[test]
fn test_invalid_transitions() {
    let mut engine = RideSessionEngine::with_defaults();
    assert_eq!(engine.pause(t0()), Err(RecorderError::NotRiding(RideState::Idle)));
    assert_eq!(engine.resume(t0()), Err(RecorderError::NotPaused(RideState::Idle)));
    assert!(engine.end(t0()).is_err());
    assert!(engine.add_lap(t0()).is_err());

    engine.start(t0()).unwrap();
    assert_eq!(engine.resume(at(1)), Err(RecorderError::NotPaused(RideState::Riding)));
}

#[test]
fn test_no_tick_after_end() {
    let mut engine = RideSessionEngine::with_defaults();
    let gen = engine.start(t0()).unwrap();
    engine.tick(gen, at(1), &riding_sample(200, 0, 90.0, 30.0));
    let session = engine.end(at(1)).unwrap();

    assert!(!engine.tick(gen, at(2), &riding_sample(900, 0, 90.0, 30.0)));
    assert!(!engine.tick(engine.tick_generation(), at(2), &riding_sample(900, 0, 90.0, 30.0)));
    assert_eq!(session.power.max, 200.0);
    assert_eq!(engine.state(), RideState::Ended);
}

#[test]
fn test_in_progress_views() {
    let mut engine = RideSessionEngine::with_defaults();
    let gen = engine.start(t0()).unwrap();
    assert_eq!(engine.current_lap(), Some(1));

    engine.tick(gen, at(1), &riding_sample(150, 120, 85.0, 28.0));
    engine.tick(gen, at(2), &riding_sample(160, 121, 86.0, 28.5));
    engine.add_lap(at(2)).unwrap();

    assert_eq!(engine.samples().len(), 2);
    assert_eq!(engine.samples()[1].elapsed_seconds, 2);
    assert_eq!(engine.laps().len(), 1);
    assert_eq!(engine.laps()[0].avg_power, 155.0);
    assert_eq!(engine.current_lap(), Some(2));

    engine.note_dropout();
    assert_eq!(engine.dropout_count(), 1);
}

#[test]
fn test_zero_tick_interval_is_raised() {
    let engine = RideSessionEngine::new(RecorderConfig {
        tick_interval: std::time::Duration::ZERO,
        ..Default::default()
    });
    assert_eq!(engine.config().tick_interval, MIN_TICK_INTERVAL);
}
