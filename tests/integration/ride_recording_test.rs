//! Integration tests for ride recording.
//!
//! Drives raw frames through decoder, store and engine, then reports on and
//! persists the finished session.

use crate::sensor_mock::MockSensorData;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ridelink::metrics::report::{HrDrift, RideReportGenerator};
use ridelink::recording::engine::RideSessionEngine;
use ridelink::recording::sink::{JsonFileSink, SessionSink};
use ridelink::recording::types::{DistanceSource, EnergySource, RecorderConfig, RideState};
use ridelink::sensors::decoder::FrameDecoder;
use ridelink::sensors::types::{PeripheralId, SensorEvent};
use ridelink::telemetry::store::LiveTelemetryStore;
use tempfile::TempDir;

struct Pipeline {
    decoder: FrameDecoder,
    store: LiveTelemetryStore,
    engine: RideSessionEngine,
}

impl Pipeline {
    fn new(config: RecorderConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            store: LiveTelemetryStore::new(),
            engine: RideSessionEngine::new(config),
        }
    }

    fn feed(&mut self, event: SensorEvent, at: DateTime<Utc>) {
        if let SensorEvent::Frame {
            peripheral,
            characteristic,
            data,
        } = event
        {
            if let Ok(Some(update)) = self.decoder.decode_uuid(&peripheral, characteristic, &data) {
                self.store.apply(&peripheral, update, at);
            }
        }
    }

    fn tick(&mut self, generation: u64, at: DateTime<Utc>) -> bool {
        let sample = self.store.snapshot();
        self.engine.tick(generation, at, &sample)
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 5, 9, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

#[test]
fn test_full_recording_flow() {
    let trainer = PeripheralId::new("trainer");
    let strap = PeripheralId::new("strap");
    let mut pipeline = Pipeline::new(RecorderConfig::default());

    assert_eq!(pipeline.engine.state(), RideState::Idle);
    let gen = pipeline.engine.start(t0()).unwrap();
    assert_eq!(pipeline.engine.state(), RideState::Riding);

    // 60 s steady with a heart rate strap
    for s in 1..=60 {
        let mock = MockSensorData {
            heart_rate: 140,
            ..Default::default()
        };
        pipeline.feed(mock.ftms_event(&trainer), at(s));
        pipeline.feed(mock.heart_rate_event(&strap), at(s));
        assert!(pipeline.tick(gen, at(s)));
    }

    // Pause for two minutes: ticks are ignored
    pipeline.engine.pause(at(60)).unwrap();
    assert!(!pipeline.tick(gen, at(90)));

    let gen = pipeline.engine.resume(at(180)).unwrap();
    let lap = pipeline.engine.add_lap(at(180)).unwrap();
    assert_eq!(lap, 2);

    // Another 60 s, harder
    for s in 181..=240 {
        let mock = MockSensorData {
            power: 300,
            heart_rate: 160,
            ..Default::default()
        };
        pipeline.feed(mock.ftms_event(&trainer), at(s));
        pipeline.feed(mock.heart_rate_event(&strap), at(s));
        assert!(pipeline.tick(gen, at(s)));
    }

    let session = pipeline.engine.end(at(240)).unwrap();

    assert_eq!(session.samples.len(), 120);
    assert_eq!(session.duration_seconds, 120);
    assert_eq!(session.power.avg, 250.0);
    assert_eq!(session.power.max, 300.0);
    assert_eq!(session.heart_rate.avg, 150.0);
    assert_eq!(session.cadence.avg, 90.0);
    assert_eq!(session.distance_source, DistanceSource::SpeedIntegration);
    assert!((session.distance_meters - 1_000.0).abs() < 0.01);
    assert_eq!(session.energy_source, EnergySource::Estimated);
    // 250 W for 2 min
    assert!((session.energy_kcal - 30.0).abs() < 1e-6);

    assert_eq!(session.laps.len(), 2);
    assert_eq!(session.laps[0].avg_power, 200.0);
    assert_eq!(session.laps[0].duration_seconds, 60);
    assert_eq!(session.laps[1].avg_power, 300.0);
    assert_eq!(session.laps[1].lap_number, 2);
}

#[test]
fn test_device_distance_from_trainer() {
    let trainer = PeripheralId::new("trainer");
    let mut pipeline = Pipeline::new(RecorderConfig::default());
    let gen = pipeline.engine.start(t0()).unwrap();

    for s in 1..=30 {
        let mock = MockSensorData {
            total_distance: Some(5_000 + 9 * s as u32),
            ..Default::default()
        };
        pipeline.feed(mock.ftms_event(&trainer), at(s));
        pipeline.tick(gen, at(s));
    }
    let session = pipeline.engine.end(at(30)).unwrap();

    // Baseline captured on the first tick
    assert_eq!(session.distance_meters, 261.0);
    assert_eq!(session.distance_source, DistanceSource::Device);
}

#[test]
fn test_finished_session_is_reported_and_persisted() {
    let dir = TempDir::new().unwrap();
    let mut sink = JsonFileSink::new(dir.path());
    let trainer = PeripheralId::new("trainer");
    let strap = PeripheralId::new("strap");
    let mut pipeline = Pipeline::new(RecorderConfig::default());

    let gen = pipeline.engine.start(t0()).unwrap();
    for s in 1..=60 {
        let mock = MockSensorData {
            heart_rate: 120 + ((s - 1) * 30 / 59) as u8,
            ..Default::default()
        };
        pipeline.feed(mock.ftms_event(&trainer), at(s));
        pipeline.feed(mock.heart_rate_event(&strap), at(s));
        pipeline.tick(gen, at(s));
    }
    let mut session = pipeline.engine.end(at(60)).unwrap();

    let report = RideReportGenerator::new().generate(&session, &[]);
    assert!(matches!(report.hr_drift, HrDrift::ModerateRise { .. }));
    session.attach_report(report.render());
    sink.save(&session).unwrap();

    let loaded = sink.load(session.id).unwrap();
    assert_eq!(loaded.samples.len(), 60);
    assert_eq!(loaded.report, session.report);
    assert!(loaded.report.unwrap().contains("Heart rate drifted up moderately"));
}

#[test]
fn test_rejected_cadence_does_not_reach_samples() {
    let sensor = PeripheralId::new("csc");
    let mut pipeline = Pipeline::new(RecorderConfig::default());
    let gen = pipeline.engine.start(t0()).unwrap();

    let frames = [(10u16, 0u16), (13, 1024), (65534, 2048), (2, 2560)];
    for (i, (revs, time)) in frames.into_iter().enumerate() {
        let s = i as i64 + 1;
        pipeline.feed(
            SensorEvent::Frame {
                peripheral: sensor.clone(),
                characteristic: ridelink::sensors::gatt::Characteristic::CscMeasurement.uuid(),
                data: MockSensorData::generate_csc_measurement(revs, time),
            },
            at(s),
        );
        pipeline.tick(gen, at(s));
    }
    let session = pipeline.engine.end(at(4)).unwrap();

    let cadence: Vec<f32> = session.samples.iter().map(|p| p.cadence_rpm).collect();
    assert_eq!(cadence, vec![0.0, 180.0, 180.0, 180.0]);
    assert_eq!(session.cadence.max, 180.0);
}

#[test]
fn test_sessions_reload_in_start_order() {
    let dir = TempDir::new().unwrap();
    let mut sink = JsonFileSink::new(dir.path());

    for offset in [2i64, 0, 1] {
        let mut engine = RideSessionEngine::with_defaults();
        let start = t0() + Duration::days(offset);
        engine.start(start).unwrap();
        let session = engine.end(start + Duration::minutes(30)).unwrap();
        sink.save(&session).unwrap();
    }

    let loaded = sink.load_all().unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.windows(2).all(|w| w[0].started_at <= w[1].started_at));
    assert_eq!(loaded[0].started_at, t0());
}
