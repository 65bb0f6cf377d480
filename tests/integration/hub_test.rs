//! Integration tests for the ride hub actor.
//!
//! Run on a paused tokio clock so tick, publish, settle and retry timers
//! fire deterministically as the test sleeps.

use crate::sensor_mock::{MockSensorData, MockTransport};
use crossbeam::channel::Receiver;
use ridelink::hub::{HubConfig, HubError, HubHandle, RideEvent, RideHub};
use ridelink::recording::sink::MemorySink;
use ridelink::recording::types::{RecorderConfig, RecorderError, RideState};
use ridelink::sensors::types::{ConnectionState, PeripheralId, SensorEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    hub: HubHandle,
    task: JoinHandle<()>,
    sensors: mpsc::UnboundedSender<SensorEvent>,
    events: Receiver<RideEvent>,
    sink: MemorySink,
    transport: MockTransport,
}

impl Harness {
    fn spawn(config: HubConfig) -> Self {
        let (sensor_tx, sensor_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = crossbeam::channel::unbounded();
        let transport = MockTransport::new(sensor_tx.clone());
        let sink = MemorySink::new();

        let (hub, task) = RideHub::spawn(
            transport.clone(),
            config,
            Box::new(sink.clone()),
            events_tx,
            sensor_rx,
        );

        Self {
            hub,
            task,
            sensors: sensor_tx,
            events: events_rx,
            sink,
            transport,
        }
    }

    fn drain(&self) -> Vec<RideEvent> {
        self.events.try_iter().collect()
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn finished_count(events: &[RideEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, RideEvent::SessionFinished(_)))
        .count()
}

fn connection_changes(events: &[RideEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            RideEvent::ConnectionChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_ride_samples_once_per_tick_and_finishes_once() {
    let h = Harness::spawn(HubConfig::default());

    h.hub.start_ride().await.unwrap();
    sleep_ms(5_500).await;
    let session = h.hub.end_ride().await.unwrap();

    assert_eq!(session.samples.len(), 5);
    assert!(session.report.is_some());

    // Late ticks cannot reach the finished session
    sleep_ms(3_000).await;
    let events = h.drain();
    assert_eq!(finished_count(&events), 1);

    let saved = h.sink.sessions();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, session.id);
    assert_eq!(saved[0].samples.len(), 5);
    assert_eq!(saved[0].report, session.report);
}

#[tokio::test(start_paused = true)]
async fn test_settle_returns_to_idle() {
    let h = Harness::spawn(HubConfig::default());

    h.hub.start_ride().await.unwrap();
    sleep_ms(1_200).await;
    h.hub.end_ride().await.unwrap();

    // Still settling
    assert_eq!(h.hub.live_metrics().await.unwrap().ride_state, RideState::Ended);
    assert!(matches!(
        h.hub.start_ride().await,
        Err(HubError::Recorder(RecorderError::NotIdle(RideState::Ended)))
    ));

    sleep_ms(2_000).await;
    assert_eq!(h.hub.live_metrics().await.unwrap().ride_state, RideState::Idle);

    let states: Vec<RideState> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            RideEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![RideState::Riding, RideState::Ended, RideState::Idle]);

    // A new ride can start after settling
    h.hub.start_ride().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_sampling() {
    let h = Harness::spawn(HubConfig::default());

    h.hub.start_ride().await.unwrap();
    sleep_ms(2_500).await;
    h.hub.pause_ride().await.unwrap();
    sleep_ms(5_000).await;
    h.hub.resume_ride().await.unwrap();
    sleep_ms(1_500).await;

    let session = h.hub.end_ride().await.unwrap();
    assert_eq!(session.samples.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_live_metrics_follow_frames() {
    let config = HubConfig {
        goal_distance_m: 1_000.0,
        ..Default::default()
    };
    let h = Harness::spawn(config);
    let trainer = PeripheralId::new("trainer");

    h.hub.connect(trainer.clone()).await.unwrap();
    h.sensors
        .send(MockSensorData::default().ftms_event(&trainer))
        .unwrap();
    h.hub.start_ride().await.unwrap();
    sleep_ms(1_500).await;

    let live = h.hub.live_metrics().await.unwrap();
    assert_eq!(live.power_watts, 200);
    assert_eq!(live.cadence_rpm, 90.0);
    assert_eq!(live.ride_state, RideState::Riding);
    assert_eq!(live.connection_state, ConnectionState::Connected);
    assert_eq!(live.current_lap, Some(1));
    assert!(live.has_goal);
    assert!(live.progress > 0.0 && live.progress < 0.01);

    let lap = h.hub.add_lap().await.unwrap();
    assert_eq!(lap, 2);
    assert_eq!(h.hub.live_metrics().await.unwrap().current_lap, Some(2));

    assert!(h
        .drain()
        .iter()
        .any(|e| matches!(e, RideEvent::Live(m) if m.power_watts == 200)));
}

#[tokio::test(start_paused = true)]
async fn test_unrequested_disconnect_counts_dropout_and_reconnects() {
    let h = Harness::spawn(HubConfig::default());
    let trainer = PeripheralId::new("trainer");

    h.hub.connect(trainer.clone()).await.unwrap();
    h.hub.start_ride().await.unwrap();
    sleep_ms(100).await;

    h.sensors
        .send(SensorEvent::Disconnected {
            peripheral: trainer.clone(),
            error: Some("link lost".to_string()),
        })
        .unwrap();
    sleep_ms(500).await;
    assert_eq!(
        h.hub.live_metrics().await.unwrap().connection_state,
        ConnectionState::Disconnected
    );

    // Default retry interval is 3 s
    sleep_ms(3_000).await;
    assert_eq!(
        h.hub.live_metrics().await.unwrap().connection_state,
        ConnectionState::Connected
    );
    assert_eq!(h.transport.connect_requests().len(), 2);

    let session = h.hub.end_ride().await.unwrap();
    assert_eq!(session.dropout_count, 1);

    assert_eq!(
        connection_changes(&h.drain()),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_user_disconnect_is_not_a_dropout() {
    let h = Harness::spawn(HubConfig::default());
    let trainer = PeripheralId::new("trainer");

    h.hub.connect(trainer.clone()).await.unwrap();
    h.hub.start_ride().await.unwrap();
    sleep_ms(100).await;
    h.hub.disconnect(trainer).await.unwrap();
    sleep_ms(5_000).await;

    let session = h.hub.end_ride().await.unwrap();
    assert_eq!(session.dropout_count, 0);
    assert_eq!(h.transport.connect_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_intervals_still_tick() {
    let config = HubConfig {
        recorder: RecorderConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        },
        live_publish_interval: Duration::ZERO,
        ..Default::default()
    };
    let h = Harness::spawn(config);

    h.hub.start_ride().await.unwrap();
    sleep_ms(20).await;
    let session = h.hub.end_ride().await.unwrap();

    assert!(!session.samples.is_empty());
    assert!(h.drain().iter().any(|e| matches!(e, RideEvent::Live(_))));
    assert!(!h.task.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_commands_are_rejected() {
    let h = Harness::spawn(HubConfig::default());

    assert!(matches!(
        h.hub.end_ride().await,
        Err(HubError::Recorder(RecorderError::NotRiding(RideState::Idle)))
    ));
    assert!(h.hub.pause_ride().await.is_err());
    assert!(h.hub.add_lap().await.is_err());

    h.hub.start_ride().await.unwrap();
    assert!(matches!(
        h.hub.start_ride().await,
        Err(HubError::Recorder(RecorderError::NotIdle(RideState::Riding)))
    ));
    assert_eq!(finished_count(&h.drain()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_hub() {
    let h = Harness::spawn(HubConfig::default());

    h.hub.shutdown().await.unwrap();
    h.task.await.unwrap();

    assert!(matches!(h.hub.start_ride().await, Err(HubError::Closed)));
}
