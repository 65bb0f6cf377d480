//! Ride hub: the single owner of live telemetry and ride state.
//!
//! A tokio task drains one `select!` loop over commands, transport events,
//! reconnect retry ticks and its own timers. Frame merges, engine ticks and
//! lifecycle transitions therefore never interleave, so the sampler always
//! sees whole telemetry samples and a transition can cancel the tick timer
//! before any late tick is processed.
//!
//! Callers talk to the hub through a cloneable [`HubHandle`]; outbound
//! [`RideEvent`]s go out on a crossbeam channel.

use crate::metrics::report::RideReportGenerator;
use crate::recording::engine::RideSessionEngine;
use crate::recording::sink::SessionSink;
use crate::recording::types::{RecorderConfig, RecorderError, RideSession, RideState};
use crate::sensors::decoder::FrameDecoder;
use crate::sensors::supervisor::{ConnectionSupervisor, RetryTick, SensorTransport};
use crate::sensors::types::{
    ConnectionState, DiscoveredSensor, PeripheralId, SensorConfig, SensorEvent,
};
use crate::storage::config::AppConfig;
use crate::telemetry::live::{LiveMetrics, RideProgress};
use crate::telemetry::store::{DeviceProfile, LiveTelemetryStore};
use chrono::Utc;
use crossbeam::channel::Sender;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Periodic timers never run faster than this.
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Events published by the hub.
#[derive(Debug, Clone)]
pub enum RideEvent {
    /// Live metrics projection
    Live(LiveMetrics),
    /// The ride engine changed state
    StateChanged(RideState),
    /// Aggregate sensor connection state changed
    ConnectionChanged(ConnectionState),
    /// A sensor was found while scanning
    SensorDiscovered(DiscoveredSensor),
    /// A ride ended; sent exactly once per ride, report attached
    SessionFinished(RideSession),
}

/// Errors returned through a [`HubHandle`].
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Ride hub is not running")]
    Closed,

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub recorder: RecorderConfig,
    pub sensors: SensorConfig,
    /// Distance goal in meters, 0 = no goal
    pub goal_distance_m: f64,
    pub live_publish_interval: Duration,
    /// Earlier rides used for the report comparison line
    pub previous_sessions: Vec<RideSession>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig::default(),
            sensors: SensorConfig::default(),
            goal_distance_m: 0.0,
            live_publish_interval: Duration::from_secs(2),
            previous_sessions: Vec::new(),
        }
    }
}

impl HubConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            recorder: config.recording.to_recorder_config(),
            sensors: config.sensors.to_sensor_config(),
            goal_distance_m: config.display.goal_distance_m,
            live_publish_interval: config.recording.live_publish_interval(),
            previous_sessions: Vec::new(),
        }
    }
}

enum HubCommand {
    StartRide {
        response: oneshot::Sender<Result<(), RecorderError>>,
    },
    PauseRide {
        response: oneshot::Sender<Result<(), RecorderError>>,
    },
    ResumeRide {
        response: oneshot::Sender<Result<(), RecorderError>>,
    },
    AddLap {
        response: oneshot::Sender<Result<u32, RecorderError>>,
    },
    EndRide {
        response: oneshot::Sender<Result<RideSession, RecorderError>>,
    },
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    LiveMetrics {
        response: oneshot::Sender<LiveMetrics>,
    },
    DeviceProfile {
        peripheral: PeripheralId,
        response: oneshot::Sender<Option<DeviceProfile>>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum TimerEvent {
    Tick(u64),
    Publish(u64),
    Settle(u64),
}

/// A running timer and the generation its messages carry.
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl Timer {
    fn cancel(slot: &mut Option<Timer>) {
        if let Some(timer) = slot.take() {
            timer.handle.abort();
        }
    }
}

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    command_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn start_ride(&self) -> Result<(), HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::StartRide { response }, rx).await?.map_err(HubError::from)
    }

    pub async fn pause_ride(&self) -> Result<(), HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::PauseRide { response }, rx).await?.map_err(HubError::from)
    }

    pub async fn resume_ride(&self) -> Result<(), HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::ResumeRide { response }, rx).await?.map_err(HubError::from)
    }

    /// Split the lap. Returns the number of the new lap.
    pub async fn add_lap(&self) -> Result<u32, HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::AddLap { response }, rx).await?.map_err(HubError::from)
    }

    /// End the ride. Returns the finalized session with its report.
    pub async fn end_ride(&self) -> Result<RideSession, HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::EndRide { response }, rx).await?.map_err(HubError::from)
    }

    pub async fn connect(&self, peripheral: PeripheralId) -> Result<(), HubError> {
        self.send(HubCommand::Connect(peripheral)).await
    }

    pub async fn disconnect(&self, peripheral: PeripheralId) -> Result<(), HubError> {
        self.send(HubCommand::Disconnect(peripheral)).await
    }

    /// Current live metrics projection.
    pub async fn live_metrics(&self) -> Result<LiveMetrics, HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::LiveMetrics { response }, rx).await
    }

    /// Device facts gathered for a peripheral.
    pub async fn device_profile(
        &self,
        peripheral: PeripheralId,
    ) -> Result<Option<DeviceProfile>, HubError> {
        let (response, rx) = oneshot::channel();
        self.request(HubCommand::DeviceProfile { peripheral, response }, rx)
            .await
    }

    /// Stop the hub, disconnecting every sensor.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.command_tx.send(command).await.map_err(|_| HubError::Closed)
    }

    async fn request<R>(
        &self,
        command: HubCommand,
        rx: oneshot::Receiver<R>,
    ) -> Result<R, HubError> {
        self.send(command).await?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

/// The hub task state.
pub struct RideHub<T: SensorTransport> {
    store: LiveTelemetryStore,
    decoder: FrameDecoder,
    supervisor: ConnectionSupervisor<T>,
    engine: RideSessionEngine,
    reports: RideReportGenerator,
    sink: Box<dyn SessionSink>,
    history: Vec<RideSession>,
    goal_distance_m: f64,
    publish_interval: Duration,
    events_tx: Sender<RideEvent>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    tick_timer: Option<Timer>,
    publish_timer: Option<Timer>,
    settle_timer: Option<Timer>,
    next_timer_generation: u64,
    last_connection: ConnectionState,
}

impl<T: SensorTransport + 'static> RideHub<T> {
    /// Spawn the hub task. `sensor_rx` carries events from the transport.
    pub fn spawn(
        transport: T,
        config: HubConfig,
        sink: Box<dyn SessionSink>,
        events_tx: Sender<RideEvent>,
        sensor_rx: mpsc::UnboundedReceiver<SensorEvent>,
    ) -> (HubHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let hub = RideHub {
            store: LiveTelemetryStore::new(),
            decoder: FrameDecoder::new(),
            supervisor: ConnectionSupervisor::new(transport, config.sensors, retry_tx),
            engine: RideSessionEngine::new(config.recorder),
            reports: RideReportGenerator::new(),
            sink,
            history: config.previous_sessions,
            goal_distance_m: config.goal_distance_m,
            publish_interval: config.live_publish_interval,
            events_tx,
            timer_tx,
            tick_timer: None,
            publish_timer: None,
            settle_timer: None,
            next_timer_generation: 0,
            last_connection: ConnectionState::Disconnected,
        };

        let task = tokio::spawn(hub.run(command_rx, sensor_rx, retry_rx, timer_rx));
        (HubHandle { command_tx }, task)
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<HubCommand>,
        mut sensor_rx: mpsc::UnboundedReceiver<SensorEvent>,
        mut retry_rx: mpsc::UnboundedReceiver<RetryTick>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    ) {
        tracing::info!("Ride hub started");

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = sensor_rx.recv() => self.handle_sensor_event(event),
                Some(tick) = retry_rx.recv() => {
                    self.supervisor.on_retry_tick(&tick);
                    self.check_connection();
                }
                Some(timer) = timer_rx.recv() => self.handle_timer(timer),
            }
        }

        Timer::cancel(&mut self.tick_timer);
        Timer::cancel(&mut self.publish_timer);
        Timer::cancel(&mut self.settle_timer);
        self.supervisor.disconnect_all();
        tracing::info!("Ride hub stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::StartRide { response } => {
                let _ = response.send(self.start_ride());
            }
            HubCommand::PauseRide { response } => {
                let _ = response.send(self.pause_ride());
            }
            HubCommand::ResumeRide { response } => {
                let _ = response.send(self.resume_ride());
            }
            HubCommand::AddLap { response } => {
                let result = self.engine.add_lap(Utc::now());
                if result.is_ok() {
                    self.publish_live();
                }
                let _ = response.send(result);
            }
            HubCommand::EndRide { response } => {
                let _ = response.send(self.end_ride());
            }
            HubCommand::Connect(peripheral) => {
                self.supervisor.connect(&peripheral);
                self.check_connection();
            }
            HubCommand::Disconnect(peripheral) => {
                self.supervisor.disconnect(&peripheral);
                self.check_connection();
            }
            HubCommand::LiveMetrics { response } => {
                let _ = response.send(self.live_metrics());
            }
            HubCommand::DeviceProfile {
                peripheral,
                response,
            } => {
                let _ = response.send(self.store.device(&peripheral).cloned());
            }
            HubCommand::Shutdown => {}
        }
    }

    fn handle_sensor_event(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Frame {
                peripheral,
                characteristic,
                data,
            } => match self.decoder.decode_uuid(&peripheral, characteristic, &data) {
                Ok(Some(update)) => self.store.apply(&peripheral, update, Utc::now()),
                Ok(None) => {}
                Err(e) => tracing::trace!("Dropped frame from {}: {}", peripheral, e),
            },
            SensorEvent::Connected(peripheral) => {
                self.decoder.reset_peripheral(&peripheral);
                self.supervisor.on_connected(&peripheral);
                self.check_connection();
            }
            SensorEvent::ConnectFailed { peripheral, error } => {
                self.supervisor.on_connect_failed(&peripheral, &error);
                self.check_connection();
            }
            SensorEvent::Disconnected { peripheral, error } => {
                self.decoder.reset_peripheral(&peripheral);
                self.supervisor.on_disconnected(&peripheral, error.as_deref());
                self.check_connection();
            }
            SensorEvent::Discovered(sensor) => {
                self.emit(RideEvent::SensorDiscovered(sensor));
            }
        }
    }

    fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::Tick(generation) => {
                let sample = self.store.snapshot();
                if self.engine.tick(generation, Utc::now(), &sample) {
                    self.publish_live();
                }
            }
            TimerEvent::Publish(generation) => {
                if is_current(&self.publish_timer, generation) {
                    self.publish_live();
                }
            }
            TimerEvent::Settle(generation) => {
                if !is_current(&self.settle_timer, generation) {
                    return;
                }
                self.settle_timer = None;
                if self.engine.reset().is_ok() {
                    tracing::info!("Ride settled, ready for a new ride");
                    self.emit(RideEvent::StateChanged(RideState::Idle));
                    self.publish_live();
                }
            }
        }
    }

    fn start_ride(&mut self) -> Result<(), RecorderError> {
        let generation = self.engine.start(Utc::now())?;
        self.start_tick_timer(generation);

        let period = self.publish_interval;
        let publish_generation = self.next_generation();
        Timer::cancel(&mut self.publish_timer);
        self.publish_timer = Some(Timer {
            generation: publish_generation,
            handle: spawn_interval(
                self.timer_tx.clone(),
                TimerEvent::Publish(publish_generation),
                period,
            ),
        });

        self.state_changed();
        Ok(())
    }

    fn pause_ride(&mut self) -> Result<(), RecorderError> {
        self.engine.pause(Utc::now())?;
        Timer::cancel(&mut self.tick_timer);
        self.state_changed();
        Ok(())
    }

    fn resume_ride(&mut self) -> Result<(), RecorderError> {
        let generation = self.engine.resume(Utc::now())?;
        self.start_tick_timer(generation);
        self.state_changed();
        Ok(())
    }

    fn end_ride(&mut self) -> Result<RideSession, RecorderError> {
        if !matches!(self.engine.state(), RideState::Riding | RideState::Paused) {
            return Err(RecorderError::NotRiding(self.engine.state()));
        }

        Timer::cancel(&mut self.tick_timer);
        Timer::cancel(&mut self.publish_timer);
        let mut session = self.engine.end(Utc::now())?;

        let report = self.reports.generate(&session, &self.history);
        session.attach_report(report.render());

        if let Err(e) = self.sink.save(&session) {
            tracing::warn!("Failed to persist ride {}: {}", session.id, e);
        }
        self.history.push(session.clone());
        self.emit(RideEvent::SessionFinished(session.clone()));
        self.state_changed();

        let settle_generation = self.next_generation();
        let delay = self.engine.config().settle_delay;
        let tx = self.timer_tx.clone();
        self.settle_timer = Some(Timer {
            generation: settle_generation,
            handle: tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(TimerEvent::Settle(settle_generation));
            }),
        });

        Ok(session)
    }

    /// Replace the tick timer. The old one is aborted before the new one exists.
    fn start_tick_timer(&mut self, engine_generation: u64) {
        Timer::cancel(&mut self.tick_timer);
        let period = self.engine.config().tick_interval;
        self.tick_timer = Some(Timer {
            generation: engine_generation,
            handle: spawn_interval(
                self.timer_tx.clone(),
                TimerEvent::Tick(engine_generation),
                period,
            ),
        });
    }

    fn check_connection(&mut self) {
        let current = self.supervisor.aggregate_state();
        if current == self.last_connection {
            return;
        }

        let lost = self.last_connection == ConnectionState::Connected
            && matches!(
                current,
                ConnectionState::Disconnected | ConnectionState::Connecting
            );
        if lost {
            self.engine.note_dropout();
        }

        self.last_connection = current;
        self.emit(RideEvent::ConnectionChanged(current));
        self.publish_live();
    }

    fn state_changed(&mut self) {
        self.emit(RideEvent::StateChanged(self.engine.state()));
        self.publish_live();
    }

    fn live_metrics(&self) -> LiveMetrics {
        let now = Utc::now();
        LiveMetrics::project(
            &self.store.snapshot(),
            RideProgress {
                elapsed: self.engine.elapsed(now).to_std().unwrap_or_default(),
                distance_m: self.engine.distance_m(),
                goal_distance_m: self.goal_distance_m,
                connection_state: self.supervisor.aggregate_state(),
                ride_state: self.engine.state(),
                current_lap: self.engine.current_lap(),
            },
        )
    }

    fn publish_live(&self) {
        self.emit(RideEvent::Live(self.live_metrics()));
    }

    fn emit(&self, event: RideEvent) {
        if self.events_tx.send(event).is_err() {
            tracing::trace!("No listener for ride events");
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.next_timer_generation += 1;
        self.next_timer_generation
    }
}

fn is_current(timer: &Option<Timer>, generation: u64) -> bool {
    timer.as_ref().is_some_and(|t| t.generation == generation)
}

fn spawn_interval(
    tx: mpsc::UnboundedSender<TimerEvent>,
    event: TimerEvent,
    period: Duration,
) -> JoinHandle<()> {
    let period = period.max(MIN_TIMER_PERIOD);
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            interval.tick().await;
            if tx.send(event).is_err() {
                break;
            }
        }
    })
}
