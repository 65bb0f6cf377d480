//! Connection supervision with flat-interval automatic reconnection.
//!
//! Per peripheral: `Disconnected -> Connecting -> Connected -> Disconnecting
//! -> Disconnected`, with a failed connect falling back to `Disconnected`.
//! An unrequested disconnect while the reconnect intent is set starts a retry
//! timer that fires every `reconnect_interval_secs` and re-attempts while the
//! peripheral is disconnected. At most one timer exists per peripheral: a new
//! timer aborts the old one, and ticks from an aborted timer are recognised by
//! their generation and ignored.

use crate::sensors::types::{ConnectionState, PeripheralId, SensorConfig};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Requests the supervisor makes of the radio transport.
///
/// Both calls return immediately; outcomes come back as
/// [`SensorEvent`](crate::sensors::types::SensorEvent)s.
pub trait SensorTransport: Send + Sync {
    /// Begin connecting to a peripheral.
    fn request_connect(&self, peripheral: &PeripheralId);

    /// Begin disconnecting from a peripheral.
    fn request_disconnect(&self, peripheral: &PeripheralId);
}

/// Message posted by a retry timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTick {
    pub peripheral: PeripheralId,
    pub generation: u64,
}

#[derive(Debug)]
struct RetryTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct PeripheralLink {
    state: ConnectionState,
    auto_reconnect: bool,
    retry: Option<RetryTimer>,
    reconnect_attempts: u32,
}

/// Tracks connection state for every known peripheral.
pub struct ConnectionSupervisor<T: SensorTransport> {
    transport: T,
    config: SensorConfig,
    links: HashMap<PeripheralId, PeripheralLink>,
    retry_tx: mpsc::UnboundedSender<RetryTick>,
    next_generation: u64,
}

impl<T: SensorTransport> ConnectionSupervisor<T> {
    /// Create a supervisor. Retry ticks are posted to `retry_tx` and must be
    /// fed back through [`on_retry_tick`](Self::on_retry_tick).
    pub fn new(
        transport: T,
        config: SensorConfig,
        retry_tx: mpsc::UnboundedSender<RetryTick>,
    ) -> Self {
        Self {
            transport,
            config,
            links: HashMap::new(),
            retry_tx,
            next_generation: 0,
        }
    }

    /// User-initiated connect. Sets the reconnect intent from configuration.
    pub fn connect(&mut self, peripheral: &PeripheralId) {
        let auto_reconnect = self.config.auto_reconnect;
        let link = self.links.entry(peripheral.clone()).or_default();
        link.auto_reconnect = auto_reconnect;
        link.reconnect_attempts = 0;

        if link.state != ConnectionState::Disconnected {
            tracing::debug!("Connect ignored for {} in state {:?}", peripheral, link.state);
            return;
        }

        tracing::info!("Connecting to sensor: {}", peripheral);
        link.state = ConnectionState::Connecting;
        self.transport.request_connect(peripheral);
    }

    /// User-initiated disconnect. Clears the reconnect intent and any retry timer.
    pub fn disconnect(&mut self, peripheral: &PeripheralId) {
        let Some(link) = self.links.get_mut(peripheral) else {
            return;
        };
        link.auto_reconnect = false;
        cancel_retry(link);

        match link.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                tracing::info!("Disconnecting from sensor: {}", peripheral);
                link.state = ConnectionState::Disconnecting;
                self.transport.request_disconnect(peripheral);
            }
            ConnectionState::Disconnecting | ConnectionState::Disconnected => {}
        }
    }

    /// Disconnect every peripheral and drop all reconnect intent.
    pub fn disconnect_all(&mut self) {
        let ids: Vec<PeripheralId> = self.links.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id);
        }
    }

    /// The transport finished connecting.
    pub fn on_connected(&mut self, peripheral: &PeripheralId) {
        let link = self.links.entry(peripheral.clone()).or_default();
        if link.state == ConnectionState::Disconnecting {
            // Raced with a user disconnect; the transport will report the disconnect next.
            tracing::debug!("Connected to {} while disconnecting", peripheral);
            return;
        }
        link.state = ConnectionState::Connected;
        link.reconnect_attempts = 0;
        cancel_retry(link);
        tracing::info!("Connected to sensor: {}", peripheral);
    }

    /// A connect attempt failed.
    pub fn on_connect_failed(&mut self, peripheral: &PeripheralId, error: &str) {
        let link = self.links.entry(peripheral.clone()).or_default();
        tracing::warn!("Connection to {} failed: {}", peripheral, error);
        link.state = ConnectionState::Disconnected;
    }

    /// The peripheral disconnected. `error` is set for unrequested disconnects.
    pub fn on_disconnected(&mut self, peripheral: &PeripheralId, error: Option<&str>) {
        let link = self.links.entry(peripheral.clone()).or_default();
        link.state = ConnectionState::Disconnected;

        match error {
            Some(error) if link.auto_reconnect => {
                tracing::warn!(
                    "Sensor {} dropped ({}), retrying every {}s",
                    peripheral,
                    error,
                    self.config.reconnect_interval_secs
                );
                self.next_generation += 1;
                let generation = self.next_generation;
                let period = Duration::from_secs(self.config.reconnect_interval_secs);
                let handle = spawn_retry_timer(
                    self.retry_tx.clone(),
                    RetryTick {
                        peripheral: peripheral.clone(),
                        generation,
                    },
                    period,
                );
                cancel_retry(link);
                link.retry = Some(RetryTimer { generation, handle });
            }
            Some(error) => {
                tracing::warn!("Sensor {} dropped ({}), auto-reconnect off", peripheral, error);
            }
            None => {
                tracing::info!("Sensor {} disconnected", peripheral);
                cancel_retry(link);
            }
        }
    }

    /// Handle a tick from a retry timer.
    pub fn on_retry_tick(&mut self, tick: &RetryTick) {
        let Some(link) = self.links.get_mut(&tick.peripheral) else {
            return;
        };

        let current = link.retry.as_ref().map(|t| t.generation);
        if current != Some(tick.generation) {
            tracing::trace!("Stale retry tick for {}", tick.peripheral);
            return;
        }

        if !link.auto_reconnect || link.state == ConnectionState::Connected {
            cancel_retry(link);
            return;
        }

        if link.state != ConnectionState::Disconnected {
            // Attempt still in flight.
            return;
        }

        if let Some(max) = self.config.max_reconnect_attempts {
            if link.reconnect_attempts >= max {
                tracing::warn!("Giving up on {} after {} attempts", tick.peripheral, max);
                link.auto_reconnect = false;
                cancel_retry(link);
                return;
            }
        }

        link.reconnect_attempts += 1;
        link.state = ConnectionState::Connecting;
        tracing::info!(
            "Reconnect attempt {} for {}",
            link.reconnect_attempts,
            tick.peripheral
        );
        self.transport.request_connect(&tick.peripheral);
    }

    /// Connection state of one peripheral.
    pub fn state(&self, peripheral: &PeripheralId) -> ConnectionState {
        self.links
            .get(peripheral)
            .map(|l| l.state)
            .unwrap_or_default()
    }

    /// Aggregate state: connected iff any peripheral is connected.
    ///
    /// With the connected set empty the aggregate is `Disconnected` unless a
    /// link is mid-transition: `Connecting` while an attempt (or retry) is in
    /// flight, `Disconnecting` while a user-requested disconnect completes.
    /// Those two let the hub tell a dropout from a requested disconnect.
    pub fn aggregate_state(&self) -> ConnectionState {
        let states = || self.links.values().map(|l| l.state);
        if states().any(|s| s == ConnectionState::Connected) {
            ConnectionState::Connected
        } else if states().any(|s| s == ConnectionState::Connecting) {
            ConnectionState::Connecting
        } else if states().any(|s| s == ConnectionState::Disconnecting) {
            ConnectionState::Disconnecting
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Peripherals currently connected.
    pub fn connected_peripherals(&self) -> Vec<PeripheralId> {
        let mut ids: Vec<PeripheralId> = self
            .links
            .iter()
            .filter(|(_, l)| l.state == ConnectionState::Connected)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether a retry timer is outstanding for a peripheral.
    pub fn has_retry_timer(&self, peripheral: &PeripheralId) -> bool {
        self.links
            .get(peripheral)
            .is_some_and(|l| l.retry.is_some())
    }
}

impl<T: SensorTransport> Drop for ConnectionSupervisor<T> {
    fn drop(&mut self) {
        for link in self.links.values_mut() {
            cancel_retry(link);
        }
    }
}

fn cancel_retry(link: &mut PeripheralLink) {
    if let Some(timer) = link.retry.take() {
        timer.handle.abort();
    }
}

fn spawn_retry_timer(
    tx: mpsc::UnboundedSender<RetryTick>,
    tick: RetryTick,
    period: Duration,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            interval.tick().await;
            if tx.send(tick.clone()).is_err() {
                break;
            }
        }
    })
}
