//! Sensor manager for BLE device discovery and connection.
//!
//! The btleplug-backed radio transport. Scanning returns classified
//! fitness peripherals; connect and disconnect requests from the
//! connection supervisor run as background tasks that report back through
//! the `SensorEvent` channel. Once connected, every notification and every
//! readable device-information or supported-range value is forwarded as a
//! raw `SensorEvent::Frame`; decoding happens in the ride hub.

use crate::sensors::gatt::{classify_services, Characteristic, SCAN_SERVICES};
use crate::sensors::supervisor::SensorTransport;
use crate::sensors::types::{
    DiscoveredSensor, PeripheralId, SensorConfig, SensorError, SensorEvent,
};
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// State shared between the manager and its connection tasks.
#[derive(Default)]
struct Links {
    /// Connection/notification task per peripheral
    tasks: HashMap<PeripheralId, JoinHandle<()>>,
    /// Connected peripherals
    connected: HashMap<PeripheralId, Peripheral>,
}

/// Manages BLE sensor discovery, connection, and data streaming.
#[derive(Clone)]
pub struct SensorManager {
    /// Configuration
    config: SensorConfig,
    /// BLE adapter
    adapter: Adapter,
    /// Channel into the ride hub
    event_tx: mpsc::UnboundedSender<SensorEvent>,
    links: Arc<Mutex<Links>>,
}

impl SensorManager {
    /// Initialize the first BLE adapter on the system.
    pub async fn initialize(
        config: SensorConfig,
        event_tx: mpsc::UnboundedSender<SensorEvent>,
    ) -> Result<Self, SensorError> {
        tracing::info!("Initializing SensorManager");

        let manager = Manager::new()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");
        Ok(Self {
            config,
            adapter,
            event_tx,
            links: Arc::new(Mutex::new(Links::default())),
        })
    }

    /// Scan for fitness sensors for the configured discovery timeout.
    pub async fn discover(&self) -> Result<Vec<DiscoveredSensor>, SensorError> {
        let scan_filter = ScanFilter {
            services: SCAN_SERVICES.to_vec(),
        };

        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        tracing::info!(
            "Starting sensor discovery ({}s)",
            self.config.discovery_timeout_secs
        );
        self.adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

        let mut found: HashMap<PeripheralId, DiscoveredSensor> = HashMap::new();
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.discovery_timeout_secs);

        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.next()).await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };
            let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                continue;
            };
            let Some(sensor) = classify_peripheral(&peripheral).await else {
                continue;
            };
            if !found.contains_key(&sensor.peripheral) {
                tracing::info!(
                    "Discovered {} ({}) at {}",
                    sensor.name,
                    sensor.sensor_type,
                    sensor.peripheral
                );
                let _ = self.event_tx.send(SensorEvent::Discovered(sensor.clone()));
            }
            found.insert(sensor.peripheral.clone(), sensor);
        }

        self.adapter
            .stop_scan()
            .await
            .map_err(|e| SensorError::ScanFailed(e.to_string()))?;
        tracing::info!("Discovery finished, {} sensor(s) found", found.len());

        let mut sensors: Vec<DiscoveredSensor> = found.into_values().collect();
        sensors.sort_by(|a, b| a.peripheral.cmp(&b.peripheral));
        Ok(sensors)
    }

    /// Abort all link tasks and disconnect every peripheral.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down SensorManager");

        let peripherals: Vec<Peripheral> = {
            let mut links = lock(&self.links);
            for (_, task) in links.tasks.drain() {
                task.abort();
            }
            links.connected.drain().map(|(_, p)| p).collect()
        };

        for peripheral in peripherals {
            if let Err(e) = peripheral.disconnect().await {
                tracing::warn!("Disconnect during shutdown failed: {}", e);
            }
        }
    }
}

impl SensorTransport for SensorManager {
    fn request_connect(&self, peripheral: &PeripheralId) {
        let task = tokio::spawn(run_link(
            self.adapter.clone(),
            peripheral.clone(),
            self.event_tx.clone(),
            self.links.clone(),
            Duration::from_secs(self.config.connection_timeout_secs),
        ));

        if let Some(previous) = lock(&self.links).tasks.insert(peripheral.clone(), task) {
            previous.abort();
        }
    }

    fn request_disconnect(&self, peripheral: &PeripheralId) {
        let (task, connected) = {
            let mut links = lock(&self.links);
            (
                links.tasks.remove(peripheral),
                links.connected.remove(peripheral),
            )
        };
        if let Some(task) = task {
            task.abort();
        }

        let event_tx = self.event_tx.clone();
        let id = peripheral.clone();
        tokio::spawn(async move {
            if let Some(p) = connected {
                if let Err(e) = p.disconnect().await {
                    tracing::warn!("Disconnect from {} failed: {}", id, e);
                }
            }
            let _ = event_tx.send(SensorEvent::Disconnected {
                peripheral: id,
                error: None,
            });
        });
    }
}

/// Connect, subscribe and forward frames until the link drops.
async fn run_link(
    adapter: Adapter,
    id: PeripheralId,
    event_tx: mpsc::UnboundedSender<SensorEvent>,
    links: Arc<Mutex<Links>>,
    connection_timeout: Duration,
) {
    let connect = tokio::time::timeout(connection_timeout, establish(&adapter, &id));
    let peripheral = match connect.await {
        Ok(Ok(peripheral)) => peripheral,
        Ok(Err(e)) => {
            let _ = event_tx.send(SensorEvent::ConnectFailed {
                peripheral: id,
                error: e.to_string(),
            });
            return;
        }
        Err(_) => {
            let _ = event_tx.send(SensorEvent::ConnectFailed {
                peripheral: id,
                error: SensorError::ConnectionTimeout.to_string(),
            });
            return;
        }
    };

    let mut notifications = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = peripheral.disconnect().await;
            let _ = event_tx.send(SensorEvent::ConnectFailed {
                peripheral: id,
                error: SensorError::SubscriptionFailed(e.to_string()).to_string(),
            });
            return;
        }
    };

    lock(&links).connected.insert(id.clone(), peripheral.clone());
    let _ = event_tx.send(SensorEvent::Connected(id.clone()));

    read_static_values(&peripheral, &id, &event_tx).await;

    while let Some(notification) = notifications.next().await {
        let frame = SensorEvent::Frame {
            peripheral: id.clone(),
            characteristic: notification.uuid,
            data: notification.value,
        };
        if event_tx.send(frame).is_err() {
            return;
        }
    }

    // Stream ended without a disconnect request
    let was_linked = {
        let mut links = lock(&links);
        if release_task(&mut links.tasks, &id, tokio::task::try_id()) {
            links.connected.remove(&id).is_some()
        } else {
            tracing::debug!("Link task for {} was superseded", id);
            false
        }
    };
    if was_linked {
        let _ = event_tx.send(SensorEvent::Disconnected {
            peripheral: id,
            error: Some("notification stream ended".to_string()),
        });
    }
}

/// Find, connect, discover services and subscribe to notified characteristics.
async fn establish(adapter: &Adapter, id: &PeripheralId) -> Result<Peripheral, SensorError> {
    tracing::info!("Connecting to sensor: {}", id);

    let peripherals = adapter
        .peripherals()
        .await
        .map_err(|e| SensorError::BleError(e.to_string()))?;

    let peripheral = peripherals
        .into_iter()
        .find(|p| p.id().to_string() == id.as_str())
        .ok_or_else(|| SensorError::SensorNotFound(id.clone()))?;

    peripheral
        .connect()
        .await
        .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

    peripheral
        .discover_services()
        .await
        .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

    for characteristic in peripheral.characteristics() {
        let Some(known) = Characteristic::from_uuid(characteristic.uuid) else {
            continue;
        };
        let can_notify = characteristic
            .properties
            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE);
        if known.is_notified() && can_notify {
            peripheral
                .subscribe(&characteristic)
                .await
                .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;
            tracing::debug!("Subscribed to {} on {}", known, id);
        }
    }

    Ok(peripheral)
}

/// Read device information strings and supported ranges once per link.
async fn read_static_values(
    peripheral: &Peripheral,
    id: &PeripheralId,
    event_tx: &mpsc::UnboundedSender<SensorEvent>,
) {
    for characteristic in peripheral.characteristics() {
        let Some(known) = Characteristic::from_uuid(characteristic.uuid) else {
            continue;
        };
        if known.is_notified() || !characteristic.properties.contains(CharPropFlags::READ) {
            continue;
        }
        match peripheral.read(&characteristic).await {
            Ok(data) => {
                let _ = event_tx.send(SensorEvent::Frame {
                    peripheral: id.clone(),
                    characteristic: characteristic.uuid,
                    data,
                });
            }
            Err(e) => tracing::debug!("Read of {} on {} failed: {}", known, id, e),
        }
    }
}

/// Classify a peripheral based on its advertised services.
async fn classify_peripheral(peripheral: &Peripheral) -> Option<DiscoveredSensor> {
    let properties = peripheral.properties().await.ok()??;
    let protocol = classify_services(&properties.services)?;

    Some(DiscoveredSensor {
        peripheral: PeripheralId::new(peripheral.id().to_string()),
        name: properties
            .local_name
            .unwrap_or_else(|| "Unknown Sensor".to_string()),
        sensor_type: protocol.sensor_type(),
        protocol,
        signal_strength: properties.rssi,
    })
}

fn lock(links: &Mutex<Links>) -> MutexGuard<'_, Links> {
    links.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop the task entry for `id` if it belongs to the calling task.
///
/// Returns false when a newer connect request has replaced the entry; that
/// task now owns the link and its handle must stay abortable.
fn release_task(
    tasks: &mut HashMap<PeripheralId, JoinHandle<()>>,
    id: &PeripheralId,
    current: Option<tokio::task::Id>,
) -> bool {
    match tasks.get(id) {
        Some(task) if current != Some(task.id()) => false,
        Some(_) => {
            tasks.remove(id);
            true
        }
        None => true,
    }
}
