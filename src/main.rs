//! RideLink - headless ride recorder
//!
//! Scans for fitness sensors, connects to every one found, records a ride
//! until Ctrl-C and saves it with its report.

use anyhow::Context;
use ridelink::hub::{HubConfig, RideEvent, RideHub};
use ridelink::recording::sink::JsonFileSink;
use ridelink::sensors::manager::SensorManager;
use ridelink::storage::config::{load_config, DisplayMetric};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RideLink v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;

    let (sensor_tx, sensor_rx) = mpsc::unbounded_channel();
    let manager = SensorManager::initialize(config.sensors.to_sensor_config(), sensor_tx)
        .await
        .context("Failed to initialize Bluetooth")?;

    let sink = JsonFileSink::new(config.rides_dir());
    let mut hub_config = HubConfig::from_app_config(&config);
    hub_config.previous_sessions = sink.load_all().unwrap_or_else(|e| {
        tracing::warn!("Could not read ride history: {}", e);
        Vec::new()
    });

    let (events_tx, events_rx) = crossbeam::channel::unbounded();
    let (hub, hub_task) = RideHub::spawn(
        manager.clone(),
        hub_config,
        Box::new(sink),
        events_tx,
        sensor_rx,
    );

    let display = config.display.metrics.clone();
    std::thread::spawn(move || {
        for event in events_rx.iter() {
            log_event(&event, &display);
        }
    });

    let sensors = manager.discover().await.context("Sensor discovery failed")?;
    if sensors.is_empty() {
        tracing::warn!("No fitness sensors found; recording without live data");
    }
    for sensor in &sensors {
        hub.connect(sensor.peripheral.clone()).await?;
    }

    hub.start_ride().await?;
    tracing::info!("Riding. Press Ctrl-C to finish.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let session = hub.end_ride().await?;
    tracing::info!(
        "Ride {} saved: {:.2} km in {} min, {:.0} kcal",
        session.id,
        session.distance_meters / 1000.0,
        session.duration_seconds / 60,
        session.energy_kcal
    );
    if let Some(report) = &session.report {
        for line in report.lines() {
            tracing::info!("{}", line);
        }
    }

    hub.shutdown().await?;
    let _ = hub_task.await;
    manager.shutdown().await;

    Ok(())
}

fn log_event(event: &RideEvent, display: &[DisplayMetric]) {
    match event {
        RideEvent::Live(metrics) => {
            if metrics.elapsed_seconds % 10 != 0 {
                return;
            }
            let values: Vec<String> = display
                .iter()
                .map(|m| format!("{} {}", m, metrics.format_metric(*m)))
                .collect();
            let goal = if metrics.has_goal {
                format!(" ({:.0}% of goal)", metrics.progress * 100.0)
            } else {
                String::new()
            };
            tracing::info!(
                "[{}] {} | {:.2} km{}",
                metrics.elapsed_display(),
                values.join(" | "),
                metrics.distance_km,
                goal
            );
        }
        RideEvent::StateChanged(state) => tracing::info!("Ride state: {}", state),
        RideEvent::ConnectionChanged(state) => tracing::info!("Sensors: {}", state),
        RideEvent::SensorDiscovered(_) => {}
        RideEvent::SessionFinished(session) => {
            tracing::debug!("Session {} handed off", session.id)
        }
    }
}
