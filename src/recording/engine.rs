//! Ride session engine.
//!
//! Owns the ride lifecycle (`Idle -> Riding <-> Paused -> Ended -> Idle`),
//! the pause-excluded elapsed clock, per-tick sampling and lap splits.
//!
//! The engine never reads the clock itself; callers pass `now` in. Ticks
//! carry the generation returned by `start`/`resume`, and every transition
//! that suspends sampling bumps the generation so late ticks are ignored.

use crate::recording::accumulator::{LapAccumulator, SessionAccumulator};
use crate::recording::types::{
    EnergySource, Lap, RecorderConfig, RecorderError, RideSession, RideState, TimeSeriesPoint,
    MIN_TICK_INTERVAL,
};
use crate::telemetry::store::LiveTelemetrySample;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Drives one ride at a time from start to finalized session.
pub struct RideSessionEngine {
    config: RecorderConfig,
    state: RideState,
    session_id: Uuid,
    started_at: Option<DateTime<Utc>>,
    pause_started_at: Option<DateTime<Utc>>,
    paused_total: Duration,
    final_elapsed: Option<Duration>,
    tick_generation: u64,
    accumulator: SessionAccumulator,
    lap: Option<LapAccumulator>,
    laps: Vec<Lap>,
    samples: Vec<TimeSeriesPoint>,
    dropout_count: u32,
    last_sample: LiveTelemetrySample,
}

impl RideSessionEngine {
    pub fn new(mut config: RecorderConfig) -> Self {
        config.tick_interval = config.tick_interval.max(MIN_TICK_INTERVAL);
        Self {
            config,
            state: RideState::Idle,
            session_id: Uuid::nil(),
            started_at: None,
            pause_started_at: None,
            paused_total: Duration::zero(),
            final_elapsed: None,
            tick_generation: 0,
            accumulator: SessionAccumulator::default(),
            lap: None,
            laps: Vec::new(),
            samples: Vec::new(),
            dropout_count: 0,
            last_sample: LiveTelemetrySample::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RecorderConfig::default())
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RideState {
        self.state
    }

    /// Generation that ticks must carry to be applied.
    pub fn tick_generation(&self) -> u64 {
        self.tick_generation
    }

    /// Start a new ride. Returns the tick generation to schedule.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<u64, RecorderError> {
        if self.state != RideState::Idle {
            return Err(RecorderError::NotIdle(self.state));
        }

        self.clear();
        self.session_id = Uuid::new_v4();
        self.started_at = Some(now);
        self.lap = Some(LapAccumulator::new(1, now, 0, 0.0));
        self.state = RideState::Riding;
        self.tick_generation += 1;

        tracing::info!("Started ride {}", self.session_id);
        Ok(self.tick_generation)
    }

    /// Sample one tick. Returns false when the tick was stale or the
    /// engine is not riding.
    pub fn tick(
        &mut self,
        generation: u64,
        now: DateTime<Utc>,
        sample: &LiveTelemetrySample,
    ) -> bool {
        if self.state != RideState::Riding || generation != self.tick_generation {
            tracing::trace!(
                "Ignoring tick gen {} (current {}, state {})",
                generation,
                self.tick_generation,
                self.state
            );
            return false;
        }

        let tick_secs = self.config.tick_interval.as_secs_f64();
        let elapsed = self.elapsed(now).num_seconds().max(0) as u32;

        self.accumulator.add(sample, tick_secs);
        if let Some(lap) = self.lap.as_mut() {
            lap.add(sample);
        }
        self.samples.push(TimeSeriesPoint {
            timestamp: now,
            elapsed_seconds: elapsed,
            power_watts: sample.power_watts,
            heart_rate_bpm: sample.heart_rate_bpm,
            cadence_rpm: sample.cadence_rpm,
            speed_kmh: sample.speed_kmh,
        });
        self.last_sample = *sample;
        true
    }

    /// Suspend sampling. Pause time stops counting towards elapsed.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), RecorderError> {
        if self.state != RideState::Riding {
            return Err(RecorderError::NotRiding(self.state));
        }

        self.pause_started_at = Some(now);
        self.state = RideState::Paused;
        self.tick_generation += 1;

        tracing::info!("Paused ride");
        Ok(())
    }

    /// Resume sampling. Returns the new tick generation.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<u64, RecorderError> {
        if self.state != RideState::Paused {
            return Err(RecorderError::NotPaused(self.state));
        }

        self.fold_pause(now);
        self.state = RideState::Riding;
        self.tick_generation += 1;

        tracing::info!("Resumed ride");
        Ok(self.tick_generation)
    }

    /// Split the current lap. Returns the number of the lap now open.
    pub fn add_lap(&mut self, now: DateTime<Utc>) -> Result<u32, RecorderError> {
        if !self.is_active() {
            return Err(RecorderError::NotRiding(self.state));
        }

        let elapsed = self.elapsed(now).num_seconds();
        let distance = self.accumulator.distance.distance_m();
        let next = self.close_lap(now, elapsed, distance) + 1;
        self.lap = Some(LapAccumulator::new(next, now, elapsed, distance));

        tracing::info!("Lap {} started", next);
        Ok(next)
    }

    /// Finalize the ride into a session.
    ///
    /// No further tick can mutate the returned session; the engine stays in
    /// `Ended` until [`reset`](Self::reset).
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<RideSession, RecorderError> {
        if !self.is_active() {
            return Err(RecorderError::NotRiding(self.state));
        }

        self.fold_pause(now);
        self.tick_generation += 1;

        let elapsed = self.elapsed_riding(now);
        self.final_elapsed = Some(elapsed);
        let duration_seconds = elapsed.num_seconds().max(0) as u32;
        let distance = self.accumulator.distance.distance_m();
        self.close_lap(now, duration_seconds as i64, distance);
        self.lap = None;

        let metrics = &self.accumulator.metrics;
        let avg_power = metrics.power.average() as f64;
        let (energy_kcal, energy_source) = match self.last_sample.total_energy_kcal {
            Some(kcal) if kcal > 0 => (kcal as f64, EnergySource::Device),
            _ => (
                avg_power * (duration_seconds as f64 / 3600.0) * 3.6,
                EnergySource::Estimated,
            ),
        };

        let session = RideSession {
            id: self.session_id,
            started_at: self.started_at.unwrap_or(now),
            ended_at: now,
            ride_type: self.config.ride_type,
            power: metrics.power.summary(),
            heart_rate: metrics.heart_rate.summary(),
            cadence: metrics.cadence.summary(),
            speed: metrics.speed.summary(),
            distance_meters: distance,
            distance_source: self.accumulator.distance.source(),
            duration_seconds,
            energy_kcal,
            energy_source,
            dropout_count: self.dropout_count,
            samples: std::mem::take(&mut self.samples),
            laps: std::mem::take(&mut self.laps),
            report: None,
        };

        self.state = RideState::Ended;
        tracing::info!(
            "Ended ride {}: {}s, {:.0}m, {} samples",
            session.id,
            session.duration_seconds,
            session.distance_meters,
            session.samples.len()
        );
        Ok(session)
    }

    /// Return to `Idle` after the settle delay.
    pub fn reset(&mut self) -> Result<(), RecorderError> {
        if self.state != RideState::Ended {
            return Err(RecorderError::NotEnded(self.state));
        }
        self.clear();
        self.state = RideState::Idle;
        Ok(())
    }

    /// Count a loss of every sensor during an active ride.
    pub fn note_dropout(&mut self) {
        if self.is_active() {
            self.dropout_count += 1;
            tracing::warn!("Sensor dropout #{} during ride", self.dropout_count);
        }
    }

    /// Pause-excluded time since the ride started.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.state {
            RideState::Idle => Duration::zero(),
            RideState::Riding => self.elapsed_riding(now),
            RideState::Paused => self.elapsed_riding(self.pause_started_at.unwrap_or(now)),
            RideState::Ended => self.final_elapsed.unwrap_or_else(Duration::zero),
        }
    }

    /// Distance covered so far in meters.
    pub fn distance_m(&self) -> f64 {
        self.accumulator.distance.distance_m()
    }

    /// Number of the lap currently open, if a ride is active.
    pub fn current_lap(&self) -> Option<u32> {
        self.lap.as_ref().map(|lap| lap.lap_number)
    }

    pub fn laps(&self) -> &[Lap] {
        &self.laps
    }

    pub fn samples(&self) -> &[TimeSeriesPoint] {
        &self.samples
    }

    pub fn dropout_count(&self) -> u32 {
        self.dropout_count
    }

    fn is_active(&self) -> bool {
        matches!(self.state, RideState::Riding | RideState::Paused)
    }

    fn elapsed_riding(&self, now: DateTime<Utc>) -> Duration {
        match self.started_at {
            Some(start) => (now - start - self.paused_total).max(Duration::zero()),
            None => Duration::zero(),
        }
    }

    fn fold_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.pause_started_at.take() {
            self.paused_total = self.paused_total + (now - paused_at).max(Duration::zero());
        }
    }

    /// Close the open lap into a record if laps are materialized. Returns
    /// the closed lap's number.
    fn close_lap(&mut self, now: DateTime<Utc>, elapsed_secs: i64, distance_m: f64) -> u32 {
        let Some(lap) = self.lap.as_ref() else {
            return 0;
        };
        if self.config.materialize_laps {
            self.laps.push(lap.close(now, elapsed_secs, distance_m));
        }
        lap.lap_number
    }

    fn clear(&mut self) {
        self.session_id = Uuid::nil();
        self.started_at = None;
        self.pause_started_at = None;
        self.paused_total = Duration::zero();
        self.final_elapsed = None;
        self.accumulator = SessionAccumulator::default();
        self.lap = None;
        self.laps.clear();
        self.samples.clear();
        self.dropout_count = 0;
        self.last_sample = LiveTelemetrySample::default();
    }
}
