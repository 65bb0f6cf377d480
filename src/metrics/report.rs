//! Post-ride report.
//!
//! Pure analysis over a finished `RideSession` and, optionally, earlier
//! sessions: comparison with the previous ride, heart rate drift, cadence
//! pattern, best 30 s power and a short recommendation.

use crate::metrics::smoothing::best_window_average;
use crate::recording::types::{RideSession, TimeSeriesPoint};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Heart rate drift between the first and second half of the ride.
///
/// `drift` is measured from the ride's midpoint: half the gap between the
/// second-half and first-half means, in BPM. Three size buckets; a falling
/// heart rate counts as stable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HrDrift {
    /// Fewer heart-rate-bearing samples than needed
    InsufficientData,
    Stable { drift: f32 },
    ModerateRise { drift: f32 },
    HighRise { drift: f32 },
}

impl HrDrift {
    fn classify(drift: f32) -> Self {
        if drift > 10.0 {
            HrDrift::HighRise { drift }
        } else if drift >= 5.0 {
            HrDrift::ModerateRise { drift }
        } else {
            HrDrift::Stable { drift }
        }
    }

    fn describe(&self) -> String {
        match self {
            HrDrift::InsufficientData => "Heart rate drift: insufficient data".to_string(),
            HrDrift::Stable { drift } => {
                format!("Heart rate stayed stable ({:+.1} bpm)", drift)
            }
            HrDrift::ModerateRise { drift } => {
                format!("Heart rate drifted up moderately ({:+.1} bpm)", drift)
            }
            HrDrift::HighRise { drift } => format!(
                "Heart rate drifted up strongly ({:+.1} bpm), watch hydration and fatigue",
                drift
            ),
        }
    }
}

/// Cadence in the last quarter of the ride compared with the whole ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadencePattern {
    NoData,
    /// Last quarter more than 10% below the ride average
    Fade,
    Steady,
    /// Last quarter more than 10% above the ride average
    Sprint,
}

impl CadencePattern {
    fn describe(&self) -> &'static str {
        match self {
            CadencePattern::NoData => "No cadence data",
            CadencePattern::Fade => "Cadence faded in the final quarter",
            CadencePattern::Steady => "Cadence held steady to the finish",
            CadencePattern::Sprint => "Strong finish: cadence picked up in the final quarter",
        }
    }
}

/// Structured post-ride analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideReport {
    /// Comparison with the most recent earlier ride
    pub comparison: String,
    pub hr_drift: HrDrift,
    pub cadence_pattern: CadencePattern,
    /// Best sustained 30 s average power
    pub best_30s_power: Option<f32>,
    pub recommendation: String,
}

impl RideReport {
    /// Render the report as plain text, one finding per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.comparison);
        let _ = writeln!(out, "{}", self.hr_drift.describe());
        let _ = writeln!(out, "{}", self.cadence_pattern.describe());
        if let Some(power) = self.best_30s_power {
            let _ = writeln!(out, "Best 30 s power: {:.0} W", power);
        }
        out.push_str(&self.recommendation);
        out
    }
}

/// Generates [`RideReport`]s.
#[derive(Debug, Clone)]
pub struct RideReportGenerator {
    /// Minimum heart-rate-bearing samples for drift analysis
    pub min_hr_samples: usize,
    /// Window for the best sustained power highlight, in samples
    pub power_window: usize,
}

impl Default for RideReportGenerator {
    fn default() -> Self {
        Self {
            min_hr_samples: 10,
            power_window: 30,
        }
    }
}

impl RideReportGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyse `session`. `previous` may hold earlier sessions in any order.
    pub fn generate(&self, session: &RideSession, previous: &[RideSession]) -> RideReport {
        RideReport {
            comparison: comparison_line(session, previous),
            hr_drift: self.hr_drift(&session.samples),
            cadence_pattern: cadence_pattern(&session.samples),
            best_30s_power: best_window_average(
                session.samples.iter().map(|p| p.power_watts),
                self.power_window,
            ),
            recommendation: recommendation(session),
        }
    }

    /// Drift over samples with a known heart rate.
    pub fn hr_drift(&self, samples: &[TimeSeriesPoint]) -> HrDrift {
        let hr: Vec<f32> = samples
            .iter()
            .filter(|p| p.heart_rate_bpm > 0)
            .map(|p| p.heart_rate_bpm as f32)
            .collect();

        if hr.len() < self.min_hr_samples.max(2) {
            return HrDrift::InsufficientData;
        }

        let (first, second) = hr.split_at(hr.len() / 2);
        HrDrift::classify((mean(second) - mean(first)) / 2.0)
    }
}

/// Last-quarter cadence against the ride average.
pub fn cadence_pattern(samples: &[TimeSeriesPoint]) -> CadencePattern {
    if samples.len() < 4 {
        return CadencePattern::NoData;
    }

    let cadence: Vec<f32> = samples.iter().map(|p| p.cadence_rpm).collect();
    let overall = mean(&cadence);
    if overall <= 0.0 {
        return CadencePattern::NoData;
    }

    let last_quarter = &cadence[cadence.len() - cadence.len() / 4..];
    let ratio = mean(last_quarter) / overall;
    if ratio < 0.9 {
        CadencePattern::Fade
    } else if ratio > 1.1 {
        CadencePattern::Sprint
    } else {
        CadencePattern::Steady
    }
}

fn comparison_line(session: &RideSession, previous: &[RideSession]) -> String {
    let last = previous
        .iter()
        .filter(|p| p.id != session.id && p.started_at < session.started_at)
        .max_by_key(|p| p.started_at);

    let Some(last) = last else {
        return format!(
            "First recorded ride: {:.1} km in {} min",
            session.distance_meters / 1000.0,
            session.duration_seconds / 60
        );
    };

    let power_delta = session.power.avg - last.power.avg;
    let distance_delta_km = (session.distance_meters - last.distance_meters) / 1000.0;
    format!(
        "Avg power {:.0} W ({:+.0} W vs last ride), distance {:.1} km ({:+.1} km)",
        session.power.avg,
        power_delta,
        session.distance_meters / 1000.0,
        distance_delta_km
    )
}

fn recommendation(session: &RideSession) -> String {
    let avg_hr = session.heart_rate.avg;
    let minutes = session.duration_seconds / 60;

    if avg_hr > 0.0 {
        return if avg_hr >= 160.0 {
            "Hard effort. Plan an easy recovery ride next.".to_string()
        } else if avg_hr >= 140.0 {
            "Solid aerobic work. Keep building with rides like this.".to_string()
        } else {
            "Easy effort. Good for recovery; add some intensity next time.".to_string()
        };
    }

    // No heart rate recorded: fall back to power and duration
    if minutes < 20 {
        "Short ride. Aim for at least 30 minutes next time.".to_string()
    } else if session.power.avg >= 200.0 {
        "Strong power output. Give yourself a recovery day.".to_string()
    } else {
        "Steady session. Try extending the next ride to build endurance.".to_string()
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
