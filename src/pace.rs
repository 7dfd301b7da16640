use serde::Serialize;

use crate::error::{Result, TrackError};
use crate::noise::NoiseSource;
use crate::route::RouteModel;

/// Number of intervals in the pace chart (the chart has one more sample).
pub const PACE_CHART_INTERVALS: usize = 50;

/// Fastest and slowest pace shown on the chart, in seconds per kilometer.
const CHART_PACE_RANGE: (f64, f64) = (180.0, 720.0);

/// Slowest accepted pace, in seconds per kilometer (one hour per km).
pub const MAX_PACE_SECONDS_PER_KM: f64 = 3600.0;

/// Target pace and how much it may oscillate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaceConfig {
    base_seconds_per_km: f64,
    consistency_percent: u8,
}

impl PaceConfig {
    pub fn new(base_seconds_per_km: f64, consistency_percent: u8) -> Result<Self> {
        if !base_seconds_per_km.is_finite()
            || base_seconds_per_km <= 0.0
            || base_seconds_per_km > MAX_PACE_SECONDS_PER_KM
        {
            return Err(TrackError::InvalidOptions(format!(
                "pace must be between 0 and {MAX_PACE_SECONDS_PER_KM} seconds per km, got {base_seconds_per_km}"
            )));
        }
        if consistency_percent > 100 {
            return Err(TrackError::InvalidOptions(format!(
                "consistency must be between 0 and 100, got {consistency_percent}"
            )));
        }
        Ok(Self {
            base_seconds_per_km,
            consistency_percent,
        })
    }

    pub fn base_seconds_per_km(&self) -> f64 {
        self.base_seconds_per_km
    }

    pub fn consistency_percent(&self) -> u8 {
        self.consistency_percent
    }

    /// Consistency as a fraction in `[0, 1]`.
    pub fn variation(&self) -> f64 {
        self.consistency_percent as f64 / 100.0
    }
}

/// One point of the pace chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaceSample {
    pub distance_km: f64,
    pub pace_minutes_per_km: f64,
}

/// Pace curve preview along the route.
///
/// Unlike the synthesized timestamps this curve mixes a fast sine with
/// random wobble, so it is only a visual hint of the variation.
pub fn pace_profile(
    distance_km: f64,
    pace: &PaceConfig,
    noise: &mut dyn NoiseSource,
) -> Vec<PaceSample> {
    let base = pace.base_seconds_per_km();
    (0..=PACE_CHART_INTERVALS)
        .map(|i| {
            let mut seconds = base;
            if pace.consistency_percent() > 0 {
                let wobble = (i as f64 * 0.3).sin() * 0.3 + noise.uniform(0.5);
                seconds = (base * (1.0 + wobble * pace.variation()))
                    .clamp(CHART_PACE_RANGE.0, CHART_PACE_RANGE.1);
            }
            PaceSample {
                distance_km: distance_km * i as f64 / PACE_CHART_INTERVALS as f64,
                pace_minutes_per_km: seconds / 60.0,
            }
        })
        .collect()
}

/// Format a pace in seconds as `m:ss`.
pub fn format_pace(seconds: f64) -> String {
    let total = seconds.max(0.0);
    let minutes = (total / 60.0).floor() as u64;
    let secs = (total % 60.0).floor() as u64;
    format!("{minutes}:{secs:02}")
}

/// Format a duration in minutes as `h:mm:ss`, or `m:ss` under an hour.
pub fn format_duration(minutes: f64) -> String {
    let minutes = minutes.max(0.0);
    let hours = (minutes / 60.0).floor() as u64;
    let mins = (minutes % 60.0).floor() as u64;
    let secs = ((minutes % 1.0) * 60.0).floor() as u64;
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

/// Summary numbers shown next to the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub elevation_gain_m: f64,
    pub pending_elevations: usize,
    pub pace_label: String,
    pub duration_label: String,
}

impl RouteStats {
    pub fn compute(route: &RouteModel, pace: &PaceConfig) -> Self {
        let duration_minutes = route.duration_minutes(pace.base_seconds_per_km());
        Self {
            distance_km: route.total_distance_km(),
            duration_minutes,
            elevation_gain_m: route.elevation_gain_meters().round(),
            pending_elevations: route.pending_count(),
            pace_label: format_pace(pace.base_seconds_per_km()),
            duration_label: format_duration(duration_minutes),
        }
    }
}
