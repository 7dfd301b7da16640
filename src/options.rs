use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Result, TrackError};
use crate::pace::PaceConfig;

/// Options for exporting the route as a GPX run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Name written to the GPX metadata and used for the file name (default: "Generated Run")
    #[serde(default = "default_run_name")]
    pub run_name: String,

    /// Start of the run (default: now)
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    /// Base pace in seconds per kilometer (default: 360)
    #[serde(default = "default_pace")]
    pub pace_seconds_per_km: f64,

    /// How much the pace oscillates, 0-100 (default: 0)
    #[serde(default)]
    pub consistency_percent: u8,

    /// Seed for the jitter terms; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            run_name: default_run_name(),
            start_time: None,
            pace_seconds_per_km: default_pace(),
            consistency_percent: 0,
            seed: None,
        }
    }
}

impl ExportOptions {
    pub fn pace_config(&self) -> Result<PaceConfig> {
        PaceConfig::new(self.pace_seconds_per_km, self.consistency_percent)
    }

    pub fn start_time_or_now(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or_else(Utc::now)
    }

    /// Run name with blank input replaced by the default.
    pub fn effective_run_name(&self) -> &str {
        let trimmed = self.run_name.trim();
        if trimmed.is_empty() {
            DEFAULT_RUN_NAME
        } else {
            &self.run_name
        }
    }
}

/// Constants of the track synthesis.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisConfig {
    /// Nominal seconds between consecutive fixes
    pub sample_interval_secs: f64,
    /// Full width of the positional jitter, in degrees (~3 m)
    pub gps_accuracy_deg: f64,
    /// Half-width of the elevation noise, in meters
    pub elevation_noise_m: f64,
    /// Elevation used when no samples exist, in meters
    pub fallback_elevation_m: f64,
    /// Shortest allowed step between fixes, in seconds
    pub min_step_secs: f64,
    /// Longest allowed step between fixes, in seconds
    pub max_step_secs: f64,
    /// Amplitude of the pace wave at 100% consistency
    pub pace_wave_amplitude: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 4.0,
            gps_accuracy_deg: 0.000027,
            elevation_noise_m: 1.0,
            fallback_elevation_m: 100.0,
            min_step_secs: 1.0,
            max_step_secs: 10.0,
            pace_wave_amplitude: 0.3,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.sample_interval_secs.is_finite() || self.sample_interval_secs <= 0.0 {
            return Err(TrackError::InvalidOptions(
                "sampleIntervalSecs must be a positive number".to_string(),
            ));
        }
        if !(self.min_step_secs > 0.0 && self.min_step_secs <= self.max_step_secs)
            || !self.max_step_secs.is_finite()
        {
            return Err(TrackError::InvalidOptions(format!(
                "step bounds must satisfy 0 < minStepSecs <= maxStepSecs, got {} and {}",
                self.min_step_secs, self.max_step_secs
            )));
        }
        let non_negative = [
            ("gpsAccuracyDeg", self.gps_accuracy_deg),
            ("elevationNoiseM", self.elevation_noise_m),
            ("paceWaveAmplitude", self.pace_wave_amplitude),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackError::InvalidOptions(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !self.fallback_elevation_m.is_finite() {
            return Err(TrackError::InvalidOptions(
                "fallbackElevationM must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the editing session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Number of undo snapshots kept
    pub history_capacity: usize,
    /// Elevation substituted when a lookup fails, in meters
    pub default_elevation_m: f64,
    /// Maximum coordinates per elevation request
    pub elevation_batch_size: usize,
    /// Maximum points kept from a snapped route
    pub max_snap_points: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: crate::history::DEFAULT_HISTORY_CAPACITY,
            default_elevation_m: 100.0,
            elevation_batch_size: 100,
            max_snap_points: 25,
        }
    }
}

impl EditorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(TrackError::InvalidOptions(
                "historyCapacity must be at least 1".to_string(),
            ));
        }
        if self.elevation_batch_size == 0 {
            return Err(TrackError::InvalidOptions(
                "elevationBatchSize must be at least 1".to_string(),
            ));
        }
        if self.max_snap_points < 2 {
            return Err(TrackError::InvalidOptions(
                "maxSnapPoints must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

pub const DEFAULT_RUN_NAME: &str = "Generated Run";

fn default_run_name() -> String {
    DEFAULT_RUN_NAME.to_string()
}

fn default_pace() -> f64 {
    360.0
}
