//! Dense, timestamped GPS fixes from a sparse route.
//!
//! Fixes are laid out on a fixed nominal time grid: fix `i` sits at the
//! fraction `i / (n - 1)` of the route's length, so at constant pace the
//! spacing in time is uniform. Timing is then bent by a single sine wave
//! whose amplitude follows the consistency setting, and every step is
//! clamped so the runner never stops or sprints.

use std::f64::consts::PI;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;

use crate::elevation::ElevationProfile;
use crate::geo::{Waypoint, haversine_distance};
use crate::noise::NoiseSource;
use crate::options::SynthesisConfig;
use crate::pace::PaceConfig;
use crate::route::RouteModel;

/// One synthesized GPS sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFix {
    pub lat: f64,
    pub lng: f64,
    pub elevation_meters: f64,
    pub timestamp: DateTime<Utc>,
}

/// Interpolated position on the nominal time grid, before timing is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridPoint {
    position: Waypoint,
    target_time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TrackSynthesizer {
    config: SynthesisConfig,
}

impl TrackSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Number of fixes for a route of the given length at the given pace.
    pub fn point_count(&self, total_distance_meters: f64, pace: &PaceConfig) -> usize {
        let total_time = total_distance_meters / 1000.0 * pace.base_seconds_per_km();
        if !total_time.is_finite() || total_time <= 0.0 {
            return 0;
        }
        (total_time / self.config.sample_interval_secs).ceil() as usize
    }

    /// Produce fixes in ascending time order.
    ///
    /// Returns an empty sequence for routes with fewer than two waypoints or
    /// no length; callers surface that as a blocked export.
    pub fn synthesize(
        &self,
        route: &RouteModel,
        pace: &PaceConfig,
        start: DateTime<Utc>,
        noise: &mut dyn NoiseSource,
    ) -> Vec<TrackFix> {
        let grid = self.grid_points(route.waypoints(), pace, noise);
        if grid.is_empty() {
            return Vec::new();
        }

        let profile = ElevationProfile::from_resolved(route.elevations())
            .with_noise(self.config.elevation_noise_m)
            .with_fallback(self.config.fallback_elevation_m);
        let offsets = self.cumulative_times(&grid, pace);
        let count = grid.len();

        debug!(
            "synthesized {count} fixes spanning {:.1}s",
            offsets.last().copied().unwrap_or(0.0)
        );

        grid.iter()
            .zip(offsets)
            .enumerate()
            .map(|(i, (gp, offset))| TrackFix {
                lat: gp.position.lat,
                lng: gp.position.lng,
                elevation_meters: profile.at_track_point(i, count, noise).round(),
                timestamp: start + Duration::milliseconds((offset * 1000.0).round() as i64),
            })
            .collect()
    }

    /// Jittered positions on the nominal time grid.
    fn grid_points(
        &self,
        waypoints: &[Waypoint],
        pace: &PaceConfig,
        noise: &mut dyn NoiseSource,
    ) -> Vec<GridPoint> {
        if waypoints.len() < 2 {
            return Vec::new();
        }
        let segments: Vec<f64> = waypoints
            .windows(2)
            .map(|pair| haversine_distance(&pair[0], &pair[1]))
            .collect();
        let total_distance: f64 = segments.iter().sum();
        let count = self.point_count(total_distance, pace);
        if count == 0 {
            return Vec::new();
        }

        let half_jitter = self.config.gps_accuracy_deg / 2.0;
        let mut points = Vec::with_capacity(count);
        let mut segment_index = 0;
        let mut cumulative = 0.0;

        for i in 0..count {
            let time_progress = if count > 1 {
                i as f64 / (count - 1) as f64
            } else {
                0.0
            };
            let target_distance = time_progress * total_distance;

            // Target distance never decreases, so the scan resumes where the
            // previous fix left off.
            while segment_index < segments.len()
                && cumulative + segments[segment_index] < target_distance
            {
                cumulative += segments[segment_index];
                segment_index += 1;
            }

            let position = if segment_index < segments.len() {
                let length = segments[segment_index];
                let t = if length > 0.0 {
                    ((target_distance - cumulative) / length).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                waypoints[segment_index].lerp(&waypoints[segment_index + 1], t)
            } else {
                // Rounding pushed the target past the final segment.
                waypoints[waypoints.len() - 1]
            };

            points.push(GridPoint {
                position: Waypoint::new(
                    position.lat + noise.uniform(half_jitter),
                    position.lng + noise.uniform(half_jitter),
                ),
                target_time: i as f64 * self.config.sample_interval_secs,
            });
        }

        points
    }

    /// Seconds between fix `index - 1` and fix `index`.
    fn time_increment(&self, index: usize, grid: &[GridPoint], pace: &PaceConfig) -> f64 {
        if index == 0 {
            return 0.0;
        }
        let base = grid[index].target_time - grid[index - 1].target_time;
        let mut step = base;
        if pace.consistency_percent() > 0 {
            let wave = (2.0 * PI * index as f64 / grid.len() as f64).sin();
            step = base * (1.0 + wave * pace.variation() * self.config.pace_wave_amplitude);
        }
        step.max(self.config.min_step_secs).min(self.config.max_step_secs)
    }

    /// Running time offset of every fix, starting at zero.
    fn cumulative_times(&self, grid: &[GridPoint], pace: &PaceConfig) -> Vec<f64> {
        let mut elapsed = 0.0;
        (0..grid.len())
            .map(|i| {
                elapsed += self.time_increment(i, grid, pace);
                elapsed
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{NoNoise, RandomNoise};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap()
    }

    fn route(points: &[(f64, f64)], elevations: &[f64]) -> RouteModel {
        let mut m = RouteModel::new();
        for (i, &(lat, lng)) in points.iter().enumerate() {
            match elevations.get(i) {
                Some(&e) => m.append_resolved(Waypoint::new(lat, lng), e),
                None => m.append(Waypoint::new(lat, lng)),
            };
        }
        m
    }

    #[test]
    fn test_point_count_for_one_km_at_five_minute_pace() {
        let synth = TrackSynthesizer::default();
        let pace = PaceConfig::new(300.0, 0).unwrap();
        assert_eq!(synth.point_count(1000.0, &pace), 75);
        assert_eq!(synth.point_count(0.0, &pace), 0);
        assert_eq!(synth.point_count(1.0, &pace), 1);
    }

    #[test]
    fn test_first_and_last_fix_hit_route_ends_without_noise() {
        let r = route(&[(48.0, 2.0), (48.005, 2.0), (48.005, 2.01)], &[100.0, 120.0, 110.0]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut NoNoise);
        let expected = TrackSynthesizer::default().point_count(r.total_distance_meters(), &pace);
        assert_eq!(fixes.len(), expected);

        let first = fixes.first().unwrap();
        let last = fixes.last().unwrap();
        assert!((first.lat - 48.0).abs() < 1e-9 && (first.lng - 2.0).abs() < 1e-9);
        assert!((last.lat - 48.005).abs() < 1e-9 && (last.lng - 2.01).abs() < 1e-9);
        assert_eq!(first.elevation_meters, 100.0);
        assert_eq!(last.elevation_meters, 110.0);
        assert_eq!(first.timestamp, start());
    }

    #[test]
    fn test_fixes_progress_along_route() {
        let r = route(&[(48.0, 2.0), (48.01, 2.0)], &[]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut NoNoise);
        let origin = Waypoint::new(48.0, 2.0);
        let mut prev = -1.0;
        for f in &fixes {
            let d = haversine_distance(&origin, &Waypoint::new(f.lat, f.lng));
            assert!(d >= prev);
            prev = d;
        }
    }

    #[test]
    fn test_constant_pace_uses_four_second_steps() {
        let r = route(&[(48.0, 2.0), (48.01, 2.0)], &[]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut NoNoise);
        for pair in fixes.windows(2) {
            assert_eq!((pair[1].timestamp - pair[0].timestamp).num_seconds(), 4);
        }
    }

    #[test]
    fn test_variable_pace_steps_are_clamped_and_monotonic() {
        let r = route(&[(48.0, 2.0), (48.02, 2.01)], &[50.0, 80.0]);
        let pace = PaceConfig::new(400.0, 100).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(
            &r,
            &pace,
            start(),
            &mut RandomNoise::seeded(11),
        );
        assert!(fixes.len() > 10);
        let mut total_ms = 0;
        let mut varied = false;
        for pair in fixes.windows(2) {
            let step = (pair[1].timestamp - pair[0].timestamp).num_milliseconds();
            assert!((1000..=10_000).contains(&step));
            varied |= step != 4000;
            total_ms += step;
        }
        assert!(varied);
        let span = (fixes.last().unwrap().timestamp - fixes[0].timestamp).num_milliseconds();
        // Per-step rounding can drift the sum by at most 1 ms per fix.
        assert!((span - total_ms).abs() <= fixes.len() as i64);
    }

    #[test]
    fn test_jitter_stays_within_accuracy() {
        let r = route(&[(48.0, 2.0), (48.01, 2.0)], &[]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let synth = TrackSynthesizer::default();
        let clean = synth.synthesize(&r, &pace, start(), &mut NoNoise);
        let noisy = synth.synthesize(&r, &pace, start(), &mut RandomNoise::seeded(5));
        assert_eq!(clean.len(), noisy.len());
        let half = synth.config().gps_accuracy_deg / 2.0 + 1e-12;
        for (c, n) in clean.iter().zip(&noisy) {
            assert!((c.lat - n.lat).abs() <= half);
            assert!((c.lng - n.lng).abs() <= half);
            assert!((c.elevation_meters - n.elevation_meters).abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_elevations_are_whole_meters() {
        let r = route(&[(48.0, 2.0), (48.01, 2.0)], &[100.0, 107.0]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let fixes =
            TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut RandomNoise::seeded(8));
        assert!(fixes.len() > 2);
        assert!(fixes.iter().all(|f| f.elevation_meters.fract() == 0.0));
        assert!(fixes.iter().all(|f| (99.0..=108.0).contains(&f.elevation_meters)));
    }

    #[test]
    fn test_slowest_pace_stays_bounded() {
        let r = route(&[(48.0, 2.0), (48.01, 2.0)], &[]);
        let pace = PaceConfig::new(crate::pace::MAX_PACE_SECONDS_PER_KM, 0).unwrap();
        let synth = TrackSynthesizer::default();
        // ~1.11 km at one hour per km
        let count = synth.point_count(r.total_distance_meters(), &pace);
        assert_eq!(count, (r.total_distance_km() * 3600.0 / 4.0).ceil() as usize);
        assert_eq!(synth.synthesize(&r, &pace, start(), &mut NoNoise).len(), count);
    }

    #[test]
    fn test_identical_points_produce_no_fixes() {
        let r = route(&[(48.0, 2.0), (48.0, 2.0)], &[]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        assert!(
            TrackSynthesizer::default()
                .synthesize(&r, &pace, start(), &mut NoNoise)
                .is_empty()
        );
    }

    #[test]
    fn test_single_fix_route() {
        // ~1 m at 300 s/km is 0.3 s of running: one fix.
        let r = route(&[(48.0, 2.0), (48.00001, 2.0)], &[100.0, 101.0]);
        let pace = PaceConfig::new(300.0, 50).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut NoNoise);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].timestamp, start());
        assert!((fixes[0].lat - 48.0).abs() < 1e-12);
        assert_eq!(fixes[0].elevation_meters, 100.0);
    }

    #[test]
    fn test_duplicate_waypoint_segment_is_skipped() {
        let r = route(&[(48.0, 2.0), (48.0, 2.0), (48.01, 2.0)], &[]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut NoNoise);
        assert!(!fixes.is_empty());
        assert!(fixes.iter().all(|f| f.lat.is_finite() && f.lng.is_finite()));
    }

    #[test]
    fn test_no_elevation_samples_fall_back() {
        let r = route(&[(48.0, 2.0), (48.01, 2.0)], &[]);
        let pace = PaceConfig::new(300.0, 0).unwrap();
        let fixes = TrackSynthesizer::default().synthesize(&r, &pace, start(), &mut NoNoise);
        assert!(fixes.iter().all(|f| f.elevation_meters == 100.0));
    }
}
