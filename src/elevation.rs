use crate::noise::NoiseSource;

/// Elevation used when there are no samples at all, in meters.
pub const FALLBACK_ELEVATION_METERS: f64 = 100.0;

/// Half-width of the uniform noise added to interpolated elevations, in meters.
pub const ELEVATION_NOISE_METERS: f64 = 1.0;

/// Resolved elevation samples aligned with the route's waypoints.
///
/// Pending samples are dropped on construction, so the profile interpolates
/// only over values that have actually been resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElevationProfile {
    samples: Vec<f64>,
    noise_meters: f64,
    fallback_meters: f64,
}

impl ElevationProfile {
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            noise_meters: ELEVATION_NOISE_METERS,
            fallback_meters: FALLBACK_ELEVATION_METERS,
        }
    }

    /// Build from the route's elevation column, skipping unresolved entries.
    pub fn from_resolved(elevations: &[Option<f64>]) -> Self {
        Self::new(elevations.iter().flatten().copied().collect())
    }

    pub fn with_noise(mut self, noise_meters: f64) -> Self {
        self.noise_meters = noise_meters;
        self
    }

    pub fn with_fallback(mut self, fallback_meters: f64) -> Self {
        self.fallback_meters = fallback_meters;
        self
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Noise-free elevation at a fractional index into the samples.
    ///
    /// The index is clamped to the sample range.
    pub fn interpolated_at(&self, fractional_index: f64) -> f64 {
        match self.samples.len() {
            0 => self.fallback_meters,
            1 => self.samples[0],
            len => {
                let max_index = (len - 1) as f64;
                let idx = if fractional_index.is_finite() {
                    fractional_index.clamp(0.0, max_index)
                } else {
                    0.0
                };
                let lower = idx.floor() as usize;
                let upper = (lower + 1).min(len - 1);
                let ratio = idx - lower as f64;
                let (a, b) = (self.samples[lower], self.samples[upper]);
                a + (b - a) * ratio
            }
        }
    }

    /// Elevation for the `index`-th of `count` evenly spaced track points,
    /// with uniform noise added.
    ///
    /// With no samples the fallback is returned unchanged.
    pub fn at_track_point(&self, index: usize, count: usize, noise: &mut dyn NoiseSource) -> f64 {
        if self.samples.is_empty() {
            return self.fallback_meters;
        }
        let progress = if count > 1 {
            (index as f64 / (count - 1) as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let fractional_index = progress * (self.samples.len() - 1) as f64;
        self.interpolated_at(fractional_index) + noise.uniform(self.noise_meters)
    }
}
