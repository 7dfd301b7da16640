//! Random sources for the jitter terms of track synthesis.
//!
//! Synthesis is deterministic apart from the noise it draws here, so tests
//! pass [`NoNoise`] or a seeded [`RandomNoise`] to get reproducible output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait NoiseSource {
    /// Uniform sample in `[-half_width, +half_width]`.
    fn uniform(&mut self, half_width: f64) -> f64;
}

/// Noise drawn from a [`StdRng`].
pub struct RandomNoise {
    rng: StdRng,
}

impl RandomNoise {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when a seed is given, entropy otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl NoiseSource for RandomNoise {
    fn uniform(&mut self, half_width: f64) -> f64 {
        let half_width = half_width.abs();
        if half_width == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-half_width..=half_width)
    }
}

/// Always returns zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNoise;

impl NoiseSource for NoNoise {
    fn uniform(&mut self, _half_width: f64) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_within_bounds() {
        let mut noise = RandomNoise::seeded(7);
        for _ in 0..1000 {
            let v = noise.uniform(0.5);
            assert!((-0.5..=0.5).contains(&v));
        }
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = RandomNoise::seeded(42);
        let mut b = RandomNoise::seeded(42);
        for _ in 0..10 {
            assert_eq!(a.uniform(1.0), b.uniform(1.0));
        }
    }

    #[test]
    fn test_zero_width() {
        let mut noise = RandomNoise::seeded(1);
        assert_eq!(noise.uniform(0.0), 0.0);
        assert_eq!(NoNoise.uniform(3.0), 0.0);
    }
}
