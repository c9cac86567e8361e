//! Procedural test scene: a gaussian cloud of small spheres.

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub sample_count: u32,
    pub seed: u64,
    pub radius: f32,
    /// Standard deviation of each coordinate before translation.
    pub std_dev: f32,
    pub translation: [f32; 3],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            sample_count: 10_000,
            seed: 0,
            radius: 0.015,
            std_dev: 0.25,
            translation: [1.5, 1.5, 0.0],
        }
    }
}

/// Colour ramp sampled by the distance attribute: red near the centre, green at the rim.
pub const COLOR_RAMP: [[f32; 3]; 2] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

#[derive(Clone, Debug, PartialEq)]
pub struct SphereSamples {
    pub positions: Vec<[f32; 3]>,
    /// Distance of each untranslated sample from the origin.
    pub attributes: Vec<f32>,
    /// Shuffled permutation of `0..n`.
    pub indices: Vec<u32>,
}

/// Marsaglia polar method; every second draw comes from the cached spare.
struct Normal {
    mean: f32,
    std_dev: f32,
    spare: Option<f32>,
}

impl Normal {
    fn new(mean: f32, std_dev: f32) -> Self {
        Self {
            mean,
            std_dev,
            spare: None,
        }
    }

    fn sample<R: Rng>(&mut self, rng: &mut R) -> f32 {
        if let Some(z) = self.spare.take() {
            return self.mean + self.std_dev * z;
        }
        loop {
            let u: f32 = rng.gen_range(-1.0..1.0);
            let v: f32 = rng.gen_range(-1.0..1.0);
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let m = (-2.0 * s.ln() / s).sqrt();
                self.spare = Some(v * m);
                return self.mean + self.std_dev * u * m;
            }
        }
    }
}

/// Generate the sphere cloud for `cfg`. Identical output for identical configs.
///
/// Draw order: x, y, z per sample in sample order, then the index shuffle continues the same
/// stream.
pub fn generate_samples(cfg: &SceneConfig) -> SphereSamples {
    let n = cfg.sample_count as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let mut dist = Normal::new(0.0, cfg.std_dev);

    let mut positions = Vec::with_capacity(n);
    let mut attributes = Vec::with_capacity(n);
    for _ in 0..n {
        let a = dist.sample(&mut rng);
        let b = dist.sample(&mut rng);
        let c = dist.sample(&mut rng);
        attributes.push((a * a + b * b + c * c).sqrt());
        positions.push([
            a + cfg.translation[0],
            b + cfg.translation[1],
            c + cfg.translation[2],
        ]);
    }

    let mut indices: Vec<u32> = (0..cfg.sample_count).collect();
    indices.shuffle(&mut rng);

    SphereSamples {
        positions,
        attributes,
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(seed: u64) -> SceneConfig {
        SceneConfig {
            sample_count: 500,
            seed,
            ..SceneConfig::default()
        }
    }

    fn bits(s: &SphereSamples) -> Vec<u32> {
        s.positions
            .iter()
            .flatten()
            .chain(s.attributes.iter())
            .map(|v| v.to_bits())
            .collect()
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let a = generate_samples(&small(0));
        let b = generate_samples(&small(0));
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(a.indices, b.indices);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate_samples(&small(0));
        let b = generate_samples(&small(1));
        assert_ne!(bits(&a), bits(&b));
    }

    #[test]
    fn indices_are_a_shuffled_permutation() {
        let s = generate_samples(&small(0));
        let mut sorted = s.indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..500).collect::<Vec<_>>());
        assert_ne!(s.indices, sorted, "shuffle should move something");
    }

    #[test]
    fn attribute_is_distance_before_translation() {
        let cfg = small(3);
        let s = generate_samples(&cfg);
        for (p, d) in s.positions.iter().zip(&s.attributes) {
            let a = p[0] - cfg.translation[0];
            let b = p[1] - cfg.translation[1];
            let c = p[2] - cfg.translation[2];
            assert!(((a * a + b * b + c * c).sqrt() - d).abs() < 1e-4);
        }
    }

    #[test]
    fn cloud_is_centered_on_translation() {
        let cfg = SceneConfig::default();
        let s = generate_samples(&cfg);
        assert_eq!(s.positions.len(), 10_000);
        let n = s.positions.len() as f32;
        for axis in 0..3 {
            let mean: f32 = s.positions.iter().map(|p| p[axis]).sum::<f32>() / n;
            assert!((mean - cfg.translation[axis]).abs() < 0.02, "axis {axis} mean {mean}");
        }
        let mean_d: f32 = s.attributes.iter().sum::<f32>() / n;
        // E|X| for a 3D gaussian is 2*sqrt(2/pi)*sigma ~= 0.399
        assert!((mean_d - 0.399).abs() < 0.02, "mean distance {mean_d}");
    }
}
