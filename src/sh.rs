use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Number of real SH terms up to and including L2.
pub const SH_BAND_COUNT: usize = 9;

/// Words per band in the shared buffer layout: R, G, B and one padding word.
pub const SH_WORDS_PER_BAND: usize = 4;

/// Total words in the shared coefficient buffer.
pub const SH_BUFFER_WORDS: usize = SH_BAND_COUNT * SH_WORDS_PER_BAND;

/// Band normalization factors of the orthonormal real SH basis.
///
/// Order: L0, L1 (y, z, x), L2 (xy, yz, 3z²-1, xz, x²-y²).
pub const SH_BASIS_WEIGHTS: [f32; SH_BAND_COUNT] = [
    0.282095, 0.488603, 0.488603, 0.488603, 1.092548, 1.092548, 0.315392, 1.092548, 0.546274,
];

/// Clamped-cosine transfer constants applied band-wise to turn radiance SH into irradiance SH.
pub const SH_CONVOLUTION: [f32; SH_BAND_COUNT] = [
    0.887227, 1.02333, 1.02333, 1.02333, 0.858086, 0.858086, 0.858086, 0.858086, 0.858086,
];

/// Evaluates the nine real SH basis terms for a unit direction.
pub fn sh_basis(direction: Vec3) -> [f32; SH_BAND_COUNT] {
    let Vec3 { x, y, z } = direction;
    let w = &SH_BASIS_WEIGHTS;
    [
        w[0],
        w[1] * y,
        w[2] * z,
        w[3] * x,
        w[4] * x * y,
        w[5] * y * z,
        w[6] * (3.0 * z * z - 1.0),
        w[7] * x * z,
        w[8] * (x * x - y * y),
    ]
}

/// Nine RGB coefficients in band order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShCoefficients {
    bands: [[f32; 3]; SH_BAND_COUNT],
}

impl ShCoefficients {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Decodes the 36-word buffer layout (R, G, B, padding per band) holding `f32` bit patterns.
    pub fn from_padded_words(words: &[u32; SH_BUFFER_WORDS]) -> Self {
        let mut bands = [[0.0f32; 3]; SH_BAND_COUNT];
        for (band, rgb) in bands.iter_mut().enumerate() {
            let base = band * SH_WORDS_PER_BAND;
            for (channel, value) in rgb.iter_mut().enumerate() {
                *value = f32::from_bits(words[base + channel]);
            }
        }
        Self { bands }
    }

    pub fn to_padded_words(&self) -> [u32; SH_BUFFER_WORDS] {
        let mut words = [0u32; SH_BUFFER_WORDS];
        for (band, rgb) in self.bands.iter().enumerate() {
            let base = band * SH_WORDS_PER_BAND;
            for (channel, value) in rgb.iter().enumerate() {
                words[base + channel] = value.to_bits();
            }
        }
        words
    }

    pub fn band(&self, index: usize) -> Vec3 {
        Vec3::from_array(self.bands[index])
    }

    pub fn set_band(&mut self, index: usize, value: Vec3) {
        self.bands[index] = value.to_array();
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self { bands: self.bands.map(|rgb| rgb.map(|value| value * factor)) }
    }

    /// Largest absolute per-channel difference across all bands.
    pub fn max_abs_diff(&self, other: &Self) -> f32 {
        let mut max = 0.0f32;
        for (a, b) in self.bands.iter().zip(other.bands.iter()) {
            for channel in 0..3 {
                max = max.max((a[channel] - b[channel]).abs());
            }
        }
        max
    }

    /// Largest absolute channel value across the L1 and L2 bands.
    pub fn max_abs_higher_order(&self) -> f32 {
        self.bands[1..].iter().flat_map(|rgb| rgb.iter()).fold(0.0f32, |max, value| max.max(value.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{PI, TAU};

    fn analytic_basis(d: Vec3) -> [f64; SH_BAND_COUNT] {
        let (x, y, z) = (d.x as f64, d.y as f64, d.z as f64);
        let pi = std::f64::consts::PI;
        let l0 = 0.5 * (1.0 / pi).sqrt();
        let l1 = (3.0 / (4.0 * pi)).sqrt();
        let l2 = 0.5 * (15.0 / pi).sqrt();
        [
            l0,
            l1 * y,
            l1 * z,
            l1 * x,
            l2 * x * y,
            l2 * y * z,
            0.25 * (5.0 / pi).sqrt() * (3.0 * z * z - 1.0),
            l2 * x * z,
            0.25 * (15.0 / pi).sqrt() * (x * x - y * y),
        ]
    }

    #[test]
    fn basis_matches_analytic_formulas_over_sphere() {
        let rings = 48;
        let segments = 96;
        for ring in 0..=rings {
            let theta = PI * ring as f32 / rings as f32;
            for segment in 0..segments {
                let phi = TAU * segment as f32 / segments as f32;
                let dir = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
                let basis = sh_basis(dir);
                let expected = analytic_basis(dir);
                for (band, (got, want)) in basis.iter().zip(expected.iter()).enumerate() {
                    let err = (*got as f64 - want).abs();
                    assert!(err <= 1e-5 * want.abs().max(1.0), "band {band} at {dir:?}: {got} vs {want}");
                }
            }
        }
    }

    #[test]
    fn l1_band_order_is_y_z_x() {
        let basis = sh_basis(Vec3::Y);
        assert!((basis[1] - 0.488603).abs() < 1e-6);
        assert_eq!(basis[2], 0.0);
        assert_eq!(basis[3], 0.0);
        let basis = sh_basis(Vec3::X);
        assert_eq!(basis[1], 0.0);
        assert!((basis[3] - 0.488603).abs() < 1e-6);
    }

    #[test]
    fn padded_words_keep_padding_zero() {
        let mut coeffs = ShCoefficients::zero();
        coeffs.set_band(4, Vec3::new(1.5, -2.0, 0.25));
        let words = coeffs.to_padded_words();
        assert_eq!(words[4 * SH_WORDS_PER_BAND + 3], 0);
        assert_eq!(f32::from_bits(words[4 * SH_WORDS_PER_BAND + 1]), -2.0);
        assert_eq!(ShCoefficients::from_padded_words(&words), coeffs);
    }
}
