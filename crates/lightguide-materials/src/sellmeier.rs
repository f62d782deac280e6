//! Three-term Sellmeier dispersion.
//!
//! $$ n^2(\lambda) = 1 + \sum_{i=1}^{3} \frac{b_i \lambda^2}{\lambda^2 - c_i} $$
//!
//! with $\lambda$ in micrometres and $c_i$ in µm². Poles at $\lambda^2 = c_i$ are
//! not special-cased: the index becomes infinite or NaN and callers filter it
//! with their own existence tests.

use serde::{Deserialize, Serialize};

/// Sellmeier coefficients `(b1, b2, b3, c1, c2, c3)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct SellmeierCoefficients {
    /// Oscillator strengths.
    pub b: [f64; 3],
    /// Squared resonance wavelengths (µm²).
    pub c: [f64; 3],
}

impl From<[f64; 6]> for SellmeierCoefficients {
    fn from(v: [f64; 6]) -> Self {
        Self {
            b: [v[0], v[1], v[2]],
            c: [v[3], v[4], v[5]],
        }
    }
}

impl From<SellmeierCoefficients> for [f64; 6] {
    fn from(s: SellmeierCoefficients) -> Self {
        [s.b[0], s.b[1], s.b[2], s.c[0], s.c[1], s.c[2]]
    }
}

/// An optical medium with a name and a Sellmeier dispersion law.
///
/// Materials are immutable once built; cloning is cheap enough to hand each
/// optical element its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    name: String,
    coefficients: SellmeierCoefficients,
}

impl Material {
    pub fn new(name: impl Into<String>, coefficients: impl Into<SellmeierCoefficients>) -> Self {
        Self {
            name: name.into(),
            coefficients: coefficients.into(),
        }
    }

    /// Vacuum-like ambient: all coefficients zero, so n = 1 at every wavelength.
    pub fn air() -> Self {
        Self::new("Air", [0.0; 6])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coefficients(&self) -> SellmeierCoefficients {
        self.coefficients
    }

    /// Refractive index at `wavelength_um`.
    ///
    /// Returns NaN when $n^2 < 0$ (beyond a resonance) and ±∞/NaN exactly at a
    /// pole. Never panics.
    pub fn index(&self, wavelength_um: f64) -> f64 {
        let l2 = wavelength_um * wavelength_um;
        let SellmeierCoefficients { b, c } = self.coefficients;
        let n_sq = 1.0
            + b[0] * l2 / (l2 - c[0])
            + b[1] * l2 / (l2 - c[1])
            + b[2] * l2 / (l2 - c[2]);
        n_sq.sqrt()
    }

    /// Batch form of [`Material::index`], one index per wavelength.
    pub fn indices(&self, wavelengths_um: &[f64]) -> Vec<f64> {
        wavelengths_um.iter().map(|&w| self.index(w)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_air_is_unity() {
        let air = Material::air();
        for wl in [0.4, 0.525, 0.7, 1.55] {
            assert_relative_eq!(air.index(wl), 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_single_term_matches_closed_form() {
        // n² = 1 + λ²/(λ² − 0.01) at λ = 0.5: n² = 1 + 0.25/0.24
        let m = Material::new("one-term", [1.0, 0.0, 0.0, 0.01, 0.0, 0.0]);
        let expected = (1.0_f64 + 0.25 / 0.24).sqrt();
        assert_relative_eq!(m.index(0.5), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_beyond_resonance_is_nan() {
        // Just above c = 0.25 the term is large and negative: n² < 0.
        let m = Material::new("resonant", [1.0, 0.0, 0.0, 0.25, 0.0, 0.0]);
        assert!(m.index(0.49).is_nan());
        // Exactly on the pole: division by zero, non-finite.
        assert!(!m.index(0.5).is_finite());
    }

    #[test]
    fn test_coefficients_round_trip_through_array() {
        let raw = [1.0, 2.0, 3.0, 0.1, 0.2, 0.3];
        let c = SellmeierCoefficients::from(raw);
        assert_eq!(<[f64; 6]>::from(c), raw);
    }
}
