//! Ray direction encodings.
//!
//! A propagation direction can be written three ways:
//!
//! | Encoding | Components | Notes |
//! |----------|------------|-------|
//! | Field angle | horizontal, vertical (°), direction | `tan h = kx/|kz|`, `tan v = ky/|kz|` |
//! | Spherical | polar, azimuth (°) | polar measured from +z over 0–180° |
//! | Wavevector | kx, ky, kz | `|k|` is the medium index |
//!
//! Field angles do not carry the sign of `kz`, so they come with an explicit
//! [`Direction`]. A wavevector with `kz == 0` converts to a backward field
//! angle.

use lightguide_materials::Material;
use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// Which encoding a [`RayDirection`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    FieldAngle,
    Spherical,
    Wavevector,
}

/// A propagation direction in one of the supported encodings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum RayDirection {
    FieldAngle {
        horizontal_deg: f64,
        vertical_deg: f64,
        direction: Direction,
    },
    Spherical {
        polar_deg: f64,
        azimuth_deg: f64,
    },
    Wavevector {
        k: [f64; 3],
    },
}

impl RayDirection {
    pub fn encoding(&self) -> Encoding {
        match self {
            RayDirection::FieldAngle { .. } => Encoding::FieldAngle,
            RayDirection::Spherical { .. } => Encoding::Spherical,
            RayDirection::Wavevector { .. } => Encoding::Wavevector,
        }
    }

    /// Wavevector of this direction in a medium of the given index.
    ///
    /// For field angles:
    ///
    /// $$ k_x = \frac{n \tan h}{\sqrt{1 + \tan^2 h + \tan^2 v}}, \quad
    ///    k_z = \pm\sqrt{n^2 - k_x^2 - k_y^2} $$
    ///
    /// A wavevector input is returned unchanged.
    pub fn to_wavevector(&self, index: f64) -> [f64; 3] {
        match *self {
            RayDirection::FieldAngle {
                horizontal_deg,
                vertical_deg,
                direction,
            } => {
                let th = horizontal_deg.to_radians().tan();
                let tv = vertical_deg.to_radians().tan();
                let d = (1.0 + th * th + tv * tv).sqrt();
                let kx = index * th / d;
                let ky = index * tv / d;
                let kz = direction.sign() * (index * index - kx * kx - ky * ky).sqrt();
                [kx, ky, kz]
            }
            RayDirection::Spherical {
                polar_deg,
                azimuth_deg,
            } => {
                let (st, ct) = polar_deg.to_radians().sin_cos();
                let (sp, cp) = azimuth_deg.to_radians().sin_cos();
                [index * st * cp, index * st * sp, index * ct]
            }
            RayDirection::Wavevector { k } => k,
        }
    }

    /// Express a wavevector in `encoding`, using `index` as the medium index.
    ///
    /// Components with `kx² + ky² > index²` have no real angle and come out
    /// as NaN.
    pub fn from_wavevector(k: [f64; 3], index: f64, encoding: Encoding) -> Self {
        let kxy_sq = k[0] * k[0] + k[1] * k[1];
        match encoding {
            Encoding::FieldAngle => {
                let kz = (index * index - kxy_sq).sqrt();
                RayDirection::FieldAngle {
                    horizontal_deg: (k[0] / kz).atan().to_degrees(),
                    vertical_deg: (k[1] / kz).atan().to_degrees(),
                    direction: Direction::of(k[2]),
                }
            }
            Encoding::Spherical => {
                let mut polar = (kxy_sq.sqrt() / index).asin().to_degrees();
                if k[2] < 0.0 {
                    polar = 180.0 - polar;
                }
                RayDirection::Spherical {
                    polar_deg: polar,
                    azimuth_deg: k[1].atan2(k[0]).to_degrees(),
                }
            }
            Encoding::Wavevector => RayDirection::Wavevector { k },
        }
    }
}

/// Converts ray directions between encodings for a given medium.
#[derive(Debug, Clone)]
pub struct RayConverter {
    material: Material,
    target: Encoding,
}

impl RayConverter {
    pub fn new(material: Material, target: Encoding) -> Self {
        Self { material, target }
    }

    /// Convert a single `(wavelength, direction)` sample.
    ///
    /// The medium index is `|k|` for a wavevector input and the material's
    /// index at `wavelength` otherwise.
    pub fn convert_one(&self, wavelength: f64, direction: &RayDirection) -> RayDirection {
        let index = match direction {
            RayDirection::Wavevector { k } => (k[0] * k[0] + k[1] * k[1] + k[2] * k[2]).sqrt(),
            _ => self.material.index(wavelength),
        };
        let k = direction.to_wavevector(index);
        RayDirection::from_wavevector(k, index, self.target)
    }

    /// Convert a batch of `(wavelength, direction)` samples, preserving order.
    pub fn convert(&self, samples: &[(f64, RayDirection)]) -> Vec<(f64, RayDirection)> {
        samples
            .iter()
            .map(|(w, d)| (*w, self.convert_one(*w, d)))
            .collect()
    }
}
