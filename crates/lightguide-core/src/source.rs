//! Sampled ray sources.
//!
//! A source spans a rectangular field of view, a list of wavelengths and,
//! in a scene, a spatial aperture. Sampling is a full grid in the order
//! horizontal angle, vertical angle, wavelength, aperture y, aperture x
//! (last index fastest).

use lightguide_geometry::Footprint;
use lightguide_materials::Material;
use serde::{Deserialize, Serialize};

use crate::rays::RayDirection;
use crate::types::{Direction, Precision, Ray, RayBatch};

/// Sampling parameters of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Field of view `[h_min, h_max, v_min, v_max]` (degrees).
    pub fov: [f64; 4],
    /// Wavelengths (µm).
    pub wavelengths: Vec<f64>,
    /// Samples along the horizontal and vertical field axes.
    pub fov_grid: [usize; 2],
    /// Samples along the aperture x and y axes.
    pub spatial_grid: [usize; 2],
    /// Launch direction of every ray.
    pub direction: Direction,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            fov: [-20.0, 20.0, -15.0, 15.0],
            wavelengths: vec![0.525],
            fov_grid: [5, 5],
            spatial_grid: [5, 5],
            direction: Direction::Forward,
        }
    }
}

/// `n` evenly spaced samples over `[lo, hi]`. One sample sits at the centre.
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5 * (lo + hi)],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// A ray source at depth `z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub z: f64,
    /// Launch aperture; rays start at the origin when absent.
    pub footprint: Option<Footprint>,
    pub options: SourceOptions,
}

impl Source {
    pub fn new(z: f64, footprint: Option<Footprint>, options: SourceOptions) -> Self {
        Self {
            z,
            footprint,
            options,
        }
    }

    /// An aperture-less source for k-space work: one spatial sample.
    pub fn field(options: SourceOptions) -> Self {
        Self::new(
            0.0,
            None,
            SourceOptions {
                spatial_grid: [1, 1],
                ..options
            },
        )
    }

    /// `(horizontal, vertical, wavelength)` sample counts.
    pub fn field_shape(&self) -> (usize, usize, usize) {
        (
            self.options.fov_grid[0],
            self.options.fov_grid[1],
            self.options.wavelengths.len(),
        )
    }

    /// Field angles `(h, v)` in sampling order.
    pub fn field_angles(&self) -> Vec<(f64, f64)> {
        let fov = &self.options.fov;
        let hs = linspace(fov[0], fov[1], self.options.fov_grid[0]);
        let vs = linspace(fov[2], fov[3], self.options.fov_grid[1]);
        hs.iter()
            .flat_map(|h| vs.iter().map(move |v| (*h, *v)))
            .collect()
    }

    /// Launch positions inside the aperture.
    ///
    /// With more than one sample along both axes, grid points outside the
    /// footprint (beyond `tolerance`) are discarded.
    pub fn positions(&self, tolerance: f64) -> Vec<[f64; 3]> {
        let [nx, ny] = self.options.spatial_grid;
        let Some(footprint) = &self.footprint else {
            return vec![[0.0, 0.0, self.z]];
        };
        let (min, max) = footprint.bounding_box();
        let xs = linspace(min[0], max[0], nx);
        let ys = linspace(min[1], max[1], ny);
        let filter = nx > 1 && ny > 1;
        ys.iter()
            .flat_map(|y| xs.iter().map(move |x| [*x, *y]))
            .filter(|p| !filter || footprint.contains(*p, tolerance))
            .map(|p| [p[0], p[1], self.z])
            .collect()
    }

    /// Every sampled ray, with wavevectors computed in `ambient`.
    pub fn launch(&self, ambient: &Material, precision: &Precision, tolerance: f64) -> RayBatch {
        let positions = self.positions(tolerance);
        let mut batch = RayBatch::new();
        for (h, v) in self.field_angles() {
            let dir = RayDirection::FieldAngle {
                horizontal_deg: h,
                vertical_deg: v,
                direction: self.options.direction,
            };
            for &w in &self.options.wavelengths {
                let k = dir.to_wavevector(ambient.index(w));
                for p in &positions {
                    let mut ray = Ray::new(w, k, *p);
                    ray.round(precision);
                    batch.push(ray);
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linspace_single_sample_is_centre() {
        assert_eq!(linspace(-20.0, 20.0, 1), vec![0.0]);
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_field_source_sample_count() {
        let src = Source::field(SourceOptions {
            wavelengths: vec![0.45, 0.525, 0.65],
            ..SourceOptions::default()
        });
        let rays = src.launch(&Material::air(), &Precision::default(), 1e-3);
        assert_eq!(rays.len(), 5 * 5 * 3);
        assert_eq!(src.field_shape(), (5, 5, 3));
    }

    #[test]
    fn test_sampling_order_is_h_v_wavelength() {
        let src = Source::field(SourceOptions {
            fov: [-10.0, 10.0, -5.0, 5.0],
            fov_grid: [2, 2],
            wavelengths: vec![0.45, 0.65],
            ..SourceOptions::default()
        });
        let rays = src.launch(&Material::air(), &Precision::default(), 1e-3).into_vec();
        assert_eq!(rays.len(), 8);
        // h = −10 for the first four, wavelength alternates fastest
        assert!(rays[..4].iter().all(|r| r.k[0] < 0.0));
        assert!(rays[4..].iter().all(|r| r.k[0] > 0.0));
        assert_relative_eq!(rays[0].wavelength, 0.45);
        assert_relative_eq!(rays[1].wavelength, 0.65);
        assert!(rays[0].k[1] < 0.0 && rays[2].k[1] > 0.0);
    }

    #[test]
    fn test_positions_filtered_by_circle() {
        let src = Source::new(
            -1.0,
            Some(Footprint::circle([0.0, 0.0], 1.0)),
            SourceOptions {
                spatial_grid: [3, 3],
                ..SourceOptions::default()
            },
        );
        let pts = src.positions(1e-3);
        // corners of the 3×3 grid fall outside the circle
        assert_eq!(pts.len(), 5);
        assert!(pts.iter().all(|p| p[2] == -1.0));
    }

    #[test]
    fn test_backward_source() {
        let src = Source::field(SourceOptions {
            fov_grid: [1, 1],
            direction: Direction::Backward,
            ..SourceOptions::default()
        });
        let rays = src.launch(&Material::air(), &Precision::default(), 1e-3).into_vec();
        assert_eq!(rays.len(), 1);
        assert_relative_eq!(rays[0].k[2], -1.0);
    }
}
