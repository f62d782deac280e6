//! Refractive interfaces.
//!
//! A plane boundary between two media. The in-plane wavevector is conserved;
//! the ray transmits when
//!
//! $$ k_{z,t}^2 = n_{\text{out}}^2 - |\mathbf{k}_\parallel|^2 > 0 $$
//!
//! and is totally internally reflected otherwise. Only the direction is
//! modelled: each input ray yields exactly one output ray and no amplitude is
//! attached. [`RefractiveInterface::fresnel_coefficients`] reports the
//! amplitude coefficients separately for analysis.

use lightguide_materials::Material;
use num_complex::Complex64;
use serde::Serialize;

use crate::elements::Interact;
use crate::types::{Direction, Precision, Ray, RayBatch};

/// Amplitude reflection and transmission coefficients for s and p polarisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FresnelCoefficients {
    pub rs: Complex64,
    pub rp: Complex64,
    pub ts: Complex64,
    pub tp: Complex64,
}

/// Boundary between `materials[0]` (backward side) and `materials[1]`
/// (forward side).
#[derive(Debug, Clone)]
pub struct RefractiveInterface {
    name: String,
    materials: [Material; 2],
}

impl RefractiveInterface {
    pub fn new(name: impl Into<String>, materials: [Material; 2]) -> Self {
        Self {
            name: name.into(),
            materials,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn materials(&self) -> &[Material; 2] {
        &self.materials
    }

    /// `(n_in, n_out)` for a ray travelling in `direction`.
    fn indices(&self, direction: Direction, wavelength: f64) -> (f64, f64) {
        let (inside, outside) = match direction {
            Direction::Forward => (&self.materials[0], &self.materials[1]),
            Direction::Backward => (&self.materials[1], &self.materials[0]),
        };
        (inside.index(wavelength), outside.index(wavelength))
    }

    fn refract(&self, ray: &Ray) -> Ray {
        let direction = ray.direction();
        let (n_in, n_out) = self.indices(direction, ray.wavelength);
        let kxy_sq = ray.k_parallel_sq();
        let t_sq = n_out * n_out - kxy_sq;
        let kz = if t_sq > 0.0 {
            direction.sign() * t_sq.sqrt()
        } else {
            -direction.sign() * (n_in * n_in - kxy_sq).sqrt()
        };
        Ray {
            k: [ray.k[0], ray.k[1], kz],
            ..*ray
        }
    }

    /// Fresnel amplitude coefficients for `ray` arriving at this boundary.
    ///
    /// With $S = \sqrt{n_{\text{out}}^2 - k_\parallel^2}$ (imaginary under TIR):
    ///
    /// $$ r_s = \frac{k_z - S}{k_z + S}, \quad
    ///    r_p = \frac{n_{\text{in}}^2 S - n_{\text{out}}^2 k_z}{n_{\text{in}}^2 S + n_{\text{out}}^2 k_z} $$
    pub fn fresnel_coefficients(&self, ray: &Ray) -> FresnelCoefficients {
        let (n_in, n_out) = self.indices(ray.direction(), ray.wavelength);
        let kz = Complex64::from(ray.k[2].abs());
        let s = Complex64::from(n_out * n_out - ray.k_parallel_sq()).sqrt();
        let (e_in, e_out) = (n_in * n_in, n_out * n_out);
        FresnelCoefficients {
            rs: (kz - s) / (kz + s),
            rp: (s * e_in - kz * e_out) / (kz * e_out + s * e_in),
            ts: kz * 2.0 / (kz + s),
            tp: kz * (2.0 * n_out * n_in) / (kz * e_out + s * e_in),
        }
    }
}

impl Interact for RefractiveInterface {
    fn interact(&mut self, incoming: RayBatch, precision: &Precision) -> RayBatch {
        let mut out: RayBatch = incoming.iter().map(|r| self.refract(r)).collect();
        out.round_dedup(precision);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn glass() -> Material {
        Material::new("n1.5", [1.25, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_transmission_conserves_k_parallel() {
        let mut s = RefractiveInterface::new("S", [Material::air(), glass()]);
        let ray = Ray::new(0.525, [0.5, 0.0, 0.75f64.sqrt()], [0.0; 3]);
        let out = s.interact(RayBatch::from(vec![ray]), &Precision::default()).into_vec();
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].k[0], 0.5);
        assert_relative_eq!(out[0].k[2], 2.0f64.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_total_internal_reflection_flips_sign() {
        let mut s = RefractiveInterface::new("S", [glass(), Material::air()]);
        let ray = Ray::new(0.525, [1.2, 0.0, (2.25f64 - 1.44).sqrt()], [0.0; 3]);
        let out = s.interact(RayBatch::from(vec![ray]), &Precision::default()).into_vec();
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].k[2], -(0.81f64).sqrt(), epsilon = 1e-6);
        assert_relative_eq!(out[0].k[0], 1.2);
    }

    #[test]
    fn test_normal_incidence_fresnel() {
        let s = RefractiveInterface::new("S", [Material::air(), glass()]);
        let ray = Ray::new(0.525, [0.0, 0.0, 1.0], [0.0; 3]);
        let f = s.fresnel_coefficients(&ray);
        assert_relative_eq!(f.rs.re, -0.2, epsilon = 1e-12);
        assert_relative_eq!(f.rp.re, -0.2, epsilon = 1e-12);
        assert_relative_eq!(f.ts.re, 0.8, epsilon = 1e-12);
        assert_relative_eq!(f.tp.re, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_fresnel_unit_reflectance_under_tir() {
        let s = RefractiveInterface::new("S", [glass(), Material::air()]);
        let ray = Ray::new(0.525, [1.2, 0.0, 0.9], [0.0; 3]);
        let f = s.fresnel_coefficients(&ray);
        assert_relative_eq!(f.rs.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(f.rp.norm(), 1.0, epsilon = 1e-12);
    }
}
