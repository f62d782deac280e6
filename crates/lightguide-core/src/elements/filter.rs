//! Spectral stop filter.

use crate::elements::Interact;
use crate::types::{Precision, RayBatch};

/// Wavelengths closer than this to the stop wavelength are removed (µm).
pub const WAVELENGTH_TOLERANCE: f64 = 1e-9;

/// Removes every ray at one wavelength and passes the rest unchanged.
#[derive(Debug, Clone)]
pub struct SpectralFilter {
    name: String,
    stop_wavelength: f64,
}

impl SpectralFilter {
    pub fn new(name: impl Into<String>, stop_wavelength: f64) -> Self {
        Self {
            name: name.into(),
            stop_wavelength,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_wavelength(&self) -> f64 {
        self.stop_wavelength
    }
}

impl Interact for SpectralFilter {
    fn interact(&mut self, incoming: RayBatch, _precision: &Precision) -> RayBatch {
        incoming
            .into_iter()
            .filter(|r| (r.wavelength - self.stop_wavelength).abs() > WAVELENGTH_TOLERANCE)
            .collect()
    }
}
