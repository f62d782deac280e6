//! Core types shared across the Lightguide framework.
//!
//! Wavevectors are normalised by the vacuum wavenumber, so `|k|` equals the
//! refractive index of the medium the ray travels in. Positions are in
//! millimetres and wavelengths in micrometres.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Identifier of a registered element. Ids start at 1.
pub type ElementId = usize;

/// Tag carried by rays that have not yet interacted with any element.
pub const SOURCE_ID: ElementId = 0;

/// Sign of the z component of a wavevector.
///
/// Serialised as `1` (forward, +z) or `-1` (backward, −z). A ray with
/// `kz == 0` counts as backward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i32", into = "i32")]
pub enum Direction {
    Backward,
    #[default]
    Forward,
}

impl Direction {
    pub fn of(kz: f64) -> Self {
        if kz > 0.0 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl TryFrom<i32> for Direction {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Backward),
            other => Err(format!("direction must be 1 or -1, got {other}")),
        }
    }
}

impl From<Direction> for i32 {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Decimal places used to round wavevectors and positions.
///
/// Rounding happens after every element interaction and every propagation
/// step; it is what makes duplicate rays and coincident graph nodes compare
/// equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Precision {
    pub wavevector_decimals: i32,
    pub position_decimals: i32,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            wavevector_decimals: 6,
            position_decimals: 4,
        }
    }
}

impl Precision {
    pub fn round_k(&self, value: f64) -> f64 {
        round_to(value, self.wavevector_decimals)
    }

    pub fn round_position(&self, value: f64) -> f64 {
        round_to(value, self.position_decimals)
    }

    /// Integer key of a coordinate at position precision.
    pub fn position_key(&self, value: f64) -> i64 {
        (value * 10f64.powi(self.position_decimals)).round() as i64
    }

    pub fn point_key(&self, p: [f64; 3]) -> [i64; 3] {
        [
            self.position_key(p[0]),
            self.position_key(p[1]),
            self.position_key(p[2]),
        ]
    }
}

/// Round half away from zero, folding `-0.0` into `0.0`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale + 0.0
}

/// A single ray: a wavelength, a wavevector and where it has been.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    /// Vacuum wavelength (µm).
    pub wavelength: f64,
    /// Normalised wavevector; `kz` is NaN for an evanescent ray.
    pub k: [f64; 3],
    /// Start of the current straight segment (mm).
    pub origin: [f64; 3],
    /// Current position (mm).
    pub position: [f64; 3],
    /// Last element hit, [`SOURCE_ID`] before the first interaction.
    pub element: ElementId,
}

impl Ray {
    /// A fresh ray whose segment starts at `position`.
    pub fn new(wavelength: f64, k: [f64; 3], position: [f64; 3]) -> Self {
        Self {
            wavelength,
            k,
            origin: position,
            position,
            element: SOURCE_ID,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::of(self.k[2])
    }

    /// `kx² + ky²`.
    pub fn k_parallel_sq(&self) -> f64 {
        self.k[0] * self.k[0] + self.k[1] * self.k[1]
    }

    /// `|k|`, the index of the medium the ray is travelling in.
    pub fn index(&self) -> f64 {
        (self.k_parallel_sq() + self.k[2] * self.k[2]).sqrt()
    }

    pub fn is_evanescent(&self) -> bool {
        !self.k[2].is_finite()
    }

    /// Unit propagation direction.
    pub fn direction_cosines(&self) -> [f64; 3] {
        let n = self.index();
        [self.k[0] / n, self.k[1] / n, self.k[2] / n]
    }

    /// Round the wavevector and both positions in place.
    pub fn round(&mut self, precision: &Precision) {
        for c in self.k.iter_mut() {
            *c = precision.round_k(*c);
        }
        for c in self.origin.iter_mut().chain(self.position.iter_mut()) {
            *c = precision.round_position(*c);
        }
    }

    fn fields(&self) -> [f64; 10] {
        [
            self.wavelength,
            self.k[0],
            self.k[1],
            self.k[2],
            self.origin[0],
            self.origin[1],
            self.origin[2],
            self.position[0],
            self.position[1],
            self.position[2],
        ]
    }

    /// Total order over all fields, NaN included.
    pub fn total_cmp(&self, other: &Ray) -> Ordering {
        self.element.cmp(&other.element).then_with(|| {
            self.fields()
                .iter()
                .zip(other.fields().iter())
                .map(|(a, b)| a.total_cmp(b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }
}

/// An ordered collection of rays handed between elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RayBatch {
    rays: Vec<Ray>,
}

impl RayBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn push(&mut self, ray: Ray) {
        self.rays.push(ray);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ray> {
        self.rays.iter()
    }

    pub fn as_slice(&self) -> &[Ray] {
        &self.rays
    }

    pub fn into_vec(self) -> Vec<Ray> {
        self.rays
    }

    /// Round every ray, then drop exact duplicates. The result is sorted.
    pub fn round_dedup(&mut self, precision: &Precision) {
        for ray in self.rays.iter_mut() {
            ray.round(precision);
        }
        self.rays.sort_by(Ray::total_cmp);
        self.rays.dedup_by(|a, b| a.total_cmp(b).is_eq());
    }
}

impl From<Vec<Ray>> for RayBatch {
    fn from(rays: Vec<Ray>) -> Self {
        Self { rays }
    }
}

impl FromIterator<Ray> for RayBatch {
    fn from_iter<I: IntoIterator<Item = Ray>>(iter: I) -> Self {
        Self {
            rays: iter.into_iter().collect(),
        }
    }
}

impl Extend<Ray> for RayBatch {
    fn extend<I: IntoIterator<Item = Ray>>(&mut self, iter: I) {
        self.rays.extend(iter);
    }
}

impl IntoIterator for RayBatch {
    type Item = Ray;
    type IntoIter = std::vec::IntoIter<Ray>;

    fn into_iter(self) -> Self::IntoIter {
        self.rays.into_iter()
    }
}

impl<'a> IntoIterator for &'a RayBatch {
    type Item = &'a Ray;
    type IntoIter = std::slice::Iter<'a, Ray>;

    fn into_iter(self) -> Self::IntoIter {
        self.rays.iter()
    }
}
