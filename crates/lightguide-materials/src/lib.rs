//! # Lightguide Materials
//!
//! Dispersion models for the media a waveguide combiner is built from. Every
//! material is described by the three-term Sellmeier equation and evaluated
//! through [`Material::index`](sellmeier::Material::index).
//!
//! ## Built-in catalogue
//!
//! | Identifier | Constructor | n(0.525 µm) |
//! |-----------|-------------|-------------|
//! | `Air` | [`Material::air()`](sellmeier::Material::air) | 1.000 |
//! | `LASF46B` | [`catalogue::lasf46b()`] | ≈ 1.91 |
//! | `N-BK7` | [`catalogue::n_bk7()`] | ≈ 1.52 |
//! | `FusedSilica` | [`catalogue::fused_silica()`] | ≈ 1.46 |
//!
//! Wavelengths are in micrometres throughout.

pub mod catalogue;
pub mod sellmeier;

pub use catalogue::{lookup, MaterialError};
pub use sellmeier::{Material, SellmeierCoefficients};
