//! # Lightguide Core
//!
//! The numerical backbone of the Lightguide framework. This crate models
//! light in a planar waveguide combiner by its wavevector: diffraction
//! gratings shift the in-plane component, refraction and total internal
//! reflection fix the normal component, and geometric propagation carries
//! rays from one depth layer to the next.
//!
//! ## Architecture
//!
//! Two domains share the same element and ray model:
//!
//! | Domain | Entry point | Purpose |
//! |--------|-------------|---------|
//! | k-space | [`kspace::KSpaceDomain`] | Order sequences over a field-of-view grid, no geometry |
//! | Layout | [`layout::ProjectedLayout`] | Eyebox, input beam and coupler footprints from a k-space trace |
//! | Scene | [`scene::Scene`] | Layered 3-D ray tracing with interaction graphs |
//!
//! All optical elements implement [`elements::Interact`]; the scene dispatches
//! through the closed [`elements::OpticalElement`] enum.
//!
//! ## Modules
//!
//! - [`types`] — Rays, ray batches, propagation direction and precision.
//! - [`rays`] — Conversion between field angles, spherical angles and wavevectors.
//! - [`source`] — Sampled field-of-view × wavelength × aperture ray sources.
//! - [`elements`] — Gratings, refractive interfaces, spectral filters, receivers.
//! - [`kspace`] — The k-space order-sequence domain.
//! - [`layout`] — The projected 2-D layout estimator.
//! - [`scene`] — The 3-D scene tracer and its graph analysis.

pub mod elements;
pub mod kspace;
pub mod layout;
pub mod rays;
pub mod scene;
pub mod source;
pub mod types;
