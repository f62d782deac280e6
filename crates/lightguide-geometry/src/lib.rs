//! # Lightguide Geometry
//!
//! Planar geometry for the Lightguide framework. This crate provides:
//!
//! - **Footprints** ([`footprint`]) — The outline of an optical element or
//!   aperture in its own depth layer: a polygon ring or a circle, with a
//!   tolerance-aware point-containment test.
//! - **Regions** ([`region`]) — Possibly disjoint planar areas supporting
//!   intersection, union, difference, convex hull, translation and area.
//! - **Transformations** ([`transform`]) — Rigid rotations about a centre,
//!   used to tilt the eyebox out of the coupling plane.

pub mod footprint;
pub mod region;
pub mod transform;

pub use footprint::Footprint;
pub use region::Region;
pub use transform::Transform;
