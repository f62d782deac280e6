//! Element and aperture footprints.
//!
//! A footprint is the outline an element occupies inside its depth layer.
//! Footprints are fully described by their TOML parameters, so the same
//! shape can be written by hand in a job file or derived from a layout.

use geo::{Contains, Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::region::Region;

/// Number of segments used when a circle has to become a polygon.
pub const CIRCLE_SEGMENTS: usize = 64;

/// The 2-D outline of an element or aperture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Footprint {
    Polygon(Ring),
    Circle(Circle),
}

/// A closed polygon ring. The closing vertex may be repeated or omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    /// Vertices (mm), in order.
    pub vertices: Vec<[f64; 2]>,
}

/// A circle defined by its centre and radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Centre position (mm).
    pub centre: [f64; 2],
    /// Radius (mm).
    pub radius: f64,
}

impl Footprint {
    pub fn polygon(vertices: Vec<[f64; 2]>) -> Self {
        Footprint::Polygon(Ring { vertices })
    }

    pub fn circle(centre: [f64; 2], radius: f64) -> Self {
        Footprint::Circle(Circle { centre, radius })
    }

    /// Axis-aligned rectangle spanning `min`..`max`.
    pub fn rectangle(min: [f64; 2], max: [f64; 2]) -> Self {
        Footprint::polygon(vec![
            [max[0], max[1]],
            [max[0], min[1]],
            [min[0], min[1]],
            [min[0], max[1]],
            [max[0], max[1]],
        ])
    }

    /// Build a footprint from a derived region.
    ///
    /// A single-part region keeps its exterior ring; a multi-part region is
    /// replaced by its convex hull. Returns `None` for an empty region.
    pub fn from_region(region: &Region) -> Option<Self> {
        if region.is_empty() {
            return None;
        }
        let outline = if region.len() == 1 {
            region.exterior()
        } else {
            region.convex_hull().exterior()
        };
        Some(Footprint::polygon(outline))
    }

    /// Outline vertices. Circles are sampled with [`CIRCLE_SEGMENTS`] edges.
    pub fn vertices(&self) -> Vec<[f64; 2]> {
        match self {
            Footprint::Polygon(r) => r.vertices.clone(),
            Footprint::Circle(c) => (0..=CIRCLE_SEGMENTS)
                .map(|i| {
                    let t = 2.0 * std::f64::consts::PI * i as f64 / CIRCLE_SEGMENTS as f64;
                    [c.centre[0] + c.radius * t.cos(), c.centre[1] + c.radius * t.sin()]
                })
                .collect(),
        }
    }

    /// Planar region covered by this footprint.
    pub fn to_region(&self) -> Region {
        Region::from_ring(&self.vertices())
    }

    /// Axis-aligned bounding box: returns (min_corner, max_corner).
    pub fn bounding_box(&self) -> ([f64; 2], [f64; 2]) {
        match self {
            Footprint::Circle(c) => (
                [c.centre[0] - c.radius, c.centre[1] - c.radius],
                [c.centre[0] + c.radius, c.centre[1] + c.radius],
            ),
            Footprint::Polygon(r) => {
                let mut min = [f64::INFINITY; 2];
                let mut max = [f64::NEG_INFINITY; 2];
                for v in &r.vertices {
                    for a in 0..2 {
                        min[a] = min[a].min(v[a]);
                        max[a] = max[a].max(v[a]);
                    }
                }
                (min, max)
            }
        }
    }

    /// Check whether a point lies inside the footprint or within `tolerance`
    /// of its boundary.
    pub fn contains(&self, point: [f64; 2], tolerance: f64) -> bool {
        self.contains_points(&[point], tolerance)[0]
    }

    /// Batch containment test, one flag per point.
    pub fn contains_points(&self, points: &[[f64; 2]], tolerance: f64) -> Vec<bool> {
        match self {
            Footprint::Circle(c) => points
                .iter()
                .map(|p| {
                    let dx = p[0] - c.centre[0];
                    let dy = p[1] - c.centre[1];
                    (dx * dx + dy * dy).sqrt() <= c.radius + tolerance
                })
                .collect(),
            Footprint::Polygon(r) => {
                if r.vertices.len() < 3 {
                    return vec![false; points.len()];
                }
                let ring: Vec<Coord<f64>> =
                    r.vertices.iter().map(|v| Coord { x: v[0], y: v[1] }).collect();
                let polygon = Polygon::new(LineString::new(ring), vec![]);
                points
                    .iter()
                    .map(|p| {
                        p[0].is_finite()
                            && p[1].is_finite()
                            && (polygon.contains(&Point::new(p[0], p[1]))
                                || distance_to_ring(*p, &r.vertices) <= tolerance)
                    })
                    .collect()
            }
        }
    }
}

/// Shortest distance from `p` to the closed ring through `vertices`.
fn distance_to_ring(p: [f64; 2], vertices: &[[f64; 2]]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|i| segment_distance(p, vertices[i], vertices[(i + 1) % n]))
        .fold(f64::INFINITY, f64::min)
}

fn segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len_sq > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let dx = ap[0] - t * ab[0];
    let dy = ap[1] - t * ab[1];
    (dx * dx + dy * dy).sqrt()
}
