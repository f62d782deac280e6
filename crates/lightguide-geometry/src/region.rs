//! Planar regions and their set algebra.
//!
//! A [`Region`] is a possibly disjoint, possibly empty area in one plane.
//! Degenerate inputs (fewer than three vertices, non-finite coordinates,
//! zero area) collapse to the empty region instead of failing, so chains of
//! operations on empty intersections propagate emptiness.

use geo::{
    Area, BooleanOps, Contains, ConvexHull, Coord, LineString, MultiPoint, MultiPolygon, Point,
    Polygon, Translate,
};

/// Areas below this are treated as empty (mm²).
pub const AREA_EPSILON: f64 = 1e-9;

/// A planar area made of zero or more polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct Region(MultiPolygon<f64>);

impl Default for Region {
    fn default() -> Self {
        Self::empty()
    }
}

impl Region {
    pub fn empty() -> Self {
        Region(MultiPolygon::new(vec![]))
    }

    /// Region bounded by a single ring of vertices.
    pub fn from_ring(vertices: &[[f64; 2]]) -> Self {
        if vertices.len() < 3 || vertices.iter().any(|v| !v[0].is_finite() || !v[1].is_finite()) {
            return Self::empty();
        }
        let ring: Vec<Coord<f64>> = vertices.iter().map(|v| Coord { x: v[0], y: v[1] }).collect();
        Self::from_polygons(vec![Polygon::new(LineString::new(ring), vec![])])
    }

    fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        Region(MultiPolygon::new(
            polygons
                .into_iter()
                .filter(|p| p.unsigned_area() > AREA_EPSILON)
                .collect(),
        ))
    }

    fn from_multi(mp: MultiPolygon<f64>) -> Self {
        Self::from_polygons(mp.0)
    }

    /// Number of disjoint parts.
    pub fn len(&self) -> usize {
        self.0 .0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0 .0.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.0.unsigned_area()
    }

    /// Each disjoint part as its own region.
    pub fn parts(&self) -> Vec<Region> {
        self.0
             .0
            .iter()
            .map(|p| Region(MultiPolygon::new(vec![p.clone()])))
            .collect()
    }

    pub fn intersection(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return Region::empty();
        }
        Self::from_multi(self.0.intersection(&other.0))
    }

    pub fn union(&self, other: &Region) -> Region {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self::from_multi(self.0.union(&other.0)),
        }
    }

    pub fn difference(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        Self::from_multi(self.0.difference(&other.0))
    }

    /// Union of any number of regions.
    pub fn union_all<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Region {
        regions
            .into_iter()
            .fold(Region::empty(), |acc, r| acc.union(r))
    }

    pub fn convex_hull(&self) -> Region {
        Self::hull_of_points(&self.points())
    }

    /// Convex hull of the vertices of both regions.
    pub fn hull_with(&self, other: &Region) -> Region {
        let mut pts = self.points();
        pts.extend(other.points());
        Self::hull_of_points(&pts)
    }

    /// Convex hull of a point cloud; fewer than three distinct points give
    /// the empty region.
    pub fn hull_of_points(points: &[[f64; 2]]) -> Region {
        let finite: Vec<Point<f64>> = points
            .iter()
            .filter(|p| p[0].is_finite() && p[1].is_finite())
            .map(|p| Point::new(p[0], p[1]))
            .collect();
        if finite.len() < 3 {
            return Region::empty();
        }
        Self::from_polygons(vec![MultiPoint::new(finite).convex_hull()])
    }

    /// Shift by `(dx, dy)`. A non-finite offset yields the empty region.
    pub fn translate(&self, dx: f64, dy: f64) -> Region {
        if !dx.is_finite() || !dy.is_finite() {
            return Region::empty();
        }
        Region(self.0.translate(dx, dy))
    }

    pub fn contains_point(&self, p: [f64; 2]) -> bool {
        self.0.contains(&Point::new(p[0], p[1]))
    }

    /// All exterior vertices of all parts.
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.0
             .0
            .iter()
            .flat_map(|p| p.exterior().coords().map(|c| [c.x, c.y]))
            .collect()
    }

    /// Exterior ring of the largest part (closed), or nothing when empty.
    pub fn exterior(&self) -> Vec<[f64; 2]> {
        self.0
             .0
            .iter()
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|p| p.exterior().coords().map(|c| [c.x, c.y]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::from_ring(&[[x0, y0], [x1, y0], [x1, y1], [x0, y1]])
    }

    #[test]
    fn test_boolean_areas() {
        let a = rect(0.0, 0.0, 2.0, 2.0);
        let b = rect(1.0, 0.0, 3.0, 2.0);
        assert_relative_eq!(a.intersection(&b).area(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(a.union(&b).area(), 6.0, epsilon = 1e-9);
        assert_relative_eq!(a.difference(&b).area(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(5.0, 5.0, 6.0, 6.0);
        assert!(a.intersection(&b).is_empty());
        assert_eq!(a.union(&b).len(), 2);
    }

    #[test]
    fn test_hull_and_translate() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = a.translate(3.0, 0.0);
        assert_relative_eq!(a.hull_with(&b).area(), 4.0, epsilon = 1e-9);
        assert!(a.translate(f64::NAN, 0.0).is_empty());
    }

    #[test]
    fn test_degenerate_rings_are_empty() {
        assert!(Region::from_ring(&[[0.0, 0.0], [1.0, 1.0]]).is_empty());
        assert!(Region::from_ring(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]).is_empty());
        assert!(Region::hull_of_points(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]).is_empty());
    }
}
