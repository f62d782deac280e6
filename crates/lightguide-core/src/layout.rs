//! Projected 2-D layout.
//!
//! Turns a three-stage k-space solution (in-coupler → fold → out-coupler)
//! plus an eyebox and an input-coupler outline into element footprints in
//! the coupling plane.
//!
//! For every field sample:
//!
//! 1. The eyebox is sheared back to the coupling plane along the final-stage
//!    wavevector: offset $-d \, \mathbf{k}_\parallel / k_z$ for eye relief $d$.
//!    This is the area of the out-coupler that serves the eyebox.
//! 2. The in-coupler outline is swept along the first-stage in-plane
//!    direction across the whole layout diagonal: the input beam.
//! 3. Each part of the out-coupler area is swept backwards along the
//!    second-stage direction; where that sweep meets the input beam the fold
//!    element must act (the exit-pupil expander, EPE, area). Out-coupler parts
//!    that no EPE area can feed are dropped.
//!
//! Element footprints are the unions of these functional areas over field
//! samples and sequences.

use std::collections::BTreeMap;

use lightguide_geometry::{Footprint, Region, Transform};
use log::{debug, info};
use ndarray::{Array3, ArrayView2};
use thiserror::Error;

use crate::kspace::{KSpaceSolution, SequenceId};
use crate::types::{round_to, ElementId};

/// Cells with less coverage than this are flagged.
pub const COVERAGE_THRESHOLD: f64 = 0.5;

/// Areas below this are treated as empty (mm²).
pub const AREA_EPSILON: f64 = lightguide_geometry::region::AREA_EPSILON;

/// Number of stages a sequence must have to be laid out.
const LAYOUT_STAGES: usize = 3;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("The {0} has not been set")]
    NotAvailable(&'static str),

    #[error("Sequence {sequence} has {stages} stage(s); the layout needs three")]
    IncompleteSequence { sequence: SequenceId, stages: usize },
}

/// Eyebox outline and its per-sample projection onto the coupling plane.
#[derive(Debug, Clone)]
pub struct EyeboxProjection {
    /// Effective eyebox at `relief`.
    pub outline: Region,
    /// Effective eye relief (mm).
    pub relief: f64,
    /// Out-coupler area serving the eyebox, per sequence and field sample.
    pub active: BTreeMap<SequenceId, Vec<Region>>,
}

/// The input coupler and the beams it launches.
#[derive(Debug, Clone)]
pub struct InputBeams {
    pub coupler: Region,
    /// All sequences start at the same element.
    pub shared_coupler: bool,
    pub beams: BTreeMap<SequenceId, Vec<Region>>,
}

/// Functional areas of one field sample of one sequence.
#[derive(Debug, Clone, Default)]
pub struct FieldFootprint {
    /// Area of the fold element feeding the out-coupler.
    pub epe: Region,
    /// Usable out-coupler area.
    pub output: Region,
}

/// Result of [`ProjectedLayout::estimate`].
#[derive(Debug, Clone, Default)]
pub struct LayoutEstimate {
    pub fields: BTreeMap<SequenceId, Vec<FieldFootprint>>,
    /// `[input coupler, hull of EPE areas, hull of out-coupler areas]`.
    pub functional: BTreeMap<SequenceId, [Region; 3]>,
    /// Per-element footprint: union over sequences of the matching stage.
    pub elements: BTreeMap<ElementId, Region>,
    /// Union over sequences of the usable out-coupler area, per field sample.
    pub eyebox_cover: Vec<Region>,
}

/// Per-cell eyebox coverage.
#[derive(Debug, Clone)]
pub struct Coverage {
    /// Covered fraction of the eyebox, shaped `(h, v, wavelength)`.
    pub ratio: Array3<f64>,
    /// Cells below [`COVERAGE_THRESHOLD`].
    pub flagged: Vec<[usize; 3]>,
}

#[derive(Debug, Clone)]
pub struct ProjectedLayout {
    solution: KSpaceSolution,
    boundary: [[f64; 2]; 2],
    max_length: f64,
    eyebox: Option<EyeboxProjection>,
    input: Option<InputBeams>,
    estimate: Option<LayoutEstimate>,
}

impl ProjectedLayout {
    /// Lay out `solution` inside `boundary = [[x_min, x_max], [y_min, y_max]]`.
    ///
    /// Every traced sequence must have exactly three stages.
    pub fn new(solution: KSpaceSolution, boundary: [[f64; 2]; 2]) -> Result<Self, LayoutError> {
        for (sid, seq) in &solution.sequences {
            if seq.stage_count() != LAYOUT_STAGES {
                return Err(LayoutError::IncompleteSequence {
                    sequence: *sid,
                    stages: seq.stage_count(),
                });
            }
        }
        let dx = boundary[0][1] - boundary[0][0];
        let dy = boundary[1][1] - boundary[1][0];
        Ok(Self {
            solution,
            boundary,
            max_length: (dx * dx + dy * dy).sqrt(),
            eyebox: None,
            input: None,
            estimate: None,
        })
    }

    pub fn solution(&self) -> &KSpaceSolution {
        &self.solution
    }

    pub fn boundary(&self) -> [[f64; 2]; 2] {
        self.boundary
    }

    /// Sweep length: the layout diagonal.
    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    fn stage(&self, sid: SequenceId, index: usize) -> ArrayView2<'_, f64> {
        self.solution.sequences[&sid].stage(index)
    }

    /// Set the eyebox outline at `relief` above the coupling plane.
    ///
    /// With `tilt = [rx, ry, rz]` (degrees) the outline is first rotated
    /// about its centre; the effective relief is then the depth of the
    /// rotated vertex nearest the coupling plane, and the effective outline
    /// is the hull of the tilted eyebox projected along every field sample of
    /// the first sequence.
    pub fn set_eyebox(
        &mut self,
        relief: f64,
        eyebox: &Footprint,
        tilt: Option<[f64; 3]>,
    ) -> Result<&EyeboxProjection, LayoutError> {
        let mut relief = round_to(relief, 4);
        let mut outline = eyebox.to_region();

        if let Some(angles) = tilt {
            let (min, max) = eyebox.bounding_box();
            let centre = [0.5 * (min[0] + max[0]), 0.5 * (min[1] + max[1]), relief];
            let rot = Transform::rotation_about(centre, angles);
            let tilted: Vec<[f64; 3]> = eyebox
                .vertices()
                .iter()
                .map(|v| rot.apply(&[v[0], v[1], relief]))
                .collect();
            if let Some(nearest) = tilted.iter().min_by(|a, b| a[2].abs().total_cmp(&b[2].abs())) {
                relief = round_to(nearest[2], 4);
            }
            outline = match self.solution.sequences.values().next() {
                Some(seq) => {
                    let k = seq.final_stage();
                    let projected: Vec<Region> = k
                        .rows()
                        .into_iter()
                        .map(|row| {
                            let pts: Vec<[f64; 2]> = tilted
                                .iter()
                                .map(|p| {
                                    let t = (p[2] - relief) / row[3];
                                    [p[0] - row[1] * t, p[1] - row[2] * t]
                                })
                                .collect();
                            Region::hull_of_points(&pts)
                        })
                        .collect();
                    Region::union_all(&projected).convex_hull()
                }
                None => Region::hull_of_points(
                    &tilted.iter().map(|p| [p[0], p[1]]).collect::<Vec<_>>(),
                ),
            };
            debug!("Tilted eyebox: effective relief {relief} mm, area {:.3} mm²", outline.area());
        }

        let mut active = BTreeMap::new();
        for sid in self.solution.sequences.keys() {
            let regions: Vec<Region> = self
                .stage(*sid, LAYOUT_STAGES)
                .rows()
                .into_iter()
                .map(|row| outline.translate(-relief * row[1] / row[3], -relief * row[2] / row[3]))
                .collect();
            active.insert(*sid, regions);
        }

        self.estimate = None;
        Ok(self.eyebox.insert(EyeboxProjection {
            outline,
            relief,
            active,
        }))
    }

    pub fn eyebox(&self) -> Option<&EyeboxProjection> {
        self.eyebox.as_ref()
    }

    /// Set the input-coupler outline and sweep it along each sequence's
    /// first-stage direction.
    pub fn set_input(&mut self, coupler: &Footprint) -> Result<&InputBeams, LayoutError> {
        let coupler_region = coupler.to_region();
        let first: Vec<ElementId> = self
            .solution
            .sequences
            .values()
            .filter_map(|s| s.stages.first().map(|st| st.element))
            .collect();
        let shared_coupler = first.windows(2).all(|w| w[0] == w[1]);

        let mut beams = BTreeMap::new();
        for sid in self.solution.sequences.keys() {
            let regions: Vec<Region> = self
                .stage(*sid, 1)
                .rows()
                .into_iter()
                .map(|row| {
                    if !row[3].is_finite() {
                        return Region::empty();
                    }
                    let quad = self.sweep(coupler, [row[1], row[2]]);
                    if shared_coupler {
                        quad.union(&coupler_region)
                    } else {
                        quad.difference(&coupler_region)
                    }
                })
                .collect();
            beams.insert(*sid, regions);
        }

        self.estimate = None;
        Ok(self.input.insert(InputBeams {
            coupler: coupler_region,
            shared_coupler,
            beams,
        }))
    }

    pub fn input(&self) -> Option<&InputBeams> {
        self.input.as_ref()
    }

    /// Quadrilateral swept by `coupler` along `dir` for the layout diagonal.
    fn sweep(&self, coupler: &Footprint, dir: [f64; 2]) -> Region {
        let len = dir[0].hypot(dir[1]);
        if !(len > 0.0) || !len.is_finite() {
            return Region::empty();
        }
        let m = self.max_length / len;
        let phi = dir[1].atan2(dir[0]);
        let half_pi = std::f64::consts::FRAC_PI_2;

        let (p0, p1) = match coupler {
            Footprint::Circle(c) => {
                let side = |a: f64| [c.centre[0] + c.radius * a.cos(), c.centre[1] + c.radius * a.sin()];
                (side(phi - half_pi), side(phi + half_pi))
            }
            Footprint::Polygon(_) => {
                let mut verts = coupler.vertices();
                if verts.len() > 1 && verts.first() == verts.last() {
                    verts.pop();
                }
                if verts.is_empty() {
                    return Region::empty();
                }
                let n = verts.len() as f64;
                let c = verts
                    .iter()
                    .fold([0.0, 0.0], |a, v| [a[0] + v[0] / n, a[1] + v[1] / n]);
                // across-beam axis, from the right-hand to the left-hand side
                let axis = [
                    (phi + half_pi).cos() - (phi - half_pi).cos(),
                    (phi + half_pi).sin() - (phi - half_pi).sin(),
                ];
                let proj = |v: &[f64; 2]| (v[0] - c[0]) * axis[0] + (v[1] - c[1]) * axis[1];
                let lo = verts.iter().min_by(|a, b| proj(a).total_cmp(&proj(b)));
                let hi = verts.iter().max_by(|a, b| proj(a).total_cmp(&proj(b)));
                match (lo, hi) {
                    (Some(lo), Some(hi)) => (*lo, *hi),
                    _ => return Region::empty(),
                }
            }
        };
        let p2 = [p1[0] + m * dir[0], p1[1] + m * dir[1]];
        let p3 = [p0[0] + m * dir[0], p0[1] + m * dir[1]];
        Region::from_ring(&[p0, p1, p2, p3])
    }

    /// Derive EPE, out-coupler and element footprints.
    pub fn estimate(&mut self) -> Result<&LayoutEstimate, LayoutError> {
        let eyebox = self.eyebox.as_ref().ok_or(LayoutError::NotAvailable("eyebox"))?;
        let input = self.input.as_ref().ok_or(LayoutError::NotAvailable("input coupler"))?;

        let mut est = LayoutEstimate::default();
        for (sid, seq) in &self.solution.sequences {
            let fold = seq.stage(2);
            let fields: Vec<FieldFootprint> = fold
                .rows()
                .into_iter()
                .enumerate()
                .map(|(i, row)| {
                    self.field_footprint(
                        &eyebox.active[sid][i],
                        &input.beams[sid][i],
                        [row[1], row[2]],
                        row[3].is_finite(),
                    )
                })
                .collect();

            let epe_hull = Region::union_all(fields.iter().map(|f| &f.epe)).convex_hull();
            let oc_hull = Region::union_all(fields.iter().map(|f| &f.output)).convex_hull();
            let functional = [input.coupler.clone(), epe_hull, oc_hull];

            for (stage, area) in seq.stages.iter().zip(functional.iter()) {
                let entry = est.elements.entry(stage.element).or_default();
                *entry = entry.union(area);
            }
            est.functional.insert(*sid, functional);
            est.fields.insert(*sid, fields);
        }

        let samples = self.solution.sample_count();
        est.eyebox_cover = (0..samples)
            .map(|i| Region::union_all(est.fields.values().map(|f| &f[i].output)))
            .collect();

        info!(
            "Layout estimate: {} sequence(s), {} element footprint(s)",
            est.fields.len(),
            est.elements.len()
        );
        Ok(self.estimate.insert(est))
    }

    fn field_footprint(
        &self,
        active: &Region,
        beam: &Region,
        dir: [f64; 2],
        propagates: bool,
    ) -> FieldFootprint {
        let len = dir[0].hypot(dir[1]);
        if !propagates || !(len > 0.0) || active.is_empty() || beam.is_empty() {
            return FieldFootprint::default();
        }
        let m = self.max_length / len;
        let (dx, dy) = (m * dir[0], m * dir[1]);

        let mut ends = active.difference(beam).parts();
        ends.extend(active.intersection(beam).parts());

        let mut outputs = Vec::new();
        let mut epes = Vec::new();
        for end in ends {
            let start = end.translate(-dx, -dy);
            let swept = end.hull_with(&start);
            let epe = beam.intersection(&swept);
            if epe.area() > AREA_EPSILON {
                outputs.push(end);
                epes.push(epe);
            }
        }

        let epe = Region::union_all(&epes);
        let reach = epe.hull_with(&epe.translate(dx, dy));
        let output = Region::union_all(&outputs).intersection(&reach);
        FieldFootprint { epe, output }
    }

    pub fn layout_estimate(&self) -> Option<&LayoutEstimate> {
        self.estimate.as_ref()
    }

    /// Footprint of one element, as derived by [`Self::estimate`].
    pub fn element_footprint(&self, element: ElementId) -> Result<Option<Footprint>, LayoutError> {
        let est = self
            .estimate
            .as_ref()
            .ok_or(LayoutError::NotAvailable("layout estimate"))?;
        Ok(est.elements.get(&element).and_then(Footprint::from_region))
    }

    /// Covered fraction of the eyebox per field cell, for one sequence or for
    /// all sequences together.
    pub fn coverage(&self, sequence: Option<SequenceId>) -> Result<Coverage, LayoutError> {
        let eyebox = self.eyebox.as_ref().ok_or(LayoutError::NotAvailable("eyebox"))?;
        let est = self
            .estimate
            .as_ref()
            .ok_or(LayoutError::NotAvailable("layout estimate"))?;
        let total = eyebox.outline.area();
        let (nh, nv, nw) = self.solution.shape;

        let areas: Vec<f64> = match sequence {
            Some(sid) => est
                .fields
                .get(&sid)
                .map(|f| f.iter().map(|x| x.output.area()).collect())
                .unwrap_or_else(|| vec![0.0; nh * nv * nw]),
            None => est.eyebox_cover.iter().map(Region::area).collect(),
        };

        let mut ratio = Array3::zeros((nh, nv, nw));
        let mut flagged = Vec::new();
        for h in 0..nh {
            for v in 0..nv {
                for w in 0..nw {
                    let r = areas[self.solution.sample_index(h, v, w)] / total;
                    ratio[[h, v, w]] = r;
                    if !(r >= COVERAGE_THRESHOLD) {
                        flagged.push([h, v, w]);
                    }
                }
            }
        }
        Ok(Coverage { ratio, flagged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Period;
    use crate::kspace::KSpaceDomain;
    use crate::source::SourceOptions;
    use approx::assert_relative_eq;
    use lightguide_materials::Material;

    /// Normal-incidence, single-sample, IC → fold → OC design that turns
    /// +x propagation into −y propagation.
    fn turn_design() -> KSpaceSolution {
        let glass = Material::new("n1.9", [1.9 * 1.9 - 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let mut kd = KSpaceDomain::new(glass, Material::air());
        kd.set_source(SourceOptions {
            fov: [0.0; 4],
            fov_grid: [1, 1],
            ..SourceOptions::default()
        });
        let ic = kd.add_grating("IC", &[Period::new(0.38, 0.0)]).unwrap();
        let fold = kd
            .add_grating("FOLD", &[Period::new(0.38 / 2f64.sqrt(), -135.0)])
            .unwrap();
        let oc = kd.add_grating("OC", &[Period::new(0.38, 90.0)]).unwrap();
        kd.add_canonical_sequence(&[(ic, [1, 0]), (fold, [1, 0]), (oc, [1, 0])]);
        kd.trace().unwrap()
    }

    fn boundary() -> [[f64; 2]; 2] {
        [[-100.0, 100.0], [-100.0, 100.0]]
    }

    #[test]
    fn test_short_sequence_rejected() {
        let glass = Material::new("n1.9", [2.61, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let mut kd = KSpaceDomain::new(glass, Material::air());
        kd.set_source(SourceOptions::default());
        let ic = kd.add_grating("IC", &[Period::new(0.38, 0.0)]).unwrap();
        kd.add_canonical_sequence(&[(ic, [1, 0])]);
        let sol = kd.trace().unwrap();
        assert!(matches!(
            ProjectedLayout::new(sol, boundary()),
            Err(LayoutError::IncompleteSequence { stages: 1, .. })
        ));
    }

    #[test]
    fn test_estimate_requires_eyebox() {
        let mut layout = ProjectedLayout::new(turn_design(), boundary()).unwrap();
        assert!(matches!(layout.estimate(), Err(LayoutError::NotAvailable("eyebox"))));
        assert!(layout.coverage(None).is_err());
    }

    #[test]
    fn test_normal_incidence_eyebox_is_unsheared() {
        let mut layout = ProjectedLayout::new(turn_design(), boundary()).unwrap();
        let eb = layout
            .set_eyebox(20.0, &Footprint::rectangle([-5.0, -5.0], [5.0, 5.0]), None)
            .unwrap();
        assert_relative_eq!(eb.relief, 20.0);
        assert_relative_eq!(eb.active[&0][0].area(), 100.0, epsilon = 1e-6);
        assert!(eb.active[&0][0].contains_point([0.0, 0.0]));
    }

    #[test]
    fn test_turn_design_footprints() {
        let mut layout = ProjectedLayout::new(turn_design(), boundary()).unwrap();
        layout
            .set_eyebox(20.0, &Footprint::rectangle([-5.0, -5.0], [5.0, 5.0]), None)
            .unwrap();
        let input = layout.set_input(&Footprint::circle([-30.0, 20.0], 3.0)).unwrap();
        assert!(input.shared_coupler);
        let est = layout.estimate().unwrap();

        // fold area: the out-coupler column cut by the input beam band
        let fold = &est.elements[&2];
        assert_relative_eq!(fold.area(), 60.0, epsilon = 0.05);
        assert!(fold.contains_point([0.0, 20.0]));
        // the whole eyebox is served
        assert_relative_eq!(est.elements[&3].area(), 100.0, epsilon = 0.05);

        let cov = layout.coverage(None).unwrap();
        assert_eq!(cov.ratio.dim(), (1, 1, 1));
        assert_relative_eq!(cov.ratio[[0, 0, 0]], 1.0, epsilon = 1e-3);
        assert!(cov.flagged.is_empty());

        let fp = layout.element_footprint(3).unwrap().unwrap();
        assert_relative_eq!(fp.to_region().area(), 100.0, epsilon = 0.05);
    }

    #[test]
    fn test_missed_beam_gives_empty_coverage() {
        let mut layout = ProjectedLayout::new(turn_design(), boundary()).unwrap();
        layout
            .set_eyebox(20.0, &Footprint::rectangle([-5.0, -5.0], [5.0, 5.0]), None)
            .unwrap();
        // beam runs along +x below the eyebox; the fold sends light to −y,
        // away from the eyebox
        layout.set_input(&Footprint::circle([-30.0, -40.0], 3.0)).unwrap();
        layout.estimate().unwrap();
        let cov = layout.coverage(Some(0)).unwrap();
        assert_relative_eq!(cov.ratio[[0, 0, 0]], 0.0);
        assert_eq!(cov.flagged, vec![[0, 0, 0]]);
    }

    #[test]
    fn test_tilted_eyebox_relief_and_area() {
        let mut layout = ProjectedLayout::new(turn_design(), boundary()).unwrap();
        let eb = layout
            .set_eyebox(
                20.0,
                &Footprint::rectangle([-5.0, -5.0], [5.0, 5.0]),
                Some([10.0, 0.0, 0.0]),
            )
            .unwrap();
        let tilt = 10f64.to_radians();
        assert_relative_eq!(eb.relief, 20.0 - 5.0 * tilt.sin(), epsilon = 1e-4);
        assert_relative_eq!(eb.outline.area(), 100.0 * tilt.cos(), epsilon = 1e-3);
    }
}
