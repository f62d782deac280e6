//! Sequential k-space domain.
//!
//! Screens chains of gratings using wavevector algebra alone: no placement,
//! no footprints. A sequence is an ordered list of up to three stages, each
//! a grating, one diffraction order and the medium the light ends up in.
//! Tracing starts every sequence from the same source samples and records
//! the wavevector after each stage.
//!
//! ## Stage arrays
//!
//! Each traced sequence yields an array of shape `(stages + 1, samples, 4)`
//! whose rows are `[wavelength, kx, ky, kz]`. Index 0 holds the source
//! samples; index `i` holds the result of stage `i`. A sample that failed to
//! propagate at some stage has `kz = NaN` from then on.

use std::collections::BTreeMap;
use std::fmt;

use lightguide_materials::Material;
use log::{debug, info, warn};
use ndarray::{s, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::elements::{Grating, GratingError, Period};
use crate::source::{Source, SourceOptions};
use crate::types::{ElementId, Precision};

/// Sequences longer than this are not registered.
pub const MAX_SEQUENCE_LEN: usize = 3;

pub type SequenceId = usize;

#[derive(Debug, Error)]
pub enum KSpaceError {
    #[error("No source has been set")]
    NoSource,

    #[error("Sequence {sequence} refers to unknown grating {element}")]
    UnknownElement {
        sequence: SequenceId,
        element: ElementId,
    },
}

/// Medium a stage diffracts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageMedium {
    Ambient,
    /// Inside the guide; the result must also be trapped by total internal
    /// reflection against the ambient.
    Substrate,
}

/// One step of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub element: ElementId,
    pub order: [i32; 2],
    pub medium: StageMedium,
}

impl Stage {
    pub fn new(element: ElementId, order: [i32; 2], medium: StageMedium) -> Self {
        Self {
            element,
            order,
            medium,
        }
    }
}

/// Wavevectors of one sequence after every stage.
#[derive(Debug, Clone)]
pub struct SequenceTrace {
    pub stages: Vec<Stage>,
    /// `(stages + 1, samples, 4)`, rows `[wavelength, kx, ky, kz]`.
    pub k: Array3<f64>,
}

impl SequenceTrace {
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Samples after stage `index` (0 = source).
    pub fn stage(&self, index: usize) -> ArrayView2<'_, f64> {
        self.k.slice(s![index, .., ..])
    }

    pub fn final_stage(&self) -> ArrayView2<'_, f64> {
        self.stage(self.stages.len())
    }

    /// Samples that still propagate after the last stage.
    pub fn propagating(&self) -> Vec<bool> {
        self.final_stage()
            .rows()
            .into_iter()
            .map(|r| r[3].is_finite())
            .collect()
    }
}

/// Result of tracing a [`KSpaceDomain`].
#[derive(Debug, Clone)]
pub struct KSpaceSolution {
    /// `(horizontal, vertical, wavelength)` sample counts.
    pub shape: (usize, usize, usize),
    pub wavelengths: Vec<f64>,
    /// Field angles `(h, v)` in sampling order.
    pub field_angles: Vec<(f64, f64)>,
    pub sequences: BTreeMap<SequenceId, SequenceTrace>,
}

impl KSpaceSolution {
    pub fn sample_count(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    /// Flat sample index of grid cell `(h, v, w)`.
    pub fn sample_index(&self, h: usize, v: usize, w: usize) -> usize {
        (h * self.shape.1 + v) * self.shape.2 + w
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&SequenceTrace> {
        self.sequences.get(&id)
    }
}

/// A library of gratings and order sequences between an ambient medium and
/// a substrate.
#[derive(Debug, Clone)]
pub struct KSpaceDomain {
    ambient: Material,
    substrate: Material,
    source: Option<Source>,
    gratings: BTreeMap<ElementId, Grating>,
    sequences: BTreeMap<SequenceId, Vec<Stage>>,
    next_element: ElementId,
    next_sequence: SequenceId,
    precision: Precision,
}

impl KSpaceDomain {
    pub fn new(substrate: Material, ambient: Material) -> Self {
        Self {
            ambient,
            substrate,
            source: None,
            gratings: BTreeMap::new(),
            sequences: BTreeMap::new(),
            next_element: 1,
            next_sequence: 0,
            precision: Precision::default(),
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn ambient(&self) -> &Material {
        &self.ambient
    }

    pub fn substrate(&self) -> &Material {
        &self.substrate
    }

    /// Set the source. Only the field-of-view and wavelength sampling matter
    /// here; the spatial grid is collapsed to one sample.
    pub fn set_source(&mut self, options: SourceOptions) {
        self.source = Some(Source::field(options));
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Register a grating between ambient (backward side) and substrate
    /// (forward side).
    pub fn add_grating(
        &mut self,
        name: impl Into<String>,
        periods: &[Period],
    ) -> Result<ElementId, GratingError> {
        let grating = Grating::new(
            name,
            periods,
            [self.ambient.clone(), self.substrate.clone()],
        )?;
        let id = self.next_element;
        self.gratings.insert(id, grating);
        self.next_element += 1;
        Ok(id)
    }

    pub fn grating(&self, id: ElementId) -> Option<&Grating> {
        self.gratings.get(&id)
    }

    pub fn grating_mut(&mut self, id: ElementId) -> Option<&mut Grating> {
        self.gratings.get_mut(&id)
    }

    pub fn gratings(&self) -> impl Iterator<Item = (ElementId, &Grating)> {
        self.gratings.iter().map(|(id, g)| (*id, g))
    }

    /// Id of the grating called `name`.
    pub fn grating_id(&self, name: &str) -> Option<ElementId> {
        self.gratings
            .iter()
            .find(|(_, g)| g.name() == name)
            .map(|(id, _)| *id)
    }

    /// Register a sequence with explicit stage media.
    ///
    /// Sequences longer than [`MAX_SEQUENCE_LEN`] are not registered; a
    /// warning is logged and `None` returned.
    pub fn add_sequence(&mut self, stages: Vec<Stage>) -> Option<SequenceId> {
        if stages.len() > MAX_SEQUENCE_LEN {
            warn!(
                "Ignoring sequence of {} stages (at most {} are supported)",
                stages.len(),
                MAX_SEQUENCE_LEN
            );
            return None;
        }
        let id = self.next_sequence;
        self.sequences.insert(id, stages);
        self.next_sequence += 1;
        Some(id)
    }

    /// Register an in-coupler → fold → out-coupler style sequence: every
    /// stage stays in the substrate except the last, which exits to ambient.
    pub fn add_canonical_sequence(&mut self, orders: &[(ElementId, [i32; 2])]) -> Option<SequenceId> {
        let last = orders.len().saturating_sub(1);
        let stages = orders
            .iter()
            .enumerate()
            .map(|(i, (element, order))| {
                let medium = if i == last {
                    StageMedium::Ambient
                } else {
                    StageMedium::Substrate
                };
                Stage::new(*element, *order, medium)
            })
            .collect();
        self.add_sequence(stages)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&[Stage]> {
        self.sequences.get(&id).map(Vec::as_slice)
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Source samples as rows `[wavelength, kx, ky, kz]` in the ambient.
    pub fn source_samples(&self) -> Result<Array2<f64>, KSpaceError> {
        let source = self.source.as_ref().ok_or(KSpaceError::NoSource)?;
        let rays = source.launch(&self.ambient, &self.precision, 0.0);
        let mut k = Array2::zeros((rays.len(), 4));
        for (mut row, ray) in k.rows_mut().into_iter().zip(rays.iter()) {
            row[0] = ray.wavelength;
            row[1] = ray.k[0];
            row[2] = ray.k[1];
            row[3] = ray.k[2];
        }
        Ok(k)
    }

    /// Trace every registered sequence.
    pub fn trace(&self) -> Result<KSpaceSolution, KSpaceError> {
        let ids: Vec<SequenceId> = self.sequences.keys().copied().collect();
        self.trace_sequences(&ids)
    }

    /// Trace the listed sequences; unknown sequence ids are skipped.
    pub fn trace_sequences(&self, ids: &[SequenceId]) -> Result<KSpaceSolution, KSpaceError> {
        let source = self.source.as_ref().ok_or(KSpaceError::NoSource)?;
        let k_source = self.source_samples()?;
        let mut sequences = BTreeMap::new();

        for &sid in ids {
            let Some(stages) = self.sequences.get(&sid) else {
                continue;
            };
            let mut k = Array3::from_elem((stages.len() + 1, k_source.nrows(), 4), f64::NAN);
            k.slice_mut(s![0, .., ..]).assign(&k_source);

            for (i, stage) in stages.iter().enumerate() {
                let grating = self.gratings.get(&stage.element).ok_or(
                    KSpaceError::UnknownElement {
                        sequence: sid,
                        element: stage.element,
                    },
                )?;
                let out = self.apply_stage(grating, stage, k.slice(s![i, .., ..]));
                let surviving = out.column(3).iter().filter(|v| v.is_finite()).count();
                debug!(
                    "Sequence {sid} stage {} ({} order {:?}): {surviving}/{} samples propagate",
                    i + 1,
                    grating.name(),
                    stage.order,
                    out.nrows()
                );
                k.slice_mut(s![i + 1, .., ..]).assign(&out);
            }
            sequences.insert(
                sid,
                SequenceTrace {
                    stages: stages.clone(),
                    k,
                },
            );
        }

        info!("Traced {} k-space sequence(s)", sequences.len());
        let (nh, nv, nw) = source.field_shape();
        Ok(KSpaceSolution {
            shape: (nh, nv, nw),
            wavelengths: source.options.wavelengths.clone(),
            field_angles: source.field_angles(),
            sequences,
        })
    }

    fn apply_stage(&self, grating: &Grating, stage: &Stage, k_in: ArrayView2<'_, f64>) -> Array2<f64> {
        let medium = match stage.medium {
            StageMedium::Ambient => &self.ambient,
            StageMedium::Substrate => &self.substrate,
        };
        let mut out = grating.propagate_order(k_in, stage.order, medium);
        for mut row in out.rows_mut() {
            for c in 1..4 {
                row[c] = self.precision.round_k(row[c]);
            }
            if stage.medium == StageMedium::Substrate {
                let n = self.ambient.index(row[0]);
                if !(row[1] * row[1] + row[2] * row[2] > n * n) {
                    row[3] = f64::NAN;
                }
            }
        }
        out
    }
}

impl fmt::Display for KSpaceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "k-space domain")?;
        writeln!(f, "  ambient:   {}", self.ambient.name())?;
        writeln!(f, "  substrate: {}", self.substrate.name())?;
        match &self.source {
            Some(src) => {
                let o = &src.options;
                writeln!(
                    f,
                    "  source:    fov {:?}, grid {}×{}, wavelengths {:?} µm",
                    o.fov, o.fov_grid[0], o.fov_grid[1], o.wavelengths
                )?;
            }
            None => writeln!(f, "  source:    (none)")?,
        }
        for (id, g) in &self.gratings {
            let [p, q] = g.periods();
            write!(f, "  grating {id} {}: Λ1 = {} µm @ {}°", g.name(), p.pitch_um, p.angle_deg)?;
            if q.pitch_um.is_finite() {
                write!(f, ", Λ2 = {} µm @ {}°", q.pitch_um, q.angle_deg)?;
            }
            writeln!(f)?;
        }
        for (id, stages) in &self.sequences {
            let parts: Vec<String> = stages
                .iter()
                .map(|s| format!("{}{:?}/{:?}", s.element, s.order, s.medium))
                .collect();
            writeln!(f, "  sequence {id}: {}", parts.join(" → "))?;
        }
        Ok(())
    }
}
