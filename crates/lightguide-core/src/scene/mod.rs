//! Layered 3-D scene.
//!
//! Sources and elements are registered at depths `z`; elements sharing a
//! (rounded) depth form one layer. Tracing repeatedly steps every ray to
//! the nearest layer ahead of it, tests it against the footprints in that
//! layer and lets the element it hits re-emit it. The resulting interaction
//! records feed the graph analysis in [`graph`].
//!
//! Path constraints override the order tables of named gratings for one
//! trace. Each (wavelength, path) trace runs on its own snapshot of the
//! elements, so overrides never leak between traces.

pub mod graph;
mod trace;

pub use graph::{
    ClassifiedIncidence, GraphEdge, GraphNode, Incidence, InteractionGraph, LineGraph, SceneGraphs,
    Segment, WavelengthGraphs,
};
pub use trace::{Interaction, PathSummary, TraceResult, WavelengthTrace};

use std::collections::BTreeMap;

use lightguide_geometry::Footprint;
use lightguide_materials::Material;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::elements::{ElementKind, OpticalElement, OrderTable};
use crate::source::{Source, SourceOptions};
use crate::types::{ElementId, Precision, Ray};

pub type PathId = usize;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("No trace is available; run a trace first")]
    NotTraced,

    #[error("Element {0} is not registered")]
    UnknownElement(ElementId),
}

/// Tracing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneParams {
    pub precision: Precision,
    /// Distance (mm) within which a landing point still hits a footprint.
    pub hit_tolerance: f64,
    /// `[[x_min, x_max], [y_min, y_max], [z_min, z_max]]`; rays landing
    /// outside are dropped.
    pub boundary: [[f64; 2]; 3],
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            hit_tolerance: 1e-3,
            boundary: [[-100.0, 100.0], [-100.0, 100.0], [-50.0, 50.0]],
        }
    }
}

impl SceneParams {
    pub fn contains(&self, p: &[f64; 3]) -> bool {
        p.iter()
            .zip(self.boundary.iter())
            .all(|(v, [lo, hi])| *v >= *lo && *v <= *hi)
    }
}

/// Order-table overrides for one optical path, keyed by element name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathConstraint(pub BTreeMap<String, OrderTable>);

impl PathConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, element: impl Into<String>, orders: OrderTable) -> Self {
        self.0.insert(element.into(), orders);
        self
    }
}

/// An element placed in the scene.
#[derive(Debug, Clone)]
pub struct SceneElement {
    pub id: ElementId,
    pub z: f64,
    pub footprint: Footprint,
    pub element: OpticalElement,
}

impl SceneElement {
    pub fn kind(&self) -> ElementKind {
        self.element.kind()
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }
}

/// Elements sharing one depth, in registration order.
#[derive(Debug, Clone)]
pub struct Layer {
    pub z: f64,
    pub elements: Vec<ElementId>,
}

#[derive(Debug, Clone)]
pub struct Scene {
    environment: Material,
    params: SceneParams,
    sources: BTreeMap<ElementId, Source>,
    elements: BTreeMap<ElementId, SceneElement>,
    layers: BTreeMap<i64, Layer>,
    paths: BTreeMap<PathId, BTreeMap<ElementId, OrderTable>>,
    next_id: ElementId,
    next_path: PathId,
    trace: Option<TraceResult>,
}

impl Scene {
    /// An empty scene whose sources launch into `environment`.
    pub fn new(environment: Material) -> Self {
        Self::with_params(environment, SceneParams::default())
    }

    pub fn with_params(environment: Material, params: SceneParams) -> Self {
        Self {
            environment,
            params,
            sources: BTreeMap::new(),
            elements: BTreeMap::new(),
            layers: BTreeMap::new(),
            paths: BTreeMap::new(),
            next_id: 1,
            next_path: 0,
            trace: None,
        }
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    pub fn environment(&self) -> &Material {
        &self.environment
    }

    fn next_id(&mut self) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_source(
        &mut self,
        z: f64,
        footprint: Option<Footprint>,
        options: SourceOptions,
    ) -> ElementId {
        let id = self.next_id();
        self.sources.insert(id, Source::new(z, footprint, options));
        id
    }

    pub fn add_element(
        &mut self,
        z: f64,
        element: impl Into<OpticalElement>,
        footprint: Footprint,
    ) -> ElementId {
        let id = self.next_id();
        let precision = self.params.precision;
        let z = precision.round_position(z);
        self.layers
            .entry(precision.position_key(z))
            .or_insert_with(|| Layer {
                z,
                elements: Vec::new(),
            })
            .elements
            .push(id);
        self.elements.insert(
            id,
            SceneElement {
                id,
                z,
                footprint,
                element: element.into(),
            },
        );
        id
    }

    /// Register a path constraint. Names that match no grating are ignored
    /// with a warning.
    pub fn add_path(&mut self, constraint: &PathConstraint) -> PathId {
        let mut overrides = BTreeMap::new();
        for (name, orders) in &constraint.0 {
            match self.elements.values().find(|e| e.name() == name) {
                Some(e) if e.kind() == ElementKind::Grating => {
                    overrides.insert(e.id, orders.clone());
                }
                Some(e) => warn!("Path constraint names {name}, a {}; ignored", e.kind()),
                None => warn!("Path constraint names unknown element {name}; ignored"),
            }
        }
        let id = self.next_path;
        self.paths.insert(id, overrides);
        self.next_path += 1;
        id
    }

    pub fn element(&self, id: ElementId) -> Option<&SceneElement> {
        self.elements.get(&id)
    }

    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.elements.values().find(|e| e.name() == name).map(|e| e.id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &SceneElement> {
        self.elements.values()
    }

    pub fn sources(&self) -> impl Iterator<Item = (ElementId, &Source)> {
        self.sources.iter().map(|(id, s)| (*id, s))
    }

    /// Layers in ascending depth.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Highest registered element id; the default graph terminal.
    pub fn last_element(&self) -> Option<ElementId> {
        self.elements.keys().next_back().copied()
    }

    /// Distinct source wavelengths in first-seen order.
    pub fn wavelengths(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for w in self.sources.values().flat_map(|s| s.options.wavelengths.iter()) {
            if !out.iter().any(|x| x.to_bits() == w.to_bits()) {
                out.push(*w);
            }
        }
        out
    }

    /// Rectangle enclosing every element footprint, grown by `border` (mm).
    pub fn bounding_footprint(&self, border: f64) -> Option<Footprint> {
        let mut boxes = self.elements.values().map(|e| e.footprint.bounding_box());
        let (mut min, mut max) = boxes.next()?;
        for (lo, hi) in boxes {
            for a in 0..2 {
                min[a] = min[a].min(lo[a]);
                max[a] = max[a].max(hi[a]);
            }
        }
        Some(Footprint::rectangle(
            [min[0] - border, min[1] - border],
            [max[0] + border, max[1] + border],
        ))
    }

    /// Rays absorbed by a receiver across all traces so far.
    pub fn receiver_hits(&self, id: ElementId) -> Result<&[Ray], SceneError> {
        self.elements
            .get(&id)
            .and_then(|e| e.element.as_receiver())
            .map(|r| r.absorbed())
            .ok_or(SceneError::UnknownElement(id))
    }

    pub fn trace_result(&self) -> Result<&TraceResult, SceneError> {
        self.trace.as_ref().ok_or(SceneError::NotTraced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Grating, Period, Receiver};

    fn square(h: f64) -> Footprint {
        Footprint::rectangle([-h, -h], [h, h])
    }

    #[test]
    fn test_ids_are_sequential_and_layers_group() {
        let mut scene = Scene::new(Material::air());
        let s = scene.add_source(-1.0, None, SourceOptions::default());
        let g = Grating::new("G", &[Period::new(0.4, 0.0)], [Material::air(), Material::air()]).unwrap();
        let a = scene.add_element(0.6, g, square(5.0));
        let b = scene.add_element(0.60001, Receiver::new("R"), square(1.0));
        let c = scene.add_element(-20.0, Receiver::new("Eye"), square(10.0));
        assert_eq!((s, a, b, c), (1, 2, 3, 4));
        let layers: Vec<(f64, Vec<ElementId>)> =
            scene.layers().map(|l| (l.z, l.elements.clone())).collect();
        assert_eq!(layers, vec![(-20.0, vec![4]), (0.6, vec![2, 3])]);
        assert_eq!(scene.last_element(), Some(4));
    }

    #[test]
    fn test_bounding_footprint() {
        let mut scene = Scene::new(Material::air());
        scene.add_element(0.0, Receiver::new("A"), Footprint::rectangle([-1.0, 0.0], [2.0, 3.0]));
        scene.add_element(1.0, Receiver::new("B"), Footprint::circle([5.0, 5.0], 1.0));
        let fp = scene.bounding_footprint(2.0).unwrap();
        assert_eq!(fp.bounding_box(), ([-3.0, -2.0], [8.0, 8.0]));
        assert!(Scene::new(Material::air()).bounding_footprint(1.0).is_none());
    }

    #[test]
    fn test_graph_before_trace_is_not_available() {
        let scene = Scene::new(Material::air());
        assert!(matches!(scene.trace_result(), Err(SceneError::NotTraced)));
        assert!(matches!(scene.graphs(None), Err(SceneError::NotTraced)));
    }

    #[test]
    fn test_path_with_unknown_name_is_registered_empty() {
        let mut scene = Scene::new(Material::air());
        scene.add_element(0.0, Receiver::new("R"), square(1.0));
        let p = scene.add_path(&PathConstraint::new().with("nope", OrderTable::default()));
        assert_eq!(p, 0);
        assert_eq!(scene.path_count(), 1);
        assert!(scene.paths[&p].is_empty());
    }

    #[test]
    fn test_boundary_check() {
        let params = SceneParams::default();
        assert!(params.contains(&[0.0, 0.0, 0.0]));
        assert!(params.contains(&[100.0, -100.0, 50.0]));
        assert!(!params.contains(&[0.0, 0.0, -50.5]));
    }
}
