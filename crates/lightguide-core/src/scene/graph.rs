//! Interaction graphs.
//!
//! Per wavelength, the interaction records of a trace become a directed
//! graph: one node per distinct (rounded landing point, element id), one
//! synthetic node per launched ray (element id 0), and one edge per ray
//! segment carrying its wavevector. The graph is then
//!
//! 1. restricted to nodes from which a terminal element can be reached,
//! 2. split into one subgraph per source node,
//! 3. cleaned of reciprocal edge pairs (two-node strongly-connected
//!    components), keeping the edge that leads away from the source.
//!
//! The line graph turns every segment into a node and every node of the
//! original graph into incidences: pairs of incoming and outgoing segments
//! sharing an interaction point.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use log::info;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef, Reversed};
use petgraph::Direction as EdgeDirection;
use serde::Serialize;

use crate::scene::{Scene, SceneError, WavelengthTrace};
use crate::types::{Direction, ElementId, Precision, SOURCE_ID};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphNode {
    pub position: [f64; 3],
    pub element: ElementId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphEdge {
    /// Wavevector along the segment.
    pub k: [f64; 3],
}

pub type InteractionGraph = DiGraph<GraphNode, GraphEdge>;

/// A ray segment, as a line-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub k: [f64; 3],
    pub from: [f64; 3],
    pub to: [f64; 3],
}

/// An incoming and an outgoing segment meeting at one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Incidence {
    pub wavelength: f64,
    pub k_in: [f64; 3],
    pub k_out: [f64; 3],
    pub element: ElementId,
    pub position: [f64; 3],
}

pub type LineGraph = DiGraph<Segment, Incidence>;

/// An incidence at a grating, with the diffraction order that explains it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifiedIncidence {
    pub incidence: Incidence,
    pub incoming: Direction,
    pub outgoing: Direction,
    pub order: [i32; 2],
}

#[derive(Debug, Clone)]
pub struct WavelengthGraphs {
    pub wavelength: f64,
    /// One graph per source node.
    pub graphs: Vec<InteractionGraph>,
}

#[derive(Debug, Clone)]
pub struct SceneGraphs {
    pub terminal: ElementId,
    pub wavelengths: Vec<WavelengthGraphs>,
}

impl SceneGraphs {
    pub fn graph_count(&self) -> usize {
        self.wavelengths.iter().map(|w| w.graphs.len()).sum()
    }

    /// Line graphs, in the same nesting as the interaction graphs.
    pub fn line_graphs(&self) -> Vec<(f64, Vec<LineGraph>)> {
        self.wavelengths
            .iter()
            .map(|w| {
                let lgs = w.graphs.iter().map(|g| line_graph(g, w.wavelength)).collect();
                (w.wavelength, lgs)
            })
            .collect()
    }
}

type NodeKey = ([i64; 3], ElementId);

/// Build the raw interaction graph of one wavelength.
pub fn build_graph(trace: &WavelengthTrace, precision: &Precision) -> InteractionGraph {
    let mut interactions = trace.interactions.clone();
    interactions.sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.ray.total_cmp(&b.ray)));
    interactions.dedup_by(|a, b| a.from == b.from && a.ray.total_cmp(&b.ray).is_eq());

    let mut graph = InteractionGraph::new();
    let mut index: HashMap<NodeKey, NodeIndex> = HashMap::new();
    let mut node = |graph: &mut InteractionGraph, position: [f64; 3], element: ElementId| {
        *index
            .entry((precision.point_key(position), element))
            .or_insert_with(|| graph.add_node(GraphNode { position, element }))
    };

    for ray in &trace.sources {
        node(&mut graph, ray.position, SOURCE_ID);
    }
    for hit in &interactions {
        let from = node(&mut graph, hit.ray.origin, hit.from);
        let to = node(&mut graph, hit.ray.position, hit.ray.element);
        graph.add_edge(from, to, GraphEdge { k: hit.ray.k });
    }
    graph
}

/// Keep only `nodes`, preserving the edges between them.
fn induced(graph: &InteractionGraph, nodes: &HashSet<NodeIndex>) -> InteractionGraph {
    graph.filter_map(
        |n, w| nodes.contains(&n).then_some(*w),
        |_, w| Some(*w),
    )
}

/// Nodes that can reach an element with id `terminal`.
pub fn restrict_to_terminal(graph: &InteractionGraph, terminal: ElementId) -> InteractionGraph {
    let reversed = Reversed(graph);
    let mut keep = HashSet::new();
    for start in graph.node_indices().filter(|n| graph[*n].element == terminal) {
        let mut bfs = Bfs::new(reversed, start);
        while let Some(n) = bfs.next(reversed) {
            keep.insert(n);
        }
    }
    induced(graph, &keep)
}

/// One subgraph per source node: the source and everything it reaches.
pub fn split_by_source(graph: &InteractionGraph) -> Vec<InteractionGraph> {
    graph
        .node_indices()
        .filter(|n| graph[*n].element == SOURCE_ID)
        .map(|start| {
            let mut reach = HashSet::new();
            let mut bfs = Bfs::new(graph, start);
            while let Some(n) = bfs.next(graph) {
                reach.insert(n);
            }
            induced(graph, &reach)
        })
        .collect()
}

/// BFS depth of every node from the source nodes.
fn depths(graph: &InteractionGraph) -> HashMap<NodeIndex, usize> {
    let mut depth = HashMap::new();
    let mut queue = VecDeque::new();
    for n in graph.node_indices().filter(|n| graph[*n].element == SOURCE_ID) {
        depth.insert(n, 0);
        queue.push_back(n);
    }
    while let Some(n) = queue.pop_front() {
        let d = depth[&n];
        for m in graph.neighbors_directed(n, EdgeDirection::Outgoing) {
            if !depth.contains_key(&m) {
                depth.insert(m, d + 1);
                queue.push_back(m);
            }
        }
    }
    depth
}

/// Delete the back edges of every two-node strongly-connected component.
///
/// The edge leaving the node nearer the source survives. Returns the number
/// of edges removed.
pub fn remove_reciprocal_edges(graph: &mut InteractionGraph) -> usize {
    let depth = depths(graph);
    let rank = |n: NodeIndex| (depth.get(&n).copied().unwrap_or(usize::MAX), n.index());
    let mut removed = 0;
    for scc in tarjan_scc(&*graph) {
        let &[a, b] = scc.as_slice() else {
            continue;
        };
        let (near, far) = if rank(a) <= rank(b) { (a, b) } else { (b, a) };
        while let Some(e) = graph.find_edge(far, near) {
            graph.remove_edge(e);
            removed += 1;
        }
    }
    removed
}

/// Segment-to-segment graph of one interaction graph.
pub fn line_graph(graph: &InteractionGraph, wavelength: f64) -> LineGraph {
    let mut lg = LineGraph::with_capacity(graph.edge_count(), 0);
    for e in graph.edge_references() {
        lg.add_node(Segment {
            k: e.weight().k,
            from: graph[e.source()].position,
            to: graph[e.target()].position,
        });
    }
    for v in graph.node_indices() {
        let node = graph[v];
        for e_in in graph.edges_directed(v, EdgeDirection::Incoming) {
            for e_out in graph.edges_directed(v, EdgeDirection::Outgoing) {
                lg.add_edge(
                    NodeIndex::new(e_in.id().index()),
                    NodeIndex::new(e_out.id().index()),
                    Incidence {
                        wavelength,
                        k_in: e_in.weight().k,
                        k_out: e_out.weight().k,
                        element: node.element,
                        position: node.position,
                    },
                );
            }
        }
    }
    lg
}

impl Scene {
    /// Interaction graphs of the last trace, reduced to paths that reach
    /// `terminal` (default: the highest registered element id).
    pub fn graphs(&self, terminal: Option<ElementId>) -> Result<SceneGraphs, SceneError> {
        let trace = self.trace_result()?;
        let terminal = match terminal {
            Some(id) if self.elements.contains_key(&id) => id,
            Some(id) => return Err(SceneError::UnknownElement(id)),
            None => self.last_element().unwrap_or(SOURCE_ID),
        };

        let mut removed = 0;
        let wavelengths: Vec<WavelengthGraphs> = trace
            .wavelengths
            .iter()
            .map(|wt| {
                let raw = build_graph(wt, &self.params.precision);
                let restricted = restrict_to_terminal(&raw, terminal);
                let mut graphs = split_by_source(&restricted);
                for g in graphs.iter_mut() {
                    removed += remove_reciprocal_edges(g);
                }
                WavelengthGraphs {
                    wavelength: wt.wavelength,
                    graphs,
                }
            })
            .collect();

        let result = SceneGraphs {
            terminal,
            wavelengths,
        };
        info!(
            "Built {} interaction graph(s) towards element {terminal}; removed {removed} reciprocal edge(s)",
            result.graph_count()
        );
        Ok(result)
    }

    /// Classify every grating incidence of `graphs` by the allowed order
    /// closest (L1) to its observed in-plane shift `Δk∥ / λ`.
    pub fn interaction_orders(&self, graphs: &SceneGraphs) -> BTreeMap<ElementId, Vec<ClassifiedIncidence>> {
        let mut out: BTreeMap<ElementId, Vec<ClassifiedIncidence>> = BTreeMap::new();
        for (_, lgs) in graphs.line_graphs() {
            for lg in &lgs {
                for e in lg.edge_references() {
                    let inc = *e.weight();
                    let Some(grating) = self
                        .elements
                        .get(&inc.element)
                        .and_then(|el| el.element.as_grating())
                    else {
                        continue;
                    };
                    let shift = [
                        (inc.k_out[0] - inc.k_in[0]) / inc.wavelength,
                        (inc.k_out[1] - inc.k_in[1]) / inc.wavelength,
                    ];
                    let best = grating.orders().unique_mn().into_iter().min_by(|a, b| {
                        let d = |mn: &[i32; 2]| {
                            let g = grating.order_vector(mn[0], mn[1]);
                            (shift[0] - g[0]).abs() + (shift[1] - g[1]).abs()
                        };
                        d(a).total_cmp(&d(b))
                    });
                    if let Some(order) = best {
                        out.entry(inc.element).or_default().push(ClassifiedIncidence {
                            incidence: inc,
                            incoming: Direction::of(inc.k_in[2]),
                            outgoing: Direction::of(inc.k_out[2]),
                            order,
                        });
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(graph: &mut InteractionGraph, z: f64, element: ElementId) -> NodeIndex {
        graph.add_node(GraphNode {
            position: [0.0, 0.0, z],
            element,
        })
    }

    fn edge(kz: f64) -> GraphEdge {
        GraphEdge { k: [0.0, 0.0, kz] }
    }

    #[test]
    fn test_restrict_drops_dead_ends() {
        let mut g = InteractionGraph::new();
        let s = node(&mut g, 0.0, 0);
        let a = node(&mut g, 1.0, 1);
        let dead = node(&mut g, 2.0, 2);
        let r = node(&mut g, 3.0, 3);
        g.add_edge(s, a, edge(1.0));
        g.add_edge(a, dead, edge(1.0));
        g.add_edge(a, r, edge(1.0));
        let kept = restrict_to_terminal(&g, 3);
        assert_eq!(kept.node_count(), 3);
        assert_eq!(kept.edge_count(), 2);
        assert!(kept.node_weights().all(|n| n.element != 2));
    }

    #[test]
    fn test_no_terminal_gives_empty_graph() {
        let mut g = InteractionGraph::new();
        let s = node(&mut g, 0.0, 0);
        let a = node(&mut g, 1.0, 1);
        g.add_edge(s, a, edge(1.0));
        assert_eq!(restrict_to_terminal(&g, 9).node_count(), 0);
    }

    #[test]
    fn test_split_per_source() {
        let mut g = InteractionGraph::new();
        let s1 = node(&mut g, 0.0, 0);
        let s2 = node(&mut g, 0.5, 0);
        let a = node(&mut g, 1.0, 1);
        let b = node(&mut g, 2.0, 1);
        g.add_edge(s1, a, edge(1.0));
        g.add_edge(s2, b, edge(1.0));
        let parts = split_by_source(&g);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.node_count() == 2 && p.edge_count() == 1));
    }

    #[test]
    fn test_reciprocal_pair_keeps_forward_edge() {
        let mut g = InteractionGraph::new();
        let s = node(&mut g, 0.0, 0);
        let a = node(&mut g, 1.0, 1);
        let b = node(&mut g, 2.0, 2);
        g.add_edge(s, a, edge(1.0));
        g.add_edge(a, b, edge(1.0));
        g.add_edge(b, a, edge(-1.0));
        assert_eq!(remove_reciprocal_edges(&mut g), 1);
        assert!(g.find_edge(a, b).is_some());
        assert!(g.find_edge(b, a).is_none());
    }

    #[test]
    fn test_line_graph_incidences() {
        let mut g = InteractionGraph::new();
        let s = node(&mut g, 0.0, 0);
        let a = node(&mut g, 1.0, 1);
        let r1 = node(&mut g, 2.0, 2);
        let r2 = node(&mut g, -1.0, 2);
        g.add_edge(s, a, edge(1.0));
        g.add_edge(a, r1, edge(1.0));
        g.add_edge(a, r2, edge(-1.0));
        let lg = line_graph(&g, 0.525);
        assert_eq!(lg.node_count(), 3);
        assert_eq!(lg.edge_count(), 2);
        assert!(lg.edge_weights().all(|i| i.element == 1 && i.k_in[2] == 1.0));
        assert!(lg.node_weights().any(|s| s.to == [0.0, 0.0, -1.0]));
    }
}
