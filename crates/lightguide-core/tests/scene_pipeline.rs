//! Integration tests: 3-D tracing, graph extraction and the full
//! k-space → layout → scene pipeline.

use approx::assert_relative_eq;
use lightguide_core::elements::{
    DiffractionOrder, Grating, OrderTable, Period, Receiver, RefractiveInterface,
};
use lightguide_core::kspace::KSpaceDomain;
use lightguide_core::layout::ProjectedLayout;
use lightguide_core::scene::Scene;
use lightguide_core::source::SourceOptions;
use lightguide_core::types::Direction;
use lightguide_geometry::Footprint;
use lightguide_materials::Material;

fn constant(n: f64) -> Material {
    Material::new(format!("n{n}"), [n * n - 1.0, 0.0, 0.0, 0.0, 0.0, 0.0])
}

fn square(h: f64) -> Footprint {
    Footprint::rectangle([-h, -h], [h, h])
}

fn orders(entries: &[(Direction, &[(Direction, i32, i32)])]) -> OrderTable {
    entries.iter().fold(OrderTable::empty(), |t, (incoming, list)| {
        t.with(
            *incoming,
            list.iter()
                .map(|(d, m, n)| DiffractionOrder::new(*d, *m, *n))
                .collect(),
        )
    })
}

fn on_axis() -> SourceOptions {
    SourceOptions {
        fov: [0.0; 4],
        fov_grid: [1, 1],
        spatial_grid: [1, 1],
        ..SourceOptions::default()
    }
}

// ───────────────────────────── Tracing ─────────────────────────────

#[test]
fn test_grating_then_receiver_terminates_in_two_rounds() {
    let mut scene = Scene::new(Material::air());
    scene.add_source(
        0.0,
        Some(square(1.0)),
        SourceOptions {
            fov: [-5.0, 5.0, -5.0, 5.0],
            fov_grid: [3, 3],
            spatial_grid: [2, 2],
            ..SourceOptions::default()
        },
    );
    let g = Grating::new("G", &[Period::new(1.0, 0.0)], [Material::air(), Material::air()]).unwrap();
    scene.add_element(1.0, g, square(20.0));
    let eye = scene.add_element(2.0, Receiver::new("eye"), square(20.0));

    let result = scene.trace(300);
    let summary = &result.wavelengths[0].paths[0];
    assert!(summary.rounds <= 2);
    assert_eq!(summary.in_flight, 0);

    // 9 field angles × 4 positions, three forward orders each
    assert_eq!(scene.receiver_hits(eye).unwrap().len(), 9 * 4 * 3);
}

#[test]
fn test_empty_scene_traces_to_nothing() {
    let mut scene = Scene::new(Material::air());
    scene.add_element(1.0, Receiver::new("eye"), square(1.0));
    assert!(scene.trace(10).wavelengths.is_empty());
    let graphs = scene.graphs(None).unwrap();
    assert_eq!(graphs.graph_count(), 0);
}

// ───────────────────────────── Graphs ─────────────────────────────

#[test]
fn test_bouncing_pair_keeps_one_edge() {
    let mut scene = Scene::new(Material::air());
    scene.add_source(0.0, None, on_axis());
    let pass = Grating::new("A", &[Period::new(1.0, 0.0)], [Material::air(), Material::air()])
        .unwrap()
        .with_orders(orders(&[
            (Direction::Forward, &[(Direction::Forward, 0, 0)]),
            (Direction::Backward, &[(Direction::Forward, 0, 0)]),
        ]));
    let split = Grating::new("B", &[Period::new(1.0, 0.0)], [Material::air(), Material::air()])
        .unwrap()
        .with_orders(orders(&[(
            Direction::Forward,
            &[(Direction::Backward, 0, 0), (Direction::Forward, 0, 0)],
        )]));
    let a = scene.add_element(1.0, pass, square(1.0));
    let b = scene.add_element(2.0, split, square(1.0));
    let eye = scene.add_element(3.0, Receiver::new("eye"), square(1.0));

    let summary = scene.trace(10).wavelengths[0].paths[0].clone();
    assert_eq!(summary.rounds, 10);
    assert!(summary.in_flight > 0);

    let graphs = scene.graphs(None).unwrap();
    assert_eq!(graphs.terminal, eye);
    assert_eq!(graphs.graph_count(), 1);
    let g = &graphs.wavelengths[0].graphs[0];

    let find = |id: usize| g.node_indices().find(|n| g[*n].element == id).unwrap();
    let (na, nb) = (find(a), find(b));
    let between = g.edges_connecting(na, nb).count() + g.edges_connecting(nb, na).count();
    assert_eq!(between, 1);
    assert!(g.find_edge(na, nb).is_some());
    // source → A → B → eye
    assert_eq!(g.node_count(), 4);
    assert_eq!(g.edge_count(), 3);
}

#[test]
fn test_unknown_terminal_is_an_error() {
    let mut scene = Scene::new(Material::air());
    scene.add_source(0.0, None, on_axis());
    scene.add_element(1.0, Receiver::new("eye"), square(1.0));
    scene.trace(5);
    assert!(scene.graphs(Some(42)).is_err());
    assert_eq!(scene.graphs(Some(2)).unwrap().graph_count(), 1);
}

// ───────────────────────────── Pipeline ─────────────────────────────

/// A normal-incidence waveguide that couples in along +x, folds to −y and
/// couples out towards an eye 20 mm below the guide.
#[test]
fn test_kspace_layout_scene_pipeline() {
    let glass = constant(1.9);
    let pitch = 0.38;

    // k-space screening
    let mut kd = KSpaceDomain::new(glass.clone(), Material::air());
    kd.set_source(on_axis());
    let ic = kd.add_grating("IC", &[Period::new(pitch, 0.0)]).unwrap();
    let fold = kd
        .add_grating("FOLD", &[Period::new(pitch / 2f64.sqrt(), -135.0)])
        .unwrap();
    let oc = kd.add_grating("OC", &[Period::new(pitch, 90.0)]).unwrap();
    kd.add_canonical_sequence(&[(ic, [1, 0]), (fold, [1, 0]), (oc, [1, 0])])
        .unwrap();
    let solution = kd.trace().unwrap();
    assert!(solution.sequences[&0].propagating()[0]);

    // projected layout
    let coupler = Footprint::circle([-30.0, 20.0], 3.0);
    let mut layout = ProjectedLayout::new(solution, [[-100.0, 100.0], [-100.0, 100.0]]).unwrap();
    layout.set_eyebox(20.0, &square(5.0), None).unwrap();
    layout.set_input(&coupler).unwrap();
    layout.estimate().unwrap();
    let fold_fp = layout.element_footprint(fold).unwrap().unwrap();
    let oc_fp = layout.element_footprint(oc).unwrap().unwrap();
    assert_relative_eq!(layout.coverage(None).unwrap().ratio[[0, 0, 0]], 1.0, epsilon = 1e-3);

    // 3-D scene with the derived footprints
    let mut scene = Scene::new(Material::air());
    scene.add_source(-1.0, Some(coupler.clone()), on_axis());
    let build = |name: &str, periods: &[Period], table: OrderTable| {
        Grating::new(name, periods, [Material::air(), glass.clone()])
            .unwrap()
            .with_orders(table)
    };
    let g_ic = build(
        "IC",
        kd.grating(ic).unwrap().periods(),
        orders(&[
            (Direction::Forward, &[(Direction::Forward, 1, 0)]),
            (Direction::Backward, &[(Direction::Forward, 0, 0)]),
        ]),
    );
    let g_fold = build(
        "FOLD",
        kd.grating(fold).unwrap().periods(),
        orders(&[(
            Direction::Backward,
            &[(Direction::Forward, 0, 0), (Direction::Forward, 1, 0)],
        )]),
    );
    let g_oc = build(
        "OC",
        kd.grating(oc).unwrap().periods(),
        orders(&[(
            Direction::Backward,
            &[(Direction::Forward, 0, 0), (Direction::Backward, 1, 0)],
        )]),
    );
    let s_ic = scene.add_element(0.0, g_ic, coupler);
    scene.add_element(0.0, g_fold, fold_fp);
    scene.add_element(0.0, g_oc, oc_fp);
    let guide = scene.bounding_footprint(80.0).unwrap();
    scene.add_element(
        0.0,
        RefractiveInterface::new("S1", [Material::air(), glass.clone()]),
        guide.clone(),
    );
    scene.add_element(
        1.0,
        RefractiveInterface::new("S2", [glass.clone(), Material::air()]),
        guide,
    );
    let eye = scene.add_element(-20.0, Receiver::new("eye"), square(50.0));

    let result = scene.trace(300);
    assert_eq!(result.wavelengths[0].paths[0].in_flight, 0);

    let hits = scene.receiver_hits(eye).unwrap();
    assert!(hits.len() >= 10, "only {} rays reached the eye", hits.len());
    for hit in hits {
        assert_relative_eq!(hit.k[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(hit.k[1], 0.0, epsilon = 1e-5);
        assert_relative_eq!(hit.k[2], -1.0, epsilon = 1e-5);
        // light leaves the out-coupler straight down into the eyebox
        assert!(hit.position[0].abs() <= 5.0 && hit.position[1].abs() <= 5.0);
    }

    let graphs = scene.graphs(Some(eye)).unwrap();
    assert_eq!(graphs.graph_count(), 1);
    let classified = scene.interaction_orders(&graphs);
    let at_ic = &classified[&s_ic];
    assert!(at_ic
        .iter()
        .any(|c| c.order == [1, 0] && c.incoming == Direction::Forward));
}
