//! Job runner: builds the k-space design, its projected layout and the 3-D
//! scene from a parsed job, then writes the results.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use serde::Serialize;

use lightguide_core::elements::{
    ElementKind, Grating, OpticalElement, Receiver, RefractiveInterface, SpectralFilter,
};
use lightguide_core::kspace::{KSpaceDomain, KSpaceSolution, Stage, StageMedium};
use lightguide_core::layout::{Coverage, ProjectedLayout};
use lightguide_core::scene::{ClassifiedIncidence, Scene, SceneGraphs, TraceResult};
use lightguide_core::types::{Direction, ElementId};
use lightguide_geometry::Footprint;
use lightguide_materials::{catalogue, Material};

use crate::config::{
    ElementConfig, FootprintConfig, JobConfig, KSpaceConfig, LayoutConfig, MaterialConfig,
    SceneConfig,
};

/// Everything a job produced. Sections missing from the job stay `None`.
#[derive(Default)]
pub struct JobOutput {
    pub kspace: Option<KSpaceDomain>,
    pub solution: Option<KSpaceSolution>,
    pub layout: Option<ProjectedLayout>,
    pub coverage: Option<Coverage>,
    pub scene: Option<Scene>,
    pub graphs: Option<SceneGraphs>,
    pub orders: BTreeMap<ElementId, Vec<ClassifiedIncidence>>,
}

/// Job-defined media layered over the built-in catalogue.
pub struct MaterialLibrary {
    custom: BTreeMap<String, Material>,
}

impl MaterialLibrary {
    pub fn new(materials: &BTreeMap<String, MaterialConfig>) -> Self {
        let custom = materials
            .iter()
            .map(|(name, m)| (name.clone(), Material::new(name.clone(), m.coefficients)))
            .collect();
        Self { custom }
    }

    pub fn get(&self, name: &str) -> Result<Material> {
        if let Some(m) = self.custom.get(name) {
            return Ok(m.clone());
        }
        catalogue::lookup(name).with_context(|| format!("resolving material '{name}'"))
    }
}

/// Run every section of a job. With `trace == false` the scene is built but
/// neither traced nor analysed.
pub fn run_job(job: &JobConfig, trace: bool) -> Result<JobOutput> {
    let library = MaterialLibrary::new(&job.materials);
    let mut out = JobOutput::default();

    if let Some(cfg) = &job.kspace {
        let domain = build_kspace(cfg, &library)?;
        print!("{domain}");
        let solution = domain.trace().context("tracing k-space sequences")?;
        for (id, seq) in &solution.sequences {
            let alive = seq.propagating().iter().filter(|p| **p).count();
            println!(
                "Sequence {id}: {alive}/{} samples propagate",
                solution.sample_count()
            );
        }
        out.kspace = Some(domain);
        out.solution = Some(solution);
    }

    if let Some(cfg) = &job.layout {
        let solution = out
            .solution
            .clone()
            .ok_or_else(|| anyhow!("[layout] needs a [kspace] section"))?;
        let layout = run_layout(cfg, solution)?;
        let coverage = layout.coverage(None)?;
        println!(
            "Layout: {} element footprints, {} field cells below coverage threshold",
            layout
                .layout_estimate()
                .map_or(0, |e| e.elements.len()),
            coverage.flagged.len()
        );
        out.layout = Some(layout);
        out.coverage = Some(coverage);
    }

    if let Some(cfg) = &job.scene {
        let mut scene = build_scene(cfg, &library, out.kspace.as_ref(), out.layout.as_ref())?;
        println!(
            "Scene: {} elements in {} layers, {} sources, {} paths",
            scene.elements().count(),
            scene.layers().count(),
            scene.sources().count(),
            scene.path_count()
        );
        if trace {
            let result = scene.trace(cfg.max_iterations);
            println!("Trace: {} interactions", result.interaction_count());

            let terminal = match &cfg.terminal {
                Some(name) => Some(
                    scene
                        .element_id(name)
                        .ok_or_else(|| anyhow!("terminal element '{name}' is not in the scene"))?,
                ),
                None => None,
            };
            let graphs = scene.graphs(terminal)?;
            println!(
                "Graphs: {} source subgraphs ending at element {}",
                graphs.graph_count(),
                graphs.terminal
            );
            out.orders = scene.interaction_orders(&graphs);
            out.graphs = Some(graphs);
        }
        out.scene = Some(scene);
    }

    Ok(out)
}

/// Register the gratings and sequences of a `[kspace]` section.
pub fn build_kspace(cfg: &KSpaceConfig, library: &MaterialLibrary) -> Result<KSpaceDomain> {
    let mut domain = KSpaceDomain::new(library.get(&cfg.substrate)?, library.get(&cfg.ambient)?)
        .with_precision(cfg.precision);
    domain.set_source(cfg.source.clone());

    for g in &cfg.grating {
        domain
            .add_grating(g.name.clone(), &g.periods)
            .with_context(|| format!("grating '{}'", g.name))?;
    }

    for (i, seq) in cfg.sequence.iter().enumerate() {
        let last = seq.stages.len().saturating_sub(1);
        let stages = seq
            .stages
            .iter()
            .enumerate()
            .map(|(j, st)| {
                let id = domain.grating_id(&st.grating).ok_or_else(|| {
                    anyhow!("sequence {i} names unknown grating '{}'", st.grating)
                })?;
                let medium = st.medium.unwrap_or(if j == last {
                    StageMedium::Ambient
                } else {
                    StageMedium::Substrate
                });
                Ok(Stage::new(id, st.order, medium))
            })
            .collect::<Result<Vec<_>>>()?;
        domain.add_sequence(stages);
    }
    Ok(domain)
}

/// Project a traced design onto the coupling plane and estimate footprints.
pub fn run_layout(cfg: &LayoutConfig, solution: KSpaceSolution) -> Result<ProjectedLayout> {
    let mut layout = ProjectedLayout::new(solution, cfg.boundary)?;
    layout.set_eyebox(cfg.eye_relief, &cfg.eyebox, cfg.eyebox_tilt)?;
    layout.set_input(&cfg.input)?;
    layout.estimate()?;
    Ok(layout)
}

/// Register the sources, elements and paths of a `[scene]` section.
pub fn build_scene(
    cfg: &SceneConfig,
    library: &MaterialLibrary,
    kspace: Option<&KSpaceDomain>,
    layout: Option<&ProjectedLayout>,
) -> Result<Scene> {
    let mut scene = Scene::with_params(library.get(&cfg.environment)?, cfg.params.clone());
    let resolver = FootprintResolver { kspace, layout };

    for src in &cfg.source {
        let footprint = src
            .footprint
            .as_ref()
            .map(|f| resolver.resolve(f, &scene))
            .transpose()?;
        scene.add_source(src.z, footprint, src.options.clone());
    }

    for el in &cfg.element {
        let footprint = resolver
            .resolve(&el.footprint, &scene)
            .with_context(|| format!("footprint of element '{}'", el.name))?;
        let element = build_element(el, library, kspace)?;
        let id = scene.add_element(el.z, element, footprint);
        debug!("Registered {} '{}' as element {id} at z = {}", el.kind, el.name, el.z);
    }

    for path in &cfg.path {
        scene.add_path(path);
    }
    Ok(scene)
}

fn build_element(
    el: &ElementConfig,
    library: &MaterialLibrary,
    kspace: Option<&KSpaceDomain>,
) -> Result<OpticalElement> {
    let materials = |library: &MaterialLibrary| -> Result<Option<[Material; 2]>> {
        el.materials
            .as_ref()
            .map(|[a, b]| Ok([library.get(a)?, library.get(b)?]))
            .transpose()
    };

    let element = match el.kind {
        ElementKind::Grating => {
            let designed = kspace.and_then(|kd| kd.grating_id(&el.name).and_then(|id| kd.grating(id)));
            let periods = match (&el.periods, designed) {
                (Some(p), _) => p.clone(),
                (None, Some(g)) => g.periods().to_vec(),
                (None, None) => bail!("grating '{}' has no periods", el.name),
            };
            let materials = match (materials(library)?, designed) {
                (Some(m), _) => m,
                (None, Some(g)) => g.materials().clone(),
                (None, None) => bail!("grating '{}' has no materials", el.name),
            };
            let mut grating = Grating::new(el.name.clone(), &periods, materials)
                .with_context(|| format!("grating '{}'", el.name))?
                .with_mode(el.mode);
            if let Some(orders) = &el.orders {
                grating = grating.with_orders(orders.clone());
            }
            grating.into()
        }
        ElementKind::RefractiveInterface => {
            let materials = materials(library)?
                .ok_or_else(|| anyhow!("interface '{}' has no materials", el.name))?;
            RefractiveInterface::new(el.name.clone(), materials).into()
        }
        ElementKind::SpectralFilter => {
            let stop = el
                .stop_wavelength
                .ok_or_else(|| anyhow!("filter '{}' has no stop_wavelength", el.name))?;
            SpectralFilter::new(el.name.clone(), stop).into()
        }
        ElementKind::Receiver => Receiver::new(el.name.clone()).into(),
    };
    Ok(element)
}

struct FootprintResolver<'a> {
    kspace: Option<&'a KSpaceDomain>,
    layout: Option<&'a ProjectedLayout>,
}

impl FootprintResolver<'_> {
    fn resolve(&self, cfg: &FootprintConfig, scene: &Scene) -> Result<Footprint> {
        match cfg {
            FootprintConfig::Shape(f) => Ok(f.clone()),
            FootprintConfig::Bounds { bounds } => scene
                .bounding_footprint(*bounds)
                .ok_or_else(|| anyhow!("bounds footprint needs at least one earlier element")),
            FootprintConfig::Layout { layout: name } => {
                let layout = self
                    .layout
                    .ok_or_else(|| anyhow!("layout footprint '{name}' needs a [layout] section"))?;
                let id = self
                    .kspace
                    .and_then(|kd| kd.grating_id(name))
                    .ok_or_else(|| anyhow!("no k-space grating named '{name}'"))?;
                layout
                    .element_footprint(id)?
                    .ok_or_else(|| anyhow!("layout derived an empty footprint for '{name}'"))
            }
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write every stage of every k-space sequence to CSV.
pub fn write_kspace_csv(solution: &KSpaceSolution, domain: &KSpaceDomain, path: &Path) -> Result<()> {
    use std::io::Write;

    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# Lightguide k-space sequences")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# ambient: {}, substrate: {}", domain.ambient().name(), domain.substrate().name())?;
    writeln!(file, "# grid (h, v, wavelength): {:?}", solution.shape)?;
    writeln!(file, "#")?;
    writeln!(file, "sequence,stage,element,sample,wavelength_um,kx,ky,kz")?;

    for (id, seq) in &solution.sequences {
        for stage in 0..=seq.stage_count() {
            let element = match stage {
                0 => 0,
                s => seq.stages[s - 1].element,
            };
            for (sample, row) in seq.stage(stage).rows().into_iter().enumerate() {
                writeln!(
                    file,
                    "{id},{stage},{element},{sample},{:.4},{:.6},{:.6},{:.6}",
                    row[0], row[1], row[2], row[3]
                )?;
            }
        }
    }

    println!("k-space sequences written to: {}", path.display());
    Ok(())
}

/// Write the per-cell eyebox coverage to CSV.
pub fn write_coverage_csv(coverage: &Coverage, solution: &KSpaceSolution, path: &Path) -> Result<()> {
    use std::io::Write;

    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# Lightguide eyebox coverage")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# flagged cells: {}", coverage.flagged.len())?;
    writeln!(file, "#")?;
    writeln!(file, "h,v,h_deg,v_deg,wavelength_um,ratio,flagged")?;

    let (_, nv, _) = solution.shape;
    for ((h, v, w), ratio) in coverage.ratio.indexed_iter() {
        let (h_deg, v_deg) = solution.field_angles[h * nv + v];
        let flagged = coverage.flagged.contains(&[h, v, w]);
        writeln!(
            file,
            "{h},{v},{h_deg:.3},{v_deg:.3},{:.4},{ratio:.6},{}",
            solution.wavelengths[w], flagged as u8
        )?;
    }

    println!("Coverage written to: {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct FootprintRecord {
    id: ElementId,
    area_mm2: f64,
    footprint: Option<Footprint>,
}

/// Write the layout-derived footprint of every k-space grating to JSON.
pub fn write_footprints_json(layout: &ProjectedLayout, domain: &KSpaceDomain, path: &Path) -> Result<()> {
    create_parent(path)?;

    let estimate = layout
        .layout_estimate()
        .ok_or_else(|| anyhow!("layout has not been estimated"))?;
    let mut records = BTreeMap::new();
    for (id, grating) in domain.gratings() {
        let area_mm2 = estimate.elements.get(&id).map_or(0.0, |r| r.area());
        records.insert(
            grating.name().to_string(),
            FootprintRecord {
                id,
                area_mm2,
                footprint: layout.element_footprint(id)?,
            },
        );
    }

    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Footprints written to: {}", path.display());
    Ok(())
}

/// Write every recorded interaction of a trace to CSV.
pub fn write_rays_csv(trace: &TraceResult, scene: &Scene, path: &Path) -> Result<()> {
    use std::io::Write;

    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# Lightguide scene interactions")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    for w in &trace.wavelengths {
        for p in &w.paths {
            writeln!(
                file,
                "# λ = {} µm, path {:?}: {} rounds, {} interactions, {} rays in flight",
                w.wavelength, p.path, p.rounds, p.interactions, p.in_flight
            )?;
        }
    }
    writeln!(file, "#")?;
    writeln!(file, "wavelength_um,from,element,name,x0,y0,z0,x,y,z,kx,ky,kz")?;

    for w in &trace.wavelengths {
        for hit in &w.interactions {
            let r = &hit.ray;
            let name = scene.element(r.element).map_or("", |e| e.name());
            writeln!(
                file,
                "{},{},{},{name},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.6},{:.6},{:.6}",
                r.wavelength,
                hit.from,
                r.element,
                r.origin[0],
                r.origin[1],
                r.origin[2],
                r.position[0],
                r.position[1],
                r.position[2],
                r.k[0],
                r.k[1],
                r.k[2],
            )?;
        }
    }

    println!("Interactions written to: {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct GraphRecord<'a> {
    wavelength: f64,
    source: usize,
    nodes: Vec<&'a lightguide_core::scene::GraphNode>,
    edges: Vec<EdgeRecord>,
}

#[derive(Serialize)]
struct EdgeRecord {
    from: usize,
    to: usize,
    k: [f64; 3],
}

/// Write every per-source interaction graph to JSON.
pub fn write_graph_json(graphs: &SceneGraphs, path: &Path) -> Result<()> {
    create_parent(path)?;

    let mut records = Vec::new();
    for w in &graphs.wavelengths {
        for (source, g) in w.graphs.iter().enumerate() {
            records.push(GraphRecord {
                wavelength: w.wavelength,
                source,
                nodes: g.node_weights().collect(),
                edges: g
                    .raw_edges()
                    .iter()
                    .map(|e| EdgeRecord {
                        from: e.source().index(),
                        to: e.target().index(),
                        k: e.weight.k,
                    })
                    .collect(),
            });
        }
    }

    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Graphs written to: {}", path.display());
    Ok(())
}

/// Write the classified grating incidences to CSV.
pub fn write_interactions_csv(
    orders: &BTreeMap<ElementId, Vec<ClassifiedIncidence>>,
    scene: &Scene,
    path: &Path,
) -> Result<()> {
    use std::io::Write;

    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# Lightguide grating incidences")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "#")?;
    writeln!(
        file,
        "element,name,wavelength_um,x,y,z,kx_in,ky_in,kz_in,kx_out,ky_out,kz_out,incoming,outgoing,m,n"
    )?;

    let sign = |d: Direction| i32::from(d);
    for (id, incidences) in orders {
        let name = scene.element(*id).map_or("", |e| e.name());
        for c in incidences {
            let i = &c.incidence;
            writeln!(
                file,
                "{id},{name},{},{:.4},{:.4},{:.4},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{},{}",
                i.wavelength,
                i.position[0],
                i.position[1],
                i.position[2],
                i.k_in[0],
                i.k_in[1],
                i.k_in[2],
                i.k_out[0],
                i.k_out[1],
                i.k_out[2],
                sign(c.incoming),
                sign(c.outgoing),
                c.order[0],
                c.order[1],
            )?;
        }
    }

    println!("Grating incidences written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;

    const JOB: &str = r#"
[kspace]
substrate = "Glass19"

[kspace.source]
fov = [0.0, 0.0, 0.0, 0.0]
fov_grid = [1, 1]

[[kspace.grating]]
name = "IC"
periods = [[0.38, 0]]

[[kspace.grating]]
name = "FOLD"
periods = [[0.2687005768, -135]]

[[kspace.grating]]
name = "OC"
periods = [[0.38, 90]]

[[kspace.sequence]]
stages = [{ grating = "IC", order = [1, 0] }, { grating = "FOLD", order = [1, 0] }, { grating = "OC", order = [1, 0] }]

[materials.Glass19]
coefficients = [2.61, 0.0, 0.0, 0.0, 0.0, 0.0]

[layout]
eye_relief = 20.0
eyebox = { type = "polygon", vertices = [[-5, -5], [5, -5], [5, 5], [-5, 5]] }
input = { type = "circle", centre = [-30.0, 20.0], radius = 3.0 }

[scene]
max_iterations = 20

[[scene.source]]
z = -1.0
fov = [0.0, 0.0, 0.0, 0.0]
fov_grid = [1, 1]
spatial_grid = [1, 1]

[[scene.element]]
name = "IC"
kind = "grating"
z = 0.0
footprint = { layout = "IC" }
materials = ["Air", "Glass19"]

[[scene.element]]
name = "Eye"
kind = "receiver"
z = 5.0
footprint = { bounds = 10.0 }
"#;

    #[test]
    fn test_material_library_prefers_custom() {
        let job: JobConfig = toml::from_str(JOB).unwrap();
        let lib = MaterialLibrary::new(&job.materials);
        assert!((lib.get("Glass19").unwrap().index(0.5) - 1.9).abs() < 1e-12);
        assert_eq!(lib.get("LASF46B").unwrap().name(), "LASF46B");
        assert!(lib.get("Unobtainium").is_err());
    }

    #[test]
    fn test_canonical_media_fill_missing_stages() {
        let job: JobConfig = toml::from_str(JOB).unwrap();
        let lib = MaterialLibrary::new(&job.materials);
        let domain = build_kspace(job.kspace.as_ref().unwrap(), &lib).unwrap();
        let stages = domain.sequence(0).unwrap();
        let media: Vec<_> = stages.iter().map(|s| s.medium).collect();
        assert_eq!(
            media,
            vec![StageMedium::Substrate, StageMedium::Substrate, StageMedium::Ambient]
        );
    }

    #[test]
    fn test_unknown_stage_grating_rejected() {
        let src = JOB.replace("grating = \"OC\", order", "grating = \"XX\", order");
        let job: JobConfig = toml::from_str(&src).unwrap();
        let lib = MaterialLibrary::new(&job.materials);
        assert!(build_kspace(job.kspace.as_ref().unwrap(), &lib).is_err());
    }

    #[test]
    fn test_validate_builds_scene_without_tracing() {
        let job: JobConfig = toml::from_str(JOB).unwrap();
        let out = run_job(&job, false).unwrap();
        let scene = out.scene.as_ref().unwrap();
        assert_eq!(scene.elements().count(), 2);
        assert!(scene.trace_result().is_err());
        assert!(out.graphs.is_none());

        let ic = scene.element(scene.element_id("IC").unwrap()).unwrap();
        assert!(matches!(ic.footprint, Footprint::Polygon(_)));
        // bounds footprint encloses the coupler grown by the border
        let (min, max) = scene.element(scene.element_id("Eye").unwrap()).unwrap().footprint.bounding_box();
        assert!(min[0] < -40.0 && max[0] > -20.0);
    }

    #[test]
    fn test_layout_without_kspace_rejected() {
        let start = JOB.find("[layout]").unwrap();
        let end = JOB.find("[scene]").unwrap();
        let job: JobConfig = toml::from_str(&JOB[start..end]).unwrap();
        assert!(job.kspace.is_none());
        assert!(run_job(&job, false).is_err());
    }

    #[test]
    fn test_writers_produce_files() {
        let job: JobConfig = toml::from_str(JOB).unwrap();
        let out = run_job(&job, true).unwrap();
        let dir = std::env::temp_dir().join(format!("lightguide-runner-{}", std::process::id()));

        let (domain, solution) = (out.kspace.as_ref().unwrap(), out.solution.as_ref().unwrap());
        write_kspace_csv(solution, domain, &dir.join("kspace.csv")).unwrap();
        write_coverage_csv(out.coverage.as_ref().unwrap(), solution, &dir.join("coverage.csv")).unwrap();
        write_footprints_json(out.layout.as_ref().unwrap(), domain, &dir.join("footprints.json")).unwrap();

        let scene = out.scene.as_ref().unwrap();
        write_rays_csv(scene.trace_result().unwrap(), scene, &dir.join("rays.csv")).unwrap();
        write_graph_json(out.graphs.as_ref().unwrap(), &dir.join("graph.json")).unwrap();
        write_interactions_csv(&out.orders, scene, &dir.join("interactions.csv")).unwrap();

        let kspace = std::fs::read_to_string(dir.join("kspace.csv")).unwrap();
        // header plus source and three stages of one sample
        assert_eq!(kspace.lines().filter(|l| !l.starts_with('#')).count(), 1 + 4);

        let footprints: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("footprints.json")).unwrap()).unwrap();
        assert!(footprints["OC"]["area_mm2"].as_f64().unwrap() > 99.0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
