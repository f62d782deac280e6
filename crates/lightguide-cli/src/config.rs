//! TOML configuration deserialisation for combiner jobs.
//!
//! A job file has up to four sections, each optional:
//!
//! ```toml
//! [materials.MyGlass]          # extra Sellmeier media
//! coefficients = [1.0, 0.2, 1.0, 0.006, 0.02, 103.0]
//!
//! [kspace]                     # sequential k-space design
//! substrate = "LASF46B"
//!
//! [layout]                     # projected element footprints
//! eye_relief = 20.0
//!
//! [scene]                      # 3-D ray trace and interaction graphs
//! environment = "Air"
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use lightguide_core::elements::{ElementKind, GratingMode, OrderTable, Period};
use lightguide_core::kspace::StageMedium;
use lightguide_core::scene::{PathConstraint, SceneParams};
use lightguide_core::source::SourceOptions;
use lightguide_core::types::Precision;
use lightguide_geometry::Footprint;
use lightguide_materials::SellmeierCoefficients;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    /// User-defined media, looked up before the built-in catalogue.
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialConfig>,
    pub kspace: Option<KSpaceConfig>,
    pub layout: Option<LayoutConfig>,
    pub scene: Option<SceneConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct MaterialConfig {
    /// `[B1, B2, B3, C1, C2, C3]`, C in µm².
    pub coefficients: SellmeierCoefficients,
}

/// Sequential k-space design.
#[derive(Debug, Deserialize)]
pub struct KSpaceConfig {
    #[serde(default = "default_ambient")]
    pub ambient: String,
    pub substrate: String,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub source: SourceOptions,
    #[serde(default)]
    pub grating: Vec<GratingConfig>,
    #[serde(default)]
    pub sequence: Vec<SequenceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GratingConfig {
    pub name: String,
    /// One or two `[pitch_um, angle_deg]` pairs.
    pub periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
pub struct SequenceConfig {
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Deserialize)]
pub struct StageConfig {
    pub grating: String,
    pub order: [i32; 2],
    /// Medium after the stage; omitted media follow the canonical
    /// substrate-then-ambient assignment.
    #[serde(default)]
    pub medium: Option<StageMedium>,
}

/// Projected layout of a traced k-space design.
#[derive(Debug, Deserialize)]
pub struct LayoutConfig {
    /// `[[x_min, x_max], [y_min, y_max]]` (mm).
    #[serde(default = "default_layout_boundary")]
    pub boundary: [[f64; 2]; 2],
    pub eye_relief: f64,
    pub eyebox: Footprint,
    /// Eyebox rotation `[x, y, z]` in degrees, applied before projection.
    #[serde(default)]
    pub eyebox_tilt: Option<[f64; 3]>,
    pub input: Footprint,
}

/// 3-D scene, trace and graph analysis.
#[derive(Debug, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "default_ambient")]
    pub environment: String,
    #[serde(default)]
    pub params: SceneParams,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Element whose incoming rays define the graphs (default: last registered).
    #[serde(default)]
    pub terminal: Option<String>,
    #[serde(default)]
    pub source: Vec<SourceConfig>,
    #[serde(default)]
    pub element: Vec<ElementConfig>,
    #[serde(default)]
    pub path: Vec<PathConstraint>,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub z: f64,
    /// Aperture; omitted means a single launch point at the origin.
    #[serde(default)]
    pub footprint: Option<FootprintConfig>,
    #[serde(flatten)]
    pub options: SourceOptions,
}

/// One scene element. Which optional fields apply depends on `kind`.
#[derive(Debug, Deserialize)]
pub struct ElementConfig {
    pub name: String,
    pub kind: ElementKind,
    pub z: f64,
    pub footprint: FootprintConfig,
    /// Grating periods; defaults to the `[kspace]` grating of the same name.
    #[serde(default)]
    pub periods: Option<Vec<Period>>,
    /// `[backward side, forward side]` media of a grating or interface.
    #[serde(default)]
    pub materials: Option<[String; 2]>,
    #[serde(default)]
    pub mode: GratingMode,
    #[serde(default)]
    pub orders: Option<OrderTable>,
    /// Filter cut-off (µm).
    #[serde(default)]
    pub stop_wavelength: Option<f64>,
}

/// Element footprint: a literal shape, a shape derived by `[layout]`, or
/// the rectangle around every element registered so far.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FootprintConfig {
    Layout { layout: String },
    Bounds { bounds: f64 },
    Shape(Footprint),
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Write CSV tables (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Write footprints and graphs as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: true,
        }
    }
}

fn default_ambient() -> String {
    "Air".into()
}
fn default_layout_boundary() -> [[f64; 2]; 2] {
    [[-100.0, 100.0], [-100.0, 100.0]]
}
fn default_max_iterations() -> usize {
    300
}
fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: JobConfig =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
