use anyhow::{anyhow, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::branching::Branching;
use crate::error::MorphError;
use crate::framing::View;
use crate::resample::Resampling;
use crate::skeleton::Skeletonization;
use crate::soma::SomaStyle;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn default_config_loads_and_validates() {
        let settings = load_default_config().unwrap();
        assert_eq!(settings.method, Method::Extrusion);
        assert_eq!(settings.soma_connection, SomaConnection::Connected);
        assert_eq!(settings.branching, Branching::Radii);
        assert!(validate_config(&settings).is_ok());
    }

    #[test]
    fn cli_overrides_fields() {
        let mut settings = load_default_config().unwrap();
        let args = CliArgs::parse_from([
            "neuromesh",
            "--input",
            "cell.swc",
            "--method",
            "disconnected-segments",
            "--edges",
            "smooth",
            "--tessellation",
            "0.3",
            "--sides",
            "6",
        ]);
        apply_args(&mut settings, args);
        assert_eq!(settings.input.as_deref(), Some("cell.swc"));
        assert_eq!(settings.method, Method::DisconnectedSegments);
        assert_eq!(settings.edges, Edges::Smooth);
        assert_eq!(settings.tessellation_level, 0.3);
        assert_eq!(settings.bevel_object_sides, 6);
    }

    #[test]
    fn environment_overrides_defaults() {
        env::set_var("NEUROMESH_TESSELLATION_LEVEL", "0.5");
        env::set_var("NEUROMESH_FRAMING__RESOLUTION", "512");
        let loaded = load_config_with(CliArgs::parse_from(["neuromesh"]));
        env::remove_var("NEUROMESH_TESSELLATION_LEVEL");
        env::remove_var("NEUROMESH_FRAMING__RESOLUTION");

        let settings = loaded.unwrap();
        assert_eq!(settings.tessellation_level, 0.5);
        assert_eq!(settings.framing.resolution, 512);
        assert_eq!(settings.method, Method::Extrusion);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let base = load_default_config().unwrap();

        let mut settings = base.clone();
        settings.tessellation_level = 0.05;
        assert!(validate_config(&settings).is_err());

        let mut settings = base.clone();
        settings.bevel_object_sides = 2;
        assert!(validate_config(&settings).is_err());

        let mut settings = base.clone();
        settings.resampling_step = 0.0;
        assert!(validate_config(&settings).is_err());

        let mut settings = base;
        settings.arbors.axon_branch_order = 0;
        assert!(validate_config(&settings).is_err());
    }

    #[test]
    fn option_names_parse_case_insensitively() {
        assert_eq!(parse_option::<Method>("ARTICULATED_SECTIONS"), Ok(Method::ArticulatedSections));
        assert_eq!(parse_option::<SomaStyle>("meta-ball"), Ok(SomaStyle::MetaBall));
        assert!(parse_option::<Edges>("wobbly").is_err());
    }
}

/// Reconstruction style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    /// One extruded tube per arbor, optionally bridged to the soma.
    Extrusion,
    /// Swept tubes following primary chains.
    ConnectedSections,
    /// One swept tube per section.
    DisconnectedSections,
    /// One swept tube per segment.
    DisconnectedSegments,
    /// Swept sections with spheres at the branch points.
    ArticulatedSections,
    /// Poly-lines only.
    Skeleton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SomaConnection {
    Connected,
    Disconnected,
}

/// Shading of the exported surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Edges {
    Hard,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FramingMode {
    FixedResolution,
    ToScale,
}

/// Which arbors are reconstructed and how deep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArborSettings {
    pub draw_axon: bool,
    pub draw_apical_dendrites: bool,
    pub draw_basal_dendrites: bool,
    pub axon_branch_order: usize,
    pub apical_branch_order: usize,
    pub basal_branch_order: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingSettings {
    pub view: View,
    pub mode: FramingMode,
    /// Longest image side for `FIXED_RESOLUTION`.
    pub resolution: u32,
    /// Pixels per micron for `TO_SCALE`.
    pub pixels_per_unit: f32,
    /// Frame the box swept by a full turn around the soma.
    pub rotation_360: bool,
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// SWC file to reconstruct.
    #[serde(default)]
    pub input: Option<String>,
    pub output_dir: String,
    pub method: Method,
    pub soma_style: SomaStyle,
    pub soma_connection: SomaConnection,
    /// External OBJ used in place of the generated sphere soma.
    #[serde(default)]
    pub soma_mesh: Option<String>,
    pub edges: Edges,
    pub branching: Branching,
    pub skeletonization: Skeletonization,
    pub resampling_method: Resampling,
    pub resampling_step: f32,
    pub tessellation_level: f32,
    pub bevel_object_sides: usize,
    /// Close the ends of swept tubes.
    pub caps: bool,
    pub arbors: ArborSettings,
    pub framing: FramingSettings,
    #[serde(default)]
    pub seed: Option<u64>,
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("Error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the layered configuration and applies command-line overrides.
pub fn load_config() -> Result<Settings> {
    load_config_with(CliArgs::parse())
}

pub fn load_config_with(args: CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let mut builder = Config::builder().add_source(File::from(default_config_file).required(true));
    if local_config.exists() {
        info!("Using local configuration: {:?}", local_config);
        builder = builder.add_source(File::from(local_config).required(true));
    }

    let settings: Config = builder
        .add_source(
            Environment::with_prefix("NEUROMESH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    apply_args(&mut config, args);
    validate_config(&config)?;

    info!("{}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the NEUROMESH_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
pub fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("NEUROMESH_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    let mut current = exe_path.parent();
    while let Some(dir) = current {
        if dir.join("config").is_dir() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(anyhow!("Could not find project root directory"))
}

pub fn validate_config(config: &Settings) -> std::result::Result<(), MorphError> {
    let invalid = |message: String| Err(MorphError::InvalidSettings(message));

    if !(config.tessellation_level > 0.05 && config.tessellation_level <= 1.0) {
        return invalid(format!(
            "tessellation level must be in (0.05, 1.0], got {}",
            config.tessellation_level
        ));
    }
    if config.bevel_object_sides < 3 {
        return invalid(format!(
            "bevel object needs at least 3 sides, got {}",
            config.bevel_object_sides
        ));
    }
    if config.resampling_step <= 0.0 {
        return invalid(format!(
            "resampling step must be greater than 0, got {}",
            config.resampling_step
        ));
    }
    let arbors = &config.arbors;
    for (name, order) in [
        ("axon", arbors.axon_branch_order),
        ("apical", arbors.apical_branch_order),
        ("basal", arbors.basal_branch_order),
    ] {
        if order < 1 {
            return invalid(format!("{} branch order must be at least 1", name));
        }
    }
    if config.framing.resolution == 0 || config.framing.pixels_per_unit <= 0.0 {
        return invalid("framing resolution and scale must be positive".to_string());
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "neuromesh - neuron morphology to mesh reconstruction")]
pub struct CliArgs {
    /// Path to the input morphology. Only the SWC text format is supported.
    #[arg(short, long)]
    input: Option<String>,

    /// Directory the meshes and the summary are written to.
    #[arg(short, long)]
    output: Option<String>,

    /// Reconstruction method, e.g. `extrusion` or `disconnected-sections`.
    #[arg(short, long, value_parser = parse_option::<Method>)]
    method: Option<Method>,

    /// Soma representation: `sphere`, `meta-ball` or `hidden`.
    #[arg(long, value_parser = parse_option::<SomaStyle>)]
    soma_style: Option<SomaStyle>,

    /// Whether extruded arbors are bridged to the soma.
    #[arg(long, value_parser = parse_option::<SomaConnection>)]
    soma_connection: Option<SomaConnection>,

    /// External OBJ file used as the soma mesh.
    #[arg(long)]
    soma_mesh: Option<String>,

    /// Surface shading: `hard` or `smooth`.
    #[arg(long, value_parser = parse_option::<Edges>)]
    edges: Option<Edges>,

    /// Primary child selection: `angles` or `radii`.
    #[arg(long, value_parser = parse_option::<Branching>)]
    branching: Option<Branching>,

    /// Resampling method applied to every section.
    #[arg(long, value_parser = parse_option::<Resampling>)]
    resampling: Option<Resampling>,

    /// Step length for fixed-step resampling, in microns.
    #[arg(long)]
    step: Option<f32>,

    /// Skeleton style applied before meshing.
    #[arg(long, value_parser = parse_option::<Skeletonization>)]
    skeleton: Option<Skeletonization>,

    /// Tessellation level in (0.05, 1.0].
    #[arg(short, long)]
    tessellation: Option<f32>,

    /// Number of sides of swept tubes.
    #[arg(long)]
    sides: Option<usize>,

    /// Camera view used for framing.
    #[arg(long, value_parser = parse_option::<View>)]
    view: Option<View>,

    /// Frame the reconstruction for a full turn around the soma.
    #[arg(long)]
    rotation_360: bool,

    /// Random seed for zigzag skeletons.
    #[arg(short, long)]
    seed: Option<u64>,
}

/// Overrides configuration values with any arguments given on the command line.
pub fn apply_args(config: &mut Settings, args: CliArgs) {
    if let Some(input) = args.input {
        config.input = Some(input);
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(style) = args.soma_style {
        config.soma_style = style;
    }
    if let Some(connection) = args.soma_connection {
        config.soma_connection = connection;
    }
    if let Some(mesh) = args.soma_mesh {
        config.soma_mesh = Some(mesh);
    }
    if let Some(edges) = args.edges {
        config.edges = edges;
    }
    if let Some(branching) = args.branching {
        config.branching = branching;
    }
    if let Some(resampling) = args.resampling {
        config.resampling_method = resampling;
    }
    if let Some(step) = args.step {
        config.resampling_step = step;
    }
    if let Some(skeleton) = args.skeleton {
        config.skeletonization = skeleton;
    }
    if let Some(level) = args.tessellation {
        config.tessellation_level = level;
    }
    if let Some(sides) = args.sides {
        config.bevel_object_sides = sides;
    }
    if let Some(view) = args.view {
        config.framing.view = view;
    }
    if args.rotation_360 {
        config.framing.rotation_360 = true;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
}

/// Parses an option name such as `meta-ball` or `META_BALL` into its enum.
fn parse_option<T: DeserializeOwned>(s: &str) -> std::result::Result<T, String> {
    let name = s.trim().to_uppercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(name))
        .map_err(|_| format!("Unknown option: '{}'", s))
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Input: {}
  - Method: {:?}
  - Soma: {:?} ({:?})
  - Edges: {:?}
  - Branching: {:?}
  - Skeletonization: {:?}
  - Resampling: {:?} (step {:.3})
  - Tessellation Level: {:.3}
  - Bevel Sides: {}
  ",
            self.input.as_deref().unwrap_or("<none>"),
            self.method,
            self.soma_style,
            self.soma_connection,
            self.edges,
            self.branching,
            self.skeletonization,
            self.resampling_method,
            self.resampling_step,
            self.tessellation_level,
            self.bevel_object_sides,
        )
    }
}
