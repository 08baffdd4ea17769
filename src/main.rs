use std::path::Path;

use anyhow::{anyhow, Context, Result};
use neuromesh::export::export_all;
use neuromesh::reconstruct::Reconstruction;
use neuromesh::settings;
use neuromesh::swc::read_swc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = settings::load_config()?;
    let input = settings
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("No input morphology given, pass one with --input"))?;

    let morphology = read_swc(input).with_context(|| format!("Failed to read {}", input))?;
    let reconstruction = Reconstruction::build(&morphology, &settings)?;
    export_all(Path::new(&settings.output_dir), &reconstruction, &settings)?;

    Ok(())
}
