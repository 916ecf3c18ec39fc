pub mod ccdproc;
pub mod config;
pub mod preview;
pub mod run;
pub mod sciproc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use skyproc_core::camera::{Camera, GenericCamera};
use skyproc_core::pipeline::{PipelineConfig, ReplacePolicy};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReplaceArg {
    None,
    Zero,
    Median,
    Mean,
    Min,
    Max,
}

impl From<ReplaceArg> for ReplacePolicy {
    fn from(arg: ReplaceArg) -> Self {
        match arg {
            ReplaceArg::None => ReplacePolicy::None,
            ReplaceArg::Zero => ReplacePolicy::Zero,
            ReplaceArg::Median => ReplacePolicy::Median,
            ReplaceArg::Mean => ReplacePolicy::Mean,
            ReplaceArg::Min => ReplacePolicy::Min,
            ReplaceArg::Max => ReplacePolicy::Max,
        }
    }
}

/// Config file if given, defaults otherwise. Not yet validated.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&contents).context("Invalid pipeline config")
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// Camera from the command line, else from the config.
pub fn load_camera(arg: Option<&PathBuf>, config: &PipelineConfig) -> Result<Arc<dyn Camera>> {
    let Some(path) = arg.or(config.run.camera.as_ref()) else {
        bail!("A camera description is required (--camera or [run] camera)");
    };
    let camera = GenericCamera::from_toml_file(path)
        .with_context(|| format!("Failed to load camera {}", path.display()))?;
    Ok(Arc::new(camera))
}

pub fn ensure_no_failures(failed: usize) -> Result<()> {
    if failed > 0 {
        bail!("{failed} exposure(s) failed");
    }
    Ok(())
}
