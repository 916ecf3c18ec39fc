use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use skyproc_core::detection::Detectors;
use skyproc_core::io::FitsStore;
use skyproc_core::pipeline::{
    run_pipeline, CancelToken, Provenance, RunReporter, Stage, TracingReporter,
};

use super::{ensure_no_failures, load_camera, load_config};
use crate::progress::BarReporter;
use crate::summary::{print_run_summary, print_stage_results};

#[derive(Args)]
pub struct RunArgs {
    /// Raw FITS frames
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Camera description (TOML)
    #[arg(long)]
    pub camera: Option<PathBuf>,

    /// Worker threads (0 = all cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Output directory
    #[arg(long)]
    pub science_dir: Option<PathBuf>,

    /// Log per-exposure events instead of drawing progress bars
    #[arg(long)]
    pub no_progress: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if args.science_dir.is_some() {
        config.run.science_dir = args.science_dir.clone();
    }
    config.validate().context("Invalid configuration")?;

    let camera = load_camera(args.camera.as_ref(), &config)?;
    print_run_summary(&config, camera.name(), args.files.len());
    info!(
        camera = camera.name(),
        exposures = args.files.len(),
        detectors = ?config.run.detectors,
        "Starting run"
    );

    let reporter: Box<dyn RunReporter> = if args.no_progress {
        Box::new(TracingReporter::new(Provenance::now().date))
    } else {
        Box::new(BarReporter::new()?)
    };
    let report = run_pipeline(
        &config,
        camera,
        &args.files,
        Arc::new(FitsStore),
        Detectors::default(),
        &CancelToken::new(),
        &*reporter,
    )?;

    println!();
    let failed = print_stage_results(Stage::CcdCorrection, &report.ccd)
        + print_stage_results(Stage::ScienceProcessing, &report.sci);
    ensure_no_failures(failed)
}
