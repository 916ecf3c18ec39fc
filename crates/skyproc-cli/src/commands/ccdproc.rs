use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use skyproc_core::detection::Detectors;
use skyproc_core::io::FitsStore;
use skyproc_core::pipeline::orchestrator::ccd_corrector;
use skyproc_core::pipeline::{run_ccd_batch, CancelToken, Provenance, Stage};

use super::{ensure_no_failures, load_camera, load_config, ReplaceArg};
use crate::progress::BarReporter;
use crate::summary::{print_ccdproc_summary, print_stage_results};

#[derive(Args)]
pub struct CcdprocArgs {
    /// Raw FITS frames
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Camera description (TOML)
    #[arg(long)]
    pub camera: Option<PathBuf>,

    /// Detectors to process (overrides config)
    #[arg(long, value_delimiter = ',')]
    pub det: Vec<usize>,

    /// Worker threads (0 = all cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Output directory
    #[arg(long)]
    pub science_dir: Option<PathBuf>,

    /// Master bias
    #[arg(long)]
    pub bias: Option<PathBuf>,

    /// Master dark (per second of exposure)
    #[arg(long)]
    pub dark: Option<PathBuf>,

    /// Master pixel flat
    #[arg(long)]
    pub pixel_flat: Option<PathBuf>,

    /// Master illumination flat
    #[arg(long)]
    pub illum_flat: Option<PathBuf>,

    /// External defect mask (nonzero = bad)
    #[arg(long)]
    pub defect_mask: Option<PathBuf>,

    /// Flag vignetted pixels
    #[arg(long)]
    pub mask_vig: bool,

    /// Vignetting threshold (fractional loss)
    #[arg(long)]
    pub minimum_vig: Option<f32>,

    /// Apply per-amplifier gain
    #[arg(long)]
    pub apply_gain: bool,

    /// Replacement for flagged pixels
    #[arg(long, value_enum)]
    pub replace: Option<ReplaceArg>,

    /// Mask growth radius in pixels
    #[arg(long)]
    pub grow: Option<f32>,
}

pub fn run(args: &CcdprocArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if !args.det.is_empty() {
        config.run.detectors = args.det.clone();
    }
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if args.science_dir.is_some() {
        config.run.science_dir = args.science_dir.clone();
    }
    let cal = &mut config.calibrations;
    for (arg, slot) in [
        (&args.bias, &mut cal.bias),
        (&args.dark, &mut cal.dark),
        (&args.pixel_flat, &mut cal.pixel_flat),
        (&args.illum_flat, &mut cal.illum_flat),
        (&args.defect_mask, &mut cal.defect_mask),
    ] {
        if arg.is_some() {
            *slot = arg.clone();
        }
    }
    config.ccdproc.mask_vig |= args.mask_vig;
    config.ccdproc.apply_gain |= args.apply_gain;
    if let Some(v) = args.minimum_vig {
        config.ccdproc.minimum_vig = v;
    }
    if let Some(r) = args.replace {
        config.ccdproc.replace = r.into();
    }
    if let Some(g) = args.grow {
        config.ccdproc.grow = g;
    }
    config.validate().context("Invalid configuration")?;

    let camera = load_camera(args.camera.as_ref(), &config)?;
    print_ccdproc_summary(&config.ccdproc);

    let reporter = BarReporter::new()?;
    let cancel = CancelToken::new();
    let provenance = Provenance::now();
    let mut failed = 0;

    for &det in &config.run.detectors {
        info!(det, exposures = args.files.len(), "Correcting detector");
        let corrector = ccd_corrector(
            &config,
            Arc::clone(&camera),
            det,
            Arc::new(FitsStore),
            Detectors::default(),
            provenance.clone(),
        )
        .with_context(|| format!("Failed to prepare detector {det}"))?;
        let results = run_ccd_batch(&corrector, &args.files, config.run.workers, &cancel, &reporter);
        failed += print_stage_results(Stage::CcdCorrection, &results);
    }

    ensure_no_failures(failed)
}
