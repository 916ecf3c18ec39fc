use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;
use skyproc_core::detection::Detectors;
use skyproc_core::io::{ccd_mask_for, detector_from_name, FitsStore};
use skyproc_core::pipeline::orchestrator::science_processor;
use skyproc_core::pipeline::{run_sci_batch, CancelToken, Provenance, SciTask, Stage};

use super::{ensure_no_failures, load_config, ReplaceArg};
use crate::progress::BarReporter;
use crate::summary::{print_sciproc_summary, print_stage_results};

#[derive(Args)]
pub struct SciprocArgs {
    /// Corrected frames (`*_proc.fits`); masks are found alongside
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads (0 = all cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Supersky flat
    #[arg(long)]
    pub supersky: Option<PathBuf>,

    /// Comma-separated airmass, one per file
    #[arg(long, value_delimiter = ',')]
    pub airmass: Vec<f32>,

    /// Extinction coefficient (mag per airmass)
    #[arg(long)]
    pub coeff_airmass: Option<f32>,

    /// Replacement for flagged pixels
    #[arg(long, value_enum)]
    pub replace: Option<ReplaceArg>,

    /// Disable bright-star masking
    #[arg(long)]
    pub no_stars: bool,

    /// Disable cosmic-ray masking
    #[arg(long)]
    pub no_cosmic: bool,

    /// Disable satellite-trail masking
    #[arg(long)]
    pub no_satellites: bool,

    /// Mask negative-star artefacts
    #[arg(long)]
    pub negative_stars: bool,

    /// Mask growth radius in pixels
    #[arg(long)]
    pub grow: Option<f32>,
}

pub fn run(args: &SciprocArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if args.supersky.is_some() {
        config.calibrations.supersky = args.supersky.clone();
    }
    if !args.airmass.is_empty() {
        config.airmass = Some(args.airmass.clone());
    }
    let sci = &mut config.sciproc;
    if let Some(c) = args.coeff_airmass {
        sci.coeff_airmass = c;
    }
    if let Some(r) = args.replace {
        sci.replace = r.into();
    }
    if let Some(g) = args.grow {
        sci.grow = g;
    }
    sci.mask_bright_star &= !args.no_stars;
    sci.mask_cosmic_rays &= !args.no_cosmic;
    sci.mask_satellites &= !args.no_satellites;
    sci.mask_negative_star |= args.negative_stars;
    config.validate().context("Invalid configuration")?;

    print_sciproc_summary(&config.sciproc);

    if let Some(airmass) = &config.airmass {
        if airmass.len() != args.files.len() {
            bail!("{} airmass values given for {} files", airmass.len(), args.files.len());
        }
    }

    let tasks: Vec<SciTask> = args
        .files
        .iter()
        .enumerate()
        .map(|(i, image)| SciTask {
            image: image.clone(),
            mask: ccd_mask_for(image),
            det: detector_from_name(image).unwrap_or(1),
            airmass: config.airmass.as_ref().and_then(|a| a.get(i).copied()),
        })
        .collect();

    // Supersky flats are per detector, so batch by detector.
    let mut dets: Vec<usize> = tasks.iter().map(|t| t.det).collect();
    dets.sort_unstable();
    dets.dedup();

    let reporter = BarReporter::new()?;
    let cancel = CancelToken::new();
    let provenance = Provenance::now();
    let mut failed = 0;

    for det in dets {
        let batch: Vec<SciTask> = tasks.iter().filter(|t| t.det == det).cloned().collect();
        info!(det, exposures = batch.len(), "Processing detector");
        let processor = science_processor(
            &config,
            det,
            Arc::new(FitsStore),
            Detectors::default(),
            provenance.clone(),
        )
        .with_context(|| format!("Failed to prepare detector {det}"))?;
        let results = run_sci_batch(
            &processor,
            batch,
            None,
            config.run.workers,
            &cancel,
            &reporter,
        )?;
        failed += print_stage_results(Stage::ScienceProcessing, &results);
    }

    ensure_no_failures(failed)
}
