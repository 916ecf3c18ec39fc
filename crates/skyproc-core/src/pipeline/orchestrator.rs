use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;
use tracing::{info, warn};

use crate::camera::Camera;
use crate::detection::Detectors;
use crate::error::{Result, SkyprocError};
use crate::io::naming::{CcdProducts, SciProducts};
use crate::io::store::ImageStore;
use crate::pipeline::ccdproc::{CcdCorrector, MasterFrames};
use crate::pipeline::config::{CalibrationPaths, PipelineConfig};
use crate::pipeline::dispatch::{run_ccd_batch, run_sci_batch, CancelToken};
use crate::pipeline::sciproc::{SciTask, ScienceProcessor};
use crate::pipeline::types::{
    ExposureFailure, ExposureId, ExposureResult, Outcome, Provenance, RunReporter, StageOutput,
};

/// Per-exposure results of a full run, over all detectors.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub ccd: Vec<ExposureResult<StageOutput<CcdProducts>>>,
    pub sci: Vec<ExposureResult<StageOutput<SciProducts>>>,
}

/// Counts of one stage's results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTally {
    pub persisted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageTally {
    pub fn of<P>(results: &[ExposureResult<StageOutput<P>>]) -> Self {
        let mut tally = Self::default();
        for result in results {
            match result {
                Ok(out) if out.outcome == Outcome::Persisted => tally.persisted += 1,
                Ok(_) => tally.skipped += 1,
                Err(_) => tally.failed += 1,
            }
        }
        tally
    }
}

impl PipelineReport {
    pub fn ccd_tally(&self) -> StageTally {
        StageTally::of(&self.ccd)
    }

    pub fn sci_tally(&self) -> StageTally {
        StageTally::of(&self.sci)
    }

    pub fn failures(&self) -> usize {
        self.ccd_tally().failed + self.sci_tally().failed
    }
}

/// Substitute `{det}` in a calibration path with the two-digit detector number.
pub fn calibration_path(path: &Path, det: usize) -> PathBuf {
    let text = path.to_string_lossy();
    if text.contains("{det}") {
        PathBuf::from(text.replace("{det}", &format!("{det:02}")))
    } else {
        path.to_path_buf()
    }
}

fn load_optional(
    store: &dyn ImageStore,
    path: Option<&PathBuf>,
    det: usize,
) -> Result<Option<Array2<f32>>> {
    path.map(|p| {
        let p = calibration_path(p, det);
        info!(det, path = %p.display(), "Loading calibration");
        store.read_image(&p).map(|(_, data)| data)
    })
    .transpose()
}

/// Load the master frames of one detector. Missing paths are left `None`.
pub fn load_masters(
    paths: &CalibrationPaths,
    det: usize,
    store: &dyn ImageStore,
) -> Result<MasterFrames> {
    let defect_mask =
        load_optional(store, paths.defect_mask.as_ref(), det)?.map(|m| m.mapv(|v| v != 0.0));
    Ok(MasterFrames {
        bias: load_optional(store, paths.bias.as_ref(), det)?,
        dark: load_optional(store, paths.dark.as_ref(), det)?,
        pixel_flat: load_optional(store, paths.pixel_flat.as_ref(), det)?,
        illum_flat: load_optional(store, paths.illum_flat.as_ref(), det)?,
        defect_mask,
    })
}

/// Build the CCD stage for one detector, loading its masters.
pub fn ccd_corrector(
    config: &PipelineConfig,
    camera: Arc<dyn Camera>,
    det: usize,
    store: Arc<dyn ImageStore>,
    detectors: Detectors,
    provenance: Provenance,
) -> Result<CcdCorrector> {
    let masters = load_masters(&config.calibrations, det, &*store)?;
    Ok(CcdCorrector {
        camera,
        det,
        masters: Arc::new(masters),
        config: config.ccdproc.clone(),
        detectors,
        store,
        science_dir: config.run.science_dir.clone(),
        provenance,
    })
}

/// Build the science stage for one detector, loading its supersky flat.
pub fn science_processor(
    config: &PipelineConfig,
    det: usize,
    store: Arc<dyn ImageStore>,
    detectors: Detectors,
    provenance: Provenance,
) -> Result<ScienceProcessor> {
    let supersky = load_optional(&*store, config.calibrations.supersky.as_ref(), det)?;
    Ok(ScienceProcessor {
        config: config.sciproc.clone(),
        supersky: supersky.map(Arc::new),
        detectors,
        store,
        provenance,
    })
}

/// Run both stages over `raws` for every configured detector.
///
/// Science processing covers the exposures whose CCD stage succeeded.
/// Calibration loading and batch configuration errors abort the run;
/// per-exposure errors are collected in the report. Detectors reached after
/// cancellation load nothing and report every exposure as cancelled.
pub fn run_pipeline(
    config: &PipelineConfig,
    camera: Arc<dyn Camera>,
    raws: &[PathBuf],
    store: Arc<dyn ImageStore>,
    detectors: Detectors,
    cancel: &CancelToken,
    reporter: &dyn RunReporter,
) -> Result<PipelineReport> {
    config.validate()?;
    if let Some(airmass) = &config.airmass {
        if airmass.len() != raws.len() {
            return Err(SkyprocError::Configuration(format!(
                "{} airmass values given for {} exposures",
                airmass.len(),
                raws.len()
            )));
        }
    }

    let provenance = Provenance::now();
    let mut report = PipelineReport::default();

    for &det in &config.run.detectors {
        if cancel.is_cancelled() {
            warn!(det, "Run cancelled, skipping detector");
            report.ccd.extend(raws.iter().map(|raw| {
                let exposure = ExposureId::new(raw, det);
                let cause = SkyprocError::Cancelled.to_string();
                reporter.exposure_failed(&exposure, &cause);
                Err(ExposureFailure { exposure, cause })
            }));
            continue;
        }
        info!(det, camera = camera.name(), exposures = raws.len(), "Processing detector");

        let corrector = ccd_corrector(
            config,
            Arc::clone(&camera),
            det,
            Arc::clone(&store),
            detectors.clone(),
            provenance.clone(),
        )?;
        let ccd = run_ccd_batch(&corrector, raws, config.run.workers, cancel, reporter);

        let tasks: Vec<SciTask> = ccd
            .iter()
            .enumerate()
            .filter_map(|(i, result)| {
                let out = result.as_ref().ok()?;
                Some(SciTask {
                    image: out.products.image.clone(),
                    mask: out.products.mask.clone(),
                    det,
                    airmass: config.airmass.as_ref().and_then(|a| a.get(i).copied()),
                })
            })
            .collect();

        let processor = science_processor(
            config,
            det,
            Arc::clone(&store),
            detectors.clone(),
            provenance.clone(),
        )?;
        let sci = run_sci_batch(&processor, tasks, None, config.run.workers, cancel, reporter)?;

        report.ccd.extend(ccd);
        report.sci.extend(sci);
    }

    Ok(report)
}
