use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Axis, Zip};
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::consts::{CCD_REPLACE_SIGMA, DEFAULT_CLIP_MAXITERS};
use crate::detection::Detectors;
use crate::error::{ensure_shape, Result, SkyprocError};
use crate::frame::{CorrectedFrame, DetectorPar, ImageKind, RawFrame};
use crate::io::fits::Header;
use crate::io::naming::{ccd_products, CcdProducts};
use crate::io::store::{ArtifactState, ImageStore};
use crate::mask::{DefectBitmask, DefectFlag};
use crate::pipeline::config::CcdProcConfig;
use crate::pipeline::replace::replace_flagged;
use crate::pipeline::types::{ExposureId, Outcome, Provenance, StageOutput};
use crate::pipeline::vignetting::{detect_vignetting, select_vignetting_flat};
use crate::stats::SigmaClipParams;

/// Master calibration images of one calibration group, in trimmed geometry.
///
/// Shared read-only between workers.
#[derive(Clone, Debug, Default)]
pub struct MasterFrames {
    pub bias: Option<Array2<f32>>,
    pub dark: Option<Array2<f32>>,
    pub pixel_flat: Option<Array2<f32>>,
    pub illum_flat: Option<Array2<f32>>,
    /// Externally supplied defects.
    pub defect_mask: Option<Array2<bool>>,
}

impl MasterFrames {
    /// Names of the corrections that will be skipped.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bias.is_none() {
            missing.push("bias");
        }
        if self.dark.is_none() {
            missing.push("dark");
        }
        if self.pixel_flat.is_none() {
            missing.push("pixel flat");
        }
        if self.illum_flat.is_none() {
            missing.push("illumination flat");
        }
        missing
    }
}

/// `1 / x` for positive finite `x`, 0 otherwise.
pub fn reciprocal(x: f32) -> f32 {
    if x > 0.0 && x.is_finite() {
        1.0 / x
    } else {
        0.0
    }
}

/// Drop every row and column lying entirely in `exclude`.
///
/// Fails with a shape error when excluded pixels remain inside the kept
/// rectangle, i.e. the valid region is not bounded by whole rows and columns.
pub fn trim_frame<T: Clone>(frame: &Array2<T>, exclude: &Array2<bool>) -> Result<Array2<T>> {
    ensure_shape("data section map", frame.dim(), exclude.dim())?;

    let rows: Vec<usize> = exclude
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, line)| !line.iter().all(|&e| e))
        .map(|(i, _)| i)
        .collect();
    let cols: Vec<usize> = exclude
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, line)| !line.iter().all(|&e| e))
        .map(|(i, _)| i)
        .collect();

    if rows.is_empty() || cols.is_empty() {
        return Err(SkyprocError::Shape("data section is empty".into()));
    }
    let leftover = rows
        .iter()
        .any(|&r| cols.iter().any(|&c| exclude[[r, c]]));
    if leftover {
        return Err(SkyprocError::Shape(
            "data section is oddly shaped; trimming does not remove all pixels outside it".into(),
        ));
    }

    Ok(frame.select(Axis(0), &rows).select(Axis(1), &cols))
}

/// Correct one raw frame.
///
/// `static_bpm` is in raw geometry; master frames are in trimmed geometry.
pub fn ccd_correct(
    raw: &RawFrame,
    detector: &DetectorPar,
    static_bpm: &Array2<bool>,
    masters: &MasterFrames,
    config: &CcdProcConfig,
    detectors: &Detectors,
) -> Result<CorrectedFrame> {
    let overscan = raw.datasec.mapv(|a| a == 0);
    let mut image = trim_frame(&raw.data, &overscan)?;
    let amps = trim_frame(&raw.datasec, &overscan)?;
    let bpm = trim_frame(static_bpm, &overscan)?;
    let shape = image.dim();

    for (what, frame) in [
        ("master bias", masters.bias.as_ref()),
        ("master dark", masters.dark.as_ref()),
        ("pixel flat", masters.pixel_flat.as_ref()),
        ("illumination flat", masters.illum_flat.as_ref()),
    ] {
        if let Some(frame) = frame {
            ensure_shape(what, shape, frame.dim())?;
        }
    }
    if let Some(mask) = &masters.defect_mask {
        ensure_shape("defect mask", shape, mask.dim())?;
    }

    let sat_level = detector.saturation_level();
    let saturated = image.mapv(|v| v > sat_level);
    let zero = image.mapv(|v| v == 0.0);

    if let Some(bias) = &masters.bias {
        image -= bias;
    }
    if let Some(dark) = &masters.dark {
        let exptime = raw.exptime.ok_or_else(|| {
            SkyprocError::Configuration("dark frame supplied but exposure time unknown".into())
        })?;
        image.scaled_add(-exptime, dark);
    }
    if let Some(flat) = &masters.pixel_flat {
        Zip::from(&mut image)
            .and(flat)
            .for_each(|v, &f| *v *= reciprocal(f));
    }
    if let Some(flat) = &masters.illum_flat {
        Zip::from(&mut image)
            .and(flat)
            .for_each(|v, &f| *v *= reciprocal(f));
    }

    let mut header = raw.header.clone();
    if config.apply_gain {
        let gain = &detector.gain;
        Zip::from(&mut image).and(&amps).for_each(|v, &amp| {
            if let Some(g) = (amp as usize).checked_sub(1).and_then(|i| gain.get(i)) {
                *v *= g;
            }
        });
        header.set("GAIN", 1.0f64, Some("Effective gain"));
    }

    let external = masters
        .defect_mask
        .clone()
        .unwrap_or_else(|| Array2::from_elem(shape, false));

    let vignetted = if config.mask_vig {
        let flat = select_vignetting_flat(masters.illum_flat.as_ref(), masters.pixel_flat.as_ref());
        let exclude = Zip::from(&bpm)
            .and(&zero)
            .and(&external)
            .map_collect(|&b, &z, &e| b || z || e);
        detect_vignetting(
            &image,
            flat,
            &exclude,
            config.minimum_vig,
            config.grow,
            detectors,
        )?
    } else {
        Array2::from_elem(shape, false)
    };

    let non_finite = image.mapv(|v| !v.is_finite());
    Zip::from(&mut image).and(&non_finite).for_each(|v, &n| {
        if n {
            *v = 0.0;
        }
    });

    let mut mask = DefectBitmask::new(shape);
    mask.insert(DefectFlag::StaticBadPixel, &bpm)?;
    mask.insert(DefectFlag::ExternalDefect, &external)?;
    mask.insert(DefectFlag::Saturated, &saturated)?;
    mask.insert(DefectFlag::Zero, &zero)?;
    mask.insert(DefectFlag::NonFinite, &non_finite)?;
    mask.insert(DefectFlag::Vignetted, &vignetted)?;

    let clip = SigmaClipParams {
        sigma: CCD_REPLACE_SIGMA,
        maxiters: DEFAULT_CLIP_MAXITERS,
    };
    replace_flagged(&mut image, &mask.any(), &saturated, config.replace, &clip)?;

    header.set("CCDPROC", true, Some("CCD correction done"));
    debug!(
        saturated = mask.count(DefectFlag::Saturated),
        zero = mask.count(DefectFlag::Zero),
        vignetted = mask.count(DefectFlag::Vignetted),
        "CCD correction flags"
    );

    Ok(CorrectedFrame {
        image,
        mask,
        header,
    })
}

/// CCD correction of exposures from one detector with one set of masters.
pub struct CcdCorrector {
    pub camera: Arc<dyn Camera>,
    pub det: usize,
    pub masters: Arc<MasterFrames>,
    pub config: CcdProcConfig,
    pub detectors: Detectors,
    pub store: Arc<dyn ImageStore>,
    pub science_dir: Option<PathBuf>,
    pub provenance: Provenance,
}

impl CcdCorrector {
    pub fn products(&self, raw_path: &Path) -> CcdProducts {
        ccd_products(raw_path, self.det, self.science_dir.as_deref())
    }

    /// Correct one exposure unless its products are already up to date.
    pub fn process_one(&self, raw_path: &Path) -> Result<StageOutput<CcdProducts>> {
        let exposure = ExposureId::new(raw_path, self.det);
        let products = self.products(raw_path);

        match self.store.state(&[raw_path], &products.all()) {
            ArtifactState::Present => {
                info!(%exposure, path = %products.image.display(), "Corrected frame exists, skipping");
                return Ok(StageOutput {
                    exposure,
                    products,
                    outcome: Outcome::SkippedExisting,
                });
            }
            ArtifactState::Stale => {
                warn!(%exposure, "Corrected products incomplete or outdated, recomputing");
            }
            ArtifactState::Missing => {}
        }

        info!(%exposure, "Correcting");
        let raw = self.camera.read_raw(raw_path, self.det)?;
        let detector = self.camera.detector(self.det)?;
        let bpm = self.camera.bad_pixel_mask(self.det, raw.data.dim())?;
        let corrected = ccd_correct(
            &raw,
            &detector,
            &bpm,
            &self.masters,
            &self.config,
            &self.detectors,
        )?;

        if let Some(dir) = products.image.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let flag_header: Header = self.provenance.stamp(&corrected.header, ImageKind::FlagImage);
        self.store
            .write_mask(&products.mask, corrected.mask.bits(), &flag_header)?;
        let image_header = self
            .provenance
            .stamp(&corrected.header, ImageKind::ScienceImage);
        self.store
            .write_image(&products.image, &corrected.image, &image_header)?;
        info!(%exposure, path = %products.image.display(), "Corrected frame saved");

        Ok(StageOutput {
            exposure,
            products,
            outcome: Outcome::Persisted,
        })
    }
}
