use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array2, Zip};
use tracing::{debug, info, warn};

use crate::detection::Detectors;
use crate::error::{ensure_shape, Result};
use crate::frame::{ImageKind, ScienceFrame};
use crate::io::fits::Header;
use crate::io::naming::{sci_products, SciProducts};
use crate::io::store::{ArtifactState, ImageStore};
use crate::mask::{grow_mask, DefectBitmask, DefectFlag};
use crate::pipeline::ccdproc::reciprocal;
use crate::pipeline::config::SciProcConfig;
use crate::pipeline::replace::replace_flagged;
use crate::pipeline::types::{ExposureId, Outcome, Provenance, StageOutput};
use crate::stats::median_of;

/// Flux scale for extinction correction to airmass 1.
pub fn extinction_factor(coeff: f32, airmass: f32) -> f32 {
    10f32.powf(0.4 * coeff * (airmass - 1.0))
}

/// Process one corrected frame into a science frame.
pub fn science_process(
    mut image: Array2<f32>,
    mut mask: DefectBitmask,
    header: Header,
    airmass: Option<f32>,
    supersky: Option<&Array2<f32>>,
    config: &SciProcConfig,
    detectors: &Detectors,
) -> Result<ScienceFrame> {
    ensure_shape("defect mask", image.dim(), mask.dim())?;
    let shape = image.dim();

    let zero = Zip::from(&image)
        .and(mask.bits())
        .map_collect(|&v, &b| v == 0.0 || b & DefectFlag::Zero.bit() != 0);
    let saturated = mask.contains(DefectFlag::Saturated);
    let defects = mask.any();
    let vignetted_only = Zip::from(&mask.contains(DefectFlag::Vignetted))
        .and(&zero)
        .map_collect(|&v, &z| v && !z);

    if let Some(flat) = supersky {
        ensure_shape("supersky flat", shape, flat.dim())?;
        Zip::from(&mut image)
            .and(flat)
            .for_each(|v, &f| *v *= reciprocal(f));
    }

    if let Some(airmass) = airmass {
        let factor = extinction_factor(config.coeff_airmass, airmass);
        debug!(airmass, factor, "Extinction correction");
        image.mapv_inplace(|v| v * factor);
    }

    let stars = if config.mask_bright_star {
        let exclude = Zip::from(&defects)
            .and(&vignetted_only)
            .map_collect(|&d, &v| d && !v);
        let found = detectors
            .stars
            .detect(&image, &exclude, &config.star_mask)?;
        grow_mask(&found, config.grow)
    } else {
        Array2::from_elem(shape, false)
    };

    let bkg_mask = Zip::from(&defects)
        .and(&stars)
        .map_collect(|&d, &s| d || s);
    let mut model = detectors
        .background
        .estimate(&image, &bkg_mask, &config.background)?;
    Zip::from(&mut model.background)
        .and(&zero)
        .for_each(|b, &z| {
            if z {
                *b = 0.0;
            }
        });

    let mut science = &image - &model.background;

    // Saturated cores are not treated as defects when searching for artefacts.
    let artefact_exclude = Zip::from(&defects)
        .and(&saturated)
        .map_collect(|&d, &s| d && !s);

    if config.mask_cosmic_rays {
        let found = detectors.cosmic_rays.detect(
            &science,
            &model.rms,
            &artefact_exclude,
            &config.cosmic,
        )?;
        mask.insert(DefectFlag::CosmicRay, &grow_mask(&found, config.grow))?;
    }

    if config.mask_satellites {
        let found = detectors
            .satellites
            .detect(&science, &artefact_exclude, &config.satellite)?;
        mask.insert(DefectFlag::SatelliteTrail, &grow_mask(&found, config.grow))?;
    }

    if config.mask_negative_star {
        let inverted = science.mapv(|v| -v);
        let found = detectors
            .stars
            .detect(&inverted, &defects, &config.star_mask)?;
        mask.insert(DefectFlag::NegativeStar, &grow_mask(&found, config.grow))?;
    }

    let flagged = mask.any();
    replace_flagged(
        &mut science,
        &flagged,
        &saturated,
        config.replace,
        &config.replace_clip,
    )?;

    let weight = weight_map(&model.rms, &flagged);

    debug!(
        cosmic_rays = mask.count(DefectFlag::CosmicRay),
        satellites = mask.count(DefectFlag::SatelliteTrail),
        negative = mask.count(DefectFlag::NegativeStar),
        "Science flags"
    );

    Ok(ScienceFrame {
        image: science,
        weight,
        mask,
        header,
    })
}

/// Inverse variance from the background RMS, zero exactly where `flagged`.
///
/// Unflagged pixels without a usable variance get the median usable
/// variance (or 1.0 when there is none), so they keep a nonzero weight.
pub fn weight_map(rms: &Array2<f32>, flagged: &Array2<bool>) -> Array2<f32> {
    let usable = |var: f32| -> Option<f32> {
        let w = reciprocal(var);
        (w > 0.0 && w.is_finite()).then_some(w)
    };

    let mut variances: Vec<f32> = rms
        .iter()
        .map(|&r| r * r)
        .filter(|&v| usable(v).is_some())
        .collect();
    let fallback = median_of(&mut variances)
        .and_then(usable)
        .unwrap_or(1.0);

    Zip::from(rms).and(flagged).map_collect(|&r, &f| {
        if f {
            0.0
        } else {
            usable(r * r).unwrap_or(fallback)
        }
    })
}

/// Science processing of corrected frames, sharing one configuration.
pub struct ScienceProcessor {
    pub config: SciProcConfig,
    pub supersky: Option<Arc<Array2<f32>>>,
    pub detectors: Detectors,
    pub store: Arc<dyn ImageStore>,
    pub provenance: Provenance,
}

/// Inputs for one exposure of the science stage.
#[derive(Clone, Debug, PartialEq)]
pub struct SciTask {
    /// Corrected image (`*_proc.fits`).
    pub image: PathBuf,
    /// Its defect mask (`*_ccdmask.fits`).
    pub mask: PathBuf,
    pub det: usize,
    pub airmass: Option<f32>,
}

impl SciTask {
    pub fn exposure(&self) -> ExposureId {
        ExposureId::new(&self.image, self.det)
    }
}

impl ScienceProcessor {
    /// Process one corrected frame unless its products are already up to date.
    pub fn process_one(&self, task: &SciTask) -> Result<StageOutput<SciProducts>> {
        let exposure = task.exposure();
        let products = sci_products(&task.image);

        let inputs = [task.image.as_path(), task.mask.as_path()];
        match self.store.state(&inputs, &products.all()) {
            ArtifactState::Present => {
                info!(%exposure, path = %products.image.display(), "Science products exist, skipping");
                return Ok(StageOutput {
                    exposure,
                    products,
                    outcome: Outcome::SkippedExisting,
                });
            }
            ArtifactState::Stale => {
                warn!(%exposure, "Science products incomplete or outdated, recomputing");
            }
            ArtifactState::Missing => {}
        }

        info!(%exposure, "Processing science frame");
        let (header, image) = self.store.read_image(&task.image)?;
        let (_, bits) = self.store.read_mask(&task.mask)?;

        let airmass = task.airmass.or_else(|| {
            self.config
                .airmass_key
                .as_deref()
                .and_then(|key| header.get_f64(key))
                .map(|a| a as f32)
        });
        if airmass.is_none() && self.config.coeff_airmass != 0.0 {
            warn!(%exposure, "No airmass available, skipping extinction correction");
        }

        let frame = science_process(
            image,
            DefectBitmask::from_bits(bits),
            header,
            airmass,
            self.supersky.as_deref(),
            &self.config,
            &self.detectors,
        )?;

        write_products(&*self.store, &self.provenance, &products, &frame)?;
        info!(%exposure, path = %products.image.display(), "Science frame saved");

        Ok(StageOutput {
            exposure,
            products,
            outcome: Outcome::Persisted,
        })
    }
}

fn write_products(
    store: &dyn ImageStore,
    provenance: &Provenance,
    products: &SciProducts,
    frame: &ScienceFrame,
) -> Result<()> {
    store.write_mask(
        &products.flag,
        frame.mask.bits(),
        &provenance.stamp(&frame.header, ImageKind::FlagImage),
    )?;
    store.write_image(
        &products.weight,
        &frame.weight,
        &provenance.stamp(&frame.header, ImageKind::WeightImage),
    )?;
    store.write_image(
        &products.image,
        &frame.image,
        &provenance.stamp(&frame.header, ImageKind::ScienceImage),
    )
}
