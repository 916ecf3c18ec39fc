use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detection::components::{remove_small_components, Connectivity};
use crate::detection::StarMasker;
use crate::error::{ensure_shape, Result};
use crate::stats::{masked_clipped_stats, SigmaClipParams};

/// Bright-source masking parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StarMaskParams {
    /// Detection threshold above the sky, in units of the sky noise (default: 3.0).
    #[serde(default = "default_nsigma")]
    pub nsigma: f32,
    /// Clipping used to measure the sky level and noise (default: 5 sigma, 5 iterations).
    #[serde(default = "default_clip")]
    pub clip: SigmaClipParams,
    /// Smallest source kept, in pixels (default: 5).
    #[serde(default = "default_min_area")]
    pub min_area: usize,
}

fn default_nsigma() -> f32 {
    3.0
}

fn default_clip() -> SigmaClipParams {
    SigmaClipParams {
        sigma: 5.0,
        maxiters: crate::consts::DEFAULT_CLIP_MAXITERS,
    }
}

fn default_min_area() -> usize {
    5
}

impl Default for StarMaskParams {
    fn default() -> Self {
        Self {
            nsigma: default_nsigma(),
            clip: default_clip(),
            min_area: default_min_area(),
        }
    }
}

/// Global threshold at `sky + nsigma * noise`, keeping 8-connected groups of
/// at least `min_area` pixels.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThresholdStarMasker;

impl StarMasker for ThresholdStarMasker {
    fn detect(
        &self,
        image: &Array2<f32>,
        mask: &Array2<bool>,
        params: &StarMaskParams,
    ) -> Result<Array2<bool>> {
        ensure_shape("star mask input", image.dim(), mask.dim())?;

        let Some(sky) = masked_clipped_stats(image, Some(mask), &params.clip) else {
            return Ok(Array2::from_elem(image.dim(), false));
        };
        let threshold = sky.median + params.nsigma * sky.std;

        let mut candidates = Array2::from_elem(image.dim(), false);
        Zip::from(&mut candidates)
            .and(image)
            .and(mask)
            .for_each(|c, &v, &m| *c = !m && v.is_finite() && v > threshold);

        let stars = remove_small_components(&candidates, params.min_area, Connectivity::Eight);
        debug!(
            threshold,
            pixels = stars.iter().filter(|&&s| s).count(),
            "Bright sources masked"
        );
        Ok(stars)
    }
}
