use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::LACOSMIC_FINE_FLOOR;
use crate::detection::CosmicRayDetector;
use crate::error::{ensure_shape, Result};
use crate::filters::median_filter;
use crate::mask::morphology::neighbours_of;
use crate::parallel::{map_pixels, reflect_index};
use crate::stats::median_of;

/// L.A.Cosmic parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CosmicRayParams {
    /// Minimum ratio of Laplacian significance to fine structure (default: 2.0).
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    /// Significance a pixel needs to seed a detection (default: 5.0).
    #[serde(default = "default_cr_threshold")]
    pub cr_threshold: f32,
    /// Significance a neighbour needs to join a detection (default: 2.0).
    #[serde(default = "default_neighbor_threshold")]
    pub neighbor_threshold: f32,
    /// Detect/clean iterations (default: 1).
    #[serde(default = "default_maxiter")]
    pub maxiter: usize,
}

fn default_contrast() -> f32 {
    2.0
}

fn default_cr_threshold() -> f32 {
    5.0
}

fn default_neighbor_threshold() -> f32 {
    2.0
}

fn default_maxiter() -> usize {
    1
}

impl Default for CosmicRayParams {
    fn default() -> Self {
        Self {
            contrast: default_contrast(),
            cr_threshold: default_cr_threshold(),
            neighbor_threshold: default_neighbor_threshold(),
            maxiter: default_maxiter(),
        }
    }
}

/// Laplacian edge detection after van Dokkum (2001).
#[derive(Clone, Copy, Debug, Default)]
pub struct LaCosmic;

impl CosmicRayDetector for LaCosmic {
    fn detect(
        &self,
        image: &Array2<f32>,
        noise: &Array2<f32>,
        mask: &Array2<bool>,
        params: &CosmicRayParams,
    ) -> Result<Array2<bool>> {
        ensure_shape("cosmic-ray noise map", image.dim(), noise.dim())?;
        ensure_shape("cosmic-ray mask", image.dim(), mask.dim())?;

        let inv_noise = noise.mapv(|n| {
            if n > 0.0 && n.is_finite() {
                1.0 / n
            } else {
                0.0
            }
        });

        let mut clean = image.mapv(|v| if v.is_finite() { v } else { 0.0 });
        let mut found = Array2::from_elem(image.dim(), false);

        for iteration in 0..params.maxiter.max(1) {
            let mut significance = subsampled_laplacian(&clean);
            Zip::from(&mut significance)
                .and(&inv_noise)
                .for_each(|s, &inv| *s *= 0.5 * inv);

            // Remove large structures.
            let smooth = median_filter(&significance, 5);
            Zip::from(&mut significance)
                .and(&smooth)
                .and(mask)
                .for_each(|s, &m5, &excluded| *s = if excluded { 0.0 } else { *s - m5 });

            let med3 = median_filter(&clean, 3);
            let med7 = median_filter(&med3, 7);
            let mut seeds = Array2::from_elem(image.dim(), false);
            Zip::from(&mut seeds)
                .and(&significance)
                .and(&med3)
                .and(&med7)
                .and(&inv_noise)
                .for_each(|seed, &s, &m3, &m7, &inv| {
                    let fine = ((m3 - m7) * inv).max(LACOSMIC_FINE_FLOOR);
                    *seed = s > params.cr_threshold && s / fine > params.contrast;
                });

            let strong = significance.mapv(|s| s > params.cr_threshold);
            let weak = significance.mapv(|s| s > params.neighbor_threshold);
            let grown = neighbours_of(&seeds, &strong);
            let mut hits = neighbours_of(&grown, &weak);
            Zip::from(&mut hits).and(mask).for_each(|h, &m| *h = *h && !m);

            let count = hits.iter().filter(|&&h| h).count();
            debug!(iteration, count, "L.A.Cosmic pass");
            if count == 0 {
                break;
            }

            Zip::from(&mut found).and(&hits).for_each(|f, &h| *f |= h);
            if iteration + 1 < params.maxiter {
                clean = clean_flagged(&clean, &found, mask);
            }
        }

        Ok(found)
    }
}

/// Laplacian of the 2x block-replicated image, clipped at zero and averaged
/// back down to the original sampling.
fn subsampled_laplacian(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let (h2, w2) = (2 * h, 2 * w);
    let sample = |r: isize, c: isize| -> f32 {
        let r = reflect_index(r, h2) / 2;
        let c = reflect_index(c, w2) / 2;
        data[[r, c]]
    };

    map_pixels((h, w), |row, col| {
        let mut acc = 0.0f32;
        for sr in 0..2 {
            for sc in 0..2 {
                let r = (2 * row + sr) as isize;
                let c = (2 * col + sc) as isize;
                let lap = 4.0 * sample(r, c)
                    - sample(r - 1, c)
                    - sample(r + 1, c)
                    - sample(r, c - 1)
                    - sample(r, c + 1);
                acc += lap.max(0.0);
            }
        }
        acc / 4.0
    })
}

/// Replace flagged pixels with the median of their unflagged 5x5 neighbours.
fn clean_flagged(data: &Array2<f32>, flagged: &Array2<bool>, excluded: &Array2<bool>) -> Array2<f32> {
    let (h, w) = data.dim();
    map_pixels((h, w), |row, col| {
        if !flagged[[row, col]] {
            return data[[row, col]];
        }
        let mut values = Vec::with_capacity(25);
        for r in row.saturating_sub(2)..(row + 3).min(h) {
            for c in col.saturating_sub(2)..(col + 3).min(w) {
                if !flagged[[r, c]] && !excluded[[r, c]] {
                    values.push(data[[r, c]]);
                }
            }
        }
        median_of(&mut values).unwrap_or(data[[row, col]])
    })
}
