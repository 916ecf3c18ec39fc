use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::background::{
    BackgroundEstimator, BackgroundMethod, BackgroundModel, BackgroundParams, RmsMethod,
};
use crate::consts::{BACKGROUND_MIN_BOX_FRACTION, MAD_TO_STD, SEXTRACTOR_SKEW_LIMIT};
use crate::error::{ensure_shape, Result};
use crate::filters::median_filter;
use crate::parallel::map_pixels;
use crate::stats::{mean_std, median_of, sigma_clip_values};

/// Box-mesh background: sigma-clipped statistics per box, a median filter
/// over the mesh, then bilinear interpolation between box centres.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshBackground;

impl BackgroundEstimator for MeshBackground {
    fn estimate(
        &self,
        image: &Array2<f32>,
        mask: &Array2<bool>,
        params: &BackgroundParams,
    ) -> Result<BackgroundModel> {
        ensure_shape("background mask", image.dim(), mask.dim())?;
        let (h, w) = image.dim();
        if h == 0 || w == 0 {
            return Ok(BackgroundModel {
                background: Array2::zeros((h, w)),
                rms: Array2::zeros((h, w)),
            });
        }

        let box_h = params.box_size.clamp(1, h);
        let box_w = params.box_size.clamp(1, w);
        let ny = h.div_ceil(box_h);
        let nx = w.div_ceil(box_w);

        let cells: Vec<Option<(f32, f32)>> = (0..ny * nx)
            .into_par_iter()
            .map(|idx| {
                let (iy, ix) = (idx / nx, idx % nx);
                let rows = iy * box_h..((iy + 1) * box_h).min(h);
                let cols = ix * box_w..((ix + 1) * box_w).min(w);
                let total = rows.len() * cols.len();

                let mut values = Vec::with_capacity(total);
                for r in rows {
                    for c in cols.clone() {
                        let v = image[[r, c]];
                        if !mask[[r, c]] && v.is_finite() {
                            values.push(v);
                        }
                    }
                }
                if (values.len() as f32) < BACKGROUND_MIN_BOX_FRACTION * total as f32 {
                    return None;
                }
                box_statistics(&values, params)
            })
            .collect();

        let valid: Vec<(f32, f32)> = cells.iter().flatten().copied().collect();
        let (fill_bkg, fill_rms) = if valid.is_empty() {
            warn!("No background box has enough unmasked pixels, using global statistics");
            let values: Vec<f32> = image
                .iter()
                .zip(mask.iter())
                .filter(|(v, &m)| !m && v.is_finite())
                .map(|(&v, _)| v)
                .collect();
            box_statistics(&values, params).unwrap_or((0.0, 0.0))
        } else {
            let mut bkgs: Vec<f32> = valid.iter().map(|c| c.0).collect();
            let mut rmss: Vec<f32> = valid.iter().map(|c| c.1).collect();
            (
                median_of(&mut bkgs).unwrap_or(0.0),
                median_of(&mut rmss).unwrap_or(0.0),
            )
        };

        debug!(
            boxes = ny * nx,
            valid = valid.len(),
            "Background mesh computed"
        );

        let mut mesh_bkg = Array2::<f32>::zeros((ny, nx));
        let mut mesh_rms = Array2::<f32>::zeros((ny, nx));
        for (idx, cell) in cells.iter().enumerate() {
            let (b, r) = cell.unwrap_or((fill_bkg, fill_rms));
            mesh_bkg[[idx / nx, idx % nx]] = b;
            mesh_rms[[idx / nx, idx % nx]] = r;
        }

        let mesh_bkg = median_filter(&mesh_bkg, params.filter_size);
        let mesh_rms = median_filter(&mesh_rms, params.filter_size);

        let centers_y = box_centers(h, box_h, ny);
        let centers_x = box_centers(w, box_w, nx);

        Ok(BackgroundModel {
            background: interpolate_mesh(&mesh_bkg, &centers_y, &centers_x, (h, w)),
            rms: interpolate_mesh(&mesh_rms, &centers_y, &centers_x, (h, w)),
        })
    }
}

/// Location and scale of one box after clipping.
fn box_statistics(values: &[f32], params: &BackgroundParams) -> Option<(f32, f32)> {
    let mut kept = sigma_clip_values(values, &params.clip);
    if kept.is_empty() {
        return None;
    }

    let (mean, std) = mean_std(&kept);
    let median = median_of(&mut kept)?;

    let location = match params.method {
        BackgroundMethod::Median => median,
        BackgroundMethod::Mean => mean,
        BackgroundMethod::SExtractor => {
            if std <= 0.0 {
                mean
            } else if ((mean - median) / std).abs() > SEXTRACTOR_SKEW_LIMIT {
                median
            } else {
                2.5 * median - 1.5 * mean
            }
        }
    };

    let scale = match params.rms_method {
        RmsMethod::Std => std,
        RmsMethod::Mad => {
            let mut dev: Vec<f32> = kept.iter().map(|v| (v - median).abs()).collect();
            MAD_TO_STD * median_of(&mut dev).unwrap_or(0.0)
        }
    };

    Some((location, scale))
}

fn box_centers(len: usize, box_len: usize, n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let start = i * box_len;
            let end = ((i + 1) * box_len).min(len);
            (start + end - 1) as f32 / 2.0
        })
        .collect()
}

/// Lower index, upper index and blend factor for `x` between sorted `centers`.
/// Outside the first/last centre the edge value is held constant.
fn bracket(centers: &[f32], x: f32) -> (usize, usize, f32) {
    let n = centers.len();
    if n == 1 || x <= centers[0] {
        return (0, 0, 0.0);
    }
    if x >= centers[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    let hi = centers.partition_point(|&c| c <= x).min(n - 1);
    let lo = hi - 1;
    let t = (x - centers[lo]) / (centers[hi] - centers[lo]);
    (lo, hi, t)
}

fn interpolate_mesh(
    mesh: &Array2<f32>,
    centers_y: &[f32],
    centers_x: &[f32],
    shape: (usize, usize),
) -> Array2<f32> {
    let cols: Vec<(usize, usize, f32)> = (0..shape.1)
        .map(|c| bracket(centers_x, c as f32))
        .collect();

    map_pixels(shape, |row, col| {
        let (y0, y1, ty) = bracket(centers_y, row as f32);
        let (x0, x1, tx) = cols[col];
        let top = mesh[[y0, x0]] * (1.0 - tx) + mesh[[y0, x1]] * tx;
        let bottom = mesh[[y1, x0]] * (1.0 - tx) + mesh[[y1, x1]] * tx;
        top * (1.0 - ty) + bottom * ty
    })
}
