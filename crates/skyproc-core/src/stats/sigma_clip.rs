use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_CLIP_MAXITERS;
use crate::stats::median::median_of;

/// Parameters for iterative sigma clipping about the median.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigmaClipParams {
    /// Values farther than `sigma * std` from the median are rejected (default: 3.0).
    pub sigma: f32,
    /// Maximum number of rejection passes (default: 5).
    pub maxiters: usize,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            maxiters: DEFAULT_CLIP_MAXITERS,
        }
    }
}

/// Statistics of the values that survived clipping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedStats {
    pub mean: f32,
    pub median: f32,
    pub std: f32,
    pub count: usize,
}

/// Iteratively reject values about the median and return the survivors.
///
/// Each pass computes the median and population standard deviation of the
/// survivors and rejects everything beyond `sigma` deviations. Stops early
/// once a pass rejects nothing. Non-finite values are always rejected.
pub fn sigma_clip_values(values: &[f32], params: &SigmaClipParams) -> Vec<f32> {
    let mut kept: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();

    let mut scratch = Vec::with_capacity(kept.len());
    for _ in 0..params.maxiters {
        scratch.clear();
        scratch.extend_from_slice(&kept);
        let Some(median) = median_of(&mut scratch) else {
            break;
        };
        let (_, std) = mean_std(&kept);
        if std <= 0.0 {
            break;
        }

        let limit = params.sigma * std;
        let before = kept.len();
        kept.retain(|&v| (v - median).abs() <= limit);
        if kept.len() == before || kept.is_empty() {
            break;
        }
    }

    kept
}

/// Sigma-clipped mean, median and standard deviation of the finite `values`.
///
/// Returns `None` when nothing survives.
pub fn sigma_clipped_stats(values: &[f32], params: &SigmaClipParams) -> Option<ClippedStats> {
    let mut kept = sigma_clip_values(values, params);
    if kept.is_empty() {
        return None;
    }

    let (mean, std) = mean_std(&kept);
    let count = kept.len();
    let median = median_of(&mut kept)?;
    Some(ClippedStats {
        mean,
        median,
        std,
        count,
    })
}

/// [`sigma_clipped_stats`] over the pixels of `data` not set in `exclude`.
pub fn masked_clipped_stats(
    data: &Array2<f32>,
    exclude: Option<&Array2<bool>>,
    params: &SigmaClipParams,
) -> Option<ClippedStats> {
    let values: Vec<f32> = match exclude {
        Some(mask) => data
            .iter()
            .zip(mask.iter())
            .filter(|(_, &m)| !m)
            .map(|(&v, _)| v)
            .collect(),
        None => data.iter().copied().collect(),
    };
    sigma_clipped_stats(&values, params)
}

/// Mean and population standard deviation, accumulated in f64.
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}
