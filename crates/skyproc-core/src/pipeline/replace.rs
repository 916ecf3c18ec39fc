use ndarray::{Array2, Zip};
use tracing::{debug, warn};

use crate::consts::{REPLACE_MIN_SAMPLES, REPLACE_WINDOW_RADIUS};
use crate::error::{ensure_shape, Result};
use crate::parallel::map_pixels;
use crate::pipeline::config::ReplacePolicy;
use crate::stats::{sigma_clipped_stats, ClippedStats, SigmaClipParams};

/// Overwrite pixels that are `flagged` but not `protected` according to `policy`.
///
/// Replacement values are drawn from unflagged pixels of the input only.
/// Median and mean use a local window, falling back to the whole image when
/// the window holds too few unflagged pixels. Returns the number of pixels
/// written.
pub fn replace_flagged(
    image: &mut Array2<f32>,
    flagged: &Array2<bool>,
    protected: &Array2<bool>,
    policy: ReplacePolicy,
    clip: &SigmaClipParams,
) -> Result<usize> {
    ensure_shape("replacement mask", image.dim(), flagged.dim())?;
    ensure_shape("protected mask", image.dim(), protected.dim())?;
    if policy == ReplacePolicy::None {
        return Ok(0);
    }

    let targets = Zip::from(flagged)
        .and(protected)
        .map_collect(|&f, &p| f && !p);
    let n_targets = targets.iter().filter(|&&t| t).count();
    if n_targets == 0 {
        return Ok(0);
    }

    let replacement: Array2<Option<f32>> = match policy {
        ReplacePolicy::None => return Ok(0),
        ReplacePolicy::Zero => targets.mapv(|t| t.then_some(0.0)),
        _ => {
            let good: Vec<f32> = image
                .iter()
                .zip(flagged.iter())
                .filter(|(v, &f)| !f && v.is_finite())
                .map(|(&v, _)| v)
                .collect();
            if good.is_empty() {
                warn!(policy = ?policy, "No unflagged pixels, nothing to replace with");
                return Ok(0);
            }
            from_unflagged(&*image, flagged, &targets, &good, policy, clip)
        }
    };

    let mut written = 0;
    Zip::from(image)
        .and(&replacement)
        .for_each(|v, &r| {
            if let Some(r) = r {
                *v = r;
                written += 1;
            }
        });
    debug!(policy = ?policy, written, "Flagged pixels replaced");
    Ok(written)
}

/// Replacement values for min, max, median and mean, drawn from `good`.
fn from_unflagged(
    image: &Array2<f32>,
    flagged: &Array2<bool>,
    targets: &Array2<bool>,
    good: &[f32],
    policy: ReplacePolicy,
    clip: &SigmaClipParams,
) -> Array2<Option<f32>> {
    match policy {
        ReplacePolicy::Min => {
            let min = good.iter().copied().fold(f32::INFINITY, f32::min);
            targets.mapv(|t| t.then_some(min))
        }
        ReplacePolicy::Max => {
            let max = good.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            targets.mapv(|t| t.then_some(max))
        }
        _ => {
            let pick = |s: &ClippedStats| match policy {
                ReplacePolicy::Mean => s.mean,
                _ => s.median,
            };
            let global = sigma_clipped_stats(good, clip).map(|s| pick(&s));
            local_values(image, flagged, targets, clip, global, pick)
        }
    }
}

fn local_values<F>(
    image: &Array2<f32>,
    flagged: &Array2<bool>,
    targets: &Array2<bool>,
    clip: &SigmaClipParams,
    global: Option<f32>,
    pick: F,
) -> Array2<Option<f32>>
where
    F: Fn(&ClippedStats) -> f32 + Sync,
{
    let (h, w) = image.dim();
    let r = REPLACE_WINDOW_RADIUS;

    map_pixels((h, w), |row, col| {
        if !targets[[row, col]] {
            return None;
        }
        let mut window = Vec::with_capacity((2 * r + 1) * (2 * r + 1));
        for rr in row.saturating_sub(r)..(row + r + 1).min(h) {
            for cc in col.saturating_sub(r)..(col + r + 1).min(w) {
                let v = image[[rr, cc]];
                if !flagged[[rr, cc]] && v.is_finite() {
                    window.push(v);
                }
            }
        }
        if window.len() >= REPLACE_MIN_SAMPLES {
            sigma_clipped_stats(&window, clip).map(|s| pick(&s)).or(global)
        } else {
            global
        }
    })
}
