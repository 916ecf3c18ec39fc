use std::f32::consts::PI;

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{HOUGH_THETA_BINS, TRAIL_MAX_PEAKS};
use crate::detection::components::{label_components, remove_small_components, Connectivity};
use crate::detection::SatelliteDetector;
use crate::error::{ensure_shape, Result};
use crate::filters::{gaussian_blur_array, percentile_stretch, sobel};
use crate::mask::morphology::dilate_3x3;
use crate::stats::median_of;

/// Trail detection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatelliteParams {
    /// Gaussian smoothing before edge detection, in pixels (default: 3.0).
    #[serde(default = "default_sigma")]
    pub sigma: f32,
    /// Half-width of the masked band around each trail (default: 20).
    #[serde(default = "default_buf")]
    pub buf: usize,
    /// Hysteresis low threshold on the gradient magnitude (default: 0.1).
    #[serde(default = "default_low_thresh")]
    pub low_thresh: f32,
    /// Hysteresis high threshold on the gradient magnitude (default: 0.5).
    #[serde(default = "default_high_thresh")]
    pub high_thresh: f32,
    /// Edge groups smaller than this are discarded (default: 60).
    #[serde(default = "default_small_edge")]
    pub small_edge: usize,
    /// Minimum accepted segment length (default: 200).
    #[serde(default = "default_line_len")]
    pub line_len: usize,
    /// Largest gap bridged inside one segment (default: 75).
    #[serde(default = "default_line_gap")]
    pub line_gap: usize,
    /// Percentiles mapped to 0 and 1 before edge detection (default: 4.5, 93.0).
    #[serde(default = "default_percentile")]
    pub percentile: (f32, f32),
}

fn default_sigma() -> f32 {
    3.0
}

fn default_buf() -> usize {
    20
}

fn default_low_thresh() -> f32 {
    0.1
}

fn default_high_thresh() -> f32 {
    0.5
}

fn default_small_edge() -> usize {
    60
}

fn default_line_len() -> usize {
    200
}

fn default_line_gap() -> usize {
    75
}

fn default_percentile() -> (f32, f32) {
    (4.5, 93.0)
}

impl Default for SatelliteParams {
    fn default() -> Self {
        Self {
            sigma: default_sigma(),
            buf: default_buf(),
            low_thresh: default_low_thresh(),
            high_thresh: default_high_thresh(),
            small_edge: default_small_edge(),
            line_len: default_line_len(),
            line_gap: default_line_gap(),
            percentile: default_percentile(),
        }
    }
}

/// A straight trail segment in pixel coordinates (x = column, y = row).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

impl Segment {
    pub fn length(&self) -> f32 {
        (self.end.0 - self.start.0).hypot(self.end.1 - self.start.1)
    }

    fn distance_to(&self, x: f32, y: f32) -> f32 {
        let (dx, dy) = (self.end.0 - self.start.0, self.end.1 - self.start.1);
        let len2 = dx * dx + dy * dy;
        let t = if len2 > 0.0 {
            (((x - self.start.0) * dx + (y - self.start.1) * dy) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (px, py) = (self.start.0 + t * dx, self.start.1 + t * dy);
        (x - px).hypot(y - py)
    }
}

/// Canny edges followed by a Hough transform, in the manner of the HST
/// ACS satellite-trail finder.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrailDetector;

impl SatelliteDetector for TrailDetector {
    fn detect(
        &self,
        image: &Array2<f32>,
        mask: &Array2<bool>,
        params: &SatelliteParams,
    ) -> Result<Array2<bool>> {
        ensure_shape("satellite mask input", image.dim(), mask.dim())?;
        let (h, w) = image.dim();
        let mut result = Array2::from_elem((h, w), false);
        if h < 3 || w < 3 {
            return Ok(result);
        }

        let segments = find_segments(image, mask, params);
        debug!(segments = segments.len(), "Satellite trail search");

        let buf = params.buf as f32;
        for seg in &segments {
            let x_lo = (seg.start.0.min(seg.end.0) - buf).floor().max(0.0) as usize;
            let x_hi = ((seg.start.0.max(seg.end.0) + buf).ceil() as usize).min(w - 1);
            let y_lo = (seg.start.1.min(seg.end.1) - buf).floor().max(0.0) as usize;
            let y_hi = ((seg.start.1.max(seg.end.1) + buf).ceil() as usize).min(h - 1);
            for row in y_lo..=y_hi {
                for col in x_lo..=x_hi {
                    if seg.distance_to(col as f32, row as f32) <= buf {
                        result[[row, col]] = true;
                    }
                }
            }
        }

        Ok(result)
    }
}

/// Trail segments found in `image`, ignoring pixels set in `mask`.
pub fn find_segments(
    image: &Array2<f32>,
    mask: &Array2<bool>,
    params: &SatelliteParams,
) -> Vec<Segment> {
    let mut values: Vec<f32> = image
        .iter()
        .zip(mask.iter())
        .filter(|(v, &m)| !m && v.is_finite())
        .map(|(&v, _)| v)
        .collect();
    let fill = median_of(&mut values).unwrap_or(0.0);

    let filled = Zip::from(image)
        .and(mask)
        .map_collect(|&v, &m| if m || !v.is_finite() { fill } else { v });
    let (scaled, _) = percentile_stretch(&filled, Some(mask), params.percentile.0, params.percentile.1);

    let mut edges = canny(&scaled, params.sigma, params.low_thresh, params.high_thresh);

    // Masked regions produce spurious step edges once filled.
    let near_mask = dilate_3x3(&dilate_3x3(mask));
    Zip::from(&mut edges).and(&near_mask).for_each(|e, &m| *e = *e && !m);

    let edges = remove_small_components(&edges, params.small_edge, Connectivity::Eight);
    hough_segments(&edges, params)
}

/// Canny edge map: smoothing, Sobel gradients, non-maximum suppression and
/// hysteresis between `low` and `high` gradient magnitudes.
pub fn canny(image: &Array2<f32>, sigma: f32, low: f32, high: f32) -> Array2<bool> {
    let (h, w) = image.dim();
    let smoothed = gaussian_blur_array(image, sigma);
    let (gx, gy) = sobel(&smoothed);
    let magnitude = Zip::from(&gx).and(&gy).map_collect(|&x, &y| x.hypot(y));

    let mut thin = Array2::<f32>::zeros((h, w));
    for row in 1..h.saturating_sub(1) {
        for col in 1..w.saturating_sub(1) {
            let m = magnitude[[row, col]];
            if m <= 0.0 {
                continue;
            }
            let angle = gy[[row, col]].atan2(gx[[row, col]]).to_degrees().rem_euclid(180.0);
            let (dr, dc): (isize, isize) = if !(22.5..157.5).contains(&angle) {
                (0, 1)
            } else if angle < 67.5 {
                (1, 1)
            } else if angle < 112.5 {
                (1, 0)
            } else {
                (1, -1)
            };
            let a = magnitude[[(row as isize + dr) as usize, (col as isize + dc) as usize]];
            let b = magnitude[[(row as isize - dr) as usize, (col as isize - dc) as usize]];
            if m >= a && m >= b {
                thin[[row, col]] = m;
            }
        }
    }

    let weak = thin.mapv(|m| m >= low && m > 0.0);
    let labeling = label_components(&weak, Connectivity::Eight);
    let max_label = labeling
        .components
        .iter()
        .map(|c| c.label as usize)
        .max()
        .unwrap_or(0);
    let mut has_strong = vec![false; max_label + 1];
    Zip::from(&labeling.labels).and(&thin).for_each(|&l, &m| {
        if l > 0 && m >= high {
            has_strong[l as usize] = true;
        }
    });
    labeling.labels.mapv(|l| l > 0 && has_strong[l as usize])
}

fn hough_segments(edges: &Array2<bool>, params: &SatelliteParams) -> Vec<Segment> {
    let (h, w) = edges.dim();
    let points: Vec<(usize, usize)> = edges
        .indexed_iter()
        .filter(|(_, &e)| e)
        .map(|(idx, _)| idx)
        .collect();
    if points.len() < params.line_len / 2 {
        return Vec::new();
    }

    let diag = ((h * h + w * w) as f32).sqrt().ceil() as usize;
    let n_rho = 2 * diag + 1;
    let trig: Vec<(f32, f32)> = (0..HOUGH_THETA_BINS)
        .map(|t| {
            let theta = t as f32 * PI / HOUGH_THETA_BINS as f32;
            (theta.cos(), theta.sin())
        })
        .collect();

    let mut accumulator = Array2::<u32>::zeros((HOUGH_THETA_BINS, n_rho));
    for &(row, col) in &points {
        for (t, &(cos, sin)) in trig.iter().enumerate() {
            let rho = col as f32 * cos + row as f32 * sin;
            let bin = (rho.round() as isize + diag as isize) as usize;
            accumulator[[t, bin]] += 1;
        }
    }

    let min_votes = (params.line_len / 2).max(1) as u32;
    let mut peaks = Vec::new();
    for ((t, r), &votes) in accumulator.indexed_iter() {
        if votes < min_votes {
            continue;
        }
        let is_max = (-1..=1isize).all(|dt| {
            (-1..=1isize).all(|dr| {
                let tt = (t as isize + dt).rem_euclid(HOUGH_THETA_BINS as isize) as usize;
                let rr = r as isize + dr;
                if rr < 0 || rr >= n_rho as isize || (dt == 0 && dr == 0) {
                    return true;
                }
                let other = accumulator[[tt, rr as usize]];
                // Ties resolve towards the lower index.
                other < votes || (other == votes && (tt, rr as usize) > (t, r))
            })
        });
        if is_max {
            peaks.push((votes, t, r));
        }
    }
    peaks.sort_unstable_by(|a, b| b.0.cmp(&a.0).then((a.1, a.2).cmp(&(b.1, b.2))));
    peaks.truncate(TRAIL_MAX_PEAKS);

    let mut segments = Vec::new();
    for &(_, t, r) in &peaks {
        let (cos, sin) = trig[t];
        let rho = r as f32 - diag as f32;
        segments.extend(walk_line(edges, cos, sin, rho, params));
    }
    segments
}

/// Follow the line `x cos + y sin = rho` across the image and split the
/// supporting edge pixels into segments separated by gaps longer than `line_gap`.
fn walk_line(
    edges: &Array2<bool>,
    cos: f32,
    sin: f32,
    rho: f32,
    params: &SatelliteParams,
) -> Vec<Segment> {
    let (h, w) = edges.dim();
    let (x0, y0) = (rho * cos, rho * sin);
    let (dx, dy) = (-sin, cos);
    let span = ((h * h + w * w) as f32).sqrt();

    let supported = |x: f32, y: f32| -> bool {
        (-1..=1).any(|k| {
            let px = (x + k as f32 * cos).round();
            let py = (y + k as f32 * sin).round();
            px >= 0.0
                && py >= 0.0
                && (px as usize) < w
                && (py as usize) < h
                && edges[[py as usize, px as usize]]
        })
    };

    let mut segments = Vec::new();
    let mut current: Option<(f32, f32)> = None;
    let mut gap = 0usize;
    let steps = (2.0 * span).ceil() as isize;

    for step in -steps / 2..=steps / 2 {
        let s = step as f32;
        let (x, y) = (x0 + s * dx, y0 + s * dy);
        if supported(x, y) {
            current = Some(match current {
                Some((start, _)) => (start, s),
                None => (s, s),
            });
            gap = 0;
        } else if let Some((start, end)) = current {
            gap += 1;
            if gap > params.line_gap {
                push_segment(&mut segments, start, end, (x0, y0), (dx, dy), params.line_len);
                current = None;
                gap = 0;
            }
        }
    }
    if let Some((start, end)) = current {
        push_segment(&mut segments, start, end, (x0, y0), (dx, dy), params.line_len);
    }
    segments
}

fn push_segment(
    out: &mut Vec<Segment>,
    start: f32,
    end: f32,
    origin: (f32, f32),
    dir: (f32, f32),
    min_len: usize,
) {
    let seg = Segment {
        start: (origin.0 + start * dir.0, origin.1 + start * dir.1),
        end: (origin.0 + end * dir.0, origin.1 + end * dir.1),
    };
    if seg.length() >= min_len as f32 {
        out.push(seg);
    }
}
