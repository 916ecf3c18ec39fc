use ndarray::Array2;

use crate::parallel::map_pixels;

/// Dilate `mask` with a disk of the given radius.
///
/// A pixel is set when some seed pixel lies within Euclidean distance
/// `radius` of it. Offsets are searched inside a square window of half-width
/// `ceil(1 + radius)`, so `grow_mask(m, 0.0) == m`. The result depends only on
/// the input bits, never on the execution path.
pub fn grow_mask(mask: &Array2<bool>, radius: f32) -> Array2<bool> {
    if !mask.iter().any(|&m| m) {
        return mask.clone();
    }

    let offsets = disk_offsets(radius);
    let (h, w) = mask.dim();

    map_pixels((h, w), |row, col| {
        offsets.iter().any(|&(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            r >= 0 && r < h as isize && c >= 0 && c < w as isize && mask[[r as usize, c as usize]]
        })
    })
}

fn disk_offsets(radius: f32) -> Vec<(isize, isize)> {
    let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
    let half = (1.0 + radius).ceil() as isize;
    let r2 = radius * radius;

    let mut offsets = Vec::new();
    for dr in -half..=half {
        for dc in -half..=half {
            if (dr * dr + dc * dc) as f32 <= r2 {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}
