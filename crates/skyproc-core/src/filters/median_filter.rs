use ndarray::Array2;

use crate::parallel::{map_rows, reflect_index};
use crate::stats::median_of;

/// Square median filter of odd width `size` with mirrored borders.
///
/// Even sizes are rounded up to the next odd width.
pub fn median_filter(data: &Array2<f32>, size: usize) -> Array2<f32> {
    let size = if size % 2 == 0 { size + 1 } else { size };
    if size <= 1 {
        return data.clone();
    }

    let (h, w) = data.dim();
    let half = (size / 2) as isize;

    map_rows((h, w), |row, out: &mut [f32]| {
        let mut window = Vec::with_capacity(size * size);
        for (col, dst) in out.iter_mut().enumerate() {
            window.clear();
            for dr in -half..=half {
                let r = reflect_index(row as isize + dr, h);
                for dc in -half..=half {
                    let c = reflect_index(col as isize + dc, w);
                    window.push(data[[r, c]]);
                }
            }
            *dst = median_of(&mut window).unwrap_or(0.0);
        }
    })
}
