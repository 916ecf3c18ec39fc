use ndarray::Array2;

use crate::parallel::map_rows;

/// Sobel derivatives `(gx, gy)` of `data`.
///
/// `gx` grows to the right, `gy` grows downwards. The 1-pixel border is zero.
pub fn sobel(data: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = data.dim();
    if h < 3 || w < 3 {
        return (Array2::zeros((h, w)), Array2::zeros((h, w)));
    }

    let gx = map_rows((h, w), |row, out: &mut [f32]| {
        if row == 0 || row == h - 1 {
            return;
        }
        for col in 1..w - 1 {
            out[col] = -data[[row - 1, col - 1]] + data[[row - 1, col + 1]]
                - 2.0 * data[[row, col - 1]]
                + 2.0 * data[[row, col + 1]]
                - data[[row + 1, col - 1]]
                + data[[row + 1, col + 1]];
        }
    });

    let gy = map_rows((h, w), |row, out: &mut [f32]| {
        if row == 0 || row == h - 1 {
            return;
        }
        for col in 1..w - 1 {
            out[col] = -data[[row - 1, col - 1]]
                - 2.0 * data[[row - 1, col]]
                - data[[row - 1, col + 1]]
                + data[[row + 1, col - 1]]
                + 2.0 * data[[row + 1, col]]
                + data[[row + 1, col + 1]];
        }
    });

    (gx, gy)
}
