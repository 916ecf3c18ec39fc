use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Build an array row by row: `f(row, out_row)` fills one output row.
///
/// Rows are evaluated in parallel once the image reaches
/// [`PARALLEL_PIXEL_THRESHOLD`] pixels; smaller images stay sequential.
pub fn map_rows<T, F>(shape: (usize, usize), f: F) -> Array2<T>
where
    T: Clone + Default + Send + Sync,
    F: Fn(usize, &mut [T]) + Sync,
{
    let (h, w) = shape;
    let mut out = Array2::from_elem((h, w), T::default());

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut line)| fill_row(&f, row, &mut line));
    } else {
        for (row, mut line) in out.axis_iter_mut(Axis(0)).enumerate() {
            fill_row(&f, row, &mut line);
        }
    }

    out
}

/// Build an array by evaluating `f(row, col)` at every pixel.
pub fn map_pixels<T, F>(shape: (usize, usize), f: F) -> Array2<T>
where
    T: Clone + Default + Send + Sync,
    F: Fn(usize, usize) -> T + Sync,
{
    map_rows(shape, |row, out: &mut [T]| {
        for (col, v) in out.iter_mut().enumerate() {
            *v = f(row, col);
        }
    })
}

fn fill_row<T, F>(f: &F, row: usize, line: &mut ndarray::ArrayViewMut1<'_, T>)
where
    T: Clone + Default,
    F: Fn(usize, &mut [T]),
{
    match line.as_slice_mut() {
        Some(slice) => f(row, slice),
        None => {
            let mut buf = vec![T::default(); line.len()];
            f(row, &mut buf);
            for (dst, src) in line.iter_mut().zip(buf) {
                *dst = src;
            }
        }
    }
}

/// Mirror an out-of-range index back into `0..n` (`d c b a | a b c d | d c b a`).
pub fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}
