use ndarray::Array2;

/// Binary dilation: a pixel becomes true if ANY pixel in its 3x3 neighborhood is true.
pub fn dilate_3x3(mask: &Array2<bool>) -> Array2<bool> {
    let (h, w) = mask.dim();
    let mut result = Array2::from_elem((h, w), false);

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            for r in row.saturating_sub(1)..=(row + 1).min(h - 1) {
                for c in col.saturating_sub(1)..=(col + 1).min(w - 1) {
                    result[[r, c]] = true;
                }
            }
        }
    }

    result
}

/// Pixels of `candidates` that touch (3x3) a pixel of `seeds`, plus the seeds
/// themselves when they are candidates.
pub fn neighbours_of(seeds: &Array2<bool>, candidates: &Array2<bool>) -> Array2<bool> {
    let mut grown = dilate_3x3(seeds);
    ndarray::Zip::from(&mut grown)
        .and(candidates)
        .for_each(|g, &c| *g = *g && c);
    grown
}
